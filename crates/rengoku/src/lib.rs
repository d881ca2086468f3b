//! # rengoku
//!
//! Single-server supervisor for Rust CLIs.
//!
//! Plan a JVM-style launch from a config record, spawn the server, stream its
//! console output, feed it commands, and shut it down either politely
//! (`stop`) or by signal.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use rengoku::{plan, LaunchConfig, Supervisor, SupervisorConfig};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = plan::validate(LaunchConfig::default()).unwrap();
//! let launch = plan::plan(&config);
//!
//! let (sup, mut output) = Supervisor::new(SupervisorConfig::default());
//! let runner = {
//!     let sup = sup.clone();
//!     tokio::spawn(async move { sup.start(&launch, launch.working_dir()).await })
//! };
//!
//! tokio::spawn(async move {
//!     while let Some(chunk) = output.stdout.recv().await {
//!         print!("{}", chunk);
//!     }
//! });
//!
//! sup.send_command("say hello").await;
//! sup.stop().await.unwrap();
//! runner.await.unwrap().unwrap();
//! # }
//! ```

pub mod error;
pub mod logs;
pub mod output;
pub mod plan;
pub mod supervisor;
pub mod types;

pub use error::{LaunchError, SupervisorError, ValidationError};
pub use output::{LogWriter, OutputStreams, OutputTail};
pub use supervisor::{Supervisor, SupervisorConfig, STOP_COMMAND};
pub use types::*;
