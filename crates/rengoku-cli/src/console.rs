use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use owo_colors::OwoColorize;
use rengoku::{plan, StopOutcome, StreamKind, Supervisor, SupervisorConfig, SupervisorState};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{self, Settings};

/// Launch the server described by `config_path` and attach the terminal to it.
///
/// Returns the exit code rgk should exit with.
pub async fn run(config_path: &Path, settings: &Settings) -> Result<i32, String> {
	let launch_config = config::load_server_config(config_path)?;
	let launch_config = plan::validate(launch_config).map_err(|e| e.to_string())?;
	let launch = plan::plan(&launch_config);
	let name = config::server_name(config_path);

	let log_dir = settings.logs.enabled.then(|| settings.logs.resolve_dir());
	if let Some(dir) = &log_dir {
		rengoku::logs::expire_logs(dir, &name, settings.logs.max_age_days, settings.logs.max_files);
	}

	let (sup, output) = Supervisor::new(SupervisorConfig {
		name: name.clone(),
		log_dir,
		max_log_size: settings.logs.max_size_bytes,
	});
	if let Some(path) = sup.log_path() {
		eprintln!("{} {}", "logging to".dimmed(), path.display());
	}
	eprintln!("{} {} {}", "starting".green().bold(), name.bold(), launch.to_string().dimmed());

	let printers = [
		spawn_printer(output.stdout, StreamKind::Stdout),
		spawn_printer(output.stderr, StreamKind::Stderr),
	];

	let mut runner = {
		let sup = Arc::clone(&sup);
		tokio::spawn(async move { sup.start(&launch, launch.working_dir()).await })
	};

	let forwarder = tokio::spawn(forward_commands(Arc::clone(&sup), spawn_input_reader()));
	let stop_timeout = Duration::from_secs(settings.shutdown.stop_timeout_secs);
	let mut interrupts = 0u32;

	let started = loop {
		tokio::select! {
			joined = &mut runner => break joined,
			_ = tokio::signal::ctrl_c() => {
				interrupts += 1;
				let sup = Arc::clone(&sup);
				if interrupts == 1 {
					eprintln!("{} (Ctrl-C again to force)", "stopping".yellow().bold());
					tokio::spawn(async move { stop_in_background(&sup, stop_timeout).await });
				} else {
					eprintln!("{}", "terminating".red().bold());
					tokio::spawn(async move { sup.terminate().await });
				}
			}
		}
	};

	forwarder.abort();
	for printer in printers {
		let _ = printer.await;
	}

	match started {
		Ok(Ok(())) => {}
		Ok(Err(e)) => return Err(e.to_string()),
		Err(e) => return Err(format!("supervisor task failed: {}", e)),
	}

	match sup.state() {
		SupervisorState::Terminated { exit_code: Some(code) } => {
			eprintln!("{} with code {}", "server exited".bold(), code);
			Ok(code)
		}
		_ => {
			eprintln!("{} by signal", "server exited".bold());
			Ok(1)
		}
	}
}

async fn stop_in_background(sup: &Supervisor, timeout: Duration) {
	match sup.stop_timeout(timeout).await {
		Ok(StopOutcome::Graceful) => {}
		Ok(StopOutcome::Forced) => {
			eprintln!("{} after {}s", "forced shutdown".red().bold(), timeout.as_secs())
		}
		Err(e) => tracing::debug!("stop: {}", e),
	}
}

/// Feed typed lines to the server in order, off the signal-handling loop so
/// a full stdin pipe cannot delay Ctrl-C.
async fn forward_commands(sup: Arc<Supervisor>, mut input: mpsc::UnboundedReceiver<String>) {
	while let Some(line) = input.recv().await {
		sup.send_command(line.trim_end_matches('\r')).await;
	}
}

fn spawn_printer(mut rx: mpsc::UnboundedReceiver<String>, stream: StreamKind) -> JoinHandle<()> {
	tokio::spawn(async move {
		while let Some(chunk) = rx.recv().await {
			let result = match stream {
				StreamKind::Stdout => {
					let mut out = std::io::stdout().lock();
					out.write_all(chunk.as_bytes()).and_then(|_| out.flush())
				}
				StreamKind::Stderr => {
					let mut err = std::io::stderr().lock();
					err.write_all(chunk.as_bytes()).and_then(|_| err.flush())
				}
			};
			if result.is_err() {
				break;
			}
		}
	})
}

/// Terminal lines, read on a plain thread since stdin blocks.
fn spawn_input_reader() -> mpsc::UnboundedReceiver<String> {
	let (tx, rx) = mpsc::unbounded_channel();
	std::thread::spawn(move || {
		let stdin = std::io::stdin();
		for line in stdin.lock().lines() {
			let Ok(line) = line else { break };
			if tx.send(line).is_err() {
				break;
			}
		}
	});
	rx
}

#[cfg(test)]
mod tests {
	use super::*;
	use rengoku::LaunchPlan;

	#[tokio::test]
	async fn typed_lines_reach_the_server_in_order() {
		let (sup, mut output) = Supervisor::new(SupervisorConfig::default());
		let runner = {
			let sup = Arc::clone(&sup);
			let plan = LaunchPlan::new("cat", Vec::<String>::new());
			tokio::spawn(async move { sup.start(&plan, plan.working_dir()).await })
		};
		let mut rx = sup.subscribe();
		rx.wait_for(|s| s.is_running()).await.unwrap();

		let (tx, input) = mpsc::unbounded_channel();
		let forwarder = tokio::spawn(forward_commands(Arc::clone(&sup), input));
		for line in ["list\r", "say hi", "save-all"] {
			tx.send(line.to_string()).unwrap();
		}
		drop(tx);
		forwarder.await.unwrap();

		let mut echoed = String::new();
		while !echoed.ends_with("save-all\n") {
			let chunk = tokio::time::timeout(Duration::from_secs(5), output.stdout.recv())
				.await
				.expect("timed out waiting for echo")
				.expect("stdout closed early");
			echoed.push_str(&chunk);
		}
		assert_eq!(echoed, "list\nsay hi\nsave-all\n");

		sup.terminate().await;
		assert!(runner.await.unwrap().is_ok());
	}
}
