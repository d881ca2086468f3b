mod config;
mod console;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use rengoku::plan;

use config::DEFAULT_SERVER_CONFIG;

#[derive(Debug, Parser)]
#[command(name = "rgk", version, about = "Launch and babysit a single game server")]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Start the server and attach this terminal to its console
	Run {
		/// Server config file
		#[arg(short, long, default_value = DEFAULT_SERVER_CONFIG)]
		config: PathBuf,
	},
	/// Print the command line the server would be started with
	Plan {
		/// Server config file
		#[arg(short, long, default_value = DEFAULT_SERVER_CONFIG)]
		config: PathBuf,
	},
	/// Write a server config with default values
	Init {
		#[arg(default_value = DEFAULT_SERVER_CONFIG)]
		path: PathBuf,
		/// Overwrite an existing file
		#[arg(long)]
		force: bool,
	},
}

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt().with_writer(std::io::stderr).init();

	let cli = Cli::parse();
	let result = match cli.command {
		Command::Run { config } => {
			let settings = config::load_settings();
			console::run(&config, &settings).await
		}
		Command::Plan { config } => cmd_plan(&config).map(|()| 0),
		Command::Init { path, force } => cmd_init(&path, force).map(|()| 0),
	};

	match result {
		Ok(0) => {}
		Ok(code) => std::process::exit(code),
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			std::process::exit(1);
		}
	}
}

fn cmd_plan(config_path: &std::path::Path) -> Result<(), String> {
	let config = config::load_server_config(config_path)?;
	let config = plan::validate(config).map_err(|e| e.to_string())?;
	let launch = plan::plan(&config);

	println!("{}", launch);
	let dir = launch.working_dir();
	if dir.as_os_str().is_empty() {
		eprintln!("{} (current directory)", "in".dimmed());
	} else {
		eprintln!("{} {}", "in".dimmed(), dir.display());
	}
	Ok(())
}

fn cmd_init(path: &std::path::Path, force: bool) -> Result<(), String> {
	config::write_default_server_config(path, force)?;
	eprintln!("{} {}", "created".green(), path.display());
	Ok(())
}
