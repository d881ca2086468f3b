use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Everything needed to launch the server, as read from `Default.json`.
///
/// Field names follow the JSON layout (`isManagedRuntime`, `minHeapGB`, ...);
/// the older launcher keys (`typeIsJava`, `executor`, `xms`, `xmx`, `serverPath`,
/// `serverFile`, `serverOptions`) are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LaunchConfig {
	#[serde(alias = "typeIsJava")]
	pub is_managed_runtime: bool,
	#[serde(alias = "executor")]
	pub executable_path: String,
	#[serde(rename = "minHeapGB", alias = "xms")]
	pub min_heap_gb: u32,
	#[serde(rename = "maxHeapGB", alias = "xmx")]
	pub max_heap_gb: u32,
	#[serde(alias = "serverPath")]
	pub working_directory: PathBuf,
	#[serde(alias = "serverFile")]
	pub artifact_file_name: String,
	#[serde(alias = "serverOptions")]
	pub extra_options: Vec<String>,
}

/// G1 tuning flags commonly used for game servers.
pub const DEFAULT_JVM_OPTIONS: &[&str] = &[
	"-XX:+UnlockExperimentalVMOptions",
	"-XX:MaxGCPauseMillis=100",
	"-XX:+DisableExplicitGC",
	"-XX:TargetSurvivorRatio=90",
	"-XX:G1NewSizePercent=50",
	"-XX:G1MaxNewSizePercent=80",
	"-XX:G1MixedGCLiveThresholdPercent=35",
	"-XX:+AlwaysPreTouch",
	"-XX:+ParallelRefProcEnabled",
	"-Dusing.aikars.flags=mcflags.emc.gs",
];

impl Default for LaunchConfig {
	fn default() -> Self {
		Self {
			is_managed_runtime: true,
			executable_path: "java".into(),
			min_heap_gb: 1,
			max_heap_gb: 4,
			working_directory: PathBuf::new(),
			artifact_file_name: "server.jar".into(),
			extra_options: DEFAULT_JVM_OPTIONS.iter().map(|s| s.to_string()).collect(),
		}
	}
}

/// A fully resolved command line plus the directory to run it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
	argv: Vec<String>,
	working_dir: PathBuf,
}

impl LaunchPlan {
	/// Build a plan for an arbitrary program, run in the caller's working directory.
	pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut argv = vec![program.into()];
		argv.extend(args.into_iter().map(Into::into));
		Self {
			argv,
			working_dir: PathBuf::new(),
		}
	}

	pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.working_dir = dir.into();
		self
	}

	pub fn program(&self) -> &str {
		&self.argv[0]
	}

	pub fn args(&self) -> &[String] {
		&self.argv[1..]
	}

	pub fn argv(&self) -> &[String] {
		&self.argv
	}

	/// Empty means "inherit the caller's working directory".
	pub fn working_dir(&self) -> &Path {
		&self.working_dir
	}
}

impl fmt::Display for LaunchPlan {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, arg) in self.argv.iter().enumerate() {
			if i > 0 {
				f.write_str(" ")?;
			}
			if arg.is_empty() || arg.contains(char::is_whitespace) {
				write!(f, "'{}'", arg.replace('\'', "'\\''"))?;
			} else {
				f.write_str(arg)?;
			}
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
	Idle,
	Running { pid: u32 },
	Stopping { pid: u32 },
	Terminated { exit_code: Option<i32> },
}

impl SupervisorState {
	pub fn is_running(&self) -> bool {
		matches!(self, SupervisorState::Running { .. } | SupervisorState::Stopping { .. })
	}

	pub fn is_terminated(&self) -> bool {
		matches!(self, SupervisorState::Terminated { .. })
	}

	pub fn pid(&self) -> Option<u32> {
		match self {
			SupervisorState::Running { pid } | SupervisorState::Stopping { pid } => Some(*pid),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
	Stdout,
	Stderr,
}

impl StreamKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			StreamKind::Stdout => "stdout",
			StreamKind::Stderr => "stderr",
		}
	}
}

/// How a bounded cooperative stop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
	Graceful,
	Forced,
}
