use std::fmt;
use std::io;

/// Configuration rejected before anything is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
	/// `minHeapGB` is larger than `maxHeapGB`.
	InvalidHeapRange { min_gb: u32, max_gb: u32 },
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ValidationError::InvalidHeapRange { min_gb, max_gb } => write!(
				f,
				"invalid heap range: minimum {}G is larger than maximum {}G",
				min_gb, max_gb
			),
		}
	}
}

impl std::error::Error for ValidationError {}

/// Errors from [`Supervisor::start`](crate::Supervisor::start).
#[derive(Debug)]
pub enum LaunchError {
	/// The OS refused to create the child process.
	SpawnFailed { program: String, source: io::Error },
	/// This supervisor already launched (or tried to launch) a child.
	AlreadyStarted,
}

impl fmt::Display for LaunchError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LaunchError::SpawnFailed { program, source } => {
				write!(f, "failed to spawn {}: {}", program, source)
			}
			LaunchError::AlreadyStarted => write!(f, "supervisor already started"),
		}
	}
}

impl std::error::Error for LaunchError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			LaunchError::SpawnFailed { source, .. } => Some(source),
			LaunchError::AlreadyStarted => None,
		}
	}
}

/// Errors from shutdown requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
	/// There is no live child to stop.
	NotRunning,
}

impl fmt::Display for SupervisorError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SupervisorError::NotRunning => write!(f, "server not running"),
		}
	}
}

impl std::error::Error for SupervisorError {}
