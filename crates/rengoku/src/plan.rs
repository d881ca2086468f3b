//! Turns a [`LaunchConfig`] into the exact command line the server is started with.

use std::path::PathBuf;

use crate::error::ValidationError;
use crate::types::{LaunchConfig, LaunchPlan};

pub const ARCHIVE_EXTENSION: &str = "jar";
pub const RUN_ARCHIVE_FLAG: &str = "-jar";

/// Reject configs that cannot produce a sensible heap range.
///
/// Nothing else is checked here: a missing executable or artifact only
/// shows up when the process is spawned.
pub fn validate(config: LaunchConfig) -> Result<LaunchConfig, ValidationError> {
	if config.min_heap_gb > config.max_heap_gb {
		return Err(ValidationError::InvalidHeapRange {
			min_gb: config.min_heap_gb,
			max_gb: config.max_heap_gb,
		});
	}
	Ok(config)
}

/// Build the argument vector: executable, heap flags, extra options,
/// `-jar` for managed runtimes, then the artifact path last.
pub fn plan(config: &LaunchConfig) -> LaunchPlan {
	let mut args = Vec::with_capacity(config.extra_options.len() + 4);
	args.push(format!("-Xms{}G", config.min_heap_gb));
	args.push(format!("-Xmx{}G", config.max_heap_gb));
	args.extend(config.extra_options.iter().cloned());
	if config.is_managed_runtime {
		args.push(RUN_ARCHIVE_FLAG.to_string());
	}
	args.push(artifact_path(config).to_string_lossy().into_owned());

	LaunchPlan::new(config.executable_path.clone(), args)
		.with_working_dir(config.working_directory.clone())
}

pub fn artifact_path(config: &LaunchConfig) -> PathBuf {
	let mut name = config.artifact_file_name.clone();
	if config.is_managed_runtime && !has_archive_extension(&name) {
		name.push('.');
		name.push_str(ARCHIVE_EXTENSION);
	}
	config.working_directory.join(name)
}

fn has_archive_extension(name: &str) -> bool {
	std::path::Path::new(name)
		.extension()
		.and_then(|e| e.to_str())
		.map(|e| e.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
		.unwrap_or(false)
}
