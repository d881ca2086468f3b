use rengoku::LaunchConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "rengoku";
pub const DEFAULT_SERVER_CONFIG: &str = "Default.json";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
	#[serde(default)]
	pub logs: LogsConfig,
	#[serde(default)]
	pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
	pub dir: Option<String>,
	#[serde(default = "default_max_size")]
	pub max_size_bytes: u64,
	#[serde(default = "default_max_age_days")]
	pub max_age_days: u32,
	#[serde(default = "default_max_files")]
	pub max_files: u32,
}

impl Default for LogsConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			dir: None,
			max_size_bytes: default_max_size(),
			max_age_days: default_max_age_days(),
			max_files: default_max_files(),
		}
	}
}

impl LogsConfig {
	pub fn resolve_dir(&self) -> PathBuf {
		match &self.dir {
			Some(dir) => expand_tilde(dir),
			None => state_dir().join("logs"),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
	#[serde(default = "default_stop_timeout")]
	pub stop_timeout_secs: u64,
}

impl Default for ShutdownConfig {
	fn default() -> Self {
		Self {
			stop_timeout_secs: default_stop_timeout(),
		}
	}
}

fn default_true() -> bool {
	true
}
fn default_max_size() -> u64 {
	10 * 1024 * 1024
}
fn default_max_age_days() -> u32 {
	14
}
fn default_max_files() -> u32 {
	20
}
fn default_stop_timeout() -> u64 {
	60
}

pub fn config_dir() -> PathBuf {
	if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
		PathBuf::from(dir).join(APP_NAME)
	} else if let Some(home) = home_dir() {
		home.join(".config").join(APP_NAME)
	} else {
		PathBuf::from("/tmp").join(APP_NAME).join("config")
	}
}

pub fn state_dir() -> PathBuf {
	if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
		PathBuf::from(dir).join(APP_NAME)
	} else if let Some(home) = home_dir() {
		home.join(".local").join("state").join(APP_NAME)
	} else {
		PathBuf::from("/tmp").join(APP_NAME)
	}
}

pub fn parse_settings(content: &str) -> Result<Settings, String> {
	toml::from_str(content).map_err(|e| e.to_string())
}

/// Read `config.toml`, falling back to defaults when it is missing or broken.
pub fn load_settings() -> Settings {
	let path = config_dir().join("config.toml");
	if path.exists() {
		match std::fs::read_to_string(&path) {
			Ok(content) => match parse_settings(&content) {
				Ok(settings) => return settings,
				Err(e) => eprintln!("warning: failed to parse {}: {}", path.display(), e),
			},
			Err(e) => eprintln!("warning: failed to read {}: {}", path.display(), e),
		}
	}
	Settings::default()
}

/// Load a server config. A relative `workingDirectory` is taken relative to
/// the config file itself; an empty one means the current directory.
pub fn load_server_config(path: &Path) -> Result<LaunchConfig, String> {
	let content = std::fs::read_to_string(path).map_err(|e| {
		if e.kind() == std::io::ErrorKind::NotFound {
			format!("{} not found (create one with 'rgk init')", path.display())
		} else {
			format!("failed to read {}: {}", path.display(), e)
		}
	})?;
	let mut config: LaunchConfig = serde_json::from_str(&content)
		.map_err(|e| format!("invalid server config {}: {}", path.display(), e))?;

	let wd = &config.working_directory;
	if !wd.as_os_str().is_empty() && wd.is_relative() {
		let base = path.parent().unwrap_or_else(|| Path::new(""));
		config.working_directory = base.join(wd);
	}
	Ok(config)
}

pub fn write_default_server_config(path: &Path, force: bool) -> Result<(), String> {
	if path.exists() && !force {
		return Err(format!("{} already exists (use --force to overwrite)", path.display()));
	}
	let mut json = serde_json::to_string_pretty(&LaunchConfig::default())
		.map_err(|e| format!("failed to serialize config: {}", e))?;
	json.push('\n');
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		std::fs::create_dir_all(parent)
			.map_err(|e| format!("failed to create {}: {}", parent.display(), e))?;
	}
	std::fs::write(path, json).map_err(|e| format!("failed to write {}: {}", path.display(), e))
}

/// Console log prefix: the config file name without extension.
pub fn server_name(config_path: &Path) -> String {
	config_path
		.file_stem()
		.map(|s| s.to_string_lossy().into_owned())
		.filter(|s| !s.is_empty())
		.unwrap_or_else(|| "server".to_string())
}

fn expand_tilde(path: &str) -> PathBuf {
	if let Some(rest) = path.strip_prefix("~/") {
		if let Some(home) = home_dir() {
			return home.join(rest);
		}
	}
	PathBuf::from(path)
}

fn home_dir() -> Option<PathBuf> {
	std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

	fn temp_dir(name: &str) -> PathBuf {
		let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
		let dir = std::env::temp_dir().join(format!("rgk-test-{}-{}-{}", std::process::id(), n, name));
		let _ = std::fs::create_dir_all(&dir);
		dir
	}

	#[test]
	fn settings_defaults_when_empty() {
		let s = parse_settings("").unwrap();
		assert!(s.logs.enabled);
		assert_eq!(s.logs.max_size_bytes, 10 * 1024 * 1024);
		assert_eq!(s.shutdown.stop_timeout_secs, 60);
	}

	#[test]
	fn settings_partial_override() {
		let s = parse_settings(
			"[logs]\ndir = \"/var/log/mc\"\nmax_files = 3\n\n[shutdown]\nstop_timeout_secs = 15\n",
		)
		.unwrap();
		assert_eq!(s.logs.resolve_dir(), PathBuf::from("/var/log/mc"));
		assert_eq!(s.logs.max_files, 3);
		assert_eq!(s.logs.max_age_days, 14);
		assert_eq!(s.shutdown.stop_timeout_secs, 15);
	}

	#[test]
	fn settings_reject_wrong_types() {
		assert!(parse_settings("[shutdown]\nstop_timeout_secs = \"soon\"\n").is_err());
	}

	#[test]
	fn init_then_load_yields_defaults() {
		let dir = temp_dir("init");
		let path = dir.join("Default.json");
		write_default_server_config(&path, false).unwrap();
		assert_eq!(load_server_config(&path).unwrap(), LaunchConfig::default());

		let err = write_default_server_config(&path, false).unwrap_err();
		assert!(err.contains("already exists"));
		assert!(write_default_server_config(&path, true).is_ok());
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn relative_working_directory_follows_config_file() {
		let dir = temp_dir("relative");
		let path = dir.join("Creative.json");
		std::fs::write(&path, r#"{ "workingDirectory": "creative", "minHeapGB": 2 }"#).unwrap();

		let config = load_server_config(&path).unwrap();
		assert_eq!(config.working_directory, dir.join("creative"));
		assert_eq!(config.min_heap_gb, 2);
		assert_eq!(config.max_heap_gb, 4);
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn missing_config_suggests_init() {
		let err = load_server_config(Path::new("/nonexistent/rgk/Default.json")).unwrap_err();
		assert!(err.contains("rgk init"), "{}", err);
	}

	#[test]
	fn server_name_from_file_stem() {
		assert_eq!(server_name(Path::new("/srv/Default.json")), "Default");
		assert_eq!(server_name(Path::new("")), "server");
	}
}
