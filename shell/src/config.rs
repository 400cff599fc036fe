use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{fs, io};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("cannot read {}: {}", .path.display(), .source)]
	Read { path: PathBuf, source: io::Error },
	#[error("cannot parse {}: {}", .path.display(), .source)]
	Parse { path: PathBuf, source: toml::de::Error },
	#[error("unknown log level: {0}")]
	LogLevel(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	pub shell: ShellConfig,
	pub limits: Limits,
	pub redirect: RedirectConfig,
	pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
	pub prompt: String,
}

/// Bounds on a single input line. Exceeding either is reported as an error;
/// nothing is ever truncated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
	/// Bytes.
	pub max_line_length: usize,
	/// Per stage, program name included.
	pub max_arguments: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedirectConfig {
	/// Permission bits for files created by `>`, before the umask.
	pub output_mode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
	pub level: String,
	pub file: Option<PathBuf>,
}

impl Default for Config {
	fn default() -> Config {
		Config {
			shell: ShellConfig::default(),
			limits: Limits::default(),
			redirect: RedirectConfig::default(),
			log: LogConfig::default(),
		}
	}
}

impl Default for ShellConfig {
	fn default() -> ShellConfig {
		ShellConfig { prompt: "% ".to_owned() }
	}
}

impl Default for Limits {
	fn default() -> Limits {
		Limits { max_line_length: 65536, max_arguments: 4096 }
	}
}

impl Default for RedirectConfig {
	fn default() -> RedirectConfig {
		RedirectConfig { output_mode: 0o644 }
	}
}

impl Default for LogConfig {
	fn default() -> LogConfig {
		LogConfig { level: "warn".to_owned(), file: None }
	}
}

impl LogConfig {
	pub fn level_filter(&self) -> Result<log::LevelFilter, ConfigError> {
		self.level.parse().map_err(|_| ConfigError::LogLevel(self.level.clone()))
	}
}

impl Config {
	pub fn from_toml(content: &str, path: &Path) -> Result<Config, ConfigError> {
		toml::from_str(content).map_err(|source| ConfigError::Parse { path: path.to_owned(), source })
	}

	pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
		let content = fs::read_to_string(path)
			.map_err(|source| ConfigError::Read { path: path.to_owned(), source })?;
		Config::from_toml(&content, path)
	}

	/// `~/.config/psh/config.toml`
	pub fn user_path() -> Option<PathBuf> {
		let home = std::env::var_os("HOME")?;
		Some(Path::new(&home).join(".config/psh/config.toml"))
	}

	/// Loads `explicit` if given, else the user file if it exists, else the
	/// built-in defaults. An explicit file must exist.
	pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
		if let Some(path) = explicit {
			return Config::from_file(path);
		}
		match Config::user_path() {
			Some(path) if path.is_file() => Config::from_file(&path),
			_ => Ok(Config::default()),
		}
	}
}
