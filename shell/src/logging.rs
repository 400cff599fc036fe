use crate::config::{ConfigError, LogConfig};

use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode, WriteLogger};
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
	#[error(transparent)]
	Level(#[from] ConfigError),
	#[error("cannot open log file {}: {}", .path.display(), .source)]
	File { path: PathBuf, source: io::Error },
	#[error("logger already installed: {0}")]
	Install(#[from] log::SetLoggerError),
}

/// Installs the stderr logger, plus a file logger when one is configured.
/// `verbose` raises the stderr level to at least debug.
pub fn init(config: &LogConfig, verbose: bool) -> Result<(), LogError> {
	let mut level = config.level_filter()?;
	if verbose && level < LevelFilter::Debug {
		level = LevelFilter::Debug;
	}
	let log_config = ConfigBuilder::new()
		.set_time_level(LevelFilter::Off)
		.set_target_level(LevelFilter::Off)
		.build();

	let mut loggers: Vec<Box<dyn SharedLogger>> = vec![
		TermLogger::new(level, log_config.clone(), TerminalMode::Stderr, ColorChoice::Auto),
	];
	if let Some(ref path) = config.file {
		let file = OpenOptions::new().create(true).append(true).open(path)
			.map_err(|source| LogError::File { path: path.clone(), source })?;
		loggers.push(WriteLogger::new(LevelFilter::Debug.max(level), log_config, file));
	}
	CombinedLogger::init(loggers)?;
	Ok(())
}
