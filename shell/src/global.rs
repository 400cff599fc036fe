use crate::config::Config;
use crate::eval::{self, EvalError};
use crate::job::{Job, State as JobState, WaitStatusExt};
use crate::parser::{self, ParseError};

use log::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Parse(#[from] ParseError),
	#[error(transparent)]
	Eval(#[from] EvalError),
}

impl Error {
	/// Status recorded when a line fails before or while launching.
	pub fn code(&self) -> i32 {
		match *self {
			Error::Parse(_) => 2,
			Error::Eval(EvalError::EmptyCommand { .. }) | Error::Eval(EvalError::TooManyPipes { .. }) => 2,
			Error::Eval(_) => 126,
		}
	}
}

/// Interpreter state carried from one line to the next: the configuration
/// and the status of the last line. Pipelines themselves never outlive
/// their line.
pub struct State {
	pub config: Config,
	pub last_status: i32,
}

impl State {
	pub fn new(config: Config) -> State {
		State { config, last_status: 0 }
	}

	/// Parses and runs one line. Blank lines run nothing, keep the last
	/// status and return `None`.
	pub fn eval_line(&mut self, line: &str) -> Result<Option<Job>, Error> {
		if line.bytes().all(|b| b.is_ascii_whitespace()) {
			debug!("empty input line");
			return Ok(None);
		}
		let result = parser::parse_checked(line, &self.config.limits)
			.map_err(Error::from)
			.and_then(|pipeline| eval::eval(&self.config, &pipeline).map_err(Error::from));
		match result {
			Ok(job) => {
				self.last_status = job.code();
				for pr in &job.processes {
					if pr.status.state() == JobState::Stopped {
						warn!("stage {} (pid {}) is stopped", pr.stage, pr.pid);
					}
				}
				info!("exit status {}", self.last_status);
				Ok(Some(job))
			},
			Err(e) => {
				self.last_status = e.code();
				Err(e)
			},
		}
	}
}
