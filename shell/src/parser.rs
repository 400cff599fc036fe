use crate::config::Limits;
use crate::types::*;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("line too long ({len} bytes, limit {limit})")]
	LineTooLong { len: usize, limit: usize },
}

struct Parser {
	stages: Vec<Stage>,
	stage: Stage,
	target: Target,
	has_pipe: bool,
}

impl Parser {
	fn new() -> Parser {
		Parser { stages: vec![], stage: Stage::default(), target: Target::Command, has_pipe: false }
	}

	fn close_stage(&mut self) {
		let mut stage = std::mem::take(&mut self.stage);
		stage.trim();
		self.stages.push(stage);
		self.target = Target::Command;
	}

	fn feed(&mut self, c: char) {
		match c {
			'|' => {
				self.close_stage();
				self.has_pipe = true;
			},
			'<' => self.target = Target::Input,
			'>' => self.target = Target::Output,
			_ => self.stage.field_mut(self.target).push(c),
		}
	}

	fn finish(mut self) -> Pipeline {
		self.close_stage();
		Pipeline { stages: self.stages, has_pipe: self.has_pipe }
	}
}

/// Splits a line into pipeline stages.
///
/// Never fails: an empty line yields a single empty stage, and a stage may
/// carry redirections without a command. Whether the result is runnable is
/// decided when the pipeline is evaluated.
pub fn parse(line: &str) -> Pipeline {
	let mut parser = Parser::new();
	for c in line.chars() {
		parser.feed(c);
	}
	parser.finish()
}

pub fn parse_checked(line: &str, limits: &Limits) -> Result<Pipeline, ParseError> {
	if line.len() > limits.max_line_length {
		return Err(ParseError::LineTooLong { len: line.len(), limit: limits.max_line_length });
	}
	Ok(parse(line))
}
