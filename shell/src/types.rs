/// Field of a [`Stage`] that receives the characters being scanned.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Target { Command, Input, Output }

/// One command between pipe boundaries, with its own redirections.
///
/// An empty `input` or `output` means the stream is not redirected.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Stage {
	pub command: String,
	pub input: String,
	pub output: String,
}

impl Stage {
	pub fn field_mut(&mut self, target: Target) -> &mut String {
		match target {
			Target::Command => &mut self.command,
			Target::Input => &mut self.input,
			Target::Output => &mut self.output,
		}
	}

	pub fn input_path(&self) -> Option<&str> {
		if self.input.is_empty() { None } else { Some(&self.input) }
	}

	pub fn output_path(&self) -> Option<&str> {
		if self.output.is_empty() { None } else { Some(&self.output) }
	}

	pub(crate) fn trim(&mut self) {
		for target in [Target::Command, Target::Input, Target::Output] {
			let field = self.field_mut(target);
			let trimmed = field.trim_matches(|c: char| c.is_ascii_whitespace());
			if trimmed.len() != field.len() {
				*field = trimmed.to_owned();
			}
		}
	}
}

/// Stages parsed from one input line, in source order.
///
/// `stages[0]` writes into the pipe and `stages[1]` reads from it.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Pipeline {
	pub stages: Vec<Stage>,
	pub has_pipe: bool,
}
