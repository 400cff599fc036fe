use crate::config::Limits;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenizeError {
	#[error("argument list too long ({count} arguments, limit {limit})")]
	TooManyArguments { count: usize, limit: usize },
}

fn is_whitespace(c: char) -> bool {
	c.is_ascii_whitespace()
}

/// Splits command text on runs of whitespace. Quotes and backslashes are
/// ordinary characters.
pub fn tokenize(text: &str) -> Vec<&str> {
	text.split(is_whitespace).filter(|word| !word.is_empty()).collect()
}

pub fn tokenize_checked<'a>(text: &'a str, limits: &Limits) -> Result<Vec<&'a str>, TokenizeError> {
	let words = tokenize(text);
	if words.len() > limits.max_arguments {
		return Err(TokenizeError::TooManyArguments { count: words.len(), limit: limits.max_arguments });
	}
	Ok(words)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parser;

	#[test]
	fn splits_parsed_command() {
		let pipeline = parser::parse("ls -l -a");
		assert_eq!(tokenize(&pipeline.stages[0].command), vec!["ls", "-l", "-a"]);
	}

	#[test]
	fn runs_of_whitespace() {
		assert_eq!(tokenize("  wc \t -l\n"), vec!["wc", "-l"]);
	}

	#[test]
	fn blank_is_empty() {
		assert!(tokenize("").is_empty());
		assert!(tokenize(" \t ").is_empty());
	}

	#[test]
	fn quotes_are_not_special() {
		assert_eq!(tokenize(r#"echo "a b" c\ d"#), vec!["echo", "\"a", "b\"", "c\\", "d"]);
	}

	#[test]
	fn argument_limit() {
		let limits = Limits { max_line_length: 1024, max_arguments: 3 };
		assert_eq!(tokenize_checked("a b c", &limits), Ok(vec!["a", "b", "c"]));
		assert_eq!(tokenize_checked("a b c d", &limits),
			Err(TokenizeError::TooManyArguments { count: 4, limit: 3 }));
	}
}
