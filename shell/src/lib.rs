//! A line interpreter that runs one external command, or two joined by a
//! single pipe, with `<` and `>` redirections.
//!
//! A line goes through [`parser::parse`], each stage's command text through
//! [`tokenize::tokenize`], and the resulting pipeline through [`eval::eval`],
//! which forks, wires descriptors, execs, and reaps.

pub mod config;
pub mod eval;
pub mod global;
pub mod job;
pub mod logging;
pub mod parser;
pub mod search;
pub mod tokenize;
pub mod types;

pub use global::State;
