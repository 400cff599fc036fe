use psh::config::Config;
use psh::{global, logging};

use anyhow::Context;
use argh::FromArgs;
use nix::sys::signal::{self, SigHandler, Signal};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::process;

/// Run commands, optionally joined by one pipe, with < and > redirections.
#[derive(FromArgs)]
struct Args {
	/// run this line and exit with its status
	#[argh(option, short = 'c')]
	command: Option<String>,

	/// configuration file (default: ~/.config/psh/config.toml)
	#[argh(option)]
	config: Option<PathBuf>,

	/// log process creation and exit statuses
	#[argh(switch, short = 'v')]
	verbose: bool,
}

fn run_line(state: &mut global::State, line: &str) {
	if let Err(e) = state.eval_line(line) {
		eprintln!("psh: {}", e);
	}
}

fn repl(state: &mut global::State) -> rustyline::Result<()> {
	let mut rl = DefaultEditor::new()?;
	loop {
		match rl.readline(&state.config.shell.prompt) {
			Ok(line) => {
				if !line.trim().is_empty() {
					rl.add_history_entry(line.as_str())?;
				}
				run_line(state, &line);
			},
			Err(ReadlineError::Interrupted) => continue,
			Err(ReadlineError::Eof) => break,
			Err(err) => return Err(err),
		}
	}
	Ok(())
}

fn main() -> anyhow::Result<()> {
	let args: Args = argh::from_env();
	let config = Config::load(args.config.as_deref()).context("loading configuration")?;
	logging::init(&config.log, args.verbose).context("setting up logging")?;

	let mut state = global::State::new(config);
	match args.command {
		Some(line) => run_line(&mut state, &line),
		None => {
			// Ctrl-C is for the running children; the prompt gets it from rustyline
			unsafe { signal::signal(Signal::SIGINT, SigHandler::SigIgn) }.context("ignoring SIGINT")?;
			repl(&mut state).context("reading input")?
		},
	}
	process::exit(state.last_status)
}
