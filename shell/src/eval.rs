use crate::config::{Config, Limits};
use crate::job::{Job, JobBuilder};
use crate::search;
use crate::tokenize::{self, TokenizeError};
use crate::types::{Pipeline, Stage};

use std::convert::Infallible;
use std::ffi::{CStr, CString, NulError};
use std::fmt::{self, Write};
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStringExt;

use log::debug;
use nix::errno::Errno;
use nix::fcntl::{self, FcntlArg, FdFlag, OFlag};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::stat::Mode;
use nix::unistd;

/// Failures detected by the interpreter itself. None of them runs a
/// program; the pipe and fork failures abandon the line after cleaning up.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
	#[error("only one pipe per line is supported (got {stages} stages)")]
	TooManyPipes { stages: usize },
	#[error("stage {}: empty command", .stage + 1)]
	EmptyCommand { stage: usize },
	#[error("stage {}: {}", .stage + 1, .source)]
	Tokenize { stage: usize, source: TokenizeError },
	#[error("stage {}: nul byte in {}", .stage + 1, .what)]
	Nul { stage: usize, what: &'static str, source: NulError },
	#[error("could not create a pipe: {0}")]
	Pipe(#[source] nix::Error),
	#[error("fork failed: {0}")]
	Fork(#[source] nix::Error),
	#[error("could not close pipe descriptors: {0}")]
	Close(#[source] nix::Error),
	#[error("wait failed: {0}")]
	Wait(#[source] nix::Error),
}

/// Failures inside a forked child. They end the child, never the shell.
#[derive(Debug, thiserror::Error)]
pub enum ChildError<'a> {
	#[error("failed to open {}: {}", .path.to_string_lossy(), .source)]
	Open { path: &'a CStr, source: nix::Error },
	#[error("failed to duplicate descriptor {fd} onto {target}: {source}")]
	Dup { fd: RawFd, target: RawFd, source: nix::Error },
	#[error("failed to close descriptor {fd}: {source}")]
	Close { fd: RawFd, source: nix::Error },
	#[error("{name}: command not found")]
	NotFound { name: &'a str },
	#[error("failed to reset {signal}: {source}")]
	Signal { signal: Signal, source: nix::Error },
	#[error("failed to run {name}: {source}")]
	Exec { name: &'a str, source: nix::Error },
}

impl ChildError<'_> {
	pub fn exit_code(&self) -> i32 {
		match *self {
			ChildError::NotFound { .. } => 127,
			ChildError::Exec { source: Errno::ENOENT, .. } | ChildError::Exec { source: Errno::ENOTDIR, .. } => 127,
			ChildError::Exec { .. } => 126,
			_ => 1,
		}
	}
}

/// Everything a child needs, prepared before forking so that the child only
/// has to make system calls.
#[derive(Debug, PartialEq, Eq)]
pub struct StagePlan {
	pub index: usize,
	pub name: String,
	/// `None` when the name was not found on `PATH`.
	pub program: Option<CString>,
	pub argv: Vec<CString>,
	pub input: Option<CString>,
	pub output: Option<CString>,
}

fn c_string(stage: usize, what: &'static str, s: &str) -> Result<CString, EvalError> {
	CString::new(s).map_err(|source| EvalError::Nul { stage, what, source })
}

fn c_path(stage: usize, path: Option<&str>) -> Result<Option<CString>, EvalError> {
	path.map(|p| c_string(stage, "redirection path", p)).transpose()
}

pub fn plan_stage(index: usize, stage: &Stage, limits: &Limits) -> Result<StagePlan, EvalError> {
	let words = tokenize::tokenize_checked(&stage.command, limits)
		.map_err(|source| EvalError::Tokenize { stage: index, source })?;
	let name = match words.first() {
		Some(&name) => name,
		None => return Err(EvalError::EmptyCommand { stage: index }),
	};
	let argv = words.iter()
		.map(|w| c_string(index, "argument", w))
		.collect::<Result<Vec<_>, _>>()?;
	let program = match search::lookup(name) {
		Some(path) => Some(CString::new(path.into_os_string().into_vec())
			.map_err(|source| EvalError::Nul { stage: index, what: "program path", source })?),
		None => None,
	};
	Ok(StagePlan {
		index,
		name: name.to_owned(),
		program,
		argv,
		input: c_path(index, stage.input_path())?,
		output: c_path(index, stage.output_path())?,
	})
}

/// Validates the whole pipeline before anything is launched.
pub fn plan_pipeline(pipeline: &Pipeline, limits: &Limits) -> Result<Vec<StagePlan>, EvalError> {
	if pipeline.stages.len() > 2 {
		return Err(EvalError::TooManyPipes { stages: pipeline.stages.len() });
	}
	pipeline.stages.iter().enumerate()
		.map(|(i, stage)| plan_stage(i, stage, limits))
		.collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipeEnd { Read, Write }

struct Pipe {
	read: OwnedFd,
	write: OwnedFd,
}

impl Pipe {
	fn new() -> nix::Result<Pipe> {
		let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC)?;
		Ok(Pipe { read, write })
	}

	fn close(self) -> nix::Result<()> {
		let r = unistd::close(self.read.into_raw_fd());
		let w = unistd::close(self.write.into_raw_fd());
		r.and(w)
	}
}

fn close_in_child<'a>(fd: RawFd) -> Result<(), ChildError<'a>> {
	unistd::close(fd).map_err(|source| ChildError::Close { fd, source })
}

/// Makes `target` a copy of `fd` that survives exec. When the interpreter
/// was started with `target` closed, `fd` may already be `target`: `dup2`
/// would do nothing then and leave close-on-exec set.
fn dup_onto<'a>(fd: RawFd, target: RawFd) -> Result<(), ChildError<'a>> {
	let r = if fd == target {
		fcntl::fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty())).map(drop)
	} else {
		unistd::dup2(fd, target).map(drop)
	};
	r.map_err(|source| ChildError::Dup { fd, target, source })
}

/// Closes `fd` after it was copied onto `target`, unless it is `target`.
fn close_copied<'a>(fd: RawFd, target: RawFd) -> Result<(), ChildError<'a>> {
	if fd == target {
		return Ok(());
	}
	close_in_child(fd)
}

fn redirect(path: &CStr, flags: OFlag, mode: Mode, target: RawFd) -> Result<(), ChildError<'_>> {
	let fd = fcntl::open(path, flags, mode).map_err(|source| ChildError::Open { path, source })?;
	dup_onto(fd, target)?;
	close_copied(fd, target)
}

/// The Rust runtime ignores SIGPIPE and the interactive shell ignores
/// SIGINT; ignored dispositions would survive exec.
fn reset_signals<'a>() -> Result<(), ChildError<'a>> {
	for sig in [Signal::SIGINT, Signal::SIGPIPE] {
		unsafe { signal::signal(sig, SigHandler::SigDfl) }
			.map_err(|source| ChildError::Signal { signal: sig, source })?;
	}
	Ok(())
}

fn do_exec_stage<'a>(plan: &'a StagePlan, pipe: Option<(&Pipe, PipeEnd)>, mode: Mode) -> Result<Infallible, ChildError<'a>> {
	reset_signals()?;
	if let Some((pipe, end)) = pipe {
		let (fd, target) = match end {
			PipeEnd::Read => (pipe.read.as_raw_fd(), libc::STDIN_FILENO),
			PipeEnd::Write => (pipe.write.as_raw_fd(), libc::STDOUT_FILENO),
		};
		dup_onto(fd, target)?;
		close_copied(pipe.read.as_raw_fd(), target)?;
		close_copied(pipe.write.as_raw_fd(), target)?;
	}
	// applied after the pipe so that an explicit redirection wins
	if let Some(ref path) = plan.input {
		redirect(path, OFlag::O_RDONLY, Mode::empty(), libc::STDIN_FILENO)?;
	}
	if let Some(ref path) = plan.output {
		redirect(path, OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC, mode, libc::STDOUT_FILENO)?;
	}
	let program = plan.program.as_ref().ok_or(ChildError::NotFound { name: &plan.name })?;
	unistd::execv(program, &plan.argv).map_err(|source| ChildError::Exec { name: &plan.name, source })
}

/// Fixed-size message buffer for the child. Text past the end is dropped.
struct MessageBuf {
	buf: [u8; 512],
	len: usize,
}

impl MessageBuf {
	fn new() -> MessageBuf {
		MessageBuf { buf: [0; 512], len: 0 }
	}

	fn as_bytes(&self) -> &[u8] {
		&self.buf[..self.len]
	}
}

impl fmt::Write for MessageBuf {
	fn write_str(&mut self, s: &str) -> fmt::Result {
		let n = s.len().min(self.buf.len() - self.len);
		self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
		self.len += n;
		Ok(())
	}
}

/// Runs in the forked child and never returns.
fn exec_stage(plan: &StagePlan, pipe: Option<(&Pipe, PipeEnd)>, mode: Mode) -> ! {
	let e = match do_exec_stage(plan, pipe, mode) {
		Ok(never) => match never {},
		Err(e) => e,
	};
	// no logger and no heap here: their locks may have been held by another
	// thread at fork time
	let mut msg = MessageBuf::new();
	let _ = write!(msg, "psh: {}", e);
	let msg = msg.as_bytes();
	unsafe {
		libc::write(libc::STDERR_FILENO, msg.as_ptr() as *const libc::c_void, msg.len());
		libc::write(libc::STDERR_FILENO, b"\n".as_ptr() as *const libc::c_void, 1);
		libc::_exit(e.exit_code())
	}
}

fn spawn_single(plan: &StagePlan, mode: Mode) -> Result<Job, EvalError> {
	let mut builder = JobBuilder::new(1);
	debug!("running {:?} without a pipe", plan.name);
	match unsafe { builder.push_fork(plan.index) }.map_err(EvalError::Fork)? {
		unistd::ForkResult::Child => exec_stage(plan, None, mode),
		unistd::ForkResult::Parent { .. } => {},
	}
	let mut job = builder.build();
	job.wait(true).map_err(EvalError::Wait)?;
	Ok(job)
}

fn fork_pipe_end(builder: &mut JobBuilder, plan: &StagePlan, pipe: &Pipe, end: PipeEnd, mode: Mode) -> Result<(), EvalError> {
	match unsafe { builder.push_fork(plan.index) }.map_err(EvalError::Fork)? {
		unistd::ForkResult::Child => exec_stage(plan, Some((pipe, end)), mode),
		unistd::ForkResult::Parent { .. } => Ok(()),
	}
}

fn spawn_piped(writer: &StagePlan, reader: &StagePlan, mode: Mode) -> Result<Job, EvalError> {
	let pipe = Pipe::new().map_err(EvalError::Pipe)?;
	debug!("pipe {} -> {}: {:?} | {:?}", pipe.write.as_raw_fd(), pipe.read.as_raw_fd(), writer.name, reader.name);

	let mut builder = JobBuilder::new(2);
	let forked = fork_pipe_end(&mut builder, reader, &pipe, PipeEnd::Read, mode)
		.and_then(|()| fork_pipe_end(&mut builder, writer, &pipe, PipeEnd::Write, mode));
	// only now may the parent give up its ends; the reader sees end of input
	// once the writer is its last holder
	let closed = pipe.close();

	let mut job = builder.build();
	let waited = job.wait(false);
	forked?;
	closed.map_err(EvalError::Close)?;
	waited.map_err(EvalError::Wait)?;
	Ok(job)
}

/// Launches the pipeline and waits for every process it started.
pub fn eval(config: &Config, pipeline: &Pipeline) -> Result<Job, EvalError> {
	let plans = plan_pipeline(pipeline, &config.limits)?;
	let mode = Mode::from_bits_truncate(config.redirect.output_mode as libc::mode_t);
	match plans.as_slice() {
		[single] => spawn_single(single, mode),
		[writer, reader] => spawn_piped(writer, reader, mode),
		_ => Err(EvalError::TooManyPipes { stages: plans.len() }),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parser;

	fn plans(line: &str) -> Result<Vec<StagePlan>, EvalError> {
		plan_pipeline(&parser::parse(line), &Limits::default())
	}

	#[test]
	fn plan_resolves_program_and_paths() {
		let plans = plans("sort -r < names.txt > sorted.txt").unwrap();
		assert_eq!(plans.len(), 1);
		let plan = &plans[0];
		assert_eq!(plan.name, "sort");
		assert_eq!(plan.argv, vec![CString::new("sort").unwrap(), CString::new("-r").unwrap()]);
		assert!(plan.program.as_ref().unwrap().to_bytes().ends_with(b"/sort"));
		assert_eq!(plan.input.as_deref(), Some(c"names.txt"));
		assert_eq!(plan.output.as_deref(), Some(c"sorted.txt"));
	}

	#[test]
	fn plan_unknown_program() {
		let plans = plans("psh-no-such-program arg").unwrap();
		assert_eq!(plans[0].program, None);
		assert_eq!(plans[0].argv.len(), 2);
	}

	#[test]
	fn plan_rejects_empty_stage() {
		assert!(matches!(plans("> out.txt"), Err(EvalError::EmptyCommand { stage: 0 })));
		assert!(matches!(plans("ls |"), Err(EvalError::EmptyCommand { stage: 1 })));
		assert!(matches!(plans(""), Err(EvalError::EmptyCommand { stage: 0 })));
	}

	#[test]
	fn plan_rejects_second_pipe() {
		assert!(matches!(plans("a | b | c"), Err(EvalError::TooManyPipes { stages: 3 })));
	}

	#[test]
	fn plan_rejects_nul() {
		assert!(matches!(plans("echo a\0b"), Err(EvalError::Nul { stage: 0, what: "argument", .. })));
	}

	#[test]
	fn plan_enforces_argument_limit() {
		let limits = Limits { max_line_length: 1024, max_arguments: 2 };
		let err = plan_pipeline(&parser::parse("echo a | echo a b"), &limits).unwrap_err();
		assert!(matches!(err, EvalError::Tokenize { stage: 1, .. }));
		assert_eq!(err.to_string(), "stage 2: argument list too long (3 arguments, limit 2)");
	}

	#[test]
	fn child_exit_codes() {
		assert_eq!(ChildError::NotFound { name: "x" }.exit_code(), 127);
		assert_eq!(ChildError::Exec { name: "x", source: Errno::ENOENT }.exit_code(), 127);
		assert_eq!(ChildError::Exec { name: "x", source: Errno::EACCES }.exit_code(), 126);
		assert_eq!(ChildError::Open { path: c"in.txt", source: Errno::ENOENT }.exit_code(), 1);
		assert_eq!(ChildError::Close { fd: 3, source: Errno::EBADF }.exit_code(), 1);
	}

	#[test]
	fn child_messages_name_the_operation() {
		let e = ChildError::Open { path: c"in.txt", source: Errno::ENOENT };
		assert_eq!(e.to_string(), format!("failed to open in.txt: {}", Errno::ENOENT));
		assert_eq!(ChildError::NotFound { name: "frob" }.to_string(), "frob: command not found");
	}

	#[test]
	fn child_message_fits_fixed_buffer() {
		let mut msg = MessageBuf::new();
		write!(msg, "psh: {}", ChildError::NotFound { name: "frob" }).unwrap();
		assert_eq!(msg.as_bytes(), b"psh: frob: command not found");

		let long = "x".repeat(600);
		let mut msg = MessageBuf::new();
		write!(msg, "psh: {}", ChildError::NotFound { name: &long }).unwrap();
		assert_eq!(msg.as_bytes().len(), 512);
		assert!(msg.as_bytes().starts_with(b"psh: xxx"));
	}
}
