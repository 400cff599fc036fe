use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum State { Active, Stopped, Terminated }

pub trait WaitStatusExt {
	fn state(self) -> State;
	/// Shell-style status: the exit code, or 128 plus the signal number.
	fn code(self) -> i32;
}

impl WaitStatusExt for WaitStatus {
	fn state(self) -> State {
		match self {
			WaitStatus::Exited(..) => State::Terminated,
			WaitStatus::Signaled(..) => State::Terminated,
			WaitStatus::Stopped(..) => State::Stopped,
			#[cfg(any(target_os = "linux", target_os = "android"))]
			WaitStatus::PtraceEvent(..) => State::Stopped,
			#[cfg(any(target_os = "linux", target_os = "android"))]
			WaitStatus::PtraceSyscall(..) => State::Stopped,
			WaitStatus::Continued(..) => State::Active,
			WaitStatus::StillAlive => State::Active,
		}
	}

	fn code(self) -> i32 {
		match self {
			WaitStatus::Exited(_, code) => code,
			WaitStatus::Signaled(_, signal, _) => 128 + signal as i32,
			WaitStatus::Stopped(_, signal) => 128 + signal as i32,
			#[cfg(any(target_os = "linux", target_os = "android"))]
			WaitStatus::PtraceEvent(_, signal, _) => 128 + signal as i32,
			#[cfg(any(target_os = "linux", target_os = "android"))]
			WaitStatus::PtraceSyscall(..) => 128 + libc::SIGTRAP,
			WaitStatus::Continued(..) | WaitStatus::StillAlive => 0,
		}
	}
}

/// A child launched for one pipeline stage.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Process {
	pub pid: Pid,
	/// Index of the stage in its pipeline.
	pub stage: usize,
	pub status: WaitStatus,
}

/// Every process launched for one pipeline, in stage order.
#[derive(Debug)]
pub struct Job {
	pub processes: Vec<Process>,
}

impl Job {
	pub fn state(&self) -> State {
		self.processes.iter().map(|pr| pr.status.state()).min().unwrap_or(State::Terminated)
	}

	/// Status of the last stage, as a shell reports a pipeline.
	pub fn code(&self) -> i32 {
		self.processes.iter().max_by_key(|pr| pr.stage).map_or(0, |pr| pr.status.code())
	}

	/// Reaps every process in the job. Children that change state in a
	/// different order than they are waited for keep their status in the
	/// kernel until their turn, so completion order does not matter.
	///
	/// With `untraced`, a stopped child counts as done waiting.
	pub fn wait(&mut self, untraced: bool) -> nix::Result<()> {
		let flags = if untraced { Some(WaitPidFlag::WUNTRACED) } else { None };
		let mut result = Ok(());
		for pr in self.processes.iter_mut().filter(|pr| pr.status.state() == State::Active) {
			match wait_one(pr.pid, flags) {
				Ok(status) => {
					pr.status = status;
					info!("stage {} (pid {}) finished: {:?}", pr.stage, pr.pid, status);
				},
				Err(e) => {
					warn!("waiting for pid {} failed: {}", pr.pid, e);
					if result.is_ok() {
						result = Err(e);
					}
				},
			}
		}
		result
	}
}

fn wait_one(pid: Pid, flags: Option<WaitPidFlag>) -> nix::Result<WaitStatus> {
	loop {
		match waitpid(pid, flags) {
			Err(Errno::EINTR) => continue,
			r => return r,
		}
	}
}

#[derive(Debug)]
pub struct JobBuilder {
	imp: Job,
}

impl JobBuilder {
	pub fn new(size_hint: usize) -> JobBuilder {
		JobBuilder {
			imp: Job { processes: Vec::with_capacity(size_hint) }
		}
	}

	/// Forks a child for `stage` and records it in the job.
	///
	/// # Safety
	///
	/// Same contract as [`unistd::fork`]: in the child, only async-signal-safe
	/// work may happen before it execs or calls `_exit`.
	pub unsafe fn push_fork(&mut self, stage: usize) -> nix::Result<unistd::ForkResult> {
		let r = unistd::fork()?;
		if let unistd::ForkResult::Parent { child: pid } = r {
			debug!("forked pid {} for stage {}", pid, stage);
			self.imp.processes.push(Process { pid, stage, status: WaitStatus::StillAlive });
		}
		Ok(r)
	}

	pub fn build(mut self) -> Job {
		self.imp.processes.sort_by_key(|pr| pr.stage);
		self.imp
	}
}
