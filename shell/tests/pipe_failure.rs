// Alone in its own binary: it lowers the process's descriptor limit.

use psh::config::Config;
use psh::eval::{self, EvalError};
use psh::parser;

use nix::fcntl::{fcntl, FcntlArg};
use nix::sys::resource::{getrlimit, setrlimit, Resource};
use std::fs;

fn open_descriptors() -> usize {
	fs::read_dir("/proc/self/fd").unwrap().count()
}

fn lowest_free_descriptor() -> i32 {
	(0..).find(|&fd| fcntl(fd, FcntlArg::F_GETFD).is_err()).unwrap()
}

#[test]
#[cfg(target_os = "linux")]
fn failed_pipe_abandons_the_line() {
	let config = Config::default();
	let line = parser::parse("true | true");
	let (soft, hard) = getrlimit(Resource::RLIMIT_NOFILE).unwrap();
	let before = open_descriptors();

	// every descriptor below the limit is taken, so pipe2 gets EMFILE
	let limit = lowest_free_descriptor() as libc::rlim_t;
	setrlimit(Resource::RLIMIT_NOFILE, limit, hard).unwrap();
	let result = eval::eval(&config, &line);
	setrlimit(Resource::RLIMIT_NOFILE, soft, hard).unwrap();

	assert!(matches!(result, Err(EvalError::Pipe(nix::errno::Errno::EMFILE))), "{:?}", result);
	assert_eq!(open_descriptors(), before);
	let job = eval::eval(&config, &line).unwrap();
	assert_eq!(job.code(), 0);
	assert_eq!(job.processes.len(), 2);
}
