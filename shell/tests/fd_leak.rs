// Alone in its own binary: other tests opening descriptors concurrently
// would skew the count.

use psh::config::Config;
use psh::{eval, parser};

use std::fs;

fn open_descriptors() -> usize {
	fs::read_dir("/proc/self/fd").unwrap().count()
}

#[test]
#[cfg(target_os = "linux")]
fn pipe_ends_are_closed_in_the_parent() {
	let dir = tempfile::tempdir().unwrap();
	let file = dir.path().join("file.txt");
	fs::write(&file, "a\nb\n").unwrap();
	let count = dir.path().join("count.txt");
	let line = format!("cat {} | wc -l > {}", file.display(), count.display());
	let config = Config::default();

	let before = open_descriptors();
	for _ in 0..5 {
		let job = eval::eval(&config, &parser::parse(&line)).unwrap();
		assert_eq!(job.code(), 0);
	}
	assert_eq!(open_descriptors(), before);
	assert_eq!(fs::read_to_string(&count).unwrap().trim(), "2");
}
