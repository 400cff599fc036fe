use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::{env, fs};

const PATH_KEY: &str = "PATH";

fn is_executable(path: &Path) -> bool {
	match fs::metadata(path) {
		Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
		Err(_) => false,
	}
}

/// Resolves a program name the way `execvp` would.
///
/// A name containing a slash is returned unchanged and left for exec to
/// judge. Otherwise the first executable regular file named `name` in one of
/// the `search_paths` directories wins.
pub fn lookup_in(search_paths: &OsStr, name: &str) -> Option<PathBuf> {
	if name.is_empty() {
		return None;
	}
	if name.contains('/') {
		return Some(PathBuf::from(name));
	}
	env::split_paths(search_paths)
		.map(|dir| if dir.as_os_str().is_empty() { PathBuf::from(".") } else { dir })
		.map(|dir| dir.join(name))
		.find(|path| is_executable(path))
}

pub fn lookup(name: &str) -> Option<PathBuf> {
	let search_paths = env::var_os(PATH_KEY).unwrap_or_default();
	lookup_in(&search_paths, name)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs::File;

	#[test]
	fn finds_in_search_path() {
		let found = lookup_in(OsStr::new("/nonexistent:/bin:/usr/bin"), "sh").expect("sh in /bin or /usr/bin");
		assert!(found.ends_with("sh"));
		assert!(found.is_absolute());
	}

	#[test]
	fn missing_program() {
		assert_eq!(lookup_in(OsStr::new("/bin:/usr/bin"), "psh-no-such-program"), None);
		assert_eq!(lookup_in(OsStr::new("/bin"), ""), None);
	}

	#[test]
	fn slash_names_pass_through() {
		assert_eq!(lookup_in(OsStr::new(""), "./run.sh"), Some(PathBuf::from("./run.sh")));
		assert_eq!(lookup_in(OsStr::new(""), "/no/such"), Some(PathBuf::from("/no/such")));
	}

	#[test]
	fn skips_non_executable_files() {
		let dir = tempfile::tempdir().unwrap();
		let plain = dir.path().join("tool");
		File::create(&plain).unwrap();
		assert_eq!(lookup_in(dir.path().as_os_str(), "tool"), None);

		fs::set_permissions(&plain, fs::Permissions::from_mode(0o755)).unwrap();
		assert_eq!(lookup_in(dir.path().as_os_str(), "tool"), Some(plain));
	}
}
