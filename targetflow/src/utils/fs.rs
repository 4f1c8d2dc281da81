//! Logged filesystem helpers for stage operations.
//!
//! Each helper prints what it is about to touch as quiet info so a build log
//! shows every file the build created or moved into.

use crate::logging;
use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Creates (or truncates) a file and opens it for writing.
///
/// # Errors
///
/// Returns the underlying IO error.
pub fn create_file(path: impl AsRef<Path>) -> io::Result<File> {
    let path = path.as_ref();
    logging::quiet_info(format!("Creating and Opening File: '{}'", path.display()));
    File::create(path)
}

/// Opens an existing file for reading.
///
/// # Errors
///
/// Returns the underlying IO error.
pub fn open(path: impl AsRef<Path>) -> io::Result<File> {
    let path = path.as_ref();
    logging::quiet_info(format!("Opening File: '{}'", path.display()));
    File::open(path)
}

/// Creates (or truncates) a file without keeping it open.
///
/// # Errors
///
/// Returns the underlying IO error.
pub fn touch(path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();
    logging::quiet_info(format!("Creating File: '{}'", path.display()));
    File::create(path).map(drop)
}

/// Creates a directory and all missing parents.
///
/// # Errors
///
/// Returns the underlying IO error.
pub fn mkdir(path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();
    logging::quiet_info(format!("Creating Dir(s): '{}'", path.display()));
    fs::create_dir_all(path)
}

/// Changes the process working directory, logging the old and new values.
///
/// The working directory is process-wide: a `cd` inside one stage is seen by
/// every later stage and every other target running in the process.
///
/// # Errors
///
/// Returns the underlying IO error.
pub fn cd(dir: impl AsRef<Path>) -> io::Result<()> {
    let dir = dir.as_ref();
    let old = std::env::current_dir()?;
    logging::quiet_info(format!("Previous Cwd: '{}'", old.display()));

    std::env::set_current_dir(dir)?;
    logging::quiet_info(format!("New Cwd: '{}'", dir.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::cwd_lock;
    use std::io::{Read, Write};

    #[test]
    fn test_create_open_touch_mkdir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a/b/c");

        mkdir(&nested).expect("mkdir");
        assert!(nested.is_dir());

        let file_path = nested.join("notes.txt");
        let mut file = create_file(&file_path).expect("create");
        file.write_all(b"hello").expect("write");
        drop(file);

        let mut contents = String::new();
        open(&file_path)
            .expect("open")
            .read_to_string(&mut contents)
            .expect("read");
        assert_eq!(contents, "hello");

        touch(&file_path).expect("touch");
        assert_eq!(fs::metadata(&file_path).expect("metadata").len(), 0);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = open(dir.path().join("missing")).expect_err("should fail");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_cd_changes_process_cwd() {
        let _guard = cwd_lock();
        let original = std::env::current_dir().expect("cwd");
        let dir = tempfile::tempdir().expect("tempdir");

        cd(dir.path()).expect("cd");
        let now = std::env::current_dir().expect("cwd");
        assert_eq!(
            now.canonicalize().expect("canonical"),
            dir.path().canonicalize().expect("canonical")
        );

        cd(&original).expect("cd back");
    }
}
