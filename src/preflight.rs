//! Startup dependency check for the renderer executable.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Resolve `binary` to an executable path.
///
/// Names containing a path separator are checked as given; bare names are
/// searched in `PATH`.
///
/// # Errors
/// Returns [`Error::MissingDependency`] when nothing executable is found.
pub fn resolve_binary(binary: &str) -> Result<PathBuf, Error> {
    resolve_binary_in(binary, env::var_os("PATH").as_deref())
}

/// Same as [`resolve_binary`] against an explicit search path.
pub fn resolve_binary_in(binary: &str, search_path: Option<&OsStr>) -> Result<PathBuf, Error> {
    let missing = || Error::MissingDependency {
        program: binary.to_string(),
    };
    if binary.is_empty() {
        return Err(missing());
    }

    let candidate = Path::new(binary);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return if is_executable(candidate) {
            Ok(candidate.to_path_buf())
        } else {
            Err(missing())
        };
    }

    let Some(search_path) = search_path else {
        return Err(missing());
    };
    env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(binary))
        .find(|path| is_executable(path))
        .ok_or_else(missing)
}

fn is_executable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(metadata) => {
            if !metadata.is_file() {
                return false;
            }

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                metadata.permissions().mode() & 0o111 != 0
            }

            #[cfg(not(unix))]
            {
                true
            }
        }
        Err(_) => false,
    }
}
