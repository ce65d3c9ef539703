use std::path::PathBuf;

use thiserror::Error;

/// Library error type for wallpaper rotation.
#[derive(Debug, Error)]
pub enum Error {
    /// The renderer executable could not be resolved at startup.
    #[error("renderer `{program}` is not installed or not in PATH")]
    MissingDependency { program: String },

    /// The configured directory has no matching images (or is gone).
    #[error("no wallpaper images (.jpg, .jpeg, .png, .webp) found in {}", .0.display())]
    EmptyDirectory(PathBuf),

    /// A requested directory was rejected before being applied.
    #[error("invalid wallpaper directory {}: {reason}", .path.display())]
    InvalidDirectory { path: PathBuf, reason: String },

    /// A requested rotation interval is outside the accepted range.
    #[error("rotation interval must be between 1 and 86400 seconds, got {0}")]
    InvalidInterval(u64),

    /// Spawning the renderer process failed.
    #[error("failed to spawn renderer `{program}`")]
    RendererDispatch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing the persisted queue failed.
    #[error("queue store {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
