//! Persisted shuffle queue.
//!
//! The queue file holds the not-yet-shown images of the current cycle, one
//! absolute path per line. It is replaced atomically on every write so that a
//! second process sharing the file never sees a torn list.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::scan;

/// File name used when no explicit queue path is configured.
pub const DEFAULT_QUEUE_FILE_NAME: &str = ".wallpaper_queue";

/// Default queue location inside the system temp directory.
pub fn default_queue_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_QUEUE_FILE_NAME)
}

pub struct QueueStore {
    path: PathBuf,
    rng: StdRng,
}

impl QueueStore {
    /// Store backed by `path`, shuffled with OS entropy.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_rng(path, StdRng::from_os_rng())
    }

    /// Store backed by `path`, shuffled deterministically from `seed`.
    pub fn with_seed(path: impl Into<PathBuf>, seed: u64) -> Self {
        Self::with_rng(path, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(path: impl Into<PathBuf>, rng: StdRng) -> Self {
        Self {
            path: path.into(),
            rng,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pop the next image of the current cycle, starting a new cycle from
    /// `directory` when the persisted queue is exhausted.
    ///
    /// Persisted entries outside `directory` are dropped, so a queue left
    /// behind by a run over another directory never leaks into this one.
    ///
    /// # Errors
    /// Returns [`Error::EmptyDirectory`] when a refill is needed and
    /// `directory` holds no images. The persisted queue is left untouched.
    pub fn next_image(&mut self, directory: &Path) -> Result<PathBuf, Error> {
        let mut queue = match self.load() {
            Ok(entries) => entries,
            Err(err) => {
                warn!("{err}; reshuffling from scratch");
                Vec::new()
            }
        };

        let root = std::path::absolute(directory).unwrap_or_else(|_| directory.to_path_buf());
        let loaded = queue.len();
        queue.retain(|entry| entry.starts_with(&root));
        if queue.len() < loaded {
            info!(
                directory = %root.display(),
                dropped = loaded - queue.len(),
                "discarding queued images from another directory"
            );
        }

        if queue.is_empty() {
            queue = self.shuffled_cycle(directory)?;
        }

        let next = queue.remove(0);
        if let Err(err) = self.persist(&queue) {
            warn!("{err}; continuing with in-memory pick");
        }
        debug!(path = %next.display(), remaining = queue.len(), "queue pop");
        Ok(next)
    }

    /// Forget the current cycle so the next pop re-enumerates.
    pub fn invalidate(&self) -> Result<(), Error> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(queue = %self.path.display(), "queue invalidated");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(queue = %self.path.display(), "queue already absent");
                Ok(())
            }
            Err(source) => Err(Error::Persistence {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Entries still pending in the persisted cycle, in pop order.
    ///
    /// # Errors
    /// Returns [`Error::Persistence`] when the file exists but cannot be read.
    pub fn remaining(&self) -> Result<Vec<PathBuf>, Error> {
        self.load()
    }

    fn shuffled_cycle(&mut self, directory: &Path) -> Result<Vec<PathBuf>, Error> {
        let mut images = scan::enumerate_images(directory);
        if images.is_empty() {
            return Err(Error::EmptyDirectory(directory.to_path_buf()));
        }
        images.shuffle(&mut self.rng);
        debug!(
            directory = %directory.display(),
            images = images.len(),
            "new shuffle cycle"
        );
        Ok(images)
    }

    fn load(&self) -> Result<Vec<PathBuf>, Error> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(parse_queue(&contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(Error::Persistence {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn persist(&self, entries: &[PathBuf]) -> Result<(), Error> {
        write_atomic(&self.path, &render_queue(entries)).map_err(|source| Error::Persistence {
            path: self.path.clone(),
            source,
        })
    }
}

fn parse_queue(contents: &str) -> Vec<PathBuf> {
    contents
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(PathBuf::from)
        .collect()
}

fn render_queue(entries: &[PathBuf]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.to_string_lossy());
        out.push('\n');
    }
    out
}

// Temp name carries the pid so two processes never share a scratch file.
fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_QUEUE_FILE_NAME.to_string());
    let tmp = path.with_file_name(format!("{file_name}.{}.tmp", std::process::id()));

    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
