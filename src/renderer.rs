//! Handoff to the external wallpaper setter.
//!
//! Dispatch is fire-and-forget: the scheduler only learns whether the process
//! could be spawned. The exit status is observed by a detached task and logged,
//! never reported back.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::Error;

pub trait Renderer: Send {
    /// Start showing `image`. Must not wait for the renderer to finish.
    fn dispatch(&self, image: &Path) -> Result<(), Error>;
}

/// Runs `<program> <args...> <image>` for every rotation.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandRenderer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl Renderer for CommandRenderer {
    fn dispatch(&self, image: &Path) -> Result<(), Error> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(image)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| Error::RendererDispatch {
                program: self.program_name(),
                source,
            })?;

        let program = self.program_name();
        let image = image.to_path_buf();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    debug!(%program, path = %image.display(), "renderer finished");
                }
                Ok(status) => {
                    warn!(%program, path = %image.display(), %status, "renderer exited unsuccessfully");
                }
                Err(err) => {
                    warn!(%program, path = %image.display(), "failed to observe renderer: {err}");
                }
            }
        });
        Ok(())
    }
}

impl<R: Renderer + Sync> Renderer for std::sync::Arc<R> {
    fn dispatch(&self, image: &Path) -> Result<(), Error> {
        (**self).dispatch(image)
    }
}
