use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::select;
use tokio::sync::mpsc::Receiver;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{self, RotationConfig};
use crate::error::Error;
use crate::events::{ControlCommand, ControlRequest, ControlResponse, RotationState, SchedulerStatus};
use crate::queue::QueueStore;
use crate::renderer::Renderer;

/// Transient scheduler state; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerState {
    pub state: RotationState,
    pub last_dispatched: Option<PathBuf>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            state: RotationState::Active,
            last_dispatched: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The renderer was started for this image.
    Dispatched(PathBuf),
    /// No image was available; nothing was dispatched.
    Skipped,
    /// An image was popped but the renderer could not be spawned.
    DispatchFailed(PathBuf),
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Startup,
    Tick,
    Manual,
    ConfigChange,
}

/// What the event loop must do after a control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    RestartTimer,
    Quit,
}

/// Owns rotation state and serializes every transition.
///
/// Rules:
/// - Ticks rotate only while `Active`; paused ticks are consumed silently.
/// - `rotate_now` ignores the pause state and never touches it.
/// - A config change replaces the config, clears the queue when the directory
///   changed, and rotates right away when `Active`.
/// - Renderer dispatch is fire-and-forget; its failures are logged here and
///   go no further.
pub struct Scheduler<R> {
    config: RotationConfig,
    state: SchedulerState,
    store: QueueStore,
    renderer: R,
    status_tx: watch::Sender<SchedulerStatus>,
}

impl<R: Renderer> Scheduler<R> {
    pub fn new(config: RotationConfig, store: QueueStore, renderer: R) -> Self {
        let state = SchedulerState::default();
        let (status_tx, _) = watch::channel(snapshot(&config, &state));
        Self {
            config,
            state,
            store,
            renderer,
            status_tx,
        }
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    pub fn state(&self) -> RotationState {
        self.state.state
    }

    pub fn last_dispatched(&self) -> Option<&Path> {
        self.state.last_dispatched.as_deref()
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    pub fn status(&self) -> SchedulerStatus {
        snapshot(&self.config, &self.state)
    }

    /// Observe indicator changes (state, config, last image).
    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status_tx.subscribe()
    }

    pub fn on_startup(&mut self) -> Option<RotationOutcome> {
        self.rotate_if_active(Trigger::Startup)
    }

    pub fn on_tick(&mut self) -> Option<RotationOutcome> {
        self.rotate_if_active(Trigger::Tick)
    }

    pub fn rotate_now(&mut self) -> RotationOutcome {
        self.rotate(Trigger::Manual)
    }

    pub fn toggle(&mut self) -> RotationState {
        self.state.state = self.state.state.toggled();
        info!(
            state = ?self.state.state,
            icon = self.state.state.icon(),
            action = self.state.state.toggle_label(),
            "rotation state toggled"
        );
        self.publish();
        self.state.state
    }

    /// Replace the rotation config. The caller restarts the timer.
    pub fn apply_config(&mut self, config: RotationConfig) -> Option<RotationOutcome> {
        let directory_changed = config.directory != self.config.directory;
        info!(
            directory = %config.directory.display(),
            interval = %humantime::format_duration(config.interval()),
            directory_changed,
            "rotation config updated"
        );
        self.config = config;
        if directory_changed {
            if let Err(err) = self.store.invalidate() {
                warn!("{err}; stale queue may be reused");
            }
        }
        self.publish();
        self.rotate_if_active(Trigger::ConfigChange)
    }

    /// Apply one control command and report what the loop must do next.
    pub fn handle(&mut self, command: ControlCommand) -> (ControlResponse, Effect) {
        match command {
            ControlCommand::ToggleState => {
                self.toggle();
                (ControlResponse::ok(self.status()), Effect::None)
            }
            ControlCommand::RotateNow => {
                self.rotate_now();
                (ControlResponse::ok(self.status()), Effect::None)
            }
            ControlCommand::SetConfig {
                directory,
                interval_secs,
            } => match requested_config(directory, interval_secs) {
                Ok(config) => {
                    self.apply_config(config);
                    (ControlResponse::ok(self.status()), Effect::RestartTimer)
                }
                Err(err) => {
                    warn!("rejected config change: {err}");
                    (ControlResponse::error(err.to_string()), Effect::None)
                }
            },
            ControlCommand::Status => (ControlResponse::ok(self.status()), Effect::None),
            ControlCommand::Quit => {
                info!("quit requested");
                (ControlResponse::ok(self.status()), Effect::Quit)
            }
        }
    }

    fn rotate_if_active(&mut self, trigger: Trigger) -> Option<RotationOutcome> {
        match self.state.state {
            RotationState::Active => Some(self.rotate(trigger)),
            RotationState::Paused => {
                debug!(?trigger, "paused; rotation skipped");
                None
            }
        }
    }

    fn rotate(&mut self, trigger: Trigger) -> RotationOutcome {
        let image = match self.store.next_image(&self.config.directory) {
            Ok(image) => image,
            Err(err) => {
                warn!(?trigger, "{err}; rotation skipped");
                return RotationOutcome::Skipped;
            }
        };

        match self.renderer.dispatch(&image) {
            Ok(()) => {
                info!(?trigger, path = %image.display(), "wallpaper dispatched");
                self.state.last_dispatched = Some(image.clone());
                self.publish();
                RotationOutcome::Dispatched(image)
            }
            Err(err) => {
                let detail = match &err {
                    Error::RendererDispatch { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                warn!(?trigger, path = %image.display(), %detail, "{err}");
                RotationOutcome::DispatchFailed(image)
            }
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }
}

fn snapshot(config: &RotationConfig, state: &SchedulerState) -> SchedulerStatus {
    SchedulerStatus {
        state: state.state,
        icon: state.state.icon().to_string(),
        toggle_label: state.state.toggle_label().to_string(),
        directory: config.directory.clone(),
        interval_secs: config.interval_secs(),
        last_dispatched: state.last_dispatched.clone(),
    }
}

fn requested_config(directory: PathBuf, interval_secs: u64) -> Result<RotationConfig, Error> {
    config::validate_directory(&directory)?;
    RotationConfig::new(directory, interval_secs)
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Run one scheduler transition on the blocking pool.
///
/// Transitions may walk the wallpaper tree and `fsync` the queue file, so
/// they stay off the async workers. Ownership moves in and comes back out.
async fn off_runtime<R, T, F>(mut scheduler: Scheduler<R>, step: F) -> Result<(Scheduler<R>, T)>
where
    R: Renderer + 'static,
    T: Send + 'static,
    F: FnOnce(&mut Scheduler<R>) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let out = step(&mut scheduler);
        (scheduler, out)
    })
    .await
    .context("scheduler transition panicked")
}

/// Drives the scheduler from its timer and the control channel.
///
/// All state changes happen on this task, one at a time. Returns when
/// `cancel` fires or a `quit` command arrives (which also cancels).
pub async fn run<R: Renderer + 'static>(
    mut scheduler: Scheduler<R>,
    mut control_rx: Receiver<ControlRequest>,
    cancel: CancellationToken,
    rotate_on_startup: bool,
) -> Result<()> {
    let mut timer = ticker(scheduler.config().interval());
    let mut control_open = true;

    if rotate_on_startup {
        (scheduler, _) = off_runtime(scheduler, Scheduler::on_startup).await?;
    }

    loop {
        select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting scheduler task");
                break;
            }

            _ = timer.tick() => {
                (scheduler, _) = off_runtime(scheduler, Scheduler::on_tick).await?;
            }

            maybe_req = control_rx.recv(), if control_open => {
                let Some(ControlRequest { command, reply }) = maybe_req else {
                    // Control surface gone; keep rotating on the timer.
                    debug!("control channel closed");
                    control_open = false;
                    continue;
                };
                debug!(?command, "control command");
                let (next, (response, effect)) =
                    off_runtime(scheduler, move |s| s.handle(command)).await?;
                scheduler = next;
                let _ = reply.send(response);
                match effect {
                    Effect::None => {}
                    Effect::RestartTimer => {
                        timer = ticker(scheduler.config().interval());
                    }
                    Effect::Quit => {
                        cancel.cancel();
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
