//! Binary entrypoint: rotation daemon plus control-socket client.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use wallpaper_cycle::config::Configuration;
use wallpaper_cycle::events::{ControlCommand, ControlRequest, ControlResponse};
use wallpaper_cycle::preflight;
use wallpaper_cycle::queue::QueueStore;
use wallpaper_cycle::renderer::CommandRenderer;
use wallpaper_cycle::tasks::{control, scheduler};

#[derive(Debug, Parser)]
#[command(
    name = "wallpaper-cycle",
    version,
    about = "Rotate the desktop wallpaper through a shuffled directory"
)]
struct Cli {
    /// Path to YAML config
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Control socket path (overrides config)
    #[arg(long, value_name = "PATH", global = true)]
    socket: Option<PathBuf>,

    /// Wallpaper directory for this run (overrides config)
    #[arg(long, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Rotation interval in seconds for this run (overrides config)
    #[arg(long, value_name = "SECONDS")]
    interval_secs: Option<u64>,

    /// Deterministic RNG seed for queue shuffles
    #[arg(long, value_name = "SEED")]
    shuffle_seed: Option<u64>,

    /// Wait for the first timer tick instead of rotating at startup
    #[arg(long)]
    no_startup_rotation: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Talk to a running daemon instead of starting one
    #[command(subcommand)]
    command: Option<ClientCommand>,
}

#[derive(Debug, Subcommand)]
enum ClientCommand {
    /// Pause or resume automatic rotation
    Toggle,
    /// Change the wallpaper now, even while paused
    RotateNow,
    /// Replace the directory and interval until the daemon restarts
    SetConfig {
        #[arg(long, value_name = "DIR")]
        directory: PathBuf,
        #[arg(long, value_name = "SECONDS")]
        interval_secs: u64,
    },
    /// Show the daemon state
    Status,
    /// Stop the daemon
    Quit,
    /// Print the persisted queue without consuming it
    Queue,
}

impl ClientCommand {
    /// Socket command for this subcommand; `None` for local-only commands.
    fn into_control(self) -> Result<Option<ControlCommand>> {
        let command = match self {
            Self::Toggle => ControlCommand::ToggleState,
            Self::RotateNow => ControlCommand::RotateNow,
            Self::SetConfig {
                directory,
                interval_secs,
            } => ControlCommand::SetConfig {
                directory: std::path::absolute(&directory)
                    .with_context(|| format!("failed to resolve {}", directory.display()))?,
                interval_secs,
            },
            Self::Status => ControlCommand::Status,
            Self::Quit => ControlCommand::Quit,
            Self::Queue => return Ok(None),
        };
        Ok(Some(command))
    }
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(
            format!("wallpaper_cycle={level}")
                .parse()
                .context("invalid log directive")?,
        );
    fmt().with_env_filter(filter).with_target(false).compact().init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = load_configuration(&cli)?;

    match cli.command {
        None => run_daemon(cfg).await,
        Some(command) => match command.into_control()? {
            Some(control) => run_client(&cfg.control_socket_path, &control).await,
            None => print_queue(&cfg.queue_path),
        },
    }
}

fn load_configuration(cli: &Cli) -> Result<Configuration> {
    let mut cfg = match &cli.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(dir) = &cli.directory {
        cfg.wallpaper_directory = dir.clone();
    }
    if let Some(secs) = cli.interval_secs {
        cfg.rotation_interval = std::time::Duration::from_secs(secs);
    }
    if let Some(seed) = cli.shuffle_seed {
        cfg.shuffle_seed = Some(seed);
    }
    if let Some(socket) = &cli.socket {
        cfg.control_socket_path = socket.clone();
    }
    if cli.no_startup_rotation {
        cfg.rotate_on_startup = false;
    }
    cfg.validated().context("invalid configuration values")
}

async fn run_daemon(cfg: Configuration) -> Result<()> {
    let program = match preflight::resolve_binary(&cfg.renderer.command) {
        Ok(program) => program,
        Err(err) => {
            error!("{err}");
            eprintln!(
                "Error: {err}\nThis application requires `{}` to function. Please install it and try again.",
                cfg.renderer.command
            );
            std::process::exit(1);
        }
    };
    info!(renderer = %program.display(), "renderer resolved");

    let rotation = cfg.rotation()?;
    info!(
        directory = %rotation.directory.display(),
        interval = %humantime::format_duration(rotation.interval()),
        queue = %cfg.queue_path.display(),
        "starting wallpaper rotation"
    );

    let store = match cfg.shuffle_seed {
        Some(seed) => QueueStore::with_seed(&cfg.queue_path, seed),
        None => QueueStore::new(&cfg.queue_path),
    };
    let renderer = CommandRenderer::new(program, cfg.renderer.args.clone());
    let sched = scheduler::Scheduler::new(rotation, store, renderer);

    let (control_tx, control_rx) = mpsc::channel::<ControlRequest>(16); // Socket/signals -> Scheduler
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        spawn_signal_forwarder(SignalKind::terminate(), None, control_tx.clone(), cancel.clone());
        spawn_signal_forwarder(
            SignalKind::user_defined1(),
            Some(ControlCommand::ToggleState),
            control_tx.clone(),
            cancel.clone(),
        );
        spawn_signal_forwarder(
            SignalKind::user_defined2(),
            Some(ControlCommand::RotateNow),
            control_tx.clone(),
            cancel.clone(),
        );
    }

    let mut tasks = JoinSet::new();

    tasks.spawn({
        let socket = cfg.control_socket_path.clone();
        let control_tx = control_tx.clone();
        let cancel = cancel.clone();
        async move {
            control::serve(socket, control_tx, cancel)
                .await
                .context("control task failed")
        }
    });

    tasks.spawn({
        let cancel = cancel.clone();
        let rotate_on_startup = cfg.rotate_on_startup;
        async move {
            scheduler::run(sched, control_rx, cancel, rotate_on_startup)
                .await
                .context("scheduler task failed")
        }
    });
    drop(control_tx);

    // Any task ending brings the others down with it.
    while let Some(res) = tasks.join_next().await {
        cancel.cancel();
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("task error: {e:?}"),
            Err(e) => error!("join error: {e}"),
        }
    }

    info!("wallpaper rotation stopped");
    Ok(())
}

#[cfg(unix)]
fn spawn_signal_forwarder(
    kind: SignalKind,
    command: Option<ControlCommand>,
    control: mpsc::Sender<ControlRequest>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut stream = match signal(kind) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(?kind, "failed to register signal handler: {err}");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = stream.recv() => {
                    if received.is_none() {
                        break;
                    }
                    let Some(command) = command.clone() else {
                        info!(?kind, "termination signal received; initiating shutdown");
                        cancel.cancel();
                        break;
                    };
                    info!(?kind, ?command, "signal received");
                    let (reply, _response) = oneshot::channel();
                    if let Err(err) = control.send(ControlRequest { command, reply }).await {
                        tracing::warn!("failed to forward signal command: {err}");
                        break;
                    }
                }
            }
        }
    });
}

async fn run_client(socket: &Path, command: &ControlCommand) -> Result<()> {
    let response = control::send_command(socket, command).await?;
    print_response(&response)
}

fn print_response(response: &ControlResponse) -> Result<()> {
    if !response.ok {
        bail!(
            "daemon rejected the command: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
    }
    if let Some(status) = &response.status {
        println!("state:     {} {:?}", status.icon, status.state);
        println!("toggle:    {}", status.toggle_label);
        println!("directory: {}", status.directory.display());
        println!(
            "interval:  {}",
            humantime::format_duration(std::time::Duration::from_secs(status.interval_secs))
        );
        match &status.last_dispatched {
            Some(path) => println!("last:      {}", path.display()),
            None => println!("last:      (none yet)"),
        }
    }
    Ok(())
}

fn print_queue(queue_path: &Path) -> Result<()> {
    let remaining = QueueStore::new(queue_path).remaining()?;
    println!(
        "# queue: {}\n# remaining: {}",
        queue_path.display(),
        remaining.len()
    );
    if remaining.is_empty() {
        println!("(cycle exhausted; next rotation reshuffles)");
    }
    for (idx, path) in remaining.iter().enumerate() {
        println!("  {:>4}: {}", idx + 1, path.display());
    }
    Ok(())
}
