pub mod config;
pub mod error;
pub mod events;
pub mod preflight;
pub mod queue;
pub mod renderer;
pub mod scan;
pub mod tasks {
    pub mod control;
    pub mod scheduler;
}
