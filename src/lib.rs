pub mod app;
pub mod shutdown;

pub use app::{AppMode, Application, RunningApplication};
