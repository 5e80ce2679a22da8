pub mod executors;
pub mod service;

pub use executors::{HandlerRegistry, ProcessJobHandler};
pub use service::{WorkerService, WorkerServiceBuilder};
