pub mod errors;
pub mod models;
pub mod shutdown;
pub mod traits;

pub use errors::*;
pub use models::{Job, JobOutcome, JobStatus};
pub use shutdown::ShutdownCoordinator;
pub use traits::{
    Broker, EnqueueOptions, JobCompletion, JobContext, TaskHandler, WorkerInspection,
};
