pub mod broker;
pub mod task_handler;

pub use broker::*;
pub use task_handler::*;
