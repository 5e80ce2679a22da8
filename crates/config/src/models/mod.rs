pub mod api_observability;
pub mod app_config;
pub mod broker;
pub mod worker;

pub use api_observability::*;
pub use app_config::*;
pub use broker::*;
pub use worker::*;
