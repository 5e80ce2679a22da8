pub mod data;
pub mod health;
pub mod jobs;
pub mod metrics;
