//! # 数据模型
//!
//! 任务记录及其状态机。任务由生产者创建，只会被预留它的那一个Worker修改。
//!
//! ```text
//! submitted → queued → reserved → active → completed
//!                                       ↘ failed
//! ```

pub mod job;

pub use job::*;
