//! 服务层模块
//!
//! 包含核心业务逻辑

pub mod pipeline;
pub mod report;

pub use pipeline::{run_pipeline, SimulationError};
