//! 领域模型模块
//!
//! 纯数据结构，不依赖 axum/tokio

pub mod simulation;

pub use simulation::{NodeStats, SimulateResponse, Summary};
