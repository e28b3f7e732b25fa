//! 应用状态

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::env::EnvConfig;
use crate::engine::{EpanetEngine, SimulationEngine};

/// 应用状态
///
/// 只读，请求之间不共享可变数据。
pub struct AppState {
    /// 环境配置
    pub config: EnvConfig,
    /// 模拟引擎（无状态）
    pub engine: Arc<dyn SimulationEngine>,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// 使用内置引擎创建状态
    pub fn new(config: EnvConfig) -> Self {
        Self::with_engine(config, Arc::new(EpanetEngine))
    }

    pub fn with_engine(config: EnvConfig, engine: Arc<dyn SimulationEngine>) -> Self {
        Self {
            config,
            engine,
            started_at: Utc::now(),
        }
    }
}
