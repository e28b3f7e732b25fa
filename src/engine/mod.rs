//! 水力模拟引擎
//!
//! 请求管线只通过 [`SimulationEngine`] 的三个调用使用引擎：
//! 构建模型、运行模拟、提取结果序列。

pub mod error;
pub mod inp;
pub mod model;
pub mod results;
pub mod simulation;
pub mod solver;
pub mod units;

use std::path::Path;

pub use error::{EngineError, EngineResult};
pub use model::NetworkModel;
pub use results::{ResultsTable, SeriesTable};

/// 模拟适配器接口
pub trait SimulationEngine: Send + Sync {
    /// 引擎名称，用于日志和健康检查
    fn name(&self) -> &'static str;

    /// 从 INP 文件构建管网模型；格式错误时返回 `InvalidInput`
    fn build_model(&self, path: &Path) -> EngineResult<NetworkModel>;

    fn run_simulation(&self, model: &NetworkModel) -> EngineResult<ResultsTable>;

    fn extract_series(&self, results: &ResultsTable, quantity: &str) -> EngineResult<SeriesTable> {
        results.series(quantity)
    }

    /// 诊断用自检，失败时返回错误文本
    fn self_check(&self) -> Result<(), String>;
}

/// 自检用的最小管网
const SELF_CHECK_NETWORK: &str = "\
[JUNCTIONS]
J1  0  1
[RESERVOIRS]
R1  10
[PIPES]
P1  R1  J1  100  100  100
[OPTIONS]
UNITS  LPS
[END]
";

/// 内置的 EPANET 兼容引擎
#[derive(Clone, Copy, Debug, Default)]
pub struct EpanetEngine;

impl SimulationEngine for EpanetEngine {
    fn name(&self) -> &'static str {
        "epanet-gga"
    }

    fn build_model(&self, path: &Path) -> EngineResult<NetworkModel> {
        inp::read_file(path)
    }

    fn run_simulation(&self, model: &NetworkModel) -> EngineResult<ResultsTable> {
        simulation::run(model)
    }

    fn self_check(&self) -> Result<(), String> {
        let model = inp::parse(SELF_CHECK_NETWORK).map_err(|e| e.to_string())?;
        let results = simulation::run(&model).map_err(|e| e.to_string())?;
        let pressure = results.series("pressure").map_err(|e| e.to_string())?;
        if pressure.is_empty() {
            return Err("self-check simulation produced no results".to_string());
        }
        Ok(())
    }
}
