//! 上传 → 模拟 → 汇总 管线
//!
//! 整条管线是同步的，由调用方放到阻塞线程池执行。

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::domain::SimulateResponse;
use crate::engine::{EngineError, SimulationEngine};
use crate::services::report::{self, ReportError};

/// 提取并汇总的结果量
pub const SUMMARY_QUANTITY: &str = "pressure";

/// 管线失败的两种类别
#[derive(Debug, Error)]
pub enum SimulationError {
    /// 上传内容不是合法的 EPANET 输入
    #[error("{0}")]
    InvalidInput(String),

    /// 其余所有失败（求解、格式化、临时文件）
    #[error("{0}")]
    SimulationFailed(String),
}

impl From<EngineError> for SimulationError {
    fn from(err: EngineError) -> Self {
        if err.is_invalid_input() {
            SimulationError::InvalidInput(err.to_string())
        } else {
            SimulationError::SimulationFailed(err.to_string())
        }
    }
}

impl From<ReportError> for SimulationError {
    fn from(err: ReportError) -> Self {
        SimulationError::SimulationFailed(err.to_string())
    }
}

impl From<io::Error> for SimulationError {
    fn from(err: io::Error) -> Self {
        SimulationError::SimulationFailed(format!("failed to stage upload: {}", err))
    }
}

/// 暂存到磁盘的上传文件，drop 时删除
///
/// 删除失败（例如文件已不存在）只记录 debug 日志。
pub struct StagedUpload {
    file: Option<NamedTempFile>,
    path: PathBuf,
}

impl StagedUpload {
    /// 在 `dir` 下创建 `upload-<uuid>-XXXXXX.inp` 并写入全部内容
    pub fn create(dir: &Path, request_id: Uuid, bytes: &[u8]) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::Builder::new()
            .prefix(&format!("upload-{}-", request_id))
            .suffix(".inp")
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        let path = file.path().to_path_buf();
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.close() {
                debug!(path = %self.path.display(), error = %e, "Staged upload already removed");
            }
        }
    }
}

/// 执行一次完整请求：暂存、建模、模拟、提取压力、格式化
///
/// 无论成功与否，暂存文件都在返回前删除。
pub fn run_pipeline(
    engine: &dyn SimulationEngine,
    bytes: &[u8],
    upload_dir: &Path,
) -> Result<SimulateResponse, SimulationError> {
    let request_id = Uuid::new_v4();
    let _span = info_span!("simulate", request_id = %request_id, engine = engine.name()).entered();
    let started = Instant::now();

    let staged = StagedUpload::create(upload_dir, request_id, bytes)?;
    debug!(path = %staged.path().display(), bytes = bytes.len(), "Upload staged");

    let result = simulate_staged(engine, &staged);
    drop(staged);

    match &result {
        Ok(resp) => info!(
            nodes = resp.summary.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Simulation request completed"
        ),
        Err(SimulationError::InvalidInput(msg)) => warn!(error = %msg, "Rejected invalid input file"),
        Err(SimulationError::SimulationFailed(msg)) => warn!(error = %msg, "Simulation request failed"),
    }
    result
}

fn simulate_staged(
    engine: &dyn SimulationEngine,
    staged: &StagedUpload,
) -> Result<SimulateResponse, SimulationError> {
    let model = engine.build_model(staged.path())?;
    debug!(
        nodes = model.nodes.len(),
        links = model.links.len(),
        "Network model built"
    );
    let results = engine.run_simulation(&model)?;
    let series = engine.extract_series(&results, SUMMARY_QUANTITY)?;
    Ok(report::build_response(&series)?)
}
