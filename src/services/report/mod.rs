//! 结果格式化
//!
//! 把 (时刻 × 节点) 序列归约成统计量，并生成 Markdown 表格和图表两种视图。

pub mod chart;
pub mod markdown;
pub mod stats;

use thiserror::Error;

use crate::domain::SimulateResponse;
use crate::engine::SeriesTable;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("simulation produced no results")]
    EmptySeries,

    #[error("non-finite value {value} for {entity}")]
    NonFinite { entity: String, value: f64 },

    #[error("chart rendering failed: {0}")]
    Chart(String),

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// 生成完整的成功响应
pub fn build_response(series: &SeriesTable) -> ReportResult<SimulateResponse> {
    let summary = stats::summarize(series)?;
    let markdown = markdown::render(&summary);
    let html_chart = chart::render_html(series)?;
    Ok(SimulateResponse::success(summary, markdown, html_chart))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_views_share_entities() {
        let series = SeriesTable {
            quantity: "pressure".to_string(),
            times: vec![0, 3600, 7200],
            columns: vec!["N1".to_string(), "N2".to_string()],
            rows: vec![vec![10.0, 5.0], vec![20.0, 5.5], vec![30.0, 6.0]],
        };
        let resp = build_response(&series).unwrap();

        assert_eq!(resp.status, "success");
        assert_eq!(resp.summary.keys().collect::<Vec<_>>(), vec!["N1", "N2"]);
        assert!(resp.markdown.contains("| N1 | 30.0 | 20.0 | 10.0 |"));
        assert!(resp.markdown.contains("| N2 | 6.0 | 5.5 | 5.0 |"));
        assert!(resp.html_chart.contains("alt=\"Pressure Chart\""));
    }
}
