//! 模拟结果领域模型

use indexmap::IndexMap;
use serde::Serialize;

/// 单个节点在所有时刻上的统计量
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct NodeStats {
    pub max: f64,
    pub mean: f64,
    pub min: f64,
}

/// 节点 ID -> 统计量，保持结果表的列顺序
pub type Summary = IndexMap<String, NodeStats>;

/// POST /simulate 的成功响应
///
/// `summary`、`markdown`、`html_chart` 来自同一份统计结果。
#[derive(Clone, Debug, Serialize)]
pub struct SimulateResponse {
    pub status: &'static str,
    pub summary: Summary,
    pub markdown: String,
    pub html_chart: String,
}

impl SimulateResponse {
    pub fn success(summary: Summary, markdown: String, html_chart: String) -> Self {
        Self {
            status: "success",
            summary,
            markdown,
            html_chart,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_serializes_in_summary_order() {
        let mut summary = Summary::new();
        summary.insert(
            "J2".to_string(),
            NodeStats {
                max: 2.0,
                mean: 1.5,
                min: 1.0,
            },
        );
        summary.insert(
            "J1".to_string(),
            NodeStats {
                max: 4.0,
                mean: 3.0,
                min: 2.0,
            },
        );
        let resp = SimulateResponse::success(summary, "md".into(), "<img/>".into());
        let json = serde_json::to_string(&resp).unwrap();

        assert!(json.starts_with(r#"{"status":"success","summary":{"J2":"#));
        assert!(json.find("\"J2\"").unwrap() < json.find("\"J1\"").unwrap());
        assert!(json.contains(r#""max":4.0,"mean":3.0,"min":2.0"#));
    }
}
