//! 逐列统计

use super::{ReportError, ReportResult};
use crate::domain::{NodeStats, Summary};
use crate::engine::SeriesTable;

/// 对每一列求最大值、算术平均值、最小值，顺序与列顺序一致
pub fn summarize(series: &SeriesTable) -> ReportResult<Summary> {
    if series.is_empty() || series.rows.is_empty() {
        return Err(ReportError::EmptySeries);
    }

    let mut summary = Summary::with_capacity(series.columns.len());
    for (col, id) in series.columns.iter().enumerate() {
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        let mut sum = 0.0;
        let mut count = 0usize;
        for value in series.column(col) {
            if !value.is_finite() {
                return Err(ReportError::NonFinite {
                    entity: id.clone(),
                    value,
                });
            }
            max = max.max(value);
            min = min.min(value);
            sum += value;
            count += 1;
        }
        summary.insert(
            id.clone(),
            NodeStats {
                max,
                mean: sum / count as f64,
                min,
            },
        );
    }
    Ok(summary)
}
