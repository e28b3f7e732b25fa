//! 仿真结果表

use super::error::{EngineError, EngineResult};

/// 一次仿真的全部结果，每个量按时刻存一行
#[derive(Clone, Debug, Default)]
pub struct ResultsTable {
    /// 报告时刻（秒）
    pub times: Vec<u64>,
    pub node_ids: Vec<String>,
    pub link_ids: Vec<String>,
    /// 压力 (m)
    pub pressure: Vec<Vec<f64>>,
    /// 总水头 (m)
    pub head: Vec<Vec<f64>>,
    /// 需水量 (m³/s)
    pub demand: Vec<Vec<f64>>,
    /// 流量 (m³/s)
    pub flowrate: Vec<Vec<f64>>,
    /// 流速 (m/s)
    pub velocity: Vec<Vec<f64>>,
    /// 起点水头 - 终点水头 (m)
    pub headloss: Vec<Vec<f64>>,
}

impl ResultsTable {
    pub fn new(node_ids: Vec<String>, link_ids: Vec<String>) -> Self {
        Self {
            node_ids,
            link_ids,
            ..Default::default()
        }
    }

    /// 取出某个量的 (时刻 × 实体) 表
    pub fn series(&self, quantity: &str) -> EngineResult<SeriesTable> {
        let (columns, rows) = match quantity {
            "pressure" => (&self.node_ids, &self.pressure),
            "head" => (&self.node_ids, &self.head),
            "demand" => (&self.node_ids, &self.demand),
            "flowrate" => (&self.link_ids, &self.flowrate),
            "velocity" => (&self.link_ids, &self.velocity),
            "headloss" => (&self.link_ids, &self.headloss),
            other => return Err(EngineError::UnknownQuantity(other.to_string())),
        };
        Ok(SeriesTable {
            quantity: quantity.to_string(),
            times: self.times.clone(),
            columns: columns.clone(),
            rows: rows.clone(),
        })
    }
}

/// 以 (时刻, 实体) 为键的数值表
///
/// `rows[i][j]` 为第 i 个时刻、第 j 列实体的值。
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesTable {
    pub quantity: String,
    pub times: Vec<u64>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl SeriesTable {
    /// 第 `col` 列在所有时刻的取值
    pub fn column(&self, col: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |row| row[col])
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty() || self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultsTable {
        let mut table = ResultsTable::new(vec!["J1".into(), "R1".into()], vec!["P1".into()]);
        table.times = vec![0, 3600];
        table.pressure = vec![vec![30.0, 0.0], vec![28.0, 0.0]];
        table.flowrate = vec![vec![0.01], vec![0.012]];
        table
    }

    #[test]
    fn test_series_selects_columns() {
        let table = sample();
        let pressure = table.series("pressure").unwrap();
        assert_eq!(pressure.columns, vec!["J1", "R1"]);
        assert_eq!(pressure.column(0).collect::<Vec<_>>(), vec![30.0, 28.0]);

        let flow = table.series("flowrate").unwrap();
        assert_eq!(flow.columns, vec!["P1"]);
        assert_eq!(flow.times, vec![0, 3600]);
    }

    #[test]
    fn test_unknown_quantity() {
        let err = sample().series("salinity").unwrap_err();
        assert!(matches!(err, EngineError::UnknownQuantity(q) if q == "salinity"));
    }
}
