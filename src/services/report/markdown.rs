//! Markdown 表格

use std::fmt::Write;

use crate::domain::Summary;

const HEADER: &str = "| Node ID | Max (m) | Mean (m) | Min (m) |\n|---|---|---|---|\n";

/// 每个节点一行，数值保留两位小数
pub fn render(summary: &Summary) -> String {
    let mut out = String::from(HEADER);
    for (id, stats) in summary {
        // 写入 String 不会失败
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            id,
            format_value(stats.max),
            format_value(stats.mean),
            format_value(stats.min)
        );
    }
    out
}

/// 四舍五入到两位小数，最短表示且至少一位小数：`30.0`、`20.12`
pub fn format_value(value: f64) -> String {
    let rounded = round2(value);
    format!("{:?}", rounded)
}

pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // 避免输出 -0.0
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeStats;

    #[test]
    fn test_row_format() {
        let mut summary = Summary::new();
        summary.insert(
            "N1".to_string(),
            NodeStats {
                max: 30.0,
                mean: 20.0,
                min: 10.0,
            },
        );
        let md = render(&summary);
        let lines: Vec<&str> = md.lines().collect();
        assert_eq!(lines[0], "| Node ID | Max (m) | Mean (m) | Min (m) |");
        assert_eq!(lines[1], "|---|---|---|---|");
        assert_eq!(lines[2], "| N1 | 30.0 | 20.0 | 10.0 |");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(20.123), "20.12");
        assert_eq!(format_value(20.126), "20.13");
        assert_eq!(format_value(7.5), "7.5");
        assert_eq!(format_value(-0.001), "0.0");
        assert_eq!(format_value(-3.456), "-3.46");
    }
}
