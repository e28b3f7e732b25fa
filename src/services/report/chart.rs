//! 压力曲线图：plotters 绘制到内存位图，PNG 编码后转 base64

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder};
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use std::sync::OnceLock;

use super::{ReportError, ReportResult};
use crate::engine::SeriesTable;

pub const WIDTH: u32 = 1000;
pub const HEIGHT: u32 = 600;

const FONT_FAMILY: &str = "sans-serif";
static FONT_BYTES: &[u8] = include_bytes!("../../../assets/fonts/DejaVuSans.ttf");
static FONT_REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();

fn ensure_font() -> ReportResult<()> {
    FONT_REGISTERED
        .get_or_init(|| {
            register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES)
                .map_err(|_| "embedded chart font could not be loaded".to_string())
        })
        .clone()
        .map_err(ReportError::Chart)
}

/// 生成嵌入 base64 PNG 的 `<img>` 片段
pub fn render_html(series: &SeriesTable) -> ReportResult<String> {
    let png = render_png(series)?;
    Ok(format!(
        r#"<img src="data:image/png;base64,{}" alt="Pressure Chart" width="600"/>"#,
        BASE64.encode(png)
    ))
}

/// 每个实体一条折线，横轴为时间（秒）
pub fn render_png(series: &SeriesTable) -> ReportResult<Vec<u8>> {
    if series.is_empty() {
        return Err(ReportError::EmptySeries);
    }
    ensure_font()?;

    let (x_range, y_range) = axis_ranges(series);
    let mut buffer = vec![0u8; (WIDTH * HEIGHT * 3) as usize];

    // 绘图区在这个作用域结束时释放，之后才编码
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Pressure Plot", (FONT_FAMILY, 28))
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(x_range, y_range)
            .map_err(chart_err)?;

        chart
            .configure_mesh()
            .x_desc("Time Step")
            .y_desc("Pressure (m)")
            .label_style((FONT_FAMILY, 14))
            .draw()
            .map_err(chart_err)?;

        for (col, id) in series.columns.iter().enumerate() {
            let style = Palette99::pick(col).stroke_width(2);
            let points = series
                .times
                .iter()
                .zip(series.column(col))
                .map(|(t, v)| (*t as f64, v));
            chart
                .draw_series(LineSeries::new(points, style))
                .map_err(chart_err)?
                .label(id.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
        }

        chart
            .configure_series_labels()
            .label_font((FONT_FAMILY, 14))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(chart_err)?;

        root.present().map_err(chart_err)?;
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(&buffer, WIDTH, HEIGHT, ExtendedColorType::Rgb8)
        .map_err(|e| ReportError::Encode(e.to_string()))?;
    Ok(png)
}

fn chart_err<E: std::fmt::Display>(e: E) -> ReportError {
    ReportError::Chart(e.to_string())
}

/// 坐标范围；单点或常数序列时向两侧扩展
fn axis_ranges(series: &SeriesTable) -> (std::ops::Range<f64>, std::ops::Range<f64>) {
    let x_min = series.times.first().copied().unwrap_or(0) as f64;
    let x_max = series.times.last().copied().unwrap_or(0) as f64;
    let x_range = if x_max > x_min {
        x_min..x_max
    } else {
        x_min - 1.0..x_max + 1.0
    };

    let (y_min, y_max) = series
        .rows
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    let pad = if y_max > y_min {
        (y_max - y_min) * 0.05
    } else {
        1.0
    };
    (x_range, y_min - pad..y_max + pad)
}
