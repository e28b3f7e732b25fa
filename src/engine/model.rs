//! 管网模型
//!
//! 由 INP 读取器构建，所有数值均已换算为 SI。每个请求独立持有一份，不跨请求共享。

use super::error::{EngineError, EngineResult};
use super::units::{FlowUnits, HeadlossFormula};

/// 单次仿真允许的最多水力时刻数
pub const MAX_TIME_STEPS: u64 = 100_000;

/// 单个管网允许的最多节点数
pub const MAX_NODES: usize = 50_000;

/// 结果表单元上限：(节点 + 管段) × 报告时刻
pub const MAX_RESULT_CELLS: u64 = 5_000_000;

/// 节点
#[derive(Clone, Debug)]
pub struct Node {
    pub id: String,
    /// 标高 (m)；水库为基准总水头
    pub elevation: f64,
    pub kind: NodeKind,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Junction {
        demands: Vec<Demand>,
    },
    Reservoir {
        head_pattern: Option<usize>,
    },
    Tank {
        init_level: f64,
        min_level: f64,
        max_level: f64,
        diameter: f64,
    },
}

impl Node {
    pub fn is_fixed_head(&self) -> bool {
        !matches!(self.kind, NodeKind::Junction { .. })
    }
}

/// 节点需水量 (m³/s) 及其时间模式
#[derive(Clone, Debug, PartialEq)]
pub struct Demand {
    pub base: f64,
    /// `None` 时使用模型默认模式
    pub pattern: Option<usize>,
}

/// 管段（管道、水泵、阀门）
#[derive(Clone, Debug)]
pub struct Link {
    pub id: String,
    pub from: usize,
    pub to: usize,
    pub kind: LinkKind,
    pub status: LinkStatus,
}

#[derive(Clone, Debug)]
pub enum LinkKind {
    Pipe {
        length: f64,
        diameter: f64,
        /// H-W 系数 C、D-W 绝对粗糙度 (m) 或 C-M 系数 n，取决于公式
        roughness: f64,
        minor_loss: f64,
        check_valve: bool,
    },
    Pump {
        curve: PumpCurve,
        speed: f64,
        speed_pattern: Option<usize>,
    },
    Valve {
        diameter: f64,
        valve_type: ValveType,
        setting: f64,
        minor_loss: f64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Open,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValveType {
    Prv,
    Psv,
    Pbv,
    Fcv,
    Tcv,
    Gpv,
}

impl ValveType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PRV" => Some(ValveType::Prv),
            "PSV" => Some(ValveType::Psv),
            "PBV" => Some(ValveType::Pbv),
            "FCV" => Some(ValveType::Fcv),
            "TCV" => Some(ValveType::Tcv),
            "GPV" => Some(ValveType::Gpv),
            _ => None,
        }
    }
}

/// 水泵特性：扬程 (m) 关于流量 (m³/s) 的函数
#[derive(Clone, Debug, PartialEq)]
pub enum PumpCurve {
    /// `h = shutoff - coeff * q^exponent`
    Power {
        shutoff: f64,
        coeff: f64,
        exponent: f64,
        design_flow: f64,
    },
    /// 多点曲线，分段线性插值
    Custom { points: Vec<(f64, f64)> },
    /// 恒功率 (W)
    ConstantPower { watts: f64 },
}

impl PumpCurve {
    /// 由 SI 曲线点拟合水泵特性
    ///
    /// 单点曲线和首点流量为 0 的三点曲线拟合为幂函数，其余按分段线性处理。
    pub fn from_points(points: &[(f64, f64)]) -> Option<Self> {
        let fitted = match points {
            [] => return None,
            [(q1, h1)] => power_fit(1.33334 * h1, *h1, 0.0, *q1, 2.0 * q1),
            [(q0, h0), (q1, h1), (q2, h2)] if *q0 == 0.0 => power_fit(*h0, *h1, *h2, *q1, *q2),
            _ => None,
        };
        if fitted.is_some() {
            return fitted;
        }
        if points.len() < 2 {
            return None;
        }
        let mut sorted = points.to_vec();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        Some(PumpCurve::Custom { points: sorted })
    }

    /// 初始流量估计
    pub fn design_flow(&self) -> f64 {
        match self {
            PumpCurve::Power { design_flow, .. } => *design_flow,
            PumpCurve::Custom { points } => points[points.len() / 2].0.max(1e-3),
            PumpCurve::ConstantPower { .. } => 0.01,
        }
    }

    /// 零流量时的扬程（额定转速）
    pub fn shutoff_head(&self) -> f64 {
        match self {
            PumpCurve::Power { shutoff, .. } => *shutoff,
            PumpCurve::Custom { points } => interpolate(points, 0.0).0,
            PumpCurve::ConstantPower { .. } => f64::INFINITY,
        }
    }
}

fn power_fit(h0: f64, h1: f64, h2: f64, q1: f64, q2: f64) -> Option<PumpCurve> {
    const TINY: f64 = 1e-9;
    if h0 < TINY || h0 - h1 < TINY || h1 - h2 < TINY || q1 < TINY || q2 - q1 < TINY {
        return None;
    }
    let exponent = ((h0 - h2) / (h0 - h1)).ln() / (q2 / q1).ln();
    if exponent <= 0.0 || exponent > 20.0 {
        return None;
    }
    let coeff = (h0 - h1) / q1.powf(exponent);
    Some(PumpCurve::Power {
        shutoff: h0,
        coeff,
        exponent,
        design_flow: q1,
    })
}

/// 分段线性插值，两端线性外推；返回 (值, 斜率)
pub fn interpolate(points: &[(f64, f64)], x: f64) -> (f64, f64) {
    let n = points.len();
    if n == 1 {
        return (points[0].1, 0.0);
    }
    let seg = points
        .windows(2)
        .position(|w| x <= w[1].0)
        .unwrap_or(n - 2);
    let (x0, y0) = points[seg];
    let (x1, y1) = points[seg + 1];
    let slope = if x1 > x0 { (y1 - y0) / (x1 - x0) } else { 0.0 };
    (y0 + slope * (x - x0), slope)
}

/// 时间模式
#[derive(Clone, Debug)]
pub struct Pattern {
    pub id: String,
    pub multipliers: Vec<f64>,
}

/// `[OPTIONS]` 中与水力计算相关的部分
#[derive(Clone, Debug)]
pub struct HydraulicOptions {
    pub units: FlowUnits,
    pub headloss: HeadlossFormula,
    pub demand_multiplier: f64,
    pub default_pattern: Option<usize>,
    pub trials: usize,
    pub accuracy: f64,
    pub viscosity: f64,
}

impl Default for HydraulicOptions {
    fn default() -> Self {
        Self {
            units: FlowUnits::default(),
            headloss: HeadlossFormula::default(),
            demand_multiplier: 1.0,
            default_pattern: None,
            trials: 200,
            accuracy: 0.001,
            viscosity: super::units::KINEMATIC_VISCOSITY,
        }
    }
}

/// `[TIMES]`，单位均为秒
#[derive(Clone, Debug)]
pub struct TimeOptions {
    pub duration: u64,
    pub hydraulic_step: u64,
    pub pattern_step: u64,
    pub pattern_start: u64,
    pub report_step: u64,
    pub report_start: u64,
}

impl Default for TimeOptions {
    fn default() -> Self {
        Self {
            duration: 0,
            hydraulic_step: 3600,
            pattern_step: 3600,
            pattern_start: 0,
            report_step: 3600,
            report_start: 0,
        }
    }
}

/// 完整管网模型
#[derive(Clone, Debug, Default)]
pub struct NetworkModel {
    pub title: Vec<String>,
    pub options: HydraulicOptions,
    pub times: TimeOptions,
    /// 顺序：节点（junction）、水库、水池，各自保持文件顺序
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub patterns: Vec<Pattern>,
}

impl NetworkModel {
    /// 时刻 `t` 时模式的乘子
    pub fn pattern_factor(&self, pattern: usize, t: u64) -> f64 {
        let Some(p) = self.patterns.get(pattern) else {
            return 1.0;
        };
        if p.multipliers.is_empty() {
            return 1.0;
        }
        let step = self.times.pattern_step.max(1);
        let period = t.saturating_add(self.times.pattern_start) / step;
        p.multipliers[(period % p.multipliers.len() as u64) as usize]
    }

    /// 节点在时刻 `t` 的实际需水量 (m³/s)
    pub fn junction_demand(&self, node: &Node, t: u64) -> f64 {
        let NodeKind::Junction { demands } = &node.kind else {
            return 0.0;
        };
        demands
            .iter()
            .map(|d| {
                let factor = d
                    .pattern
                    .or(self.options.default_pattern)
                    .map(|p| self.pattern_factor(p, t))
                    .unwrap_or(1.0);
                d.base * factor * self.options.demand_multiplier
            })
            .sum()
    }

    /// 水力计算时刻：0, Δh, 2Δh … 直到 DURATION（含），按需生成
    pub fn hydraulic_times(&self) -> impl Iterator<Item = u64> {
        let duration = self.times.duration;
        let step = self.times.hydraulic_step.max(1);
        let tail = (duration % step != 0).then_some(duration);
        (0..=duration / step).map(move |i| i * step).chain(tail)
    }

    /// 水力时刻总数
    pub fn step_count(&self) -> u64 {
        let duration = self.times.duration;
        let step = self.times.hydraulic_step.max(1);
        (duration / step)
            .saturating_add(1)
            .saturating_add(u64::from(duration % step != 0))
    }

    /// 报告时刻总数
    pub fn report_count(&self) -> u64 {
        let t = &self.times;
        if t.duration == 0 {
            return 1;
        }
        if t.report_start > t.duration {
            return 0;
        }
        // 报告时刻只能落在水力时刻上，取两者较少者作上界
        let by_report = ((t.duration - t.report_start) / t.report_step.max(1)).saturating_add(1);
        by_report.min(self.step_count())
    }

    /// 检查模型规模，超限的管网按输入错误拒绝
    pub fn check_limits(&self) -> EngineResult<()> {
        let steps = self.step_count();
        if steps > MAX_TIME_STEPS {
            return Err(EngineError::network(format!(
                "simulation needs {} hydraulic time steps, the limit is {}",
                steps, MAX_TIME_STEPS
            )));
        }
        if self.nodes.len() > MAX_NODES {
            return Err(EngineError::network(format!(
                "network has {} nodes, the limit is {}",
                self.nodes.len(),
                MAX_NODES
            )));
        }
        let entities = (self.nodes.len() + self.links.len()) as u64;
        let cells = entities.saturating_mul(self.report_count());
        if cells > MAX_RESULT_CELLS {
            return Err(EngineError::network(format!(
                "{} entities over {} report times exceed the result limit of {} values",
                entities,
                self.report_count(),
                MAX_RESULT_CELLS
            )));
        }
        Ok(())
    }

    /// 是否在该时刻输出结果
    pub fn is_report_time(&self, time: u64) -> bool {
        let t = &self.times;
        if t.duration == 0 {
            return true;
        }
        time >= t.report_start && (time - t.report_start) % t.report_step.max(1) == 0
    }
}
