//! INP 单位换算
//!
//! 读取阶段把所有数值换算成 SI（m, m³/s, W），求解器内部只处理 SI。

use std::str::FromStr;

pub const FEET: f64 = 0.3048;
pub const INCHES: f64 = 0.0254;
pub const MILLIFEET: f64 = 0.0003048;
pub const HORSEPOWER: f64 = 745.699872;

/// 重力加速度 (m/s²)
pub const GRAVITY: f64 = 9.80665;
/// 20°C 水的运动粘度 (m²/s)
pub const KINEMATIC_VISCOSITY: f64 = 1.004e-6;
/// 水的比重 (N/m³)
pub const SPECIFIC_WEIGHT: f64 = 9806.65;

/// `[OPTIONS] UNITS` 允许的流量单位
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FlowUnits {
    Cfs,
    #[default]
    Gpm,
    Mgd,
    Imgd,
    Afd,
    Lps,
    Lpm,
    Mld,
    Cmh,
    Cmd,
}

impl FlowUnits {
    /// 是否为美制单位（长度 ft，管径 in）
    pub fn is_us(self) -> bool {
        matches!(
            self,
            FlowUnits::Cfs | FlowUnits::Gpm | FlowUnits::Mgd | FlowUnits::Imgd | FlowUnits::Afd
        )
    }

    /// 1 个流量单位对应的 m³/s
    pub fn to_cms(self) -> f64 {
        match self {
            FlowUnits::Cfs => 0.028316846592,
            FlowUnits::Gpm => 6.30901964e-5,
            FlowUnits::Mgd => 0.0438126364,
            FlowUnits::Imgd => 0.0526167824,
            FlowUnits::Afd => 0.0142764101,
            FlowUnits::Lps => 0.001,
            FlowUnits::Lpm => 1.0 / 60_000.0,
            FlowUnits::Mld => 1000.0 / 86_400.0,
            FlowUnits::Cmh => 1.0 / 3600.0,
            FlowUnits::Cmd => 1.0 / 86_400.0,
        }
    }

    /// 标高、水头、管长、水位
    pub fn length(self) -> f64 {
        if self.is_us() {
            FEET
        } else {
            1.0
        }
    }

    /// 管径、阀门直径
    pub fn diameter(self) -> f64 {
        if self.is_us() {
            INCHES
        } else {
            0.001
        }
    }

    /// Darcy-Weisbach 粗糙度（millifeet 或 mm）
    pub fn dw_roughness(self) -> f64 {
        if self.is_us() {
            MILLIFEET
        } else {
            0.001
        }
    }

    /// 水泵功率（hp 或 kW）换算为 W
    pub fn power(self) -> f64 {
        if self.is_us() {
            HORSEPOWER
        } else {
            1000.0
        }
    }
}

impl FromStr for FlowUnits {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CFS" => Ok(FlowUnits::Cfs),
            "GPM" => Ok(FlowUnits::Gpm),
            "MGD" => Ok(FlowUnits::Mgd),
            "IMGD" => Ok(FlowUnits::Imgd),
            "AFD" => Ok(FlowUnits::Afd),
            "LPS" => Ok(FlowUnits::Lps),
            "LPM" => Ok(FlowUnits::Lpm),
            "MLD" => Ok(FlowUnits::Mld),
            "CMH" => Ok(FlowUnits::Cmh),
            "CMD" => Ok(FlowUnits::Cmd),
            other => Err(format!("unknown flow units '{}'", other)),
        }
    }
}

/// 沿程水头损失公式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HeadlossFormula {
    #[default]
    HazenWilliams,
    DarcyWeisbach,
    ChezyManning,
}

impl FromStr for HeadlossFormula {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "H-W" => Ok(HeadlossFormula::HazenWilliams),
            "D-W" => Ok(HeadlossFormula::DarcyWeisbach),
            "C-M" => Ok(HeadlossFormula::ChezyManning),
            other => Err(format!("unknown headloss formula '{}'", other)),
        }
    }
}

/// 解析 INP 时间值，返回秒
///
/// 支持 `h:mm[:ss]`、纯数字（默认小时）以及带单位的数字，如 `30 MIN`、`2 DAYS`。
pub fn parse_duration(value: &str, unit: Option<&str>) -> Option<u64> {
    if value.contains(':') {
        let mut parts = value.split(':');
        let hours: u64 = parts.next()?.parse().ok()?;
        let minutes: u64 = parts.next().map(str::parse::<u64>).transpose().ok()?.unwrap_or(0);
        let seconds: u64 = parts.next().map(str::parse::<u64>).transpose().ok()?.unwrap_or(0);
        if parts.next().is_some() {
            return None;
        }
        return hours
            .checked_mul(3600)?
            .checked_add(minutes.checked_mul(60)?)?
            .checked_add(seconds);
    }

    let amount: f64 = value.parse().ok()?;
    if amount < 0.0 || !amount.is_finite() {
        return None;
    }
    let factor = match unit.map(|u| u.to_ascii_uppercase()) {
        None => 3600.0,
        Some(u) if u.starts_with("SEC") => 1.0,
        Some(u) if u.starts_with("MIN") => 60.0,
        Some(u) if u.starts_with("HOUR") => 3600.0,
        Some(u) if u.starts_with("DAY") => 86_400.0,
        // AM/PM 只出现在 START CLOCKTIME，按小时处理
        Some(u) if u == "AM" || u == "PM" => 3600.0,
        Some(_) => return None,
    };
    let seconds = (amount * factor).round();
    // u64::MAX 转为 f64 后向上取整为 2^64
    if seconds >= u64::MAX as f64 {
        return None;
    }
    Some(seconds as u64)
}
