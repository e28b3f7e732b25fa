//! EPANET INP 文件读取器
//!
//! 分两步：逐行收集各 section 的原始记录（保留行号），
//! 全部读完后再解析引用关系、换算单位并校验拓扑。
//! 引用可以出现在定义之前（例如 `[PUMPS]` 引用后面的 `[CURVES]`）。

use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use super::error::{EngineError, EngineResult};
use super::model::{
    Demand, HydraulicOptions, Link, LinkKind, LinkStatus, NetworkModel, Node, NodeKind, Pattern,
    PumpCurve, TimeOptions, ValveType,
};
use super::units::{parse_duration, FlowUnits, HeadlossFormula, KINEMATIC_VISCOSITY};

/// 读取并解析 INP 文件
pub fn read_file(path: &Path) -> EngineResult<NetworkModel> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8(bytes)
        .map_err(|e| EngineError::input(0, format!("file is not valid UTF-8 text: {}", e)))?;
    parse(&text)
}

/// 解析 INP 文本
pub fn parse(text: &str) -> EngineResult<NetworkModel> {
    let mut reader = InpReader::default();
    for (idx, raw) in text.lines().enumerate() {
        reader.feed(idx + 1, raw)?;
    }
    reader.finish()
}

/// 读取但不参与水力计算的 section
const IGNORED_SECTIONS: &[&str] = &[
    "COORDINATES",
    "VERTICES",
    "LABELS",
    "BACKDROP",
    "TAGS",
    "REPORT",
    "ENERGY",
    "QUALITY",
    "REACTIONS",
    "SOURCES",
    "MIXING",
    "EMITTERS",
    "CONTROLS",
    "RULES",
    "END",
];

/// 会影响水力结果但当前不支持的 section
const UNSUPPORTED_HYDRAULIC_SECTIONS: &[&str] = &["EMITTERS", "CONTROLS", "RULES"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Title,
    Junctions,
    Reservoirs,
    Tanks,
    Pipes,
    Pumps,
    Valves,
    Demands,
    Status,
    Patterns,
    Curves,
    Options,
    Times,
    Ignored(&'static str),
}

impl Section {
    fn parse(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let section = match upper.as_str() {
            "TITLE" => Section::Title,
            "JUNCTIONS" => Section::Junctions,
            "RESERVOIRS" => Section::Reservoirs,
            "TANKS" => Section::Tanks,
            "PIPES" => Section::Pipes,
            "PUMPS" => Section::Pumps,
            "VALVES" => Section::Valves,
            "DEMANDS" => Section::Demands,
            "STATUS" => Section::Status,
            "PATTERNS" => Section::Patterns,
            "CURVES" => Section::Curves,
            "OPTIONS" => Section::Options,
            "TIMES" => Section::Times,
            other => {
                return IGNORED_SECTIONS
                    .iter()
                    .copied()
                    .find(|s| *s == other)
                    .map(Section::Ignored)
            }
        };
        Some(section)
    }
}

/// 带行号的一行数据
struct Fields<'a> {
    line: usize,
    tokens: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    fn str(&self, idx: usize, what: &str) -> EngineResult<&'a str> {
        self.tokens
            .get(idx)
            .copied()
            .ok_or_else(|| EngineError::input(self.line, format!("missing {}", what)))
    }

    fn opt_str(&self, idx: usize) -> Option<&'a str> {
        self.tokens.get(idx).copied()
    }

    fn num(&self, idx: usize, what: &str) -> EngineResult<f64> {
        let raw = self.str(idx, what)?;
        parse_number(raw)
            .ok_or_else(|| EngineError::input(self.line, format!("invalid {} '{}'", what, raw)))
    }

    fn opt_num(&self, idx: usize, what: &str) -> EngineResult<Option<f64>> {
        match self.tokens.get(idx) {
            None => Ok(None),
            Some(_) => self.num(idx, what).map(Some),
        }
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::input(self.line, message)
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

struct RawJunction {
    line: usize,
    id: String,
    elevation: f64,
    demand: f64,
    pattern: Option<String>,
}

struct RawReservoir {
    line: usize,
    id: String,
    head: f64,
    pattern: Option<String>,
}

struct RawTank {
    line: usize,
    id: String,
    elevation: f64,
    init_level: f64,
    min_level: f64,
    max_level: f64,
    diameter: f64,
}

struct RawPipe {
    line: usize,
    id: String,
    from: String,
    to: String,
    length: f64,
    diameter: f64,
    roughness: f64,
    minor_loss: f64,
    status: Option<String>,
}

struct RawPump {
    line: usize,
    id: String,
    from: String,
    to: String,
    properties: Vec<(String, String)>,
}

struct RawValve {
    line: usize,
    id: String,
    from: String,
    to: String,
    diameter: f64,
    valve_type: ValveType,
    setting: f64,
    minor_loss: f64,
}

struct RawDemand {
    line: usize,
    node: String,
    base: f64,
    pattern: Option<String>,
}

#[derive(Default)]
struct InpReader {
    section: Option<Section>,
    title: Vec<String>,
    junctions: Vec<RawJunction>,
    reservoirs: Vec<RawReservoir>,
    tanks: Vec<RawTank>,
    pipes: Vec<RawPipe>,
    pumps: Vec<RawPump>,
    valves: Vec<RawValve>,
    demands: Vec<RawDemand>,
    statuses: Vec<(usize, String, String)>,
    patterns: IndexMap<String, Vec<f64>>,
    curves: IndexMap<String, Vec<(f64, f64)>>,
    options: HydraulicOptions,
    default_pattern: Option<(usize, String)>,
    times: TimeOptions,
    skipped: IndexMap<&'static str, usize>,
}

impl InpReader {
    fn feed(&mut self, line: usize, raw: &str) -> EngineResult<()> {
        let content = raw.split(';').next().unwrap_or("").trim();
        let content = content.trim_start_matches('\u{feff}');
        if content.is_empty() {
            return Ok(());
        }

        if content.starts_with('[') {
            let name = content
                .strip_prefix('[')
                .and_then(|s| s.split(']').next())
                .unwrap_or("");
            let section = Section::parse(name)
                .ok_or_else(|| EngineError::input(line, format!("unknown section [{}]", name)))?;
            self.section = Some(section);
            return Ok(());
        }

        let Some(section) = self.section else {
            return Err(EngineError::input(
                line,
                "data found before the first [SECTION] header",
            ));
        };

        let fields = Fields {
            line,
            tokens: content.split_whitespace().collect(),
        };

        match section {
            Section::Title => self.title.push(content.to_string()),
            Section::Junctions => self.read_junction(&fields)?,
            Section::Reservoirs => self.read_reservoir(&fields)?,
            Section::Tanks => self.read_tank(&fields)?,
            Section::Pipes => self.read_pipe(&fields)?,
            Section::Pumps => self.read_pump(&fields)?,
            Section::Valves => self.read_valve(&fields)?,
            Section::Demands => self.read_demand(&fields)?,
            Section::Status => {
                let id = fields.str(0, "link id")?;
                let value = fields.str(1, "status value")?;
                self.statuses.push((line, id.to_string(), value.to_string()));
            }
            Section::Patterns => {
                let id = fields.str(0, "pattern id")?;
                let mut multipliers = Vec::with_capacity(fields.tokens.len() - 1);
                for idx in 1..fields.tokens.len() {
                    multipliers.push(fields.num(idx, "pattern multiplier")?);
                }
                self.patterns
                    .entry(id.to_string())
                    .or_default()
                    .extend(multipliers);
            }
            Section::Curves => {
                let id = fields.str(0, "curve id")?;
                let x = fields.num(1, "curve x value")?;
                let y = fields.num(2, "curve y value")?;
                self.curves.entry(id.to_string()).or_default().push((x, y));
            }
            Section::Options => self.read_option(&fields)?,
            Section::Times => self.read_time(&fields)?,
            Section::Ignored(name) => *self.skipped.entry(name).or_insert(0) += 1,
        }
        Ok(())
    }

    fn read_junction(&mut self, f: &Fields) -> EngineResult<()> {
        self.junctions.push(RawJunction {
            line: f.line,
            id: f.str(0, "junction id")?.to_string(),
            elevation: f.num(1, "elevation")?,
            demand: f.opt_num(2, "demand")?.unwrap_or(0.0),
            pattern: f.opt_str(3).map(str::to_string),
        });
        Ok(())
    }

    fn read_reservoir(&mut self, f: &Fields) -> EngineResult<()> {
        self.reservoirs.push(RawReservoir {
            line: f.line,
            id: f.str(0, "reservoir id")?.to_string(),
            head: f.num(1, "total head")?,
            pattern: f.opt_str(2).map(str::to_string),
        });
        Ok(())
    }

    fn read_tank(&mut self, f: &Fields) -> EngineResult<()> {
        if f.opt_str(7).is_some_and(|c| c != "*") {
            warn!(line = f.line, "Tank volume curves are not supported, using cylindrical geometry");
        }
        self.tanks.push(RawTank {
            line: f.line,
            id: f.str(0, "tank id")?.to_string(),
            elevation: f.num(1, "elevation")?,
            init_level: f.num(2, "initial level")?,
            min_level: f.num(3, "minimum level")?,
            max_level: f.num(4, "maximum level")?,
            diameter: f.num(5, "diameter")?,
        });
        Ok(())
    }

    fn read_pipe(&mut self, f: &Fields) -> EngineResult<()> {
        // 第 7 列可能直接是状态（省略了局部损失系数）
        let (minor_loss, status) = match f.opt_str(6) {
            Some(token) if parse_number(token).is_none() => (0.0, Some(token)),
            _ => (f.opt_num(6, "minor loss")?.unwrap_or(0.0), f.opt_str(7)),
        };
        self.pipes.push(RawPipe {
            line: f.line,
            id: f.str(0, "pipe id")?.to_string(),
            from: f.str(1, "start node")?.to_string(),
            to: f.str(2, "end node")?.to_string(),
            length: f.num(3, "length")?,
            diameter: f.num(4, "diameter")?,
            roughness: f.num(5, "roughness")?,
            minor_loss,
            status: status.map(str::to_string),
        });
        Ok(())
    }

    fn read_pump(&mut self, f: &Fields) -> EngineResult<()> {
        let rest = &f.tokens[f.tokens.len().min(3)..];
        if rest.len() % 2 != 0 {
            return Err(f.error("pump properties must be keyword/value pairs"));
        }
        self.pumps.push(RawPump {
            line: f.line,
            id: f.str(0, "pump id")?.to_string(),
            from: f.str(1, "start node")?.to_string(),
            to: f.str(2, "end node")?.to_string(),
            properties: rest
                .chunks(2)
                .map(|kv| (kv[0].to_ascii_uppercase(), kv[1].to_string()))
                .collect(),
        });
        Ok(())
    }

    fn read_valve(&mut self, f: &Fields) -> EngineResult<()> {
        let type_token = f.str(4, "valve type")?;
        let valve_type = ValveType::parse(type_token)
            .ok_or_else(|| f.error(format!("unknown valve type '{}'", type_token)))?;
        // GPV 的设定值是曲线 ID
        let setting = if valve_type == ValveType::Gpv {
            0.0
        } else {
            f.num(5, "valve setting")?
        };
        self.valves.push(RawValve {
            line: f.line,
            id: f.str(0, "valve id")?.to_string(),
            from: f.str(1, "start node")?.to_string(),
            to: f.str(2, "end node")?.to_string(),
            diameter: f.num(3, "diameter")?,
            valve_type,
            setting,
            minor_loss: f.opt_num(6, "minor loss")?.unwrap_or(0.0),
        });
        Ok(())
    }

    fn read_demand(&mut self, f: &Fields) -> EngineResult<()> {
        self.demands.push(RawDemand {
            line: f.line,
            node: f.str(0, "junction id")?.to_string(),
            base: f.num(1, "base demand")?,
            pattern: f.opt_str(2).map(str::to_string),
        });
        Ok(())
    }

    fn read_option(&mut self, f: &Fields) -> EngineResult<()> {
        let key = f.str(0, "option keyword")?.to_ascii_uppercase();
        match key.as_str() {
            "UNITS" => {
                let value = f.str(1, "flow units")?;
                self.options.units = value.parse::<FlowUnits>().map_err(|e| f.error(e))?;
            }
            "HEADLOSS" => {
                let value = f.str(1, "headloss formula")?;
                self.options.headloss = value.parse::<HeadlossFormula>().map_err(|e| f.error(e))?;
            }
            "PATTERN" => {
                self.default_pattern = Some((f.line, f.str(1, "pattern id")?.to_string()));
            }
            "DEMAND" => {
                let sub = f.str(1, "DEMAND option")?.to_ascii_uppercase();
                match sub.as_str() {
                    "MULTIPLIER" => {
                        self.options.demand_multiplier = f.num(2, "demand multiplier")?;
                    }
                    "MODEL" => {
                        if f.opt_str(2).is_some_and(|m| !m.eq_ignore_ascii_case("DDA")) {
                            warn!(line = f.line, "Pressure-driven demand is not supported, using DDA");
                        }
                    }
                    _ => debug!(line = f.line, option = %sub, "Ignoring DEMAND option"),
                }
            }
            "TRIALS" => {
                let trials = f.num(1, "trials")?;
                if trials < 1.0 {
                    return Err(f.error("TRIALS must be at least 1"));
                }
                self.options.trials = trials as usize;
            }
            "ACCURACY" => {
                let accuracy = f.num(1, "accuracy")?;
                if accuracy <= 0.0 {
                    return Err(f.error("ACCURACY must be positive"));
                }
                self.options.accuracy = accuracy;
            }
            "VISCOSITY" => {
                let relative = f.num(1, "viscosity")?;
                if relative <= 0.0 {
                    return Err(f.error("VISCOSITY must be positive"));
                }
                self.options.viscosity = relative * KINEMATIC_VISCOSITY;
            }
            _ => debug!(line = f.line, option = %key, "Ignoring option"),
        }
        Ok(())
    }

    fn read_time(&mut self, f: &Fields) -> EngineResult<()> {
        let upper: Vec<String> = f.tokens.iter().map(|t| t.to_ascii_uppercase()).collect();
        let first = upper.first().map(String::as_str).unwrap_or("");
        let second = upper.get(1).map(String::as_str).unwrap_or("");

        let (target, value_idx) = match (first, second) {
            ("DURATION", _) => (Some(&mut self.times.duration), 1),
            ("HYDRAULIC", "TIMESTEP") => (Some(&mut self.times.hydraulic_step), 2),
            ("PATTERN", "TIMESTEP") => (Some(&mut self.times.pattern_step), 2),
            ("PATTERN", "START") => (Some(&mut self.times.pattern_start), 2),
            ("REPORT", "TIMESTEP") => (Some(&mut self.times.report_step), 2),
            ("REPORT", "START") => (Some(&mut self.times.report_start), 2),
            _ => (None, 0),
        };

        let Some(target) = target else {
            debug!(line = f.line, key = %first, "Ignoring time option");
            return Ok(());
        };

        let value = f.str(value_idx, "time value")?;
        let seconds = parse_duration(value, f.opt_str(value_idx + 1))
            .ok_or_else(|| f.error(format!("invalid time value '{}'", value)))?;
        *target = seconds;
        Ok(())
    }

    fn finish(self) -> EngineResult<NetworkModel> {
        for (section, count) in &self.skipped {
            if UNSUPPORTED_HYDRAULIC_SECTIONS.contains(section) {
                warn!(section = %section, entries = count, "Section is not supported and was ignored");
            }
        }

        if self.times.hydraulic_step == 0 {
            return Err(EngineError::network("HYDRAULIC TIMESTEP must be positive"));
        }
        if self.times.pattern_step == 0 {
            return Err(EngineError::network("PATTERN TIMESTEP must be positive"));
        }

        let units = self.options.units;
        let length = units.length();
        let flow = units.to_cms();

        // ---------- patterns ----------
        let mut pattern_index: HashMap<String, usize> = HashMap::new();
        let mut patterns = Vec::with_capacity(self.patterns.len());
        for (id, multipliers) in self.patterns {
            pattern_index.insert(id.clone(), patterns.len());
            patterns.push(Pattern { id, multipliers });
        }
        let resolve_pattern = |line: usize, id: Option<&str>| -> EngineResult<Option<usize>> {
            match id {
                None => Ok(None),
                Some(id) => pattern_index
                    .get(id)
                    .copied()
                    .map(Some)
                    .ok_or_else(|| EngineError::input(line, format!("undefined pattern '{}'", id))),
            }
        };

        let mut options = self.options;
        options.default_pattern = match &self.default_pattern {
            Some((line, id)) => resolve_pattern(*line, Some(id.as_str()))?,
            None => pattern_index.get("1").copied(),
        };

        // ---------- nodes ----------
        let mut demand_overrides: HashMap<&str, Vec<Demand>> = HashMap::new();
        for d in &self.demands {
            let pattern = resolve_pattern(d.line, d.pattern.as_deref())?;
            demand_overrides
                .entry(d.node.as_str())
                .or_default()
                .push(Demand {
                    base: d.base * flow,
                    pattern,
                });
        }

        let mut nodes: Vec<Node> = Vec::new();
        let mut node_index: HashMap<String, usize> = HashMap::new();

        for j in &self.junctions {
            let demands = match demand_overrides.remove(j.id.as_str()) {
                Some(list) => list,
                None => vec![Demand {
                    base: j.demand * flow,
                    pattern: resolve_pattern(j.line, j.pattern.as_deref())?,
                }],
            };
            push_node(
                &mut nodes,
                &mut node_index,
                j.line,
                Node {
                    id: j.id.clone(),
                    elevation: j.elevation * length,
                    kind: NodeKind::Junction { demands },
                },
            )?;
        }

        if let Some(orphan) = self.demands.iter().find(|d| demand_overrides.contains_key(d.node.as_str())) {
            return Err(EngineError::input(
                orphan.line,
                format!("[DEMANDS] refers to unknown junction '{}'", orphan.node),
            ));
        }

        for r in &self.reservoirs {
            let head_pattern = resolve_pattern(r.line, r.pattern.as_deref())?;
            push_node(
                &mut nodes,
                &mut node_index,
                r.line,
                Node {
                    id: r.id.clone(),
                    elevation: r.head * length,
                    kind: NodeKind::Reservoir { head_pattern },
                },
            )?;
        }

        for t in &self.tanks {
            if t.diameter <= 0.0 {
                return Err(EngineError::input(t.line, "tank diameter must be positive"));
            }
            if t.min_level > t.max_level || t.init_level < t.min_level || t.init_level > t.max_level {
                return Err(EngineError::input(
                    t.line,
                    "tank levels must satisfy minimum <= initial <= maximum",
                ));
            }
            push_node(
                &mut nodes,
                &mut node_index,
                t.line,
                Node {
                    id: t.id.clone(),
                    elevation: t.elevation * length,
                    kind: NodeKind::Tank {
                        init_level: t.init_level * length,
                        min_level: t.min_level * length,
                        max_level: t.max_level * length,
                        diameter: t.diameter * length,
                    },
                },
            )?;
        }

        if nodes.is_empty() {
            return Err(EngineError::network("network contains no nodes"));
        }
        if !nodes.iter().any(Node::is_fixed_head) {
            return Err(EngineError::network(
                "network has no reservoirs or tanks to supply it",
            ));
        }

        // ---------- links ----------
        let mut links: Vec<Link> = Vec::new();
        let mut link_index: HashMap<String, usize> = HashMap::new();
        let endpoints = |line: usize, from: &str, to: &str| -> EngineResult<(usize, usize)> {
            let lookup = |id: &str| {
                node_index
                    .get(id)
                    .copied()
                    .ok_or_else(|| EngineError::input(line, format!("undefined node '{}'", id)))
            };
            let (a, b) = (lookup(from)?, lookup(to)?);
            if a == b {
                return Err(EngineError::input(line, "link starts and ends at the same node"));
            }
            Ok((a, b))
        };

        for p in &self.pipes {
            let (from, to) = endpoints(p.line, &p.from, &p.to)?;
            if p.length <= 0.0 || p.diameter <= 0.0 || p.roughness <= 0.0 {
                return Err(EngineError::input(
                    p.line,
                    "pipe length, diameter and roughness must be positive",
                ));
            }
            let (status, check_valve) = match p.status.as_deref().map(str::to_ascii_uppercase) {
                None => (LinkStatus::Open, false),
                Some(s) if s == "OPEN" => (LinkStatus::Open, false),
                Some(s) if s == "CLOSED" => (LinkStatus::Closed, false),
                Some(s) if s == "CV" => (LinkStatus::Open, true),
                Some(s) => {
                    return Err(EngineError::input(p.line, format!("invalid pipe status '{}'", s)))
                }
            };
            let roughness = match options.headloss {
                HeadlossFormula::DarcyWeisbach => p.roughness * units.dw_roughness(),
                _ => p.roughness,
            };
            push_link(
                &mut links,
                &mut link_index,
                p.line,
                Link {
                    id: p.id.clone(),
                    from,
                    to,
                    kind: LinkKind::Pipe {
                        length: p.length * length,
                        diameter: p.diameter * units.diameter(),
                        roughness,
                        minor_loss: p.minor_loss,
                        check_valve,
                    },
                    status,
                },
            )?;
        }

        for p in &self.pumps {
            let (from, to) = endpoints(p.line, &p.from, &p.to)?;
            let mut curve = None;
            let mut speed = 1.0;
            let mut speed_pattern = None;
            for (key, value) in &p.properties {
                match key.as_str() {
                    "HEAD" => {
                        let points = self.curves.get(value).ok_or_else(|| {
                            EngineError::input(p.line, format!("undefined curve '{}'", value))
                        })?;
                        let si: Vec<(f64, f64)> =
                            points.iter().map(|(q, h)| (q * flow, h * length)).collect();
                        curve = Some(PumpCurve::from_points(&si).ok_or_else(|| {
                            EngineError::input(p.line, format!("pump curve '{}' is not valid", value))
                        })?);
                    }
                    "POWER" => {
                        let power = parse_number(value)
                            .filter(|v| *v > 0.0)
                            .ok_or_else(|| EngineError::input(p.line, "pump POWER must be positive"))?;
                        curve = Some(PumpCurve::ConstantPower {
                            watts: power * units.power(),
                        });
                    }
                    "SPEED" => {
                        speed = parse_number(value)
                            .filter(|v| *v >= 0.0)
                            .ok_or_else(|| EngineError::input(p.line, "invalid pump SPEED"))?;
                    }
                    "PATTERN" => speed_pattern = resolve_pattern(p.line, Some(value.as_str()))?,
                    other => {
                        return Err(EngineError::input(
                            p.line,
                            format!("unknown pump property '{}'", other),
                        ))
                    }
                }
            }
            let curve = curve.ok_or_else(|| {
                EngineError::input(p.line, "pump needs either a HEAD curve or a POWER value")
            })?;
            let status = if speed == 0.0 {
                LinkStatus::Closed
            } else {
                LinkStatus::Open
            };
            push_link(
                &mut links,
                &mut link_index,
                p.line,
                Link {
                    id: p.id.clone(),
                    from,
                    to,
                    kind: LinkKind::Pump {
                        curve,
                        speed,
                        speed_pattern,
                    },
                    status,
                },
            )?;
        }

        for v in &self.valves {
            let (from, to) = endpoints(v.line, &v.from, &v.to)?;
            if v.diameter <= 0.0 {
                return Err(EngineError::input(v.line, "valve diameter must be positive"));
            }
            push_link(
                &mut links,
                &mut link_index,
                v.line,
                Link {
                    id: v.id.clone(),
                    from,
                    to,
                    kind: LinkKind::Valve {
                        diameter: v.diameter * units.diameter(),
                        valve_type: v.valve_type,
                        setting: v.setting,
                        minor_loss: v.minor_loss,
                    },
                    status: LinkStatus::Open,
                },
            )?;
        }

        for (line, id, value) in &self.statuses {
            let idx = *link_index
                .get(id)
                .ok_or_else(|| EngineError::input(*line, format!("[STATUS] refers to unknown link '{}'", id)))?;
            apply_status(&mut links[idx], *line, value)?;
        }

        // ---------- topology ----------
        let mut degree = vec![0usize; nodes.len()];
        for link in &links {
            degree[link.from] += 1;
            degree[link.to] += 1;
        }
        if let Some(node) = nodes
            .iter()
            .zip(&degree)
            .find(|(n, d)| !n.is_fixed_head() && **d == 0)
            .map(|(n, _)| n)
        {
            return Err(EngineError::network(format!(
                "junction '{}' is not connected to any link",
                node.id
            )));
        }

        debug!(
            nodes = nodes.len(),
            links = links.len(),
            patterns = patterns.len(),
            units = ?units,
            "Parsed INP network"
        );

        let model = NetworkModel {
            title: self.title,
            options,
            times: self.times,
            nodes,
            links,
            patterns,
        };
        model.check_limits()?;
        Ok(model)
    }
}

fn push_node(
    nodes: &mut Vec<Node>,
    index: &mut HashMap<String, usize>,
    line: usize,
    node: Node,
) -> EngineResult<()> {
    if index.contains_key(&node.id) {
        return Err(EngineError::input(line, format!("duplicate node id '{}'", node.id)));
    }
    index.insert(node.id.clone(), nodes.len());
    nodes.push(node);
    Ok(())
}

fn push_link(
    links: &mut Vec<Link>,
    index: &mut HashMap<String, usize>,
    line: usize,
    link: Link,
) -> EngineResult<()> {
    if index.contains_key(&link.id) {
        return Err(EngineError::input(line, format!("duplicate link id '{}'", link.id)));
    }
    index.insert(link.id.clone(), links.len());
    links.push(link);
    Ok(())
}

fn apply_status(link: &mut Link, line: usize, value: &str) -> EngineResult<()> {
    match value.to_ascii_uppercase().as_str() {
        "OPEN" => link.status = LinkStatus::Open,
        "CLOSED" => link.status = LinkStatus::Closed,
        "ACTIVE" => {}
        _ => {
            let number = parse_number(value)
                .ok_or_else(|| EngineError::input(line, format!("invalid status '{}'", value)))?;
            match &mut link.kind {
                LinkKind::Pump { speed, .. } if number >= 0.0 => {
                    *speed = number;
                    link.status = if number == 0.0 {
                        LinkStatus::Closed
                    } else {
                        LinkStatus::Open
                    };
                }
                LinkKind::Valve { setting, .. } => *setting = number,
                _ => {
                    return Err(EngineError::input(
                        line,
                        format!("numeric status '{}' is not valid for link '{}'", value, link.id),
                    ))
                }
            }
        }
    }
    Ok(())
}
