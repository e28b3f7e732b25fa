//! 全局梯度法水力求解器
//!
//! 未知量为 junction 水头和全部管段流量。每次迭代把管段水头损失在当前流量处线性化，
//! 组装对称正定的节点方程 `A·H = F` 求解水头，再据此修正流量。
//! `A` 按稀疏格式组装和分解，内存随节点数和管段数线性增长。
//! 收敛判据：Σ|ΔQ| / Σ|Q| ≤ ACCURACY。

use nalgebra::DMatrix;
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use std::f64::consts::PI;
use tracing::{debug, trace};

use super::error::{EngineError, EngineResult};
use super::model::{interpolate, LinkKind, LinkStatus, NetworkModel, PumpCurve};
use super::units::{HeadlossFormula, FEET, GRAVITY, SPECIFIC_WEIGHT};

/// 梯度下限，避免零流量时 1/g 发散
const RQTOL: f64 = 1e-7;
/// 关闭管段的等效阻力
const CBIG: f64 = 1e8;
/// 状态检查的水头容差 (m)
const HTOL: f64 = 1.5e-4;
/// 状态检查的流量容差 (m³/s)
const QTOL: f64 = 2.8e-6;
/// 每个时刻最多的状态切换轮数
const MAX_STATUS_PASSES: usize = 10;
/// 稀疏 Cholesky 失败时，未知量不超过此数才退回稠密 LU
const DENSE_FALLBACK_LIMIT: usize = 500;

/// 单个时刻的水力解
#[derive(Clone, Debug)]
pub struct HydraulicState {
    /// 节点总水头 (m)
    pub heads: Vec<f64>,
    /// 管段流量 (m³/s)，正方向为 from -> to
    pub flows: Vec<f64>,
    /// junction 为需水量；水库/水池为净流入量
    pub demands: Vec<f64>,
    pub iterations: usize,
}

/// 跨时刻复用的求解器，保留上一时刻的流量和运行状态作为初值
pub struct HydraulicSolver<'a> {
    model: &'a NetworkModel,
    /// 节点索引 -> 方程未知量索引（固定水头节点为 None）
    unknown: Vec<Option<usize>>,
    unknown_count: usize,
    status: Vec<LinkStatus>,
    flows: Vec<f64>,
}

impl<'a> HydraulicSolver<'a> {
    pub fn new(model: &'a NetworkModel) -> Self {
        let mut unknown_count = 0;
        let unknown = model
            .nodes
            .iter()
            .map(|n| {
                if n.is_fixed_head() {
                    None
                } else {
                    unknown_count += 1;
                    Some(unknown_count - 1)
                }
            })
            .collect();
        let flows = model
            .links
            .iter()
            .map(|l| initial_flow(&l.kind))
            .collect();
        Self {
            model,
            unknown,
            unknown_count,
            status: model.links.iter().map(|l| l.status).collect(),
            flows,
        }
    }

    /// 在给定固定水头（按节点索引，junction 位置忽略）和需水量下求解
    pub fn solve(
        &mut self,
        time: u64,
        fixed_heads: &[f64],
        demands: &[f64],
    ) -> EngineResult<HydraulicState> {
        let model = self.model;
        let links = &model.links;
        let n = self.unknown_count;
        let max_trials = model.options.trials;

        let mut heads = fixed_heads.to_vec();
        let mut p = vec![0.0; links.len()];
        let mut y = vec![0.0; links.len()];
        let mut status_passes = 0;
        let mut trials = 0;

        loop {
            trials += 1;
            if trials > max_trials {
                return Err(EngineError::Convergence {
                    time,
                    trials: max_trials,
                });
            }

            let mut a = CooMatrix::<f64>::new(n, n);
            let mut f = vec![0.0; n];

            for (node, u) in self.unknown.iter().enumerate() {
                if let Some(i) = u {
                    f[*i] -= demands[node];
                }
            }

            for (k, link) in links.iter().enumerate() {
                let q = self.flows[k];
                let (h, g) = self.link_gradient(k, q, time);
                p[k] = 1.0 / g;
                y[k] = h / g;

                let (from, to) = (self.unknown[link.from], self.unknown[link.to]);
                // 重复的 (i, j) 在转换为 CSC 时累加
                if let Some(i) = from {
                    a.push(i, i, p[k]);
                    f[i] -= q - y[k];
                }
                if let Some(j) = to {
                    a.push(j, j, p[k]);
                    f[j] += q - y[k];
                }
                match (from, to) {
                    (Some(i), Some(j)) => {
                        a.push(i, j, -p[k]);
                        a.push(j, i, -p[k]);
                    }
                    (Some(i), None) => f[i] += p[k] * fixed_heads[link.to],
                    (None, Some(j)) => f[j] += p[k] * fixed_heads[link.from],
                    (None, None) => {}
                }
            }

            let solution = solve_linear(&a, &f).ok_or(EngineError::Singular { time })?;
            for (node, u) in self.unknown.iter().enumerate() {
                if let Some(i) = u {
                    heads[node] = solution[*i];
                }
            }

            let mut dq_sum = 0.0;
            let mut q_sum = 0.0;
            for (k, link) in links.iter().enumerate() {
                let q_new = self.flows[k] - y[k] + p[k] * (heads[link.from] - heads[link.to]);
                dq_sum += (q_new - self.flows[k]).abs();
                q_sum += q_new.abs();
                self.flows[k] = q_new;
            }
            let ratio = if q_sum > 0.0 { dq_sum / q_sum } else { dq_sum };
            trace!(time, trials, ratio, "Gradient iteration");

            if ratio <= model.options.accuracy {
                if status_passes < MAX_STATUS_PASSES && self.check_status(&heads, time) {
                    status_passes += 1;
                    continue;
                }
                break;
            }
        }

        debug!(time, trials, status_passes, "Hydraulics converged");

        let mut node_demands = demands.to_vec();
        for node in 0..model.nodes.len() {
            if self.unknown[node].is_none() {
                node_demands[node] = 0.0;
            }
        }
        for (k, link) in links.iter().enumerate() {
            if self.unknown[link.to].is_none() {
                node_demands[link.to] += self.flows[k];
            }
            if self.unknown[link.from].is_none() {
                node_demands[link.from] -= self.flows[k];
            }
        }

        Ok(HydraulicState {
            heads,
            flows: self.flows.clone(),
            demands: node_demands,
            iterations: trials,
        })
    }

    /// 管段水头损失及其对流量的导数
    fn link_gradient(&self, k: usize, q: f64, time: u64) -> (f64, f64) {
        if self.status[k] == LinkStatus::Closed {
            return (CBIG * q, CBIG);
        }
        let options = &self.model.options;
        match &self.model.links[k].kind {
            LinkKind::Pipe {
                length,
                diameter,
                roughness,
                minor_loss,
                ..
            } => pipe_headloss(
                options.headloss,
                options.viscosity,
                *length,
                *diameter,
                *roughness,
                *minor_loss,
                q,
            ),
            LinkKind::Pump { curve, .. } => {
                let speed = self.pump_speed(k, time);
                if speed <= 0.0 {
                    return (CBIG * q, CBIG);
                }
                pump_headloss(curve, speed, q)
            }
            LinkKind::Valve {
                diameter,
                setting,
                minor_loss,
                ..
            } => {
                let coefficient = if *setting > 0.0 { *setting } else { *minor_loss };
                let m = minor_coefficient(coefficient, *diameter);
                clamp_gradient(m * q * q, 2.0 * m * q.abs(), q)
            }
        }
    }

    fn pump_speed(&self, k: usize, time: u64) -> f64 {
        match &self.model.links[k].kind {
            LinkKind::Pump {
                speed,
                speed_pattern,
                ..
            } => {
                let factor = speed_pattern
                    .map(|p| self.model.pattern_factor(p, time))
                    .unwrap_or(1.0);
                speed * factor
            }
            _ => 1.0,
        }
    }

    /// 检查单向阀与水泵状态，返回是否有状态变化
    fn check_status(&mut self, heads: &[f64], time: u64) -> bool {
        let model = self.model;
        let mut changed = false;
        for (k, link) in model.links.iter().enumerate() {
            if link.status == LinkStatus::Closed {
                continue;
            }
            let dh = heads[link.from] - heads[link.to];
            let q = self.flows[k];
            let next = match &link.kind {
                LinkKind::Pipe {
                    check_valve: true, ..
                } => match self.status[k] {
                    LinkStatus::Open if dh < -HTOL || q < -QTOL => LinkStatus::Closed,
                    LinkStatus::Closed if dh > HTOL => LinkStatus::Open,
                    current => current,
                },
                LinkKind::Pump { curve, .. } => {
                    let speed = self.pump_speed(k, time);
                    let max_lift = speed * speed * curve.shutoff_head();
                    match self.status[k] {
                        LinkStatus::Open if -dh > max_lift + HTOL || q < -QTOL => LinkStatus::Closed,
                        LinkStatus::Closed if speed > 0.0 && -dh < max_lift - HTOL => LinkStatus::Open,
                        current => current,
                    }
                }
                _ => continue,
            };
            if next != self.status[k] {
                debug!(time, link = %link.id, status = ?next, "Link status changed");
                self.status[k] = next;
                self.flows[k] = match next {
                    LinkStatus::Open => initial_flow(&link.kind),
                    LinkStatus::Closed => 0.0,
                };
                changed = true;
            }
        }
        changed
    }
}

fn initial_flow(kind: &LinkKind) -> f64 {
    match kind {
        // 1 ft/s 的流速
        LinkKind::Pipe { diameter, .. } | LinkKind::Valve { diameter, .. } => {
            PI * diameter * diameter / 4.0 * FEET
        }
        LinkKind::Pump { curve, .. } => curve.design_flow(),
    }
}

/// 局部损失系数换算：h = m·q²
fn minor_coefficient(k: f64, diameter: f64) -> f64 {
    8.0 * k / (GRAVITY * PI * PI * diameter.powi(4))
}

/// 梯度过小时退化为线性关系；返回带符号的水头损失
fn clamp_gradient(magnitude: f64, gradient: f64, q: f64) -> (f64, f64) {
    if gradient < RQTOL || !gradient.is_finite() {
        (RQTOL * q, RQTOL)
    } else {
        (magnitude * q.signum(), gradient)
    }
}

pub(crate) fn pipe_headloss(
    formula: HeadlossFormula,
    viscosity: f64,
    length: f64,
    diameter: f64,
    roughness: f64,
    minor_loss: f64,
    q: f64,
) -> (f64, f64) {
    let aq = q.abs();
    let (friction, gradient) = match formula {
        HeadlossFormula::HazenWilliams => {
            let r = 10.667 * roughness.powf(-1.852) * diameter.powf(-4.871) * length;
            (r * aq.powf(1.852), 1.852 * r * aq.powf(0.852))
        }
        HeadlossFormula::ChezyManning => {
            let r = 10.294 * roughness * roughness * length / diameter.powf(16.0 / 3.0);
            (r * aq * aq, 2.0 * r * aq)
        }
        HeadlossFormula::DarcyWeisbach => {
            let area = PI * diameter * diameter / 4.0;
            let reynolds = aq / area * diameter / viscosity;
            if reynolds < 2000.0 {
                // Hagen-Poiseuille
                let r = 128.0 * viscosity * length / (GRAVITY * PI * diameter.powi(4));
                (r * aq, r)
            } else {
                let f = swamee_jain(roughness, diameter, reynolds);
                let r = 8.0 * f * length / (GRAVITY * PI * PI * diameter.powi(5));
                (r * aq * aq, 2.0 * r * aq)
            }
        }
    };
    let m = minor_coefficient(minor_loss, diameter);
    clamp_gradient(friction + m * aq * aq, gradient + 2.0 * m * aq, q)
}

fn swamee_jain(roughness: f64, diameter: f64, reynolds: f64) -> f64 {
    let term = roughness / (3.7 * diameter) + 5.74 / reynolds.powf(0.9);
    0.25 / term.log10().powi(2)
}

/// 水泵的"水头损失"为负的扬程
pub(crate) fn pump_headloss(curve: &PumpCurve, speed: f64, q: f64) -> (f64, f64) {
    let (gain, gradient) = match curve {
        PumpCurve::Power {
            shutoff,
            coeff,
            exponent,
            ..
        } => {
            let r = coeff * speed.powf(2.0 - exponent);
            let aq = q.abs();
            (
                speed * speed * shutoff - r * aq.powf(*exponent) * q.signum(),
                exponent * r * aq.powf(exponent - 1.0),
            )
        }
        PumpCurve::Custom { points } => {
            let (head, slope) = interpolate(points, q / speed);
            (speed * speed * head, -speed * slope)
        }
        PumpCurve::ConstantPower { watts } => {
            let qp = q.abs().max(1e-4);
            let gain = watts / (SPECIFIC_WEIGHT * qp);
            (gain, gain / qp)
        }
    };
    let gradient = if gradient < RQTOL || !gradient.is_finite() {
        RQTOL
    } else {
        gradient
    };
    (-gain, gradient)
}

/// 求解 `A·x = b`，失败或出现非有限值时返回 None
fn solve_linear(a: &CooMatrix<f64>, b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 {
        return Some(Vec::new());
    }
    let csc = CscMatrix::from(a);
    let rhs = DMatrix::from_column_slice(n, 1, b);
    let solution: Vec<f64> = match CscCholesky::factor(&csc) {
        Ok(chol) => chol.solve(&rhs).column(0).iter().copied().collect(),
        Err(e) if n <= DENSE_FALLBACK_LIMIT => {
            debug!(unknowns = n, error = ?e, "Sparse Cholesky failed, falling back to dense LU");
            DMatrix::from(&csc).lu().solve(&rhs)?.column(0).iter().copied().collect()
        }
        Err(e) => {
            debug!(unknowns = n, error = ?e, "Sparse Cholesky failed");
            return None;
        }
    };
    solution.iter().all(|v| v.is_finite()).then_some(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::inp::parse;

    fn hw_headloss(c: f64, d: f64, l: f64, q: f64) -> f64 {
        10.667 * c.powf(-1.852) * d.powf(-4.871) * l * q.powf(1.852)
    }

    #[test]
    fn test_single_pipe_matches_hazen_williams() {
        let model = parse(
            "[JUNCTIONS]\nJ1 50 20\n[RESERVOIRS]\nR1 100\n[PIPES]\nP1 R1 J1 1000 300 130\n[OPTIONS]\nUNITS LPS\n",
        )
        .unwrap();
        let mut solver = HydraulicSolver::new(&model);
        let fixed = vec![0.0, 100.0];
        let demands = vec![0.020, 0.0];
        let state = solver.solve(0, &fixed, &demands).unwrap();

        let expected = 100.0 - hw_headloss(130.0, 0.3, 1000.0, 0.020);
        assert!((state.heads[0] - expected).abs() < 1e-3, "head {} vs {}", state.heads[0], expected);
        assert!((state.flows[0] - 0.020).abs() < 1e-6);
        // 水库净流入为负（向管网供水）
        assert!((state.demands[1] + 0.020).abs() < 1e-6);
    }

    #[test]
    fn test_parallel_pipes_split_flow() {
        let model = parse(
            "[JUNCTIONS]\nJ1 0 30\n[RESERVOIRS]\nR1 50\n[PIPES]\nA R1 J1 500 200 120\nB R1 J1 500 200 120\n[OPTIONS]\nUNITS LPS\n",
        )
        .unwrap();
        let mut solver = HydraulicSolver::new(&model);
        let state = solver.solve(0, &[0.0, 50.0], &[0.030, 0.0]).unwrap();
        assert!((state.flows[0] - 0.015).abs() < 1e-6);
        assert!((state.flows[1] - 0.015).abs() < 1e-6);
    }

    #[test]
    fn test_check_valve_blocks_reverse_flow() {
        // J1 由 R1 供水；CV 管段从 J1 指向高位水库 R2，应当关闭
        let model = parse(
            "[JUNCTIONS]\nJ1 0 10\n[RESERVOIRS]\nR1 50\nR2 80\n[PIPES]\nP1 R1 J1 500 200 120\nP2 J1 R2 500 200 120 CV\n[OPTIONS]\nUNITS LPS\n",
        )
        .unwrap();
        let mut solver = HydraulicSolver::new(&model);
        let state = solver.solve(0, &[0.0, 50.0, 80.0], &[0.010, 0.0, 0.0]).unwrap();
        assert!(state.flows[1].abs() < 1e-5, "cv flow {}", state.flows[1]);
        assert!((state.flows[0] - 0.010).abs() < 1e-5);
    }

    #[test]
    fn test_pump_lifts_water() {
        let model = parse(
            "[JUNCTIONS]\nJ1 0 20\n[RESERVOIRS]\nR1 0\n[PUMPS]\nPU R1 J1 HEAD C1\n[CURVES]\nC1 20 40\n[OPTIONS]\nUNITS LPS\n",
        )
        .unwrap();
        let mut solver = HydraulicSolver::new(&model);
        let state = solver.solve(0, &[0.0, 0.0], &[0.020, 0.0]).unwrap();
        // 设计点：20 L/s 时扬程 40 m
        assert!((state.heads[0] - 40.0).abs() < 1e-2, "head {}", state.heads[0]);
    }

    #[test]
    fn test_darcy_weisbach_headloss_increases_with_flow() {
        let (h1, g1) = pipe_headloss(HeadlossFormula::DarcyWeisbach, 1e-6, 100.0, 0.1, 0.0001, 0.0, 0.01);
        let (h2, _) = pipe_headloss(HeadlossFormula::DarcyWeisbach, 1e-6, 100.0, 0.1, 0.0001, 0.0, 0.02);
        assert!(h1 > 0.0 && h2 > h1 && g1 > 0.0);
        let (h_rev, _) = pipe_headloss(HeadlossFormula::DarcyWeisbach, 1e-6, 100.0, 0.1, 0.0001, 0.0, -0.01);
        assert!((h_rev + h1).abs() < 1e-12);
    }

    #[test]
    fn test_zero_flow_gradient_is_clamped() {
        let (h, g) = pipe_headloss(HeadlossFormula::HazenWilliams, 1e-6, 100.0, 0.1, 100.0, 0.0, 0.0);
        assert_eq!(h, 0.0);
        assert_eq!(g, RQTOL);
    }

    #[test]
    fn test_long_chain_beyond_dense_limit() {
        let count = 2_000;
        assert!(count > DENSE_FALLBACK_LIMIT);
        let mut text = String::from("[OPTIONS]\nUNITS LPS\n[RESERVOIRS]\nR1 100\n[JUNCTIONS]\n");
        for i in 0..count {
            text.push_str(&format!("J{} 0 0.01\n", i));
        }
        text.push_str("[PIPES]\n");
        for i in 0..count {
            let from = if i == 0 { "R1".to_string() } else { format!("J{}", i - 1) };
            text.push_str(&format!("P{} {} J{} 100 300 130\n", i, from, i));
        }
        let model = parse(&text).unwrap();

        let mut fixed = vec![0.0; count + 1];
        fixed[count] = 100.0;
        let mut demands = vec![0.01e-3; count + 1];
        demands[count] = 0.0;

        let mut solver = HydraulicSolver::new(&model);
        let state = solver.solve(0, &fixed, &demands).unwrap();

        // 第 i 根管段输送下游全部需水量
        assert!((state.flows[0] - count as f64 * 1e-5).abs() < 1e-7);
        assert!((state.flows[count - 1] - 1e-5).abs() < 1e-7);
        assert!(state.heads[..count].windows(2).all(|w| w[0] >= w[1]));
        assert!(state.heads[count - 1] > 0.0 && state.heads[0] < 100.0);
    }

    #[test]
    fn test_solve_linear_sums_duplicate_entries() {
        let mut a = CooMatrix::new(2, 2);
        a.push(0, 0, 1.0);
        a.push(0, 0, 1.0);
        a.push(1, 1, 4.0);
        a.push(0, 1, -1.0);
        a.push(1, 0, -1.0);
        let x = solve_linear(&a, &[1.0, 3.0]).unwrap();
        // [[2, -1], [-1, 4]] · [1, 1] = [1, 3]
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
        assert_eq!(solve_linear(&CooMatrix::new(0, 0), &[]), Some(Vec::new()));
    }
}
