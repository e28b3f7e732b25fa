//! 延时模拟
//!
//! 在每个水力时刻求解一次稳态，随后按净流入量推进水池水位。

use std::f64::consts::PI;
use std::time::Instant;
use tracing::{debug, info};

use super::error::{EngineError, EngineResult};
use super::model::{LinkKind, NetworkModel, NodeKind, ValveType};
use super::results::ResultsTable;
use super::solver::{HydraulicSolver, HydraulicState};

/// 运行完整的延时模拟，返回所有报告时刻的结果
pub fn run(model: &NetworkModel) -> EngineResult<ResultsTable> {
    check_supported(model)?;
    model.check_limits()?;

    let started = Instant::now();
    let mut times = model.hydraulic_times().peekable();
    let mut steps = 0u64;
    let mut solver = HydraulicSolver::new(model);
    let mut levels = initial_levels(model);
    let mut table = ResultsTable::new(
        model.nodes.iter().map(|n| n.id.clone()).collect(),
        model.links.iter().map(|l| l.id.clone()).collect(),
    );

    while let Some(time) = times.next() {
        steps += 1;
        let fixed_heads = fixed_heads(model, &levels, time);
        let demands: Vec<f64> = model
            .nodes
            .iter()
            .map(|n| model.junction_demand(n, time))
            .collect();

        let state = solver.solve(time, &fixed_heads, &demands)?;
        debug!(time, iterations = state.iterations, "Time step solved");

        if model.is_report_time(time) {
            record(model, &mut table, time, &state, &levels);
        }

        if let Some(&next) = times.peek() {
            advance_tanks(model, &mut levels, &state, (next - time) as f64);
        }
    }

    info!(
        steps,
        reported = table.times.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Simulation completed"
    );
    Ok(table)
}

fn check_supported(model: &NetworkModel) -> EngineResult<()> {
    for link in &model.links {
        if let LinkKind::Valve { valve_type, .. } = &link.kind {
            if *valve_type != ValveType::Tcv {
                return Err(EngineError::Unsupported(format!(
                    "valve {} of type {:?} (only TCV valves are simulated)",
                    link.id, valve_type
                )));
            }
        }
    }
    Ok(())
}

/// 水池当前水位（其余节点为 0）
fn initial_levels(model: &NetworkModel) -> Vec<f64> {
    model
        .nodes
        .iter()
        .map(|n| match n.kind {
            NodeKind::Tank { init_level, .. } => init_level,
            _ => 0.0,
        })
        .collect()
}

fn fixed_heads(model: &NetworkModel, levels: &[f64], time: u64) -> Vec<f64> {
    model
        .nodes
        .iter()
        .zip(levels)
        .map(|(node, level)| match node.kind {
            NodeKind::Junction { .. } => node.elevation,
            NodeKind::Reservoir { head_pattern } => {
                let factor = head_pattern
                    .map(|p| model.pattern_factor(p, time))
                    .unwrap_or(1.0);
                node.elevation * factor
            }
            NodeKind::Tank { .. } => node.elevation + level,
        })
        .collect()
}

fn record(
    model: &NetworkModel,
    table: &mut ResultsTable,
    time: u64,
    state: &HydraulicState,
    levels: &[f64],
) {
    table.times.push(time);

    let pressure = model
        .nodes
        .iter()
        .enumerate()
        .map(|(i, node)| match node.kind {
            NodeKind::Junction { .. } => state.heads[i] - node.elevation,
            NodeKind::Reservoir { .. } => 0.0,
            NodeKind::Tank { .. } => levels[i],
        })
        .collect();
    table.pressure.push(pressure);
    table.head.push(state.heads.clone());
    table.demand.push(state.demands.clone());

    let velocity = model
        .links
        .iter()
        .zip(&state.flows)
        .map(|(link, q)| match link.kind {
            LinkKind::Pipe { diameter, .. } | LinkKind::Valve { diameter, .. } => {
                q.abs() / (PI * diameter * diameter / 4.0)
            }
            LinkKind::Pump { .. } => 0.0,
        })
        .collect();
    let headloss = model
        .links
        .iter()
        .map(|link| state.heads[link.from] - state.heads[link.to])
        .collect();
    table.flowrate.push(state.flows.clone());
    table.velocity.push(velocity);
    table.headloss.push(headloss);
}

fn advance_tanks(model: &NetworkModel, levels: &mut [f64], state: &HydraulicState, dt: f64) {
    for (i, node) in model.nodes.iter().enumerate() {
        if let NodeKind::Tank {
            min_level,
            max_level,
            diameter,
            ..
        } = node.kind
        {
            let area = PI * diameter * diameter / 4.0;
            let level = levels[i] + state.demands[i] * dt / area;
            levels[i] = level.clamp(min_level, max_level);
        }
    }
}
