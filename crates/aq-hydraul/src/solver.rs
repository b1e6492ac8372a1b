//! Single-period gradient-method solution.
//!
//! Iterates: assemble coefficients, solve the junction-head system, correct
//! flows, run the valve and link status machines, until the relative flow
//! change (plus the optional head-error and flow-change limits) converges or
//! the trial limit is reached.

use aq_core::{CBIG, MISSING, Warn};
use aq_network::{DemandModel, LinkKind, LinkStatus, Network, PumpKind};

use crate::coeffs::{LinkCoeff, emitter_coeff, link_coeff, pda_coeff};
use crate::error::HydResult;
use crate::matrix::{OffDiag, solve_system};
use crate::state::HydState;
use crate::{HTOL, QTOL};

/// Result of one period's solution.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolveOutcome {
    pub iterations: usize,
    pub relative_error: f64,
    pub max_head_error: f64,
    pub max_flow_change: f64,
    pub converged: bool,
    pub warning: Option<Warn>,
}

pub fn net_solve(net: &Network, st: &mut HydState) -> HydResult<SolveOutcome> {
    let njuncs = net.n_juncs();
    let nlinks = net.n_links();
    let opt = &net.options;
    let mut outcome = SolveOutcome::default();

    let mut coeffs: Vec<LinkCoeff> = vec![LinkCoeff::Normal { p: 0.0, y: 0.0 }; nlinks];
    let mut status_changed_late = false;

    for iter in 1..=opt.trials.max(1) {
        outcome.iterations = iter;

        // --- per-link linearization ---
        for (k, c) in coeffs.iter_mut().enumerate() {
            *c = link_coeff(net, k, st);
        }

        // --- nodal flow excess X ---
        let mut x = vec![0.0; net.n_nodes()];
        for (k, link) in net.links().iter().enumerate() {
            let (n1, n2) = (link.n1().index(), link.n2().index());
            match coeffs[k] {
                LinkCoeff::Normal { .. } => {
                    x[n1] -= st.flow[k];
                    x[n2] += st.flow[k];
                }
                LinkCoeff::FcvActive => {
                    x[n1] -= st.setting[k];
                    x[n2] += st.setting[k];
                }
                // active pressure valves balance their nodes via special rows
                LinkCoeff::PrvActive | LinkCoeff::PsvActive => {}
            }
        }

        let mut aii = vec![0.0; njuncs];
        let mut f = vec![0.0; njuncs];
        let mut aij: Vec<OffDiag> = Vec::with_capacity(nlinks);

        // --- demands, PDA and emitter pseudo-links ---
        let pda = opt.demand_model == DemandModel::Pda;
        for i in 0..njuncs {
            let node = &net.nodes()[i];
            let required = st.demand_required[i];
            if pda && required > 0.0 {
                x[i] -= st.demand_flow[i];
                let (p, y) = pda_coeff(required, opt.pmin, opt.preq, opt.pexp, st.demand_flow[i]);
                aii[i] += p;
                f[i] += y + p * node.elevation;
            } else {
                x[i] -= required;
            }
            if node.emitter > 0.0 {
                x[i] -= st.emitter_flow[i];
                let (p, y) = emitter_coeff(node.emitter, opt.emit_expon, st.emitter_flow[i]);
                aii[i] += p;
                f[i] += y + p * node.elevation;
            }
        }

        // --- ordinary link contributions ---
        for (k, link) in net.links().iter().enumerate() {
            let LinkCoeff::Normal { p, y } = coeffs[k] else {
                continue;
            };
            let (n1, n2) = (link.n1().index(), link.n2().index());
            let j1 = n1 < njuncs;
            let j2 = n2 < njuncs;
            if j1 {
                aii[n1] += p;
                f[n1] += y;
                if !j2 {
                    f[n1] += p * st.head[n2];
                }
            }
            if j2 {
                aii[n2] += p;
                f[n2] -= y;
                if !j1 {
                    f[n2] += p * st.head[n1];
                }
            }
            if j1 && j2 {
                aij.push(OffDiag {
                    row: n1,
                    col: n2,
                    value: -p,
                });
            }
        }

        // --- nodal excess into the RHS ---
        for i in 0..njuncs {
            f[i] += x[i];
        }

        // --- active pressure-valve rows ---
        let mut y_special = vec![0.0; nlinks];
        for (k, link) in net.links().iter().enumerate() {
            let (n1, n2) = (link.n1().index(), link.n2().index());
            match coeffs[k] {
                LinkCoeff::PrvActive => {
                    let hset = net.nodes()[n2].elevation + st.setting[k];
                    y_special[k] = st.flow[k] + x[n2];
                    f[n2] += hset * CBIG;
                    aii[n2] += CBIG;
                    if x[n2] < 0.0 && n1 < njuncs {
                        f[n1] += x[n2];
                    }
                }
                LinkCoeff::PsvActive => {
                    let hset = net.nodes()[n1].elevation + st.setting[k];
                    y_special[k] = st.flow[k] - x[n1];
                    f[n1] += hset * CBIG;
                    aii[n1] += CBIG;
                    if x[n1] > 0.0 && n2 < njuncs {
                        f[n2] += x[n1];
                    }
                }
                _ => {}
            }
        }

        // --- opaque linear solve for junction heads ---
        let heads = solve_system(&aii, &aij, &f)?;
        st.head[..njuncs].copy_from_slice(&heads);

        // --- flow corrections ---
        let mut dq_sum = 0.0;
        let mut q_sum = 0.0;
        outcome.max_head_error = 0.0;
        outcome.max_flow_change = 0.0;
        for (k, link) in net.links().iter().enumerate() {
            let (n1, n2) = (link.n1().index(), link.n2().index());
            let dq = match coeffs[k] {
                LinkCoeff::Normal { p, y } => {
                    let dh = st.head[n1] - st.head[n2];
                    let dq = y - p * dh;
                    outcome.max_head_error = outcome.max_head_error.max((dq / p).abs());
                    dq
                }
                LinkCoeff::FcvActive => st.flow[k] - st.setting[k],
                LinkCoeff::PrvActive | LinkCoeff::PsvActive => y_special[k],
            };
            st.flow[k] -= dq;
            if link.kind == LinkKind::Pump && st.flow[k] < 0.0 {
                st.flow[k] = 0.0;
            }
            dq_sum += dq.abs();
            q_sum += st.flow[k].abs();
            outcome.max_flow_change = outcome.max_flow_change.max(dq.abs());
        }

        // --- emitter and PDA flow corrections ---
        for i in 0..njuncs {
            let node = &net.nodes()[i];
            if node.emitter > 0.0 {
                let (p, y) = emitter_coeff(node.emitter, opt.emit_expon, st.emitter_flow[i]);
                let dq = y - p * (st.head[i] - node.elevation);
                st.emitter_flow[i] -= dq;
            }
            if pda && st.demand_required[i] > 0.0 {
                let (p, y) = pda_coeff(
                    st.demand_required[i],
                    opt.pmin,
                    opt.preq,
                    opt.pexp,
                    st.demand_flow[i],
                );
                let dq = y - p * (st.head[i] - node.elevation);
                st.demand_flow[i] = (st.demand_flow[i] - dq).clamp(0.0, st.demand_required[i]);
            }
        }

        outcome.relative_error = if q_sum > QTOL { dq_sum / q_sum } else { 0.0 };

        let mut converged = outcome.relative_error <= opt.accuracy;
        if opt.head_error > 0.0 && outcome.max_head_error > opt.head_error {
            converged = false;
        }
        if opt.flow_change > 0.0 && outcome.max_flow_change > opt.flow_change {
            converged = false;
        }

        // control-valve state machines run every trial
        let valve_change = valve_status(net, st);

        if converged {
            let link_change = link_status(net, st);
            if !valve_change && !link_change {
                outcome.converged = true;
                break;
            }
            status_changed_late = true;
            tracing::debug!(iter, "status change after convergence, re-iterating");
        } else if iter <= opt.max_check && iter % opt.check_freq == 0 {
            link_status(net, st);
        }
    }

    if !outcome.converged {
        outcome.warning = Warn::max(outcome.warning, Some(Warn::Unbalanced));
    } else if status_changed_late && outcome.iterations >= opt.trials {
        outcome.warning = Warn::max(outcome.warning, Some(Warn::Unstable));
    }

    // delivered demands for reporting and the hydraulics file
    for i in 0..net.n_nodes() {
        if i < njuncs {
            let consumed = if pda_active(net, st, i) {
                st.demand_flow[i]
            } else {
                st.demand_required[i]
            };
            st.demand[i] = consumed + st.emitter_flow[i];
        } else {
            // tanks consume their net inflow (negative when supplying)
            let mut inflow = 0.0;
            for (k, link) in net.links().iter().enumerate() {
                if link.n2().index() == i {
                    inflow += st.flow[k];
                }
                if link.n1().index() == i {
                    inflow -= st.flow[k];
                }
            }
            st.demand[i] = inflow;
        }
    }

    post_warnings(net, st, &mut outcome);
    Ok(outcome)
}

fn pda_active(net: &Network, st: &HydState, i: usize) -> bool {
    net.options.demand_model == DemandModel::Pda && st.demand_required[i] > 0.0
}

fn post_warnings(net: &Network, st: &HydState, outcome: &mut SolveOutcome) {
    let njuncs = net.n_juncs();
    if net.options.demand_model == DemandModel::Dda {
        for i in 0..njuncs {
            if st.demand_required[i] > 0.0 && st.head[i] < net.nodes()[i].elevation {
                outcome.warning = Warn::max(outcome.warning, Some(Warn::NegativePressures));
                break;
            }
        }
    }
    for i in 0..njuncs {
        if st.head[i].abs() > 1.0e7 {
            outcome.warning = Warn::max(outcome.warning, Some(Warn::Disconnected));
            break;
        }
    }
    for (k, link) in net.links().iter().enumerate() {
        match (link.kind, st.status[k]) {
            (LinkKind::Pump, LinkStatus::XHead | LinkStatus::XFlow) => {
                outcome.warning = Warn::max(outcome.warning, Some(Warn::PumpLimited));
            }
            (_, LinkStatus::XFcv | LinkStatus::XPressure) => {
                outcome.warning = Warn::max(outcome.warning, Some(Warn::ValveLimited));
            }
            _ => {}
        }
    }
}

/// PRV/PSV/FCV state machines; run every trial.
fn valve_status(net: &Network, st: &mut HydState) -> bool {
    let mut changed = false;
    for (k, link) in net.links().iter().enumerate() {
        let setting = st.setting[k];
        if setting == MISSING {
            continue;
        }
        let (n1, n2) = (link.n1().index(), link.n2().index());
        let (h1, h2) = (st.head[n1], st.head[n2]);
        let q = st.flow[k];
        let old = st.status[k];
        let new = match link.kind {
            LinkKind::Prv => {
                let hset = net.nodes()[n2].elevation + setting;
                prv_next(old, h1, h2, q, hset)
            }
            LinkKind::Psv => {
                let hset = net.nodes()[n1].elevation + setting;
                psv_next(old, h1, h2, q, hset)
            }
            LinkKind::Fcv => fcv_next(old, h1, h2, q, setting),
            _ => continue,
        };
        if new != old {
            st.status[k] = new;
            changed = true;
            tracing::debug!(link = %link.id(), ?old, ?new, "valve status change");
        }
    }
    changed
}

fn prv_next(old: LinkStatus, h1: f64, h2: f64, q: f64, hset: f64) -> LinkStatus {
    match old {
        LinkStatus::Active => {
            if q < -QTOL {
                LinkStatus::Closed
            } else if h1 < hset - HTOL {
                LinkStatus::Open
            } else {
                LinkStatus::Active
            }
        }
        LinkStatus::Open => {
            if q < -QTOL {
                LinkStatus::Closed
            } else if h2 >= hset + HTOL {
                LinkStatus::Active
            } else {
                LinkStatus::Open
            }
        }
        LinkStatus::Closed => {
            if h1 >= hset + HTOL && h2 < hset - HTOL {
                LinkStatus::Active
            } else if h1 < hset - HTOL && h1 > h2 + HTOL {
                LinkStatus::Open
            } else {
                LinkStatus::Closed
            }
        }
        other => other,
    }
}

fn psv_next(old: LinkStatus, h1: f64, h2: f64, q: f64, hset: f64) -> LinkStatus {
    match old {
        LinkStatus::Active => {
            if q < -QTOL {
                LinkStatus::Closed
            } else if h2 > hset + HTOL {
                LinkStatus::Open
            } else {
                LinkStatus::Active
            }
        }
        LinkStatus::Open => {
            if q < -QTOL {
                LinkStatus::Closed
            } else if h1 <= hset - HTOL {
                LinkStatus::Active
            } else {
                LinkStatus::Open
            }
        }
        LinkStatus::Closed => {
            if h2 <= hset - HTOL && h1 > hset + HTOL {
                LinkStatus::Active
            } else if h2 > hset + HTOL && h1 > h2 + HTOL {
                LinkStatus::Open
            } else {
                LinkStatus::Closed
            }
        }
        other => other,
    }
}

fn fcv_next(old: LinkStatus, h1: f64, h2: f64, q: f64, setting: f64) -> LinkStatus {
    if h1 - h2 < -HTOL || q < -QTOL {
        LinkStatus::XFcv
    } else if old == LinkStatus::XFcv && q >= setting - QTOL {
        LinkStatus::Active
    } else {
        old
    }
}

/// Check valves, pumps and tank-limit closures; run at the check frequency
/// and on convergence.
fn link_status(net: &Network, st: &mut HydState) -> bool {
    let mut changed = false;
    for (k, link) in net.links().iter().enumerate() {
        let (n1, n2) = (link.n1().index(), link.n2().index());
        let old = st.status[k];
        let mut new = old;

        match link.kind {
            LinkKind::CvPipe => {
                let dh = st.head[n1] - st.head[n2];
                new = if dh < -HTOL || st.flow[k] < -QTOL {
                    LinkStatus::Closed
                } else {
                    LinkStatus::Open
                };
            }
            LinkKind::Pump => {
                if matches!(old, LinkStatus::Open | LinkStatus::XHead | LinkStatus::XFlow) {
                    let p = net
                        .pump_index(aq_core::Idx::from_index(k))
                        .expect("pump record");
                    let pump = &net.pumps[p];
                    let w = st.setting[k];
                    if pump.kind != PumpKind::ConstHp && w > 0.0 {
                        let hmax = w * w * pump.hmax;
                        let dh = st.head[n2] - st.head[n1];
                        if dh > hmax + HTOL {
                            new = LinkStatus::XHead;
                        } else if st.flow[k] > w * pump.qmax + QTOL {
                            new = LinkStatus::XFlow;
                        } else {
                            new = LinkStatus::Open;
                        }
                    }
                }
            }
            _ => {}
        }

        // tank-limit closures apply to any link at a full or empty tank
        if matches!(new, LinkStatus::Open | LinkStatus::TempClosed) {
            new = tank_limited(net, st, k, n1, n2, new);
        }

        if new != old {
            st.status[k] = new;
            changed = true;
            tracing::debug!(link = %link.id(), ?old, ?new, "link status change");
        }
    }
    changed
}

fn tank_limited(
    net: &Network,
    st: &HydState,
    k: usize,
    n1: usize,
    n2: usize,
    current: LinkStatus,
) -> LinkStatus {
    let mut blocked = false;
    for (node, into_tank_sign) in [(n2, 1.0), (n1, -1.0)] {
        let idx = aq_core::Idx::from_index(node);
        let Some(t) = net.tank_index(idx) else {
            continue;
        };
        let tank = &net.tanks[t];
        if tank.is_reservoir() {
            continue;
        }
        let h = st.head[node];
        let q_into = st.flow[k] * into_tank_sign;
        if h >= tank.hmax - HTOL && q_into > QTOL {
            blocked = true;
        }
        if h <= tank.hmin + HTOL && q_into < -QTOL {
            blocked = true;
        }
    }
    if blocked {
        LinkStatus::TempClosed
    } else if current == LinkStatus::TempClosed {
        LinkStatus::Open
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_network::NodeKind;
    use crate::resist::set_all_resistances;

    /// Reservoir at 100 ft feeding one junction (demand 1 cfs) through a
    /// short fat pipe; junction head should sit just below 100.
    #[test]
    fn single_pipe_network_converges() {
        let mut net = Network::new();
        let j = net.add_node("J1", NodeKind::Junction).unwrap();
        let r = net.add_node("R1", NodeKind::Reservoir).unwrap();
        let p = net.add_link("P1", LinkKind::Pipe, r, j).unwrap();
        {
            let link = net.link_mut(p).unwrap();
            link.length = 100.0;
            link.diameter = 1.0;
            link.kc = 130.0;
        }
        set_all_resistances(&mut net);

        let mut st = HydState::sized_for(&net);
        st.head[r.index()] = 100.0;
        st.head[j.index()] = 100.0;
        st.demand_required[j.index()] = 1.0;
        st.flow[0] = 1.0;
        st.setting[0] = MISSING;

        let outcome = net_solve(&net, &mut st).unwrap();
        assert!(outcome.converged, "relerr = {}", outcome.relative_error);
        assert!((st.flow[0] - 1.0).abs() < 1e-6);
        assert!(st.head[j.index()] < 100.0);
        assert!(st.head[j.index()] > 99.0);
        // delivered demand equals the requirement under DDA
        assert!((st.demand[j.index()] - 1.0).abs() < 1e-9);
        // the reservoir supplies 1 cfs
        assert!((st.demand[r.index()] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn check_valve_blocks_reverse_flow() {
        let mut net = Network::new();
        let j = net.add_node("J1", NodeKind::Junction).unwrap();
        let r = net.add_node("R1", NodeKind::Reservoir).unwrap();
        // CV oriented from the junction toward the reservoir; the reservoir
        // is higher, so flow would have to run backwards through the CV
        let p = net.add_link("P1", LinkKind::CvPipe, j, r).unwrap();
        {
            let link = net.link_mut(p).unwrap();
            link.length = 100.0;
            link.diameter = 1.0;
            link.kc = 130.0;
        }
        set_all_resistances(&mut net);

        let mut st = HydState::sized_for(&net);
        st.head[r.index()] = 100.0;
        st.head[j.index()] = 50.0;
        st.demand_required[j.index()] = 0.5;
        st.flow[0] = 0.5;
        st.setting[0] = MISSING;

        let outcome = net_solve(&net, &mut st).unwrap();
        assert_eq!(st.status[0], LinkStatus::Closed);
        // the demand node is cut off, so its head collapses and the run
        // carries a warning
        assert!(st.head[j.index()] < -1.0e6);
        assert!(outcome.warning.is_some());
    }

    #[test]
    fn pda_delivers_quarter_demand_at_quarter_pressure() {
        // driving pressure 5 ft vs required 20 ft with exponent 1
        let mut net = Network::new();
        let j = net.add_node("J1", NodeKind::Junction).unwrap();
        let r = net.add_node("R1", NodeKind::Reservoir).unwrap();
        let p = net.add_link("P1", LinkKind::Pipe, r, j).unwrap();
        {
            let link = net.link_mut(p).unwrap();
            // essentially frictionless pipe
            link.length = 1.0;
            link.diameter = 10.0;
            link.kc = 140.0;
        }
        net.node_mut(j).unwrap().elevation = 95.0;
        net.options.demand_model = DemandModel::Pda;
        net.options.pmin = 0.0;
        net.options.preq = 20.0;
        net.options.pexp = 1.0;
        set_all_resistances(&mut net);

        let mut st = HydState::sized_for(&net);
        st.head[r.index()] = 100.0; // 5 ft above the junction elevation
        st.head[j.index()] = 100.0;
        st.demand_required[j.index()] = 2.0;
        st.demand_flow[j.index()] = 1.0;
        st.flow[0] = 1.0;
        st.setting[0] = MISSING;

        net_solve(&net, &mut st).unwrap();
        let delivered = st.demand[j.index()];
        assert!(
            (delivered - 0.5).abs() < 5e-3,
            "delivered = {delivered}, head = {}",
            st.head[j.index()]
        );
    }
}
