//! Per-link linearization coefficients.
//!
//! For every link the solver needs `P` (inverse headloss gradient) and `Y`
//! (flow-correction term, `P * headloss` signed with the flow). Active
//! pressure/flow control valves replace the energy equation with special
//! matrix rows and are flagged instead.

use aq_core::units::HeadlossModel;
use aq_core::{CBIG, CSMALL, MISSING};
use aq_network::{Link, LinkKind, LinkStatus, Network, Pump, PumpKind};

use crate::resist::friction_factor;
use crate::state::HydState;
use crate::{HW_EXP, RQTOL};

const TINY: f64 = 1e-6;

/// Linearized link behavior for one iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkCoeff {
    /// Ordinary element with conductance `p` and correction `y`.
    Normal { p: f64, y: f64 },
    /// PRV holding its downstream node at a fixed grade.
    PrvActive,
    /// PSV holding its upstream node at a fixed grade.
    PsvActive,
    /// FCV forcing its flow to the valve setting.
    FcvActive,
}

fn sgn(v: f64) -> f64 {
    if v < 0.0 { -1.0 } else { 1.0 }
}

fn closed(flow: f64) -> LinkCoeff {
    // linear element with resistance CBIG: hloss = q * CBIG
    LinkCoeff::Normal {
        p: 1.0 / CBIG,
        y: flow,
    }
}

/// Compute the coefficient for link `k` at the current iterate.
pub fn link_coeff(net: &Network, k: usize, st: &HydState) -> LinkCoeff {
    let link = &net.links()[k];
    let status = st.status[k];
    let flow = st.flow[k];
    let setting = st.setting[k];
    match link.kind {
        LinkKind::Pipe | LinkKind::CvPipe => pipe_coeff(net, link, status, flow),
        LinkKind::Pump => {
            let p = net.pump_index(aq_core::Idx::from_index(k)).expect("pump record");
            pump_coeff(net, &net.pumps[p], link, status, flow, setting)
        }
        LinkKind::Prv => {
            if status == LinkStatus::Active && setting != MISSING {
                LinkCoeff::PrvActive
            } else {
                valve_coeff(link, status, flow, link.km)
            }
        }
        LinkKind::Psv => {
            if status == LinkStatus::Active && setting != MISSING {
                LinkCoeff::PsvActive
            } else {
                valve_coeff(link, status, flow, link.km)
            }
        }
        LinkKind::Fcv => {
            if status == LinkStatus::Active && setting != MISSING {
                LinkCoeff::FcvActive
            } else {
                valve_coeff(link, status, flow, link.km)
            }
        }
        LinkKind::Pbv => pbv_coeff(link, status, flow, setting),
        LinkKind::Tcv => tcv_coeff(link, status, flow, setting),
        LinkKind::Gpv => gpv_coeff(net, link, status, flow),
    }
}

fn pipe_coeff(net: &Network, link: &Link, status: LinkStatus, flow: f64) -> LinkCoeff {
    if !status.is_open() {
        return closed(flow);
    }
    let q = flow.abs();
    let (r, hexp) = match net.options.headloss {
        HeadlossModel::HazenWilliams => (link.resistance, HW_EXP),
        HeadlossModel::DarcyWeisbach => {
            let re = 4.0 * q / (std::f64::consts::PI * link.diameter * net.options.viscos);
            let f = friction_factor(re, link.kc / link.diameter);
            (f * link.resistance, 2.0)
        }
        HeadlossModel::ChezyManning => (link.resistance, 2.0),
    };

    let mut hgrad = hexp * r * q.powf(hexp - 1.0);
    let mut hloss;
    if hgrad < RQTOL {
        hgrad = RQTOL;
        hloss = q * hgrad;
    } else {
        hloss = hgrad * q / hexp;
    }
    if link.km > 0.0 {
        hloss += link.km * q * q;
        hgrad += 2.0 * link.km * q;
    }
    let p = 1.0 / hgrad;
    LinkCoeff::Normal {
        p,
        y: sgn(flow) * hloss * p,
    }
}

fn pump_coeff(
    net: &Network,
    pump: &Pump,
    link: &Link,
    status: LinkStatus,
    flow: f64,
    speed: f64,
) -> LinkCoeff {
    if !status.is_open() || speed == 0.0 {
        return closed(flow);
    }
    let q = flow.abs().max(TINY);

    let (hgain, mut hgrad) = match pump.kind {
        PumpKind::ConstHp => {
            // fixed horsepower: h q = 8.814 hp
            let hp = link.kc;
            (8.814 * speed * hp / q, 8.814 * speed * hp / (q * q))
        }
        PumpKind::PowerFunc => {
            // evaluated at the actual flow even beyond the curve's design
            // range, so excess flow meets rising back-pressure
            let h0 = speed * speed * pump.h0;
            let n = pump.n;
            let r = pump.r * speed.powf(2.0 - n);
            (h0 - r * q.powf(n), n * r * q.powf(n - 1.0))
        }
        PumpKind::Custom | PumpKind::NoCurve => {
            let Some(curve) = pump.hcurve.and_then(|c| net.curve(c)) else {
                return closed(flow);
            };
            // local segment of the curve at the equivalent full-speed flow
            let qx = q / speed;
            let (a, b) = segment(curve, qx);
            let h = a + b * qx;
            (speed * speed * h, (-b * speed).max(0.0))
        }
    };
    if hgrad < RQTOL {
        hgrad = RQTOL;
    }
    let p = 1.0 / hgrad;
    LinkCoeff::Normal { p, y: -hgain * p }
}

/// Intercept and slope of the curve segment containing `x`.
fn segment(curve: &aq_network::Curve, x: f64) -> (f64, f64) {
    let n = curve.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    if n == 1 {
        return (curve.y[0], 0.0);
    }
    let mut hi = n - 1;
    for i in 1..n {
        if x <= curve.x[i] {
            hi = i;
            break;
        }
    }
    let lo = hi - 1;
    let dx = curve.x[hi] - curve.x[lo];
    if dx.abs() < f64::EPSILON {
        return (curve.y[hi], 0.0);
    }
    let b = (curve.y[hi] - curve.y[lo]) / dx;
    let a = curve.y[lo] - b * curve.x[lo];
    (a, b)
}

/// Minor-loss element: throttled valves and open/closed control valves.
fn valve_coeff(link: &Link, status: LinkStatus, flow: f64, km: f64) -> LinkCoeff {
    if !status.is_open() {
        return closed(flow);
    }
    if km > 0.0 {
        let q = flow.abs();
        let mut hgrad = 2.0 * km * q;
        let hloss;
        if hgrad < RQTOL {
            hgrad = RQTOL;
            hloss = q * hgrad;
        } else {
            hloss = hgrad * q / 2.0;
        }
        let p = 1.0 / hgrad;
        LinkCoeff::Normal {
            p,
            y: sgn(flow) * hloss * p,
        }
    } else {
        // frictionless open valve
        LinkCoeff::Normal {
            p: 1.0 / CSMALL,
            y: flow,
        }
    }
}

fn pbv_coeff(link: &Link, status: LinkStatus, flow: f64, setting: f64) -> LinkCoeff {
    if !status.is_open() {
        return closed(flow);
    }
    if setting == MISSING {
        return valve_coeff(link, status, flow, link.km);
    }
    // fixed headloss equal to the setting, in the direction of flow
    LinkCoeff::Normal {
        p: CBIG,
        y: sgn(flow) * setting * CBIG,
    }
}

fn tcv_coeff(link: &Link, status: LinkStatus, flow: f64, setting: f64) -> LinkCoeff {
    let km = if setting == MISSING {
        link.km
    } else {
        0.02517 * setting / link.diameter.powi(4)
    };
    valve_coeff(link, status, flow, km)
}

fn gpv_coeff(net: &Network, link: &Link, status: LinkStatus, flow: f64) -> LinkCoeff {
    if status == LinkStatus::Closed {
        return closed(flow);
    }
    // kc stores the 1-based position of the headloss curve
    let Some(curve) =
        aq_core::Idx::from_position(link.kc as i64).and_then(|c| net.curve(c))
    else {
        return closed(flow);
    };
    let q = flow.abs();
    let (a, b) = segment(curve, q);
    let hloss = (a + b * q).max(0.0);
    let hgrad = b.max(RQTOL);
    let p = 1.0 / hgrad;
    LinkCoeff::Normal {
        p,
        y: sgn(flow) * hloss * p,
    }
}

/// Emitter pseudo-link coefficient: flow = Ke * (pressure head)^qexp,
/// inverted to a headloss function of the emitter flow.
pub fn emitter_coeff(ke: f64, qexp: f64, emitter_flow: f64) -> (f64, f64) {
    let ke = ke.max(CSMALL);
    let q = emitter_flow.abs().max(TINY);
    let hloss = (q / ke).powf(1.0 / qexp);
    let hgrad = (hloss / (q * qexp)).max(RQTOL);
    let p = 1.0 / hgrad;
    (p, sgn(emitter_flow) * hloss * p)
}

/// Pressure-dependent demand pseudo-link: delivered demand rises from zero
/// at `pmin` to the full requirement at `preq`.
pub fn pda_coeff(
    required: f64,
    pmin: f64,
    preq: f64,
    pexp: f64,
    demand_flow: f64,
) -> (f64, f64) {
    let dmax = required.max(TINY);
    let dp = (preq - pmin).max(CSMALL);
    let q = demand_flow.clamp(TINY, dmax);
    let frac = q / dmax;
    let hloss = pmin + dp * frac.powf(1.0 / pexp);
    let hgrad = (dp * frac.powf(1.0 / pexp) / (q * pexp)).max(RQTOL);
    let p = 1.0 / hgrad;
    (p, hloss * p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_network::NodeKind;

    fn pipe_net() -> (Network, HydState) {
        let mut net = Network::new();
        let j = net.add_node("J1", NodeKind::Junction).unwrap();
        let r = net.add_node("R1", NodeKind::Reservoir).unwrap();
        let p = net.add_link("P1", aq_network::LinkKind::Pipe, r, j).unwrap();
        {
            let link = net.link_mut(p).unwrap();
            link.length = 1000.0;
            link.diameter = 1.0;
            link.kc = 100.0;
        }
        crate::resist::set_all_resistances(&mut net);
        let mut st = HydState::sized_for(&net);
        st.flow[0] = 1.0;
        (net, st)
    }

    #[test]
    fn pipe_coeff_matches_hand_calc() {
        let (net, st) = pipe_net();
        let LinkCoeff::Normal { p, y } = link_coeff(&net, 0, &st) else {
            panic!("expected a normal element");
        };
        let r = net.links()[0].resistance;
        // at q = 1 the gradient is n*r and the loss is r
        assert!((p - 1.0 / (HW_EXP * r)).abs() < 1e-9);
        assert!((y - r * p).abs() < 1e-9);
    }

    #[test]
    fn closed_link_is_high_resistance() {
        let (net, mut st) = pipe_net();
        st.status[0] = LinkStatus::Closed;
        let LinkCoeff::Normal { p, y } = link_coeff(&net, 0, &st) else {
            panic!("expected a normal element");
        };
        assert!((p - 1.0 / CBIG).abs() < 1e-20);
        assert_eq!(y, 0.0);
    }

    #[test]
    fn emitter_coeff_inverts_flow_relation() {
        // ke = 2, exponent 0.5: q = 2 sqrt(h); at q = 4, h = 4
        let (p, y) = emitter_coeff(2.0, 0.5, 4.0);
        let hloss = y / p;
        assert!((hloss - 4.0).abs() < 1e-9);
    }

    #[test]
    fn pda_full_demand_at_required_pressure() {
        // at full delivery the pseudo-loss equals preq
        let (p, y) = pda_coeff(2.0, 0.0, 20.0, 1.0, 2.0);
        assert!((y / p - 20.0).abs() < 1e-9);
    }
}
