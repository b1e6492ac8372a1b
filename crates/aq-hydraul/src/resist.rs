//! Link flow-resistance coefficients.
//!
//! Recomputed whenever a pipe's diameter, length or roughness changes, and
//! for the whole network when the solver opens.

use aq_core::units::HeadlossModel;
use aq_core::LinkIdx;
use aq_network::{LinkKind, Network};

/// Unit constant of the Darcy-Weisbach formula, 8/(pi^2 g).
pub const DW_CONST: f64 = 0.025173;
/// Unit constant of the Chezy-Manning formula.
pub const CM_CONST: f64 = 4.66;

/// Store the resistance coefficient for one link.
pub fn set_link_resistance(net: &mut Network, idx: LinkIdx) {
    let model = net.options.headloss;
    let Some(link) = net.link_mut(idx) else {
        return;
    };
    link.resistance = match link.kind {
        LinkKind::Pipe | LinkKind::CvPipe => {
            let d = link.diameter;
            let len = link.length;
            match model {
                HeadlossModel::HazenWilliams => {
                    4.727 * len / link.kc.powf(crate::HW_EXP) / d.powf(4.871)
                }
                // friction factor applied per iteration; this is the fixed part
                HeadlossModel::DarcyWeisbach => DW_CONST * len / d.powi(5),
                HeadlossModel::ChezyManning => {
                    CM_CONST * d.powf(-5.33) * (link.kc * len).powi(2) / len
                }
            }
        }
        // minor-loss based devices carry their resistance in km
        _ => 0.0,
    };
}

/// Recompute every link's resistance.
pub fn set_all_resistances(net: &mut Network) {
    for i in 0..net.n_links() {
        set_link_resistance(net, aq_core::Idx::from_index(i));
    }
}

/// Darcy-Weisbach friction factor; laminar below Re 2300, Swamee-Jain
/// above.
pub fn friction_factor(reynolds: f64, rel_rough: f64) -> f64 {
    if reynolds < 2300.0 {
        64.0 / reynolds.max(1.0)
    } else {
        let a = rel_rough / 3.7;
        let b = 5.74 / reynolds.powf(0.9);
        let f = 0.25 / (a + b).log10().powi(2);
        f.max(1.0e-4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_network::NodeKind;

    #[test]
    fn hazen_williams_resistance() {
        let mut net = Network::new();
        let j = net.add_node("J1", NodeKind::Junction).unwrap();
        let r = net.add_node("R1", NodeKind::Reservoir).unwrap();
        let p = net.add_link("P1", LinkKind::Pipe, r, j).unwrap();
        {
            let link = net.link_mut(p).unwrap();
            link.length = 1000.0;
            link.diameter = 1.0;
            link.kc = 100.0;
        }
        set_link_resistance(&mut net, p);
        let r_expect = 4.727 * 1000.0 / 100.0_f64.powf(1.852);
        assert!((net.link(p).unwrap().resistance - r_expect).abs() < 1e-9);
    }

    #[test]
    fn friction_factor_regimes() {
        // laminar
        assert!((friction_factor(1000.0, 1e-4) - 0.064).abs() < 1e-9);
        // fully turbulent values stay in a plausible band
        let f = friction_factor(1e5, 1e-4);
        assert!(f > 0.01 && f < 0.08);
        // rougher pipe, more friction
        assert!(friction_factor(1e5, 1e-3) > friction_factor(1e5, 1e-5));
    }
}
