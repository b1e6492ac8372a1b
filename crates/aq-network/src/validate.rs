//! Whole-network consistency checks run before a solver opens the model.

use crate::error::{NetworkError, NetworkResult};
use crate::network::Network;

/// Validate a network for simulation: enough nodes, at least one fixed-grade
/// node, consistent tank levels, well-formed curves and pump characteristics,
/// and valve placement rules.
pub fn validate(net: &Network) -> NetworkResult<()> {
    if net.n_nodes() < 2 {
        return Err(NetworkError::TooFewNodes);
    }
    if net.n_tanks() == 0 {
        return Err(NetworkError::NoTanksOrReservoirs);
    }

    for t in 0..net.n_tanks() {
        let tank = &net.tanks[t];
        if tank.is_reservoir() {
            continue;
        }
        let id = net
            .node(tank.node)
            .map(|n| n.id().to_string())
            .unwrap_or_default();
        if tank.hmin > tank.hmax || tank.h0 < tank.hmin || tank.h0 > tank.hmax {
            return Err(NetworkError::InvalidTankLevels { id });
        }
        if tank.vmin > tank.vmax || tank.v0 < tank.vmin || tank.v0 > tank.vmax {
            return Err(NetworkError::InvalidTankLevels { id });
        }
    }

    for curve in &net.curves {
        if !curve.is_increasing() {
            return Err(NetworkError::CurveNotIncreasing {
                id: curve.id().to_string(),
            });
        }
    }

    for p in 0..net.n_pumps() {
        let pump = &net.pumps[p];
        let id = net
            .link(pump.link)
            .map(|l| l.id().to_string())
            .unwrap_or_default();
        if pump.kind == crate::link::PumpKind::NoCurve {
            return Err(NetworkError::NoPumpCurve { id });
        }
    }

    for link in net.links() {
        net.valve_check(link.kind, link.n1(), link.n2(), net.find_link(link.id()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkKind;
    use crate::node::NodeKind;

    #[test]
    fn empty_network_fails() {
        let net = Network::new();
        assert!(matches!(validate(&net), Err(NetworkError::TooFewNodes)));
    }

    #[test]
    fn all_junctions_fails() {
        let mut net = Network::new();
        net.add_node("J1", NodeKind::Junction).unwrap();
        net.add_node("J2", NodeKind::Junction).unwrap();
        assert!(matches!(
            validate(&net),
            Err(NetworkError::NoTanksOrReservoirs)
        ));
    }

    #[test]
    fn minimal_network_passes() {
        let mut net = Network::new();
        let j1 = net.add_node("J1", NodeKind::Junction).unwrap();
        let r1 = net.add_node("R1", NodeKind::Reservoir).unwrap();
        net.add_link("P1", LinkKind::Pipe, r1, j1).unwrap();
        validate(&net).unwrap();
    }

    #[test]
    fn bad_tank_levels_fail() {
        let mut net = Network::new();
        net.add_node("J1", NodeKind::Junction).unwrap();
        let t1 = net.add_node("T1", NodeKind::Tank).unwrap();
        let t = net.tank_index(t1).unwrap();
        net.tanks[t].hmin = 10.0;
        net.tanks[t].hmax = 5.0;
        assert!(matches!(
            validate(&net),
            Err(NetworkError::InvalidTankLevels { .. })
        ));
    }
}
