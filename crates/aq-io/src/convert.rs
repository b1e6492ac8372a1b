//! Whole-model unit conversion.
//!
//! The INP reader stores values exactly as written; once the unit system is
//! known this sweep turns the model into internal units (feet, cfs, mg/ft3,
//! horsepower, seconds). `to_user` is the exact inverse, used when saving a
//! live network back to INP text.

use aq_core::time::SECS_PER_DAY;
use aq_core::units::{M_PER_FT, Ucf};
use aq_network::{CurveKind, LinkKind, Network, PumpKind};
use aq_rules::{Object, Rule, RuleSet, Variable};

/// Kinematic viscosity of water at 20 C, ft2/s.
pub const VISCOS_WATER: f64 = 1.1e-5;
/// Molecular diffusivity of chlorine, ft2/s.
pub const DIFFUS_CHLORINE: f64 = 1.3e-8;

/// Convert a freshly parsed model to internal units.
pub fn to_internal(net: &mut Network, rules: &mut RuleSet, ucf: &Ucf) {
    let qexp = net.options.emit_expon;

    // curves first: everything derived from them reads internal values
    for curve in &mut net.curves {
        let (fx, fy) = curve_factors(curve.kind, ucf);
        for x in &mut curve.x {
            *x /= fx;
        }
        for y in &mut curve.y {
            *y /= fy;
        }
    }

    for i in 0..net.n_nodes() {
        let idx = aq_core::Idx::from_index(i);
        let is_junction = net.is_junction(idx);
        let node = net.node_mut(idx).expect("node in range");
        node.elevation /= ucf.elev;
        node.init_qual /= ucf.quality;
        if is_junction {
            for d in &mut node.demands {
                d.base /= ucf.demand;
            }
            if node.emitter > 0.0 {
                node.emitter *= ucf.pressure.powf(qexp) / ucf.flow;
            }
        }
        if let Some(source) = &mut node.source {
            if source.kind != aq_network::SourceKind::Mass {
                source.base /= ucf.quality;
            }
        }
    }

    for t in 0..net.n_tanks() {
        let elev = net.node(net.tanks[t].node).expect("tank node").elevation;
        let keep_vmin;
        {
            let tank = &mut net.tanks[t];
            if tank.is_reservoir() {
                // reservoir head came in through the node elevation
                tank.h0 = elev;
                tank.hmin = elev;
                tank.hmax = elev;
                continue;
            }
            tank.h0 = elev + tank.h0 / ucf.elev;
            tank.hmin = elev + tank.hmin / ucf.elev;
            tank.hmax = elev + tank.hmax / ucf.elev;
            // the parser parks the diameter in `area`
            let diam = tank.area / ucf.elev;
            tank.area = std::f64::consts::PI / 4.0 * diam * diam;
            tank.vmin /= ucf.volume;
            keep_vmin = tank.vmin > 0.0 || tank.vol_curve.is_some();
            if tank.kb != aq_core::MISSING {
                tank.kb /= SECS_PER_DAY as f64;
            }
        }
        net.update_tank_volumes(t, keep_vmin);
    }

    let dw = net.options.headloss == aq_core::units::HeadlossModel::DarcyWeisbach;
    let wall_order = net.options.wall_order;
    for i in 0..net.n_links() {
        let idx = aq_core::Idx::from_index(i);
        let kind = net.link(idx).expect("link in range").kind;
        let link = net.link_mut(idx).expect("link in range");
        match kind {
            LinkKind::Pipe | LinkKind::CvPipe => {
                link.diameter /= ucf.diam;
                link.length /= ucf.length;
                if dw {
                    link.kc /= 1000.0 * ucf.elev;
                }
                link.km = 0.02517 * link.km / link.diameter.powi(4);
            }
            LinkKind::Pump => {}
            _ => {
                link.diameter /= ucf.diam;
                link.km = 0.02517 * link.km / link.diameter.powi(4);
                link.kc = setting_to_internal(kind, link.kc, ucf);
            }
        }
        if link.kb != aq_core::MISSING {
            link.kb /= SECS_PER_DAY as f64;
        }
        if link.kw != aq_core::MISSING {
            link.kw = wall_coeff_to_internal(link.kw, wall_order, ucf);
        }
    }

    for p in 0..net.n_pumps() {
        if net.pumps[p].kind == PumpKind::ConstHp {
            let link = net.pumps[p].link;
            net.link_mut(link).expect("pump link").kc /= ucf.power;
        } else {
            // head-curve pumps fit their coefficients from converted curves
            let _ = net.update_pump_params(p);
        }
    }

    for c in 0..net.controls.len() {
        let (node, link) = (net.controls[c].node, net.controls[c].link);
        let kind = net.link(link).map(|l| l.kind);
        if let Some(nidx) = node {
            let elev = net.node(nidx).expect("control node").elevation;
            let grade = net.controls[c].grade;
            net.controls[c].grade = if net.is_junction(nidx) {
                elev + grade / ucf.pressure
            } else {
                elev + grade / ucf.elev
            };
        }
        if net.controls[c].setting != aq_core::MISSING {
            if let Some(kind) = kind {
                net.controls[c].setting = setting_to_internal(kind, net.controls[c].setting, ucf);
            }
        }
    }

    let opt = &mut net.options;
    opt.pmin /= ucf.pressure;
    opt.preq /= ucf.pressure;
    opt.ctol /= ucf.quality;
    opt.climit /= ucf.quality;
    opt.kbulk /= SECS_PER_DAY as f64;
    opt.kwall = wall_coeff_to_internal(opt.kwall, opt.wall_order, ucf);
    opt.viscos *= VISCOS_WATER;
    opt.diffus *= DIFFUS_CHLORINE;

    for i in 0..rules.len() {
        let rule = rules.rule_mut(i).expect("rule in range");
        rule_to_internal_with(rule, net, ucf);
    }
}

/// Convert a single parsed rule to internal units (used by the rule-adding
/// API as well as the INP path).
pub fn rule_to_internal(rule: &mut Rule, net: &Network, ucf: &Ucf) {
    rule_to_internal_with(rule, net, ucf);
}

fn rule_to_internal_with(rule: &mut Rule, net: &Network, ucf: &Ucf) {
    for p in &mut rule.premises {
        match p.variable {
            Variable::Demand | Variable::Flow => p.value /= ucf.flow,
            Variable::Head | Variable::Grade => p.value /= ucf.head,
            Variable::Level => p.value /= ucf.elev,
            Variable::Pressure => p.value /= ucf.pressure,
            Variable::Quality => p.value /= ucf.quality,
            Variable::Setting => {
                if let Object::Link(l) = p.object {
                    if let Some(link) = net.link(l) {
                        p.value = setting_to_internal(link.kind, p.value, ucf);
                    }
                }
            }
            Variable::Status | Variable::Time | Variable::ClockTime => {}
        }
    }
    for a in rule
        .then_actions
        .iter_mut()
        .chain(rule.else_actions.iter_mut())
    {
        if let Some(setting) = &mut a.setting {
            if let Some(link) = net.link(a.link) {
                *setting = setting_to_internal(link.kind, *setting, ucf);
            }
        }
    }
}

/// Link settings convert by link kind: pressure valves carry heads, FCVs
/// carry flows, everything else is dimensionless.
pub fn setting_to_internal(kind: LinkKind, value: f64, ucf: &Ucf) -> f64 {
    match kind {
        LinkKind::Prv | LinkKind::Psv | LinkKind::Pbv => value / ucf.pressure,
        LinkKind::Fcv => value / ucf.flow,
        _ => value,
    }
}

pub fn setting_to_user(kind: LinkKind, value: f64, ucf: &Ucf) -> f64 {
    match kind {
        LinkKind::Prv | LinkKind::Psv | LinkKind::Pbv => value * ucf.pressure,
        LinkKind::Fcv => value * ucf.flow,
        _ => value,
    }
}

/// Wall coefficients: first-order rates are per day; zero-order rates are
/// mass per area per day, with the area in user length units.
fn wall_coeff_to_internal(kw: f64, wall_order: f64, ucf: &Ucf) -> f64 {
    let mut kw = kw / SECS_PER_DAY as f64;
    if wall_order == 0.0 && ucf.elev == M_PER_FT {
        kw *= M_PER_FT;
    }
    kw
}

fn wall_coeff_to_user(kw: f64, wall_order: f64, ucf: &Ucf) -> f64 {
    let mut kw = kw * SECS_PER_DAY as f64;
    if wall_order == 0.0 && ucf.elev == M_PER_FT {
        kw /= M_PER_FT;
    }
    kw
}

/// Per-kind scale factors turning internal curve points into user values.
pub fn curve_factors(kind: CurveKind, ucf: &Ucf) -> (f64, f64) {
    match kind {
        CurveKind::Volume => (ucf.elev, ucf.volume),
        CurveKind::Pump => (ucf.flow, ucf.head),
        CurveKind::Effic => (ucf.flow, 1.0),
        CurveKind::Hloss => (ucf.flow, ucf.head),
        CurveKind::Generic => (1.0, 1.0),
    }
}

/// Inverse sweep: express a live internal-unit model in user units for
/// serialization. Mirrors `to_internal` operation by operation.
pub fn to_user_snapshot(net: &Network, rules: &RuleSet, ucf: &Ucf) -> (Network, RuleSet) {
    let mut net = net.clone();
    let mut rules = rules.clone();
    let qexp = net.options.emit_expon;

    for i in 0..net.n_nodes() {
        let idx = aq_core::Idx::from_index(i);
        let is_junction = net.is_junction(idx);
        let node = net.node_mut(idx).expect("node in range");
        node.elevation *= ucf.elev;
        node.init_qual *= ucf.quality;
        if is_junction {
            for d in &mut node.demands {
                d.base *= ucf.demand;
            }
            if node.emitter > 0.0 {
                node.emitter /= ucf.pressure.powf(qexp) / ucf.flow;
            }
        }
        if let Some(source) = &mut node.source {
            if source.kind != aq_network::SourceKind::Mass {
                source.base *= ucf.quality;
            }
        }
    }

    for t in 0..net.n_tanks() {
        let node_idx = net.tanks[t].node;
        // node elevations were converted above
        let elev_user = net.node(node_idx).expect("tank node").elevation;
        let tank = &mut net.tanks[t];
        if tank.is_reservoir() {
            tank.h0 = elev_user;
            tank.hmin = elev_user;
            tank.hmax = elev_user;
            continue;
        }
        tank.h0 = tank.h0 * ucf.elev - elev_user;
        tank.hmin = tank.hmin * ucf.elev - elev_user;
        tank.hmax = tank.hmax * ucf.elev - elev_user;
        let diam = (4.0 * tank.area / std::f64::consts::PI).sqrt();
        tank.area = diam * ucf.elev;
        tank.vmin *= ucf.volume;
        if tank.kb != aq_core::MISSING {
            tank.kb *= SECS_PER_DAY as f64;
        }
    }

    let dw = net.options.headloss == aq_core::units::HeadlossModel::DarcyWeisbach;
    let wall_order = net.options.wall_order;
    for i in 0..net.n_links() {
        let idx = aq_core::Idx::from_index(i);
        let kind = net.link(idx).expect("link in range").kind;
        let link = net.link_mut(idx).expect("link in range");
        match kind {
            LinkKind::Pipe | LinkKind::CvPipe => {
                link.km = link.km * link.diameter.powi(4) / 0.02517;
                link.diameter *= ucf.diam;
                link.length *= ucf.length;
                if dw {
                    link.kc *= 1000.0 * ucf.elev;
                }
            }
            LinkKind::Pump => {}
            _ => {
                link.km = link.km * link.diameter.powi(4) / 0.02517;
                link.diameter *= ucf.diam;
                link.kc = setting_to_user(kind, link.kc, ucf);
            }
        }
        if link.kb != aq_core::MISSING {
            link.kb *= SECS_PER_DAY as f64;
        }
        if link.kw != aq_core::MISSING {
            link.kw = wall_coeff_to_user(link.kw, wall_order, ucf);
        }
    }

    for p in 0..net.n_pumps() {
        if net.pumps[p].kind == PumpKind::ConstHp {
            let link = net.pumps[p].link;
            net.link_mut(link).expect("pump link").kc *= ucf.power;
        }
    }

    for c in 0..net.controls.len() {
        let (node, link) = (net.controls[c].node, net.controls[c].link);
        let kind = net.link(link).map(|l| l.kind);
        if let Some(nidx) = node {
            let elev_user = net.node(nidx).expect("control node").elevation;
            let grade = net.controls[c].grade;
            net.controls[c].grade = if net.is_junction(nidx) {
                (grade - elev_user / ucf.elev) * ucf.pressure
            } else {
                (grade - elev_user / ucf.elev) * ucf.elev
            };
        }
        if net.controls[c].setting != aq_core::MISSING {
            if let Some(kind) = kind {
                net.controls[c].setting = setting_to_user(kind, net.controls[c].setting, ucf);
            }
        }
    }

    for curve in &mut net.curves {
        let (fx, fy) = curve_factors(curve.kind, ucf);
        for x in &mut curve.x {
            *x *= fx;
        }
        for y in &mut curve.y {
            *y *= fy;
        }
    }

    let opt = &mut net.options;
    opt.pmin *= ucf.pressure;
    opt.preq *= ucf.pressure;
    opt.ctol *= ucf.quality;
    opt.climit *= ucf.quality;
    opt.kbulk *= SECS_PER_DAY as f64;
    opt.kwall = wall_coeff_to_user(opt.kwall, opt.wall_order, ucf);
    opt.viscos /= VISCOS_WATER;
    opt.diffus /= DIFFUS_CHLORINE;

    for i in 0..rules.len() {
        let rule = rules.rule_mut(i).expect("rule in range");
        for p in &mut rule.premises {
            match p.variable {
                Variable::Demand | Variable::Flow => p.value *= ucf.flow,
                Variable::Head | Variable::Grade => p.value *= ucf.head,
                Variable::Level => p.value *= ucf.elev,
                Variable::Pressure => p.value *= ucf.pressure,
                Variable::Quality => p.value *= ucf.quality,
                Variable::Setting => {
                    if let Object::Link(l) = p.object {
                        if let Some(link) = net.link(l) {
                            p.value = setting_to_user(link.kind, p.value, ucf);
                        }
                    }
                }
                Variable::Status | Variable::Time | Variable::ClockTime => {}
            }
        }
        for a in rule
            .then_actions
            .iter_mut()
            .chain(rule.else_actions.iter_mut())
        {
            if let Some(setting) = &mut a.setting {
                if let Some(link) = net.link(a.link) {
                    *setting = setting_to_user(link.kind, *setting, ucf);
                }
            }
        }
    }

    (net, rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_core::units::{FlowUnits, PressureUnits, QualKind};
    use aq_network::NodeKind;

    #[test]
    fn gpm_network_converts_and_inverts() {
        let mut net = Network::new();
        net.options.flow_units = FlowUnits::Gpm;
        let j = net.add_node("J1", NodeKind::Junction).unwrap();
        let r = net.add_node("R1", NodeKind::Reservoir).unwrap();
        let p = net.add_link("P1", LinkKind::Pipe, r, j).unwrap();
        {
            let node = net.node_mut(j).unwrap();
            node.elevation = 700.0;
            node.demands[0].base = 448.831; // 1 cfs in gpm
            let link = net.link_mut(p).unwrap();
            link.diameter = 12.0; // inches
            link.length = 1000.0;
            link.km = 2.0;
        }
        let mut rules = RuleSet::new();
        let ucf = Ucf::new(FlowUnits::Gpm, PressureUnits::Psi, QualKind::None, 1.0);

        to_internal(&mut net, &mut rules, &ucf);
        assert!((net.node(j).unwrap().demands[0].base - 1.0).abs() < 1e-9);
        assert!((net.link(p).unwrap().diameter - 1.0).abs() < 1e-12);
        // km = 0.02517 * 2 / 1^4
        assert!((net.link(p).unwrap().km - 0.05034).abs() < 1e-9);

        let (user, _) = to_user_snapshot(&net, &rules, &ucf);
        assert!((user.node(j).unwrap().demands[0].base - 448.831).abs() < 1e-9);
        assert!((user.link(p).unwrap().diameter - 12.0).abs() < 1e-9);
        assert!((user.link(p).unwrap().km - 2.0).abs() < 1e-9);
    }

    #[test]
    fn tank_levels_become_absolute_grades() {
        let mut net = Network::new();
        net.add_node("J1", NodeKind::Junction).unwrap();
        let t1 = net.add_node("T1", NodeKind::Tank).unwrap();
        net.node_mut(t1).unwrap().elevation = 850.0;
        let t = net.tank_index(t1).unwrap();
        {
            let tank = &mut net.tanks[t];
            tank.h0 = 15.0;
            tank.hmin = 5.0;
            tank.hmax = 25.0;
            tank.area = 40.0; // diameter, feet
            tank.vmin = 0.0;
        }
        let mut rules = RuleSet::new();
        let ucf = Ucf::default();
        to_internal(&mut net, &mut rules, &ucf);
        let tank = &net.tanks[t];
        assert!((tank.h0 - 865.0).abs() < 1e-9);
        assert!((tank.hmin - 855.0).abs() < 1e-9);
        assert!((tank.hmax - 875.0).abs() < 1e-9);
        let area = std::f64::consts::PI / 4.0 * 40.0 * 40.0;
        assert!((tank.area - area).abs() < 1e-9);
        assert!(tank.vmax > tank.v0 && tank.v0 > tank.vmin);
    }
}
