//! INP text writer: serialize a live model back to the interchange format.
//!
//! The model is first expressed in user units via the inverse conversion
//! sweep, so a written file re-opens to the same internal state.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use aq_core::time::format_clock;
use aq_core::units::{HeadlossModel, PressureUnits, QualKind, Ucf};
use aq_network::{
    ControlKind, LinkKind, LinkStatus, MixModel, Network, SourceKind, Statistic,
};
use aq_rules::{LogOp, Object, RelOp, RuleSet, Variable};

use crate::convert::to_user_snapshot;
use crate::error::{IoError, IoResult};
use crate::report::{ReportOptions, StatusLevel};

pub fn write_inp(
    path: &Path,
    net: &Network,
    rules: &RuleSet,
    report: &ReportOptions,
    ucf: &Ucf,
) -> IoResult<()> {
    let (net, rules) = to_user_snapshot(net, rules, ucf);
    let text = render(&net, &rules, report);
    fs::write(path, text).map_err(|_| IoError::OutputOpen)?;
    Ok(())
}

fn render(net: &Network, rules: &RuleSet, report: &ReportOptions) -> String {
    let mut s = String::new();
    let w = &mut s;

    section(w, "TITLE");
    for line in &net.title {
        let _ = writeln!(w, "{line}");
    }

    section(w, "JUNCTIONS");
    for i in 0..net.n_juncs() {
        let node = net.node(aq_core::Idx::from_index(i)).expect("junction");
        let _ = writeln!(w, " {:<16} {:<12.4}", node.id(), node.elevation);
    }

    section(w, "RESERVOIRS");
    for tank in net.tanks.iter().filter(|t| t.is_reservoir()) {
        let node = net.node(tank.node).expect("reservoir node");
        let pat = tank
            .pattern
            .and_then(|p| net.pattern(p))
            .map(|p| p.id().to_string())
            .unwrap_or_default();
        let _ = writeln!(w, " {:<16} {:<12.4} {}", node.id(), node.elevation, pat);
    }

    section(w, "TANKS");
    for tank in net.tanks.iter().filter(|t| !t.is_reservoir()) {
        let node = net.node(tank.node).expect("tank node");
        let curve = tank
            .vol_curve
            .and_then(|c| net.curve(c))
            .map(|c| c.id().to_string())
            .unwrap_or_default();
        let _ = writeln!(
            w,
            " {:<16} {:<10.4} {:<10.4} {:<10.4} {:<10.4} {:<10.4} {:<10.4} {}",
            node.id(),
            node.elevation,
            tank.h0,
            tank.hmin,
            tank.hmax,
            tank.area,
            tank.vmin,
            curve
        );
    }

    section(w, "PIPES");
    for link in net.links().iter().filter(|l| l.kind.is_pipe()) {
        let status = match (link.kind, link.init_status) {
            (LinkKind::CvPipe, _) => "CV",
            (_, LinkStatus::Closed) => "CLOSED",
            _ => "OPEN",
        };
        let _ = writeln!(
            w,
            " {:<16} {:<16} {:<16} {:<10.4} {:<8.4} {:<10.6} {:<8.4} {}",
            link.id(),
            net.node(link.n1()).expect("n1").id(),
            net.node(link.n2()).expect("n2").id(),
            link.length,
            link.diameter,
            link.kc,
            link.km,
            status
        );
    }

    section(w, "PUMPS");
    for pump in &net.pumps {
        let link = net.link(pump.link).expect("pump link");
        let mut args = String::new();
        if pump.kind == aq_network::PumpKind::ConstHp {
            let _ = write!(args, " POWER {:.4}", link.kc);
        } else if let Some(c) = pump.hcurve.and_then(|c| net.curve(c)) {
            let _ = write!(args, " HEAD {}", c.id());
        }
        if link.kc != 1.0 && pump.kind != aq_network::PumpKind::ConstHp {
            let _ = write!(args, " SPEED {:.4}", link.kc);
        }
        if let Some(p) = pump.upat.and_then(|p| net.pattern(p)) {
            let _ = write!(args, " PATTERN {}", p.id());
        }
        let _ = writeln!(
            w,
            " {:<16} {:<16} {:<16}{}",
            link.id(),
            net.node(link.n1()).expect("n1").id(),
            net.node(link.n2()).expect("n2").id(),
            args
        );
    }

    section(w, "VALVES");
    for valve in &net.valves {
        let link = net.link(valve.link).expect("valve link");
        let setting = if link.kind == LinkKind::Gpv {
            // kc stores the headloss curve position
            aq_core::Idx::from_position(link.kc as i64)
                .and_then(|c| net.curve(c))
                .map(|c| c.id().to_string())
                .unwrap_or_default()
        } else {
            format!("{:.4}", link.kc)
        };
        let _ = writeln!(
            w,
            " {:<16} {:<16} {:<16} {:<8.4} {:<4} {:<10} {:.4}",
            link.id(),
            net.node(link.n1()).expect("n1").id(),
            net.node(link.n2()).expect("n2").id(),
            link.diameter,
            link.kind.name(),
            setting,
            link.km
        );
    }

    section(w, "DEMANDS");
    for i in 0..net.n_juncs() {
        let node = net.node(aq_core::Idx::from_index(i)).expect("junction");
        for demand in &node.demands {
            let pat = demand
                .pattern
                .and_then(|p| net.pattern(p))
                .map(|p| p.id().to_string())
                .unwrap_or_default();
            let category = if demand.name.is_empty() {
                String::new()
            } else {
                format!(" ;{}", demand.name)
            };
            let _ = writeln!(
                w,
                " {:<16} {:<12.6} {}{}",
                node.id(),
                demand.base,
                pat,
                category
            );
        }
    }

    section(w, "STATUS");
    for link in net.links() {
        if link.kind.is_pipe() {
            continue;
        }
        match link.init_status {
            LinkStatus::Closed => {
                let _ = writeln!(w, " {:<16} CLOSED", link.id());
            }
            LinkStatus::Open if link.kind.is_valve() => {
                let _ = writeln!(w, " {:<16} OPEN", link.id());
            }
            _ => {}
        }
    }

    section(w, "PATTERNS");
    for pattern in &net.patterns {
        for chunk in pattern.factors.chunks(6) {
            let values: Vec<String> = chunk.iter().map(|f| format!("{f:<10.4}")).collect();
            let _ = writeln!(w, " {:<16} {}", pattern.id(), values.join(" "));
        }
    }

    section(w, "CURVES");
    for curve in &net.curves {
        for (x, y) in curve.x.iter().zip(curve.y.iter()) {
            let _ = writeln!(w, " {:<16} {:<12.6} {:<12.6}", curve.id(), x, y);
        }
    }

    section(w, "CONTROLS");
    for control in &net.controls {
        let link = net.link(control.link).expect("control link");
        let action = if control.setting != aq_core::MISSING
            && control.status == LinkStatus::Active
        {
            format!("{:.4}", control.setting)
        } else if control.status == LinkStatus::Closed {
            "CLOSED".to_string()
        } else {
            "OPEN".to_string()
        };
        match control.kind {
            ControlKind::LowLevel | ControlKind::HiLevel => {
                let node = control.node.and_then(|n| net.node(n)).expect("control node");
                let trigger = if control.kind == ControlKind::HiLevel {
                    "ABOVE"
                } else {
                    "BELOW"
                };
                let _ = writeln!(
                    w,
                    " LINK {} {} IF NODE {} {} {:.4}",
                    link.id(),
                    action,
                    node.id(),
                    trigger,
                    control.grade
                );
            }
            ControlKind::Timer => {
                let _ = writeln!(
                    w,
                    " LINK {} {} AT TIME {}",
                    link.id(),
                    action,
                    format_clock(control.time)
                );
            }
            ControlKind::TimeOfDay => {
                let _ = writeln!(
                    w,
                    " LINK {} {} AT CLOCKTIME {}",
                    link.id(),
                    action,
                    format_clock(control.time)
                );
            }
        }
    }

    section(w, "RULES");
    for rule in rules.rules() {
        let _ = writeln!(w, " RULE {}", rule.label);
        for premise in &rule.premises {
            let keyword = match premise.logop {
                LogOp::If => "IF",
                LogOp::And => "AND",
                LogOp::Or => "OR",
            };
            let _ = writeln!(w, " {} {}", keyword, premise_text(premise, net));
        }
        for (i, action) in rule.then_actions.iter().enumerate() {
            let keyword = if i == 0 { "THEN" } else { "AND" };
            let _ = writeln!(w, " {} {}", keyword, action_text(action, net));
        }
        for (i, action) in rule.else_actions.iter().enumerate() {
            let keyword = if i == 0 { "ELSE" } else { "AND" };
            let _ = writeln!(w, " {} {}", keyword, action_text(action, net));
        }
        if rule.priority != 0.0 {
            let _ = writeln!(w, " PRIORITY {}", rule.priority);
        }
    }

    section(w, "ENERGY");
    let _ = writeln!(w, " GLOBAL EFFIC {:.4}", net.options.epump_effic);
    let _ = writeln!(w, " GLOBAL PRICE {:.4}", net.options.eprice);
    if let Some(p) = net.options.epat.and_then(|p| net.pattern(p)) {
        let _ = writeln!(w, " GLOBAL PATTERN {}", p.id());
    }
    let _ = writeln!(w, " DEMAND CHARGE {:.4}", net.options.demand_charge);
    for pump in &net.pumps {
        let link = net.link(pump.link).expect("pump link");
        if pump.ecost > 0.0 {
            let _ = writeln!(w, " PUMP {} PRICE {:.4}", link.id(), pump.ecost);
        }
        if let Some(p) = pump.epat.and_then(|p| net.pattern(p)) {
            let _ = writeln!(w, " PUMP {} PATTERN {}", link.id(), p.id());
        }
        if let Some(c) = pump.ecurve.and_then(|c| net.curve(c)) {
            let _ = writeln!(w, " PUMP {} EFFIC {}", link.id(), c.id());
        }
    }

    section(w, "EMITTERS");
    for i in 0..net.n_juncs() {
        let node = net.node(aq_core::Idx::from_index(i)).expect("junction");
        if node.emitter > 0.0 {
            let _ = writeln!(w, " {:<16} {:.6}", node.id(), node.emitter);
        }
    }

    section(w, "QUALITY");
    for node in net.nodes() {
        if node.init_qual != 0.0 {
            let _ = writeln!(w, " {:<16} {:.6}", node.id(), node.init_qual);
        }
    }

    section(w, "SOURCES");
    for node in net.nodes() {
        if let Some(source) = &node.source {
            let kind = match source.kind {
                SourceKind::Concen => "CONCEN",
                SourceKind::Mass => "MASS",
                SourceKind::Setpoint => "SETPOINT",
                SourceKind::FlowPaced => "FLOWPACED",
            };
            let pat = source
                .pattern
                .and_then(|p| net.pattern(p))
                .map(|p| p.id().to_string())
                .unwrap_or_default();
            let _ = writeln!(w, " {:<16} {} {:.6} {}", node.id(), kind, source.base, pat);
        }
    }

    section(w, "REACTIONS");
    let _ = writeln!(w, " ORDER BULK {}", net.options.bulk_order);
    let _ = writeln!(w, " ORDER WALL {}", net.options.wall_order);
    let _ = writeln!(w, " ORDER TANK {}", net.options.tank_order);
    let _ = writeln!(w, " GLOBAL BULK {:.6}", net.options.kbulk);
    let _ = writeln!(w, " GLOBAL WALL {:.6}", net.options.kwall);
    if net.options.climit > 0.0 {
        let _ = writeln!(w, " LIMITING POTENTIAL {:.6}", net.options.climit);
    }
    if net.options.rfactor > 0.0 {
        let _ = writeln!(w, " ROUGHNESS CORRELATION {:.6}", net.options.rfactor);
    }
    for link in net.links() {
        if link.kb != aq_core::MISSING {
            let _ = writeln!(w, " BULK {} {:.6}", link.id(), link.kb);
        }
        if link.kw != aq_core::MISSING {
            let _ = writeln!(w, " WALL {} {:.6}", link.id(), link.kw);
        }
    }
    for tank in &net.tanks {
        if tank.kb != aq_core::MISSING && !tank.is_reservoir() {
            let node = net.node(tank.node).expect("tank node");
            let _ = writeln!(w, " TANK {} {:.6}", node.id(), tank.kb);
        }
    }

    section(w, "MIXING");
    for tank in &net.tanks {
        if tank.is_reservoir() || tank.mix_model == MixModel::Mix1 {
            continue;
        }
        let node = net.node(tank.node).expect("tank node");
        let model = match tank.mix_model {
            MixModel::Mix1 => "MIXED",
            MixModel::Mix2 => "2COMP",
            MixModel::Fifo => "FIFO",
            MixModel::Lifo => "LIFO",
        };
        let _ = writeln!(w, " {:<16} {} {:.4}", node.id(), model, tank.v1_frac);
    }

    section(w, "TIMES");
    let times = &net.times;
    let _ = writeln!(w, " DURATION {}", format_clock(times.duration));
    let _ = writeln!(w, " HYDRAULIC TIMESTEP {}", format_clock(times.hstep));
    let _ = writeln!(w, " QUALITY TIMESTEP {}", format_clock(times.qstep));
    let _ = writeln!(w, " PATTERN TIMESTEP {}", format_clock(times.pstep));
    let _ = writeln!(w, " PATTERN START {}", format_clock(times.pstart));
    let _ = writeln!(w, " REPORT TIMESTEP {}", format_clock(times.rstep));
    let _ = writeln!(w, " REPORT START {}", format_clock(times.rstart));
    let _ = writeln!(w, " RULE TIMESTEP {}", format_clock(times.rulestep));
    let _ = writeln!(w, " START CLOCKTIME {}", format_clock(times.start_clock));
    let statistic = match times.statistic {
        Statistic::Series => "NONE",
        Statistic::Average => "AVERAGE",
        Statistic::Minimum => "MINIMUM",
        Statistic::Maximum => "MAXIMUM",
        Statistic::Range => "RANGE",
    };
    let _ = writeln!(w, " STATISTIC {}", statistic);

    section(w, "REPORT");
    let _ = writeln!(w, " SUMMARY {}", if report.summary { "YES" } else { "NO" });
    let _ = writeln!(w, " ENERGY {}", if report.energy { "YES" } else { "NO" });
    let status = match report.status {
        StatusLevel::None => "NO",
        StatusLevel::Normal => "YES",
        StatusLevel::Full => "FULL",
    };
    let _ = writeln!(w, " STATUS {}", status);
    if report.all_nodes {
        let _ = writeln!(w, " NODES ALL");
    }
    if report.all_links {
        let _ = writeln!(w, " LINKS ALL");
    }

    section(w, "OPTIONS");
    let opt = &net.options;
    let _ = writeln!(w, " UNITS {}", opt.flow_units.name());
    let pressure = match opt.pressure_units {
        PressureUnits::Psi => "PSI",
        PressureUnits::Kpa => "KPA",
        PressureUnits::Meters => "METERS",
    };
    let _ = writeln!(w, " PRESSURE {}", pressure);
    let headloss = match opt.headloss {
        HeadlossModel::HazenWilliams => "H-W",
        HeadlossModel::DarcyWeisbach => "D-W",
        HeadlossModel::ChezyManning => "C-M",
    };
    let _ = writeln!(w, " HEADLOSS {}", headloss);
    match opt.qual {
        QualKind::None => {
            let _ = writeln!(w, " QUALITY NONE");
        }
        QualKind::Chem => {
            let _ = writeln!(w, " QUALITY {} {}", opt.chem_name, opt.chem_units);
        }
        QualKind::Age => {
            let _ = writeln!(w, " QUALITY AGE");
        }
        QualKind::Trace => {
            if let Some(node) = opt.trace_node.and_then(|n| net.node(n)) {
                let _ = writeln!(w, " QUALITY TRACE {}", node.id());
            }
        }
    }
    let _ = writeln!(w, " VISCOSITY {:.6}", opt.viscos);
    let _ = writeln!(w, " DIFFUSIVITY {:.6}", opt.diffus);
    let _ = writeln!(w, " SPECIFIC GRAVITY {:.6}", opt.spgrav);
    let _ = writeln!(w, " TRIALS {}", opt.trials);
    let _ = writeln!(w, " ACCURACY {:.8}", opt.accuracy);
    if opt.head_error > 0.0 {
        let _ = writeln!(w, " HEADERROR {:.8}", opt.head_error);
    }
    if opt.flow_change > 0.0 {
        let _ = writeln!(w, " FLOWCHANGE {:.8}", opt.flow_change);
    }
    if opt.ctol > 0.0 {
        let _ = writeln!(w, " TOLERANCE {:.8}", opt.ctol);
    }
    let _ = writeln!(w, " CHECKFREQ {}", opt.check_freq);
    let _ = writeln!(w, " MAXCHECK {}", opt.max_check);
    let _ = writeln!(w, " DAMPLIMIT {:.6}", opt.damp_limit);
    let _ = writeln!(w, " EMITTER EXPONENT {:.4}", opt.emit_expon);
    let _ = writeln!(w, " DEMAND MULTIPLIER {:.4}", opt.demand_mult);
    if opt.demand_model == aq_network::DemandModel::Pda {
        let _ = writeln!(w, " DEMAND MODEL PDA");
        let _ = writeln!(w, " MINIMUM PRESSURE {:.4}", opt.pmin);
        let _ = writeln!(w, " REQUIRED PRESSURE {:.4}", opt.preq);
        let _ = writeln!(w, " PRESSURE EXPONENT {:.4}", opt.pexp);
    }
    if let Some(p) = opt.def_pattern.and_then(|p| net.pattern(p)) {
        let _ = writeln!(w, " PATTERN {}", p.id());
    }

    section(w, "COORDINATES");
    for node in net.nodes() {
        if let Some((x, y)) = node.coords {
            let _ = writeln!(w, " {:<16} {:<14.6} {:<14.6}", node.id(), x, y);
        }
    }

    section(w, "END");
    s
}

fn section(w: &mut String, name: &str) {
    let _ = writeln!(w, "\n[{name}]");
}

fn premise_text(premise: &aq_rules::Premise, net: &Network) -> String {
    let object = match premise.object {
        Object::System => "SYSTEM".to_string(),
        Object::Node(n) => format!(
            "NODE {}",
            net.node(n).map(|n| n.id()).unwrap_or("?")
        ),
        Object::Link(l) => format!(
            "LINK {}",
            net.link(l).map(|l| l.id()).unwrap_or("?")
        ),
    };
    let variable = match premise.variable {
        Variable::Demand => "DEMAND",
        Variable::Head => "HEAD",
        Variable::Grade => "GRADE",
        Variable::Level => "LEVEL",
        Variable::Pressure => "PRESSURE",
        Variable::Flow => "FLOW",
        Variable::Status => "STATUS",
        Variable::Setting => "SETTING",
        Variable::Quality => "QUALITY",
        Variable::Time => "TIME",
        Variable::ClockTime => "CLOCKTIME",
    };
    let relop = match premise.relop {
        RelOp::Eq => "=",
        RelOp::Ne => "<>",
        RelOp::Le => "<=",
        RelOp::Ge => ">=",
        RelOp::Lt => "<",
        RelOp::Gt => ">",
        RelOp::Is => "IS",
        RelOp::Not => "NOT",
        RelOp::Below => "BELOW",
        RelOp::Above => "ABOVE",
    };
    let value = if premise.variable == Variable::Status {
        match premise.status {
            Some(LinkStatus::Open) => "OPEN".to_string(),
            Some(LinkStatus::Active) => "ACTIVE".to_string(),
            _ => "CLOSED".to_string(),
        }
    } else if matches!(premise.variable, Variable::Time | Variable::ClockTime) {
        format_clock(premise.value as i64)
    } else {
        format!("{:.6}", premise.value)
    };
    format!("{object} {variable} {relop} {value}")
}

fn action_text(action: &aq_rules::Action, net: &Network) -> String {
    let id = net.link(action.link).map(|l| l.id()).unwrap_or("?");
    if let Some(setting) = action.setting {
        format!("LINK {id} SETTING = {setting:.6}")
    } else {
        let status = match action.status {
            Some(LinkStatus::Open) => "OPEN",
            Some(LinkStatus::Active) => "ACTIVE",
            _ => "CLOSED",
        };
        format!("LINK {id} STATUS = {status}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inp::read_inp_str;

    const NET: &str = "\
[JUNCTIONS]
 J1  700  10
[RESERVOIRS]
 R1  800
[TANKS]
 T1  850  15  5  25  40  0
[PIPES]
 P1  R1  J1  1000  12  100  0
 P2  J1  T1  2000  10  100  0
[OPTIONS]
 UNITS GPM
[TIMES]
 DURATION 12:00
[END]
";

    #[test]
    fn round_trip_preserves_network_shape() {
        let model = read_inp_str(NET).unwrap();
        let ucf = Ucf::new(
            model.network.options.flow_units,
            model.network.options.pressure_units,
            model.network.options.qual,
            model.network.options.spgrav,
        );
        let mut net = model.network.clone();
        let mut rules = model.rules.clone();
        crate::convert::to_internal(&mut net, &mut rules, &ucf);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.inp");
        write_inp(&path, &net, &rules, &model.report, &ucf).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let reread = read_inp_str(&text).unwrap();
        assert_eq!(reread.network.n_nodes(), 3);
        assert_eq!(reread.network.n_links(), 2);
        assert_eq!(reread.network.times.duration, 12 * 3600);

        let mut reread_net = reread.network.clone();
        let mut reread_rules = reread.rules.clone();
        crate::convert::to_internal(&mut reread_net, &mut reread_rules, &ucf);
        let j1 = reread_net.find_node("J1").unwrap();
        let orig_j1 = net.find_node("J1").unwrap();
        assert!(
            (reread_net.node(j1).unwrap().demands[0].base
                - net.node(orig_j1).unwrap().demands[0].base)
                .abs()
                < 1e-9
        );
        let t = reread_net.tank_index(reread_net.find_node("T1").unwrap()).unwrap();
        assert!((reread_net.tanks[t].h0 - 865.0).abs() < 1e-6);
    }
}
