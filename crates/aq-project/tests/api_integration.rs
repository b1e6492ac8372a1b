//! Facade-level integration tests: topology editing, renumbering,
//! referential integrity and unit discipline.

use aq_core::units::{FlowUnits, HeadlossModel};
use aq_network::{ControlKind, LinkKind, NodeKind};
use aq_project::{ActionCode, CountType, LinkProperty, NodeProperty, Project};
use aq_project::controls::ControlSpec;

fn fresh() -> Project {
    let mut p = Project::new().unwrap();
    p.init("", "", FlowUnits::Gpm, HeadlossModel::HazenWilliams)
        .unwrap();
    p
}

#[test]
fn junction_insertion_renumbers_link_endpoints() {
    let mut p = fresh();
    p.add_node("J1", NodeKind::Junction).unwrap();
    let t1 = p.add_node("T1", NodeKind::Tank).unwrap();
    p.set_node_value(t1, NodeProperty::TankDiam, 100.0).unwrap();
    p.add_link("P1", LinkKind::Pipe, "J1", "T1").unwrap();

    let p1 = p.link_index("P1").unwrap();
    assert_eq!(p.link_nodes(p1).unwrap(), (1, 2));

    // a second junction slots in before the tank
    p.add_node("J2", NodeKind::Junction).unwrap();
    assert_eq!(p.link_nodes(p1).unwrap(), (1, 3));
    assert_eq!(p.node_index("T1").unwrap(), 3);
    assert_eq!(p.node_index("J2").unwrap(), 2);
}

#[test]
fn hash_round_trip_after_every_mutation() {
    let mut p = fresh();
    p.add_node("A", NodeKind::Junction).unwrap();
    p.add_node("B", NodeKind::Junction).unwrap();
    p.add_node("R", NodeKind::Reservoir).unwrap();
    p.add_link("L1", LinkKind::Pipe, "A", "B").unwrap();
    p.add_link("L2", LinkKind::Pipe, "B", "R").unwrap();

    let check = |p: &Project| {
        for i in 1..=p.count(CountType::Nodes).unwrap() {
            let id = p.node_id(i).unwrap();
            assert_eq!(p.node_index(&id).unwrap(), i);
        }
        for i in 1..=p.count(CountType::Links).unwrap() {
            let id = p.link_id(i).unwrap();
            assert_eq!(p.link_index(&id).unwrap(), i);
        }
    };
    check(&p);

    p.add_node("C", NodeKind::Junction).unwrap();
    check(&p);
    let l1 = p.link_index("L1").unwrap();
    p.delete_link(l1, ActionCode::Unconditional).unwrap();
    check(&p);
    p.set_node_id(p.node_index("C").unwrap(), "C2").unwrap();
    check(&p);
}

#[test]
fn count_consistency() {
    let mut p = fresh();
    p.add_node("J1", NodeKind::Junction).unwrap();
    p.add_node("J2", NodeKind::Junction).unwrap();
    p.add_node("R1", NodeKind::Reservoir).unwrap();
    p.add_node("T1", NodeKind::Tank).unwrap();
    p.add_link("P1", LinkKind::Pipe, "J1", "J2").unwrap();
    p.add_link("PU1", LinkKind::Pump, "R1", "J1").unwrap();
    p.add_link("V1", LinkKind::Tcv, "J2", "T1").unwrap();

    let nodes = p.count(CountType::Nodes).unwrap();
    let tanks = p.count(CountType::Tanks).unwrap();
    assert_eq!(nodes, 4);
    assert_eq!(tanks, 2);
    assert_eq!(p.count(CountType::Links).unwrap(), 3);
    // nodes = junctions + tanks; links = pipes + pumps + valves
    assert_eq!(p.network.n_juncs() + tanks, nodes);
    assert_eq!(
        p.network.n_pipes() + p.network.n_pumps() + p.network.n_valves(),
        p.count(CountType::Links).unwrap()
    );
}

#[test]
fn conditional_delete_of_controlled_link_rejected() {
    let mut p = fresh();
    p.add_node("J1", NodeKind::Junction).unwrap();
    p.add_node("T1", NodeKind::Tank).unwrap();
    let p1 = p.add_link("P1", LinkKind::Pipe, "J1", "T1").unwrap();
    p.add_control(ControlSpec {
        kind: ControlKind::Timer,
        link: p1,
        node: 0,
        open: false,
        setting: 0.0,
        level: 3600.0,
    })
    .unwrap();

    let err = p.delete_link(p1, ActionCode::Conditional).unwrap_err();
    assert_eq!(err.code().value(), 261);
    // the link survives the refused deletion
    assert_eq!(p.count(CountType::Links).unwrap(), 1);
    assert_eq!(p.count(CountType::Controls).unwrap(), 1);

    // unconditional deletion purges the control too
    p.delete_link(p1, ActionCode::Unconditional).unwrap();
    assert_eq!(p.count(CountType::Links).unwrap(), 0);
    assert_eq!(p.count(CountType::Controls).unwrap(), 0);
}

#[test]
fn conditional_delete_of_ruled_node_rejected() {
    let mut p = fresh();
    p.add_node("J1", NodeKind::Junction).unwrap();
    let t1 = p.add_node("T1", NodeKind::Tank).unwrap();
    p.set_node_value(t1, NodeProperty::TankDiam, 50.0).unwrap();
    p.set_node_value(t1, NodeProperty::MaxLevel, 30.0).unwrap();
    p.set_node_value(t1, NodeProperty::TankLevel, 10.0).unwrap();
    p.add_link("PU1", LinkKind::Pump, "J1", "T1").unwrap();
    p.add_rule(
        "RULE R1\nIF TANK T1 LEVEL BELOW 5\nTHEN PUMP PU1 STATUS = OPEN",
    )
    .unwrap();

    let err = p.delete_node(t1, ActionCode::Conditional).unwrap_err();
    assert_eq!(err.code().value(), 261);

    p.delete_node(t1, ActionCode::Unconditional).unwrap();
    // the rule lost its only premise and was removed with its subject
    assert_eq!(p.rule_count(), 0);
    assert_eq!(p.count(CountType::Nodes).unwrap(), 1);
    assert_eq!(p.count(CountType::Links).unwrap(), 0);
}

#[test]
fn trace_node_cannot_be_deleted() {
    let mut p = fresh();
    p.add_node("J1", NodeKind::Junction).unwrap();
    p.add_node("R1", NodeKind::Reservoir).unwrap();
    p.set_qual_type(aq_core::units::QualKind::Trace, "", "", "R1")
        .unwrap();
    let r1 = p.node_index("R1").unwrap();
    let err = p.delete_node(r1, ActionCode::Unconditional).unwrap_err();
    assert_eq!(err.code().value(), 260);
}

#[test]
fn check_valve_pipes_refuse_controls() {
    let mut p = fresh();
    p.add_node("J1", NodeKind::Junction).unwrap();
    p.add_node("T1", NodeKind::Tank).unwrap();
    let cv = p.add_link("CV1", LinkKind::CvPipe, "J1", "T1").unwrap();
    let err = p
        .add_control(ControlSpec {
            kind: ControlKind::Timer,
            link: cv,
            node: 0,
            open: false,
            setting: 0.0,
            level: 0.0,
        })
        .unwrap_err();
    assert_eq!(err.code().value(), 207);
    let err = p.set_link_value(cv, LinkProperty::Status, 0.0).unwrap_err();
    assert_eq!(err.code().value(), 207);
}

#[test]
fn set_link_type_within_pipe_family_keeps_index() {
    let mut p = fresh();
    p.add_node("J1", NodeKind::Junction).unwrap();
    p.add_node("T1", NodeKind::Tank).unwrap();
    let p1 = p.add_link("P1", LinkKind::Pipe, "J1", "T1").unwrap();
    let idx = p
        .set_link_type(p1, LinkKind::CvPipe, ActionCode::Unconditional)
        .unwrap();
    assert_eq!(idx, p1);
    assert_eq!(p.link_type(p1).unwrap(), LinkKind::CvPipe);
}

#[test]
fn set_link_type_to_valve_moves_link() {
    let mut p = fresh();
    p.add_node("J1", NodeKind::Junction).unwrap();
    p.add_node("J2", NodeKind::Junction).unwrap();
    p.add_node("T1", NodeKind::Tank).unwrap();
    let p1 = p.add_link("P1", LinkKind::Pipe, "J1", "J2").unwrap();
    p.add_link("P2", LinkKind::Pipe, "J2", "T1").unwrap();

    let idx = p
        .set_link_type(p1, LinkKind::Tcv, ActionCode::Unconditional)
        .unwrap();
    assert_eq!(p.link_type(idx).unwrap(), LinkKind::Tcv);
    assert_eq!(p.link_id(idx).unwrap(), "P1");
    // end nodes survive the swap
    let (n1, n2) = p.link_nodes(idx).unwrap();
    assert_eq!(p.node_id(n1).unwrap(), "J1");
    assert_eq!(p.node_id(n2).unwrap(), "J2");
    assert_eq!(p.network.n_valves(), 1);
}

#[test]
fn prv_to_tank_rejected() {
    let mut p = fresh();
    p.add_node("J1", NodeKind::Junction).unwrap();
    p.add_node("T1", NodeKind::Tank).unwrap();
    let err = p.add_link("V1", LinkKind::Prv, "J1", "T1").unwrap_err();
    assert_eq!(err.code().value(), 219);
}

#[test]
fn pattern_indexing_wraps_modulo_length() {
    let mut p = fresh();
    let pat = p.add_pattern("D").unwrap();
    p.set_pattern(pat, &[0.5, 1.0, 1.5]).unwrap();
    assert_eq!(p.pattern_value(pat, 1).unwrap(), 0.5);
    assert_eq!(p.pattern_value(pat, 4).unwrap(), 0.5);
    assert_eq!(p.pattern_value(pat, 5).unwrap(), 1.0);
    assert_eq!(p.pattern_value(pat, 303).unwrap(), 1.5);
    assert!((p.average_pattern_value(pat).unwrap() - 1.0).abs() < 1e-12);
}

#[test]
fn flow_unit_change_rescales_curve_points() {
    let mut p = fresh();
    p.add_node("J1", NodeKind::Junction).unwrap();
    p.add_node("R1", NodeKind::Reservoir).unwrap();
    let pu = p.add_link("PU1", LinkKind::Pump, "R1", "J1").unwrap();
    let c = p.add_curve("C1").unwrap();
    p.set_curve(c, &[(1000.0, 80.0)]).unwrap();
    p.set_head_curve_index(pu, c).unwrap();
    // the design point kept its user value through the kind assignment
    let (x, y) = p.curve_value(c, 1).unwrap();
    assert!((x - 1000.0).abs() < 1e-9);
    assert!((y - 80.0).abs() < 1e-9);

    let (x_gpm, _) = p.curve_value(c, 1).unwrap();
    p.set_flow_units(FlowUnits::Lps).unwrap();
    let (x_lps, _) = p.curve_value(c, 1).unwrap();
    let expect = x_gpm * (aq_core::units::LPS_PER_CFS / aq_core::units::GPM_PER_CFS);
    assert!(
        (x_lps - expect).abs() < 1e-9,
        "x_lps = {x_lps}, expect = {expect}"
    );
}

#[test]
fn emitter_round_trips_through_exponent_change() {
    let mut p = fresh();
    let j = p.add_node("J1", NodeKind::Junction).unwrap();
    p.set_node_value(j, NodeProperty::Emitter, 2.5).unwrap();
    let before = p.node_value(j, NodeProperty::Emitter).unwrap();
    p.set_option(aq_project::OptionParam::EmitExponent, 0.8)
        .unwrap();
    let after = p.node_value(j, NodeProperty::Emitter).unwrap();
    assert!((before - 2.5).abs() < 1e-9);
    assert!((after - 2.5).abs() < 1e-9);
}

#[test]
fn reset_report_then_set_report_is_stable() {
    let mut p = fresh();
    p.set_report("SUMMARY NO").unwrap();
    p.set_report("NODES ALL").unwrap();
    let snapshot = (p.report_opts.summary, p.report_opts.all_nodes);
    p.reset_report().unwrap();
    assert!(p.report_opts.summary);
    assert!(!p.report_opts.all_nodes);
    p.set_report("SUMMARY NO").unwrap();
    p.set_report("NODES ALL").unwrap();
    assert_eq!(
        (p.report_opts.summary, p.report_opts.all_nodes),
        snapshot
    );
}

#[test]
fn demand_categories_keep_primary_last() {
    let mut p = fresh();
    let j = p.add_node("J1", NodeKind::Junction).unwrap();
    p.set_base_demand(j, 1, 100.0).unwrap();
    p.network
        .node_mut(p.network.find_node("J1").unwrap())
        .unwrap()
        .demands
        .push(aq_network::Demand {
            base: 200.0 / aq_core::units::GPM_PER_CFS,
            pattern: None,
            name: "industrial".into(),
        });
    assert_eq!(p.demand_count(j).unwrap(), 2);
    // the primary category is the last one
    let primary = p.node_value(j, NodeProperty::BaseDemand).unwrap();
    assert!((primary - 200.0).abs() < 1e-9);
    assert_eq!(p.demand_name(j, 2).unwrap(), "industrial");
}
