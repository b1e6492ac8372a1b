//! Premise evaluation and pending-action resolution.

use std::collections::HashMap;

use aq_core::time::{SECS_PER_DAY, Seconds};
use aq_core::{LinkIdx, NodeIdx};
use aq_network::LinkStatus;

use crate::rule::{Action, LogOp, Object, Premise, RelOp, Rule, RuleSet, Variable};

/// Read access to the simulation state the premises compare against.
/// Implemented by the hydraulic engine.
pub trait StateView {
    /// Actual demand delivered at a junction, cfs.
    fn node_demand(&self, node: NodeIdx) -> f64;
    /// Hydraulic grade, ft.
    fn node_head(&self, node: NodeIdx) -> f64;
    /// Pressure head above elevation, ft.
    fn node_pressure(&self, node: NodeIdx) -> f64;
    /// Water level above a tank's bottom, ft (0 for junctions).
    fn tank_level(&self, node: NodeIdx) -> f64;
    /// Current quality at the node.
    fn node_quality(&self, node: NodeIdx) -> f64;
    fn link_flow(&self, link: LinkIdx) -> f64;
    fn link_status(&self, link: LinkIdx) -> LinkStatus;
    fn link_setting(&self, link: LinkIdx) -> f64;
    /// Elapsed simulation time, seconds.
    fn elapsed(&self) -> Seconds;
    /// Time of day, seconds past midnight.
    fn clock(&self) -> Seconds;
}

/// An action selected for application, tagged with its source rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingAction {
    pub rule: usize,
    pub action: Action,
}

impl RuleSet {
    /// Evaluate every rule against the state and resolve the pending action
    /// list. `last_check` is the time of the previous rule evaluation; time
    /// premises fire when their instant falls inside the elapsed window.
    pub fn evaluate(&self, view: &dyn StateView, last_check: Seconds) -> Vec<PendingAction> {
        // link -> (priority, arrival order, pending)
        let mut selected: HashMap<LinkIdx, (f64, usize, PendingAction)> = HashMap::new();
        let mut order = 0_usize;

        for (i, rule) in self.rules().iter().enumerate() {
            let fired = eval_premises(rule, view, last_check);
            let actions = if fired {
                &rule.then_actions
            } else {
                &rule.else_actions
            };
            if fired {
                tracing::debug!(rule = %rule.label, "rule premises satisfied");
            }
            for action in actions {
                let pending = PendingAction { rule: i, action: *action };
                match selected.get(&action.link) {
                    Some((prio, _, _)) if *prio >= rule.priority => {}
                    _ => {
                        selected.insert(action.link, (rule.priority, order, pending));
                    }
                }
                order += 1;
            }
        }

        let mut out: Vec<(usize, PendingAction)> =
            selected.into_values().map(|(_, ord, p)| (ord, p)).collect();
        out.sort_by_key(|(ord, _)| *ord);
        out.into_iter().map(|(_, p)| p).collect()
    }
}

/// Combine premises left to right with AND binding tighter than OR:
/// `P1 AND P2 OR P3` reads as `(P1 AND P2) OR P3`. Each OR closes the
/// running AND-clause into the result and opens a new clause; a clause
/// that has already failed skips further premise checks.
fn eval_premises(rule: &Rule, view: &dyn StateView, last_check: Seconds) -> bool {
    let mut result = false;
    let mut clause = true;
    for premise in &rule.premises {
        if premise.logop == LogOp::Or {
            result = result || clause;
            clause = check_premise(premise, view, last_check);
        } else if clause {
            clause = check_premise(premise, view, last_check);
        }
    }
    result || clause
}

fn check_premise(premise: &Premise, view: &dyn StateView, last_check: Seconds) -> bool {
    match premise.object {
        Object::System => check_system(premise, view, last_check),
        Object::Node(node) => {
            let lhs = match premise.variable {
                Variable::Demand => view.node_demand(node),
                Variable::Head | Variable::Grade => view.node_head(node),
                Variable::Level => view.tank_level(node),
                Variable::Pressure => view.node_pressure(node),
                Variable::Quality => view.node_quality(node),
                _ => return false,
            };
            premise.relop.holds(lhs, premise.value)
        }
        Object::Link(link) => match premise.variable {
            Variable::Flow => premise.relop.holds(view.link_flow(link), premise.value),
            Variable::Setting => premise.relop.holds(view.link_setting(link), premise.value),
            Variable::Status => {
                let status = view.link_status(link);
                let Some(want) = premise.status else {
                    return false;
                };
                let same = status_class(status) == status_class(want);
                match premise.relop {
                    RelOp::Eq | RelOp::Is => same,
                    RelOp::Ne | RelOp::Not => !same,
                    _ => false,
                }
            }
            _ => false,
        },
    }
}

/// Marker states collapse to their reportable class for comparisons.
fn status_class(s: LinkStatus) -> LinkStatus {
    if s.is_open() {
        if s == LinkStatus::Active {
            LinkStatus::Active
        } else {
            LinkStatus::Open
        }
    } else {
        LinkStatus::Closed
    }
}

/// Time premises fire on the window (last_check, now]; equality means the
/// target instant was crossed during the window.
fn check_system(premise: &Premise, view: &dyn StateView, last_check: Seconds) -> bool {
    let x = premise.value.round() as Seconds;
    match premise.variable {
        Variable::Time => {
            let (t1, t2) = (last_check, view.elapsed());
            match premise.relop {
                RelOp::Eq | RelOp::Is => x > t1 && x <= t2,
                RelOp::Ne | RelOp::Not => !(x > t1 && x <= t2),
                RelOp::Lt | RelOp::Below => t2 < x,
                RelOp::Le => t2 <= x,
                RelOp::Gt | RelOp::Above => t2 > x,
                RelOp::Ge => t2 >= x,
            }
        }
        Variable::ClockTime => {
            let elapsed = view.elapsed() - last_check;
            let t2 = view.clock();
            let t1 = (t2 - elapsed).rem_euclid(SECS_PER_DAY);
            let x = x.rem_euclid(SECS_PER_DAY);
            let crossed = if t1 <= t2 {
                x > t1 && x <= t2
            } else {
                // the window wraps midnight
                x > t1 || x <= t2
            };
            match premise.relop {
                RelOp::Eq | RelOp::Is => crossed,
                RelOp::Ne | RelOp::Not => !crossed,
                RelOp::Lt | RelOp::Below => t2 < x,
                RelOp::Le => t2 <= x,
                RelOp::Gt | RelOp::Above => t2 > x,
                RelOp::Ge => t2 >= x,
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_core::Idx;

    struct FakeView {
        level: f64,
        flow: f64,
        status: LinkStatus,
        elapsed: Seconds,
        clock: Seconds,
    }

    impl StateView for FakeView {
        fn node_demand(&self, _: NodeIdx) -> f64 {
            0.0
        }
        fn node_head(&self, _: NodeIdx) -> f64 {
            0.0
        }
        fn node_pressure(&self, _: NodeIdx) -> f64 {
            0.0
        }
        fn tank_level(&self, _: NodeIdx) -> f64 {
            self.level
        }
        fn node_quality(&self, _: NodeIdx) -> f64 {
            0.0
        }
        fn link_flow(&self, _: LinkIdx) -> f64 {
            self.flow
        }
        fn link_status(&self, _: LinkIdx) -> LinkStatus {
            self.status
        }
        fn link_setting(&self, _: LinkIdx) -> f64 {
            0.0
        }
        fn elapsed(&self) -> Seconds {
            self.elapsed
        }
        fn clock(&self) -> Seconds {
            self.clock
        }
    }

    fn level_rule(threshold: f64, priority: f64, link: usize) -> Rule {
        Rule {
            label: format!("r{link}"),
            priority,
            premises: vec![Premise {
                logop: LogOp::If,
                object: Object::Node(Idx::from_index(1)),
                variable: Variable::Level,
                relop: RelOp::Below,
                status: None,
                value: threshold,
            }],
            then_actions: vec![Action {
                link: Idx::from_index(link),
                status: Some(LinkStatus::Open),
                setting: None,
            }],
            else_actions: vec![Action {
                link: Idx::from_index(link),
                status: Some(LinkStatus::Closed),
                setting: None,
            }],
        }
    }

    fn view(level: f64) -> FakeView {
        FakeView {
            level,
            flow: 0.0,
            status: LinkStatus::Open,
            elapsed: 0,
            clock: 0,
        }
    }

    #[test]
    fn then_vs_else_branch() {
        let mut set = RuleSet::new();
        set.add(level_rule(10.0, 0.0, 0));

        let acts = set.evaluate(&view(50.0), 0);
        assert_eq!(acts.len(), 1);
        assert_eq!(acts[0].action.status, Some(LinkStatus::Closed));

        let acts = set.evaluate(&view(5.0), 0);
        assert_eq!(acts[0].action.status, Some(LinkStatus::Open));
    }

    #[test]
    fn higher_priority_wins_same_link() {
        let mut set = RuleSet::new();
        set.add(level_rule(100.0, 1.0, 0)); // fires THEN -> Open
        let mut closer = level_rule(100.0, 2.0, 0);
        closer.then_actions[0].status = Some(LinkStatus::Closed);
        set.add(closer);

        let acts = set.evaluate(&view(5.0), 0);
        assert_eq!(acts.len(), 1);
        assert_eq!(acts[0].action.status, Some(LinkStatus::Closed));
        assert_eq!(acts[0].rule, 1);
    }

    #[test]
    fn ties_break_by_definition_order() {
        let mut set = RuleSet::new();
        set.add(level_rule(100.0, 1.0, 0));
        let mut second = level_rule(100.0, 1.0, 0);
        second.then_actions[0].status = Some(LinkStatus::Closed);
        set.add(second);

        let acts = set.evaluate(&view(5.0), 0);
        assert_eq!(acts[0].rule, 0);
        assert_eq!(acts[0].action.status, Some(LinkStatus::Open));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        // IF level below 10 OR level above 90 AND flow above 5
        // parses as: (below 10) OR ((above 90) AND (flow above 5))
        let rule = Rule {
            label: "combo".into(),
            priority: 0.0,
            premises: vec![
                Premise {
                    logop: LogOp::If,
                    object: Object::Node(Idx::from_index(0)),
                    variable: Variable::Level,
                    relop: RelOp::Below,
                    status: None,
                    value: 10.0,
                },
                Premise {
                    logop: LogOp::Or,
                    object: Object::Node(Idx::from_index(0)),
                    variable: Variable::Level,
                    relop: RelOp::Above,
                    status: None,
                    value: 90.0,
                },
                Premise {
                    logop: LogOp::And,
                    object: Object::Link(Idx::from_index(0)),
                    variable: Variable::Flow,
                    relop: RelOp::Above,
                    status: None,
                    value: 5.0,
                },
            ],
            then_actions: vec![Action {
                link: Idx::from_index(0),
                status: Some(LinkStatus::Open),
                setting: None,
            }],
            else_actions: vec![],
        };
        let mut set = RuleSet::new();
        set.add(rule);

        // level 95, flow 10: second branch holds
        let v = FakeView {
            level: 95.0,
            flow: 10.0,
            status: LinkStatus::Open,
            elapsed: 0,
            clock: 0,
        };
        assert_eq!(set.evaluate(&v, 0).len(), 1);

        // level 95, flow 1: AND clause fails, OR already consumed
        let v = FakeView {
            level: 95.0,
            flow: 1.0,
            status: LinkStatus::Open,
            elapsed: 0,
            clock: 0,
        };
        assert_eq!(set.evaluate(&v, 0).len(), 0);

        // level 5 satisfies the opening clause on its own; the AND only
        // binds to the OR'd clause after it
        let v = FakeView {
            level: 5.0,
            flow: 1.0,
            status: LinkStatus::Open,
            elapsed: 0,
            clock: 0,
        };
        assert_eq!(set.evaluate(&v, 0).len(), 1);
    }

    #[test]
    fn failed_and_chain_still_yields_to_or() {
        // IF level below 10 AND flow above 5 OR level above 40
        // parses as: ((below 10) AND (above 5)) OR (above 40)
        let rule = Rule {
            label: "or-rescue".into(),
            priority: 0.0,
            premises: vec![
                Premise {
                    logop: LogOp::If,
                    object: Object::Node(Idx::from_index(0)),
                    variable: Variable::Level,
                    relop: RelOp::Below,
                    status: None,
                    value: 10.0,
                },
                Premise {
                    logop: LogOp::And,
                    object: Object::Link(Idx::from_index(0)),
                    variable: Variable::Flow,
                    relop: RelOp::Above,
                    status: None,
                    value: 5.0,
                },
                Premise {
                    logop: LogOp::Or,
                    object: Object::Node(Idx::from_index(0)),
                    variable: Variable::Level,
                    relop: RelOp::Above,
                    status: None,
                    value: 40.0,
                },
            ],
            then_actions: vec![Action {
                link: Idx::from_index(0),
                status: Some(LinkStatus::Open),
                setting: None,
            }],
            else_actions: vec![],
        };
        let mut set = RuleSet::new();
        set.add(rule);

        // level 50: the AND clause fails at its first premise, but the OR
        // clause holds on its own
        let v = FakeView {
            level: 50.0,
            flow: 0.0,
            status: LinkStatus::Open,
            elapsed: 0,
            clock: 0,
        };
        assert_eq!(set.evaluate(&v, 0).len(), 1);

        // level 20: both clauses fail
        let v = FakeView {
            level: 20.0,
            flow: 0.0,
            status: LinkStatus::Open,
            elapsed: 0,
            clock: 0,
        };
        assert_eq!(set.evaluate(&v, 0).len(), 0);

        // level 5, flow 10: the AND clause carries it
        let v = FakeView {
            level: 5.0,
            flow: 10.0,
            status: LinkStatus::Open,
            elapsed: 0,
            clock: 0,
        };
        assert_eq!(set.evaluate(&v, 0).len(), 1);
    }

    #[test]
    fn clocktime_crossing_fires_once() {
        let premise = Premise {
            logop: LogOp::If,
            object: Object::System,
            variable: Variable::ClockTime,
            relop: RelOp::Is,
            status: None,
            value: 6.0 * 3600.0,
        };
        let rule = Rule {
            label: "clock".into(),
            priority: 0.0,
            premises: vec![premise],
            then_actions: vec![Action {
                link: Idx::from_index(0),
                status: Some(LinkStatus::Open),
                setting: None,
            }],
            else_actions: vec![],
        };
        let mut set = RuleSet::new();
        set.add(rule);

        // window 5:00 -> 7:00 crosses 6:00
        let v = FakeView {
            level: 0.0,
            flow: 0.0,
            status: LinkStatus::Open,
            elapsed: 7 * 3600,
            clock: 7 * 3600,
        };
        assert_eq!(set.evaluate(&v, 5 * 3600).len(), 1);

        // window 7:00 -> 8:00 does not
        let v = FakeView {
            level: 0.0,
            flow: 0.0,
            status: LinkStatus::Open,
            elapsed: 8 * 3600,
            clock: 8 * 3600,
        };
        assert_eq!(set.evaluate(&v, 7 * 3600).len(), 0);
    }
}
