//! Rule data model and the rule set container.

use aq_core::{LinkIdx, NodeIdx};
use aq_network::LinkStatus;

use crate::error::{RuleError, RuleResult};

/// How a premise combines with the running result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOp {
    If,
    And,
    Or,
}

/// What a premise or action refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Object {
    Node(NodeIdx),
    Link(LinkIdx),
    System,
}

/// State variable read by a premise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Variable {
    Demand = 0,
    Head = 1,
    Grade = 2,
    Level = 3,
    Pressure = 4,
    Flow = 5,
    Status = 6,
    Setting = 7,
    Quality = 8,
    Time = 9,
    ClockTime = 10,
}

impl Variable {
    pub fn from_value(v: u8) -> Option<Self> {
        use Variable::*;
        [
            Demand, Head, Grade, Level, Pressure, Flow, Status, Setting, Quality, Time, ClockTime,
        ]
        .into_iter()
        .find(|x| *x as u8 == v)
    }
}

/// Relational operator in a premise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RelOp {
    Eq = 0,
    Ne = 1,
    Le = 2,
    Ge = 3,
    Lt = 4,
    Gt = 5,
    Is = 6,
    Not = 7,
    Below = 8,
    Above = 9,
}

impl RelOp {
    pub fn from_value(v: u8) -> Option<Self> {
        use RelOp::*;
        [Eq, Ne, Le, Ge, Lt, Gt, Is, Not, Below, Above]
            .into_iter()
            .find(|x| *x as u8 == v)
    }

    /// Compare two numbers under this operator (word forms map to their
    /// symbolic equivalents).
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        const TOL: f64 = 0.001;
        match self {
            RelOp::Eq | RelOp::Is => (lhs - rhs).abs() < TOL,
            RelOp::Ne | RelOp::Not => (lhs - rhs).abs() >= TOL,
            RelOp::Le => lhs <= rhs + TOL,
            RelOp::Ge => lhs >= rhs - TOL,
            RelOp::Lt | RelOp::Below => lhs < rhs + TOL,
            RelOp::Gt | RelOp::Above => lhs > rhs - TOL,
        }
    }
}

/// One premise of a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Premise {
    pub logop: LogOp,
    pub object: Object,
    pub variable: Variable,
    pub relop: RelOp,
    /// Compared against for STATUS premises.
    pub status: Option<LinkStatus>,
    /// Compared against for numeric premises (internal units; seconds for
    /// time variables).
    pub value: f64,
}

/// One THEN or ELSE action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Action {
    pub link: LinkIdx,
    pub status: Option<LinkStatus>,
    pub setting: Option<f64>,
}

/// A named rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub label: String,
    pub priority: f64,
    pub premises: Vec<Premise>,
    pub then_actions: Vec<Action>,
    pub else_actions: Vec<Action>,
}

/// Ordered collection of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn add(&mut self, rule: Rule) -> usize {
        self.rules.push(rule);
        self.rules.len() - 1
    }

    pub fn rule(&self, index: usize) -> RuleResult<&Rule> {
        self.rules.get(index).ok_or(RuleError::Undefined)
    }

    pub fn rule_mut(&mut self, index: usize) -> RuleResult<&mut Rule> {
        self.rules.get_mut(index).ok_or(RuleError::Undefined)
    }

    pub fn delete(&mut self, index: usize) -> RuleResult<()> {
        if index >= self.rules.len() {
            return Err(RuleError::Undefined);
        }
        self.rules.remove(index);
        Ok(())
    }

    // --- referential integrity on topology mutation ---

    pub fn references_node(&self, node: NodeIdx) -> bool {
        self.rules.iter().any(|r| {
            r.premises
                .iter()
                .any(|p| p.object == Object::Node(node))
        })
    }

    pub fn references_link(&self, link: LinkIdx) -> bool {
        self.rules.iter().any(|r| {
            r.premises.iter().any(|p| p.object == Object::Link(link))
                || r.then_actions.iter().any(|a| a.link == link)
                || r.else_actions.iter().any(|a| a.link == link)
        })
    }

    /// Remove every premise referencing the node, then drop rules left
    /// without premises.
    pub fn purge_node(&mut self, node: NodeIdx) {
        for rule in &mut self.rules {
            rule.premises.retain(|p| p.object != Object::Node(node));
        }
        self.rules.retain(|r| !r.premises.is_empty());
    }

    /// Remove every premise and action referencing the link, then drop
    /// rules left without premises or without THEN actions.
    pub fn purge_link(&mut self, link: LinkIdx) {
        for rule in &mut self.rules {
            rule.premises.retain(|p| p.object != Object::Link(link));
            rule.then_actions.retain(|a| a.link != link);
            rule.else_actions.retain(|a| a.link != link);
        }
        self.rules
            .retain(|r| !r.premises.is_empty() && !r.then_actions.is_empty());
    }

    /// A junction was inserted at `from`: bump stored node indices.
    pub fn shift_node_up(&mut self, from: usize) {
        for rule in &mut self.rules {
            for p in &mut rule.premises {
                if let Object::Node(n) = &mut p.object {
                    if n.index() >= from {
                        *n = aq_core::Idx::from_index(n.index() + 1);
                    }
                }
            }
        }
    }

    /// A node was removed at `removed`: pull higher node indices down.
    pub fn shift_node_down(&mut self, removed: usize) {
        for rule in &mut self.rules {
            for p in &mut rule.premises {
                if let Object::Node(n) = &mut p.object {
                    if n.index() > removed {
                        *n = aq_core::Idx::from_index(n.index() - 1);
                    }
                }
            }
        }
    }

    /// A link was removed at `removed`: pull higher link indices down.
    pub fn shift_link_down(&mut self, removed: usize) {
        for rule in &mut self.rules {
            for p in &mut rule.premises {
                if let Object::Link(l) = &mut p.object {
                    if l.index() > removed {
                        *l = aq_core::Idx::from_index(l.index() - 1);
                    }
                }
            }
            for a in rule
                .then_actions
                .iter_mut()
                .chain(rule.else_actions.iter_mut())
            {
                if a.link.index() > removed {
                    a.link = aq_core::Idx::from_index(a.link.index() - 1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_core::Idx;

    fn rule_on(link: usize) -> Rule {
        Rule {
            label: "r".into(),
            priority: 0.0,
            premises: vec![Premise {
                logop: LogOp::If,
                object: Object::System,
                variable: Variable::Time,
                relop: RelOp::Ge,
                status: None,
                value: 0.0,
            }],
            then_actions: vec![Action {
                link: Idx::from_index(link),
                status: Some(LinkStatus::Closed),
                setting: None,
            }],
            else_actions: vec![],
        }
    }

    #[test]
    fn relop_word_forms() {
        assert!(RelOp::Below.holds(5.0, 10.0));
        assert!(!RelOp::Below.holds(10.0, 5.0));
        assert!(RelOp::Above.holds(10.0, 5.0));
        assert!(RelOp::Is.holds(3.0, 3.0));
        assert!(RelOp::Not.holds(3.0, 4.0));
    }

    #[test]
    fn purge_link_drops_actionless_rules() {
        let mut set = RuleSet::new();
        set.add(rule_on(0));
        set.add(rule_on(1));
        set.purge_link(Idx::from_index(0));
        assert_eq!(set.len(), 1);
        assert_eq!(set.rules()[0].then_actions[0].link.index(), 1);
        set.shift_link_down(0);
        assert_eq!(set.rules()[0].then_actions[0].link.index(), 0);
    }

    #[test]
    fn references_link_sees_actions() {
        let mut set = RuleSet::new();
        set.add(rule_on(2));
        assert!(set.references_link(Idx::from_index(2)));
        assert!(!set.references_link(Idx::from_index(1)));
    }
}
