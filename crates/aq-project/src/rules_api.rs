//! Rule-editing operations.

use aq_rules::{Action, Premise, parse_rule};

use crate::error::{ProjectError, ProjectResult};
use crate::project::Project;

impl Project {
    /// Parse multi-line rule text and append the rule; premise values are
    /// converted from user units as they enter.
    pub fn add_rule(&mut self, text: &str) -> ProjectResult<usize> {
        self.require_open()?;
        let mut rule = parse_rule(text, &self.network)?;
        aq_io::convert::rule_to_internal(&mut rule, &self.network, self.ucf());
        Ok(self.rules.add(rule) + 1)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Clause counts and priority: (premises, then-actions, else-actions,
    /// priority).
    pub fn rule_info(&self, index: usize) -> ProjectResult<(usize, usize, usize, f64)> {
        self.require_open()?;
        let rule = self.rules.rule(index.wrapping_sub(1))?;
        Ok((
            rule.premises.len(),
            rule.then_actions.len(),
            rule.else_actions.len(),
            rule.priority,
        ))
    }

    pub fn rule_id(&self, index: usize) -> ProjectResult<String> {
        self.require_open()?;
        Ok(self.rules.rule(index.wrapping_sub(1))?.label.clone())
    }

    pub fn set_rule_priority(&mut self, index: usize, priority: f64) -> ProjectResult<()> {
        self.require_open()?;
        self.rules.rule_mut(index.wrapping_sub(1))?.priority = priority;
        Ok(())
    }

    pub fn delete_rule(&mut self, index: usize) -> ProjectResult<()> {
        self.require_open()?;
        self.rules.delete(index.wrapping_sub(1))?;
        Ok(())
    }

    pub fn premise(&self, rule: usize, premise: usize) -> ProjectResult<Premise> {
        self.require_open()?;
        self.rules
            .rule(rule.wrapping_sub(1))?
            .premises
            .get(premise.wrapping_sub(1))
            .cloned()
            .ok_or(ProjectError::Rule(aq_rules::RuleError::ClauseOutOfRange))
    }

    pub fn set_premise(&mut self, rule: usize, premise: usize, value: Premise) -> ProjectResult<()> {
        self.require_open()?;
        let slot = self
            .rules
            .rule_mut(rule.wrapping_sub(1))?
            .premises
            .get_mut(premise.wrapping_sub(1))
            .ok_or(ProjectError::Rule(aq_rules::RuleError::ClauseOutOfRange))?;
        *slot = value;
        Ok(())
    }

    /// THEN action by 1-based position.
    pub fn then_action(&self, rule: usize, action: usize) -> ProjectResult<Action> {
        self.require_open()?;
        self.rules
            .rule(rule.wrapping_sub(1))?
            .then_actions
            .get(action.wrapping_sub(1))
            .copied()
            .ok_or(ProjectError::Rule(aq_rules::RuleError::ClauseOutOfRange))
    }

    pub fn set_then_action(&mut self, rule: usize, action: usize, value: Action) -> ProjectResult<()> {
        self.require_open()?;
        self.check_action(&value)?;
        let slot = self
            .rules
            .rule_mut(rule.wrapping_sub(1))?
            .then_actions
            .get_mut(action.wrapping_sub(1))
            .ok_or(ProjectError::Rule(aq_rules::RuleError::ClauseOutOfRange))?;
        *slot = value;
        Ok(())
    }

    /// ELSE action by 1-based position; always reads the ELSE list (see
    /// the release notes on this behavior).
    pub fn else_action(&self, rule: usize, action: usize) -> ProjectResult<Action> {
        self.require_open()?;
        self.rules
            .rule(rule.wrapping_sub(1))?
            .else_actions
            .get(action.wrapping_sub(1))
            .copied()
            .ok_or(ProjectError::Rule(aq_rules::RuleError::ClauseOutOfRange))
    }

    pub fn set_else_action(&mut self, rule: usize, action: usize, value: Action) -> ProjectResult<()> {
        self.require_open()?;
        self.check_action(&value)?;
        let slot = self
            .rules
            .rule_mut(rule.wrapping_sub(1))?
            .else_actions
            .get_mut(action.wrapping_sub(1))
            .ok_or(ProjectError::Rule(aq_rules::RuleError::ClauseOutOfRange))?;
        *slot = value;
        Ok(())
    }

    fn check_action(&self, action: &Action) -> ProjectResult<()> {
        let link = self
            .network
            .link(action.link)
            .ok_or(aq_network::NetworkError::UndefinedLink)?;
        if link.kind == aq_network::LinkKind::CvPipe {
            return Err(aq_network::NetworkError::ControlOnCheckValve.into());
        }
        Ok(())
    }
}
