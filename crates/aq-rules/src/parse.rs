//! Parser for multi-line rule text.
//!
//! Grammar (one clause per line, case-insensitive keywords):
//!
//! ```text
//! RULE <label>
//! IF   <object> [id] <variable> <relop> <value|status>
//! AND  <premise> / OR <premise>        (repeatable)
//! THEN <link> <id> STATUS|SETTING IS|= <status|value>
//! AND  <action>                        (repeatable)
//! ELSE <action> / AND <action>         (optional)
//! PRIORITY <number>                    (optional)
//! ```

use aq_core::time::parse_clock;
use aq_network::{LinkKind, LinkStatus, Network};

use crate::error::{RuleError, RuleResult};
use crate::rule::{Action, LogOp, Object, Premise, RelOp, Rule, Variable};

#[derive(PartialEq, Clone, Copy)]
enum Section {
    Start,
    If,
    Then,
    Else,
}

/// Parse one rule from its text form, resolving element IDs against the
/// network.
pub fn parse_rule(text: &str, net: &Network) -> RuleResult<Rule> {
    let mut rule = Rule {
        label: String::new(),
        priority: 0.0,
        premises: Vec::new(),
        then_actions: Vec::new(),
        else_actions: Vec::new(),
    };
    let mut section = Section::Start;

    for raw in text.lines() {
        let line = match raw.find(';') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        let keyword = tokens[0].to_ascii_uppercase();
        let rest = &tokens[1..];
        match keyword.as_str() {
            "RULE" => {
                if section != Section::Start || rest.is_empty() {
                    return Err(misplaced(line));
                }
                rule.label = rest[0].to_string();
                section = Section::If;
            }
            "IF" => {
                if section != Section::If || !rule.premises.is_empty() {
                    return Err(misplaced(line));
                }
                rule.premises.push(parse_premise(LogOp::If, rest, net, line)?);
            }
            "AND" | "OR" => {
                let logop = if keyword == "AND" { LogOp::And } else { LogOp::Or };
                match section {
                    Section::If if !rule.premises.is_empty() => {
                        rule.premises.push(parse_premise(logop, rest, net, line)?);
                    }
                    Section::Then if logop == LogOp::And => {
                        rule.then_actions.push(parse_action(rest, net, line)?);
                    }
                    Section::Else if logop == LogOp::And => {
                        rule.else_actions.push(parse_action(rest, net, line)?);
                    }
                    _ => return Err(misplaced(line)),
                }
            }
            "THEN" => {
                if section != Section::If || rule.premises.is_empty() {
                    return Err(misplaced(line));
                }
                rule.then_actions.push(parse_action(rest, net, line)?);
                section = Section::Then;
            }
            "ELSE" => {
                if section != Section::Then {
                    return Err(misplaced(line));
                }
                rule.else_actions.push(parse_action(rest, net, line)?);
                section = Section::Else;
            }
            "PRIORITY" => {
                if !matches!(section, Section::Then | Section::Else) || rest.is_empty() {
                    return Err(misplaced(line));
                }
                rule.priority = rest[0].parse().map_err(|_| syntax(line))?;
            }
            _ => return Err(syntax(line)),
        }
    }

    if rule.label.is_empty() || rule.premises.is_empty() || rule.then_actions.is_empty() {
        return Err(RuleError::Syntax {
            clause: text.trim().to_string(),
        });
    }
    Ok(rule)
}

fn misplaced(line: &str) -> RuleError {
    RuleError::Misplaced {
        clause: line.trim().to_string(),
    }
}

fn syntax(line: &str) -> RuleError {
    RuleError::Syntax {
        clause: line.trim().to_string(),
    }
}

fn parse_premise(
    logop: LogOp,
    tokens: &[&str],
    net: &Network,
    line: &str,
) -> RuleResult<Premise> {
    if tokens.len() < 3 {
        return Err(syntax(line));
    }
    let object_word = tokens[0].to_ascii_uppercase();
    let (object, rest) = match object_word.as_str() {
        "SYSTEM" => (Object::System, &tokens[1..]),
        "NODE" | "JUNCTION" | "RESERVOIR" | "TANK" => {
            let id = tokens.get(1).ok_or_else(|| syntax(line))?;
            let idx = net
                .find_node(id)
                .ok_or_else(|| RuleError::UndefinedNode { id: id.to_string() })?;
            (Object::Node(idx), &tokens[2..])
        }
        "LINK" | "PIPE" | "PUMP" | "VALVE" => {
            let id = tokens.get(1).ok_or_else(|| syntax(line))?;
            let idx = net
                .find_link(id)
                .ok_or_else(|| RuleError::UndefinedLink { id: id.to_string() })?;
            (Object::Link(idx), &tokens[2..])
        }
        _ => return Err(syntax(line)),
    };

    if rest.len() < 3 {
        return Err(syntax(line));
    }
    let variable = parse_variable(rest[0]).ok_or_else(|| syntax(line))?;
    let relop = parse_relop(rest[1]).ok_or_else(|| syntax(line))?;

    let value_token = rest[2];
    let mut premise = Premise {
        logop,
        object,
        variable,
        relop,
        status: None,
        value: 0.0,
    };

    if variable == Variable::Status {
        premise.status = Some(parse_status(value_token).ok_or_else(|| syntax(line))?);
    } else if matches!(variable, Variable::Time | Variable::ClockTime) {
        let mut secs = parse_clock(value_token).ok_or_else(|| syntax(line))? as f64;
        match rest.get(3).map(|s| s.to_ascii_uppercase()) {
            Some(ref am) if am == "AM" => {
                if secs >= 12.0 * 3600.0 && secs < 13.0 * 3600.0 {
                    secs -= 12.0 * 3600.0;
                }
            }
            Some(ref pm) if pm == "PM" => {
                if secs < 12.0 * 3600.0 {
                    secs += 12.0 * 3600.0;
                }
            }
            _ => {}
        }
        premise.value = secs;
    } else {
        premise.value = value_token.parse().map_err(|_| syntax(line))?;
    }
    Ok(premise)
}

fn parse_action(tokens: &[&str], net: &Network, line: &str) -> RuleResult<Action> {
    // <link-kind> <id> STATUS|SETTING IS|= <value|status>
    if tokens.len() < 4 {
        return Err(syntax(line));
    }
    let kind_word = tokens[0].to_ascii_uppercase();
    if !matches!(kind_word.as_str(), "LINK" | "PIPE" | "PUMP" | "VALVE") {
        return Err(syntax(line));
    }
    let id = tokens[1];
    let link = net
        .find_link(id)
        .ok_or_else(|| RuleError::UndefinedLink { id: id.to_string() })?;
    if net.link(link).map(|l| l.kind) == Some(LinkKind::CvPipe) {
        return Err(RuleError::ActionOnCheckValve { id: id.to_string() });
    }

    let attr = tokens[2].to_ascii_uppercase();
    let mut value_pos = 3;
    let connector = tokens[3].to_ascii_uppercase();
    if connector == "IS" || connector == "=" {
        value_pos = 4;
    }
    let value_token = tokens.get(value_pos).ok_or_else(|| syntax(line))?;

    match attr.as_str() {
        "STATUS" => Ok(Action {
            link,
            status: Some(parse_status(value_token).ok_or_else(|| syntax(line))?),
            setting: None,
        }),
        "SETTING" => Ok(Action {
            link,
            status: None,
            setting: Some(value_token.parse().map_err(|_| syntax(line))?),
        }),
        _ => Err(syntax(line)),
    }
}

fn parse_variable(word: &str) -> Option<Variable> {
    match word.to_ascii_uppercase().as_str() {
        "DEMAND" => Some(Variable::Demand),
        "HEAD" => Some(Variable::Head),
        "GRADE" => Some(Variable::Grade),
        "LEVEL" => Some(Variable::Level),
        "PRESSURE" => Some(Variable::Pressure),
        "FLOW" => Some(Variable::Flow),
        "STATUS" => Some(Variable::Status),
        "SETTING" => Some(Variable::Setting),
        "QUALITY" => Some(Variable::Quality),
        "TIME" => Some(Variable::Time),
        "CLOCKTIME" => Some(Variable::ClockTime),
        _ => None,
    }
}

fn parse_relop(word: &str) -> Option<RelOp> {
    match word.to_ascii_uppercase().as_str() {
        "=" => Some(RelOp::Eq),
        "<>" => Some(RelOp::Ne),
        "<=" => Some(RelOp::Le),
        ">=" => Some(RelOp::Ge),
        "<" => Some(RelOp::Lt),
        ">" => Some(RelOp::Gt),
        "IS" => Some(RelOp::Is),
        "NOT" => Some(RelOp::Not),
        "BELOW" => Some(RelOp::Below),
        "ABOVE" => Some(RelOp::Above),
        _ => None,
    }
}

fn parse_status(word: &str) -> Option<LinkStatus> {
    match word.to_ascii_uppercase().as_str() {
        "OPEN" => Some(LinkStatus::Open),
        "CLOSED" => Some(LinkStatus::Closed),
        "ACTIVE" => Some(LinkStatus::Active),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_network::NodeKind;

    fn test_net() -> Network {
        let mut net = Network::new();
        let j1 = net.add_node("J1", NodeKind::Junction).unwrap();
        let t1 = net.add_node("T1", NodeKind::Tank).unwrap();
        net.add_link("P1", LinkKind::Pump, j1, t1).unwrap();
        net
    }

    #[test]
    fn parse_level_rule() {
        let net = test_net();
        let text = "RULE R1\n\
                    IF TANK T1 LEVEL BELOW 10\n\
                    THEN PUMP P1 STATUS = OPEN\n\
                    ELSE PUMP P1 STATUS = CLOSED\n\
                    PRIORITY 2";
        let rule = parse_rule(text, &net).unwrap();
        assert_eq!(rule.label, "R1");
        assert_eq!(rule.priority, 2.0);
        assert_eq!(rule.premises.len(), 1);
        assert_eq!(rule.premises[0].relop, RelOp::Below);
        assert_eq!(rule.then_actions[0].status, Some(LinkStatus::Open));
        assert_eq!(rule.else_actions[0].status, Some(LinkStatus::Closed));
    }

    #[test]
    fn parse_clocktime_pm() {
        let net = test_net();
        let text = "RULE R2\n\
                    IF SYSTEM CLOCKTIME >= 6 PM\n\
                    THEN PUMP P1 STATUS IS CLOSED";
        let rule = parse_rule(text, &net).unwrap();
        assert_eq!(rule.premises[0].variable, Variable::ClockTime);
        assert_eq!(rule.premises[0].value, 18.0 * 3600.0);
    }

    #[test]
    fn parse_setting_action_without_is() {
        let net = test_net();
        let text = "RULE R3\n\
                    IF SYSTEM TIME >= 1:00\n\
                    THEN PUMP P1 SETTING = 0.8";
        let rule = parse_rule(text, &net).unwrap();
        assert_eq!(rule.premises[0].value, 3600.0);
        assert_eq!(rule.then_actions[0].setting, Some(0.8));
    }

    #[test]
    fn misplaced_clause_rejected() {
        let net = test_net();
        let text = "RULE R4\n\
                    THEN PUMP P1 STATUS = OPEN";
        assert!(matches!(
            parse_rule(text, &net),
            Err(RuleError::Misplaced { .. })
        ));
    }

    #[test]
    fn unknown_link_rejected() {
        let net = test_net();
        let text = "RULE R5\n\
                    IF SYSTEM TIME >= 0\n\
                    THEN PUMP NOPE STATUS = OPEN";
        assert!(matches!(
            parse_rule(text, &net),
            Err(RuleError::UndefinedLink { .. })
        ));
    }

    #[test]
    fn and_or_premises_accumulate() {
        let net = test_net();
        let text = "RULE R6\n\
                    IF TANK T1 LEVEL BELOW 10\n\
                    OR TANK T1 LEVEL ABOVE 90\n\
                    AND PUMP P1 FLOW > 2\n\
                    THEN PUMP P1 STATUS = CLOSED";
        let rule = parse_rule(text, &net).unwrap();
        assert_eq!(rule.premises.len(), 3);
        assert_eq!(rule.premises[1].logop, LogOp::Or);
        assert_eq!(rule.premises[2].logop, LogOp::And);
    }
}
