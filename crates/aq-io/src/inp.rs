//! INP text reader.
//!
//! `[SECTION]`-delimited, whitespace-tokenized, `;` starts a comment. The
//! reader populates the store with values exactly as written (user units);
//! the project facade converts the whole model to internal units once the
//! unit system is known.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use aq_core::time::{SECS_PER_HOUR, Seconds, parse_clock};
use aq_core::units::{FlowUnits, HeadlossModel, PressureUnits, QualKind};
use aq_network::{
    Control, ControlKind, CurveKind, Demand, DemandModel, LinkKind, LinkStatus, MixModel,
    Network, NodeKind, Source, SourceKind, Statistic,
};
use aq_rules::{RuleSet, parse_rule};

use crate::error::{IoError, IoResult};
use crate::report::{ReportOptions, StatusLevel};

/// Everything an INP file defines.
#[derive(Debug, Clone, Default)]
pub struct ParsedModel {
    pub network: Network,
    pub rules: RuleSet,
    pub report: ReportOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Title,
    Junctions,
    Reservoirs,
    Tanks,
    Pipes,
    Pumps,
    Valves,
    Demands,
    Status,
    Patterns,
    Curves,
    Controls,
    Rules,
    Energy,
    Emitters,
    Quality,
    Sources,
    Reactions,
    Mixing,
    Times,
    Report,
    Options,
    Coordinates,
    Skip,
    None,
}

fn section_of(line: &str) -> Option<Section> {
    let name = line.trim().to_ascii_uppercase();
    Some(match name.as_str() {
        "[TITLE]" => Section::Title,
        "[JUNCTIONS]" => Section::Junctions,
        "[RESERVOIRS]" => Section::Reservoirs,
        "[TANKS]" => Section::Tanks,
        "[PIPES]" => Section::Pipes,
        "[PUMPS]" => Section::Pumps,
        "[VALVES]" => Section::Valves,
        "[DEMANDS]" => Section::Demands,
        "[STATUS]" => Section::Status,
        "[PATTERNS]" => Section::Patterns,
        "[CURVES]" => Section::Curves,
        "[CONTROLS]" => Section::Controls,
        "[RULES]" => Section::Rules,
        "[ENERGY]" => Section::Energy,
        "[EMITTERS]" => Section::Emitters,
        "[QUALITY]" => Section::Quality,
        "[SOURCES]" => Section::Sources,
        "[REACTIONS]" => Section::Reactions,
        "[MIXING]" => Section::Mixing,
        "[TIMES]" => Section::Times,
        "[REPORT]" => Section::Report,
        "[OPTIONS]" => Section::Options,
        "[COORDINATES]" => Section::Coordinates,
        "[TAGS]" | "[VERTICES]" | "[LABELS]" | "[BACKDROP]" => Section::Skip,
        "[END]" => Section::None,
        _ => return None,
    })
}

pub fn read_inp(path: &Path) -> IoResult<ParsedModel> {
    let file = File::open(path).map_err(|_| IoError::InputOpen)?;
    let model = parse(BufReader::new(file))?;
    tracing::debug!(
        nodes = model.network.n_nodes(),
        links = model.network.n_links(),
        rules = model.rules.len(),
        "parsed INP file"
    );
    Ok(model)
}

pub fn read_inp_str(text: &str) -> IoResult<ParsedModel> {
    parse(BufReader::new(text.as_bytes()))
}

struct Parser {
    model: ParsedModel,
    rule_texts: Vec<String>,
    fresh_patterns: std::collections::HashSet<String>,
    fresh_curves: std::collections::HashSet<String>,
    fresh_demands: std::collections::HashSet<String>,
    def_pattern_id: String,
}

fn parse<R: Read>(reader: BufReader<R>) -> IoResult<ParsedModel> {
    let mut state = Section::None;
    let mut p = Parser {
        model: ParsedModel::default(),
        rule_texts: Vec::new(),
        fresh_patterns: Default::default(),
        fresh_curves: Default::default(),
        fresh_demands: Default::default(),
        def_pattern_id: "1".to_string(),
    };
    let mut seen_end = false;

    for (line_no, raw) in reader.lines().enumerate() {
        let raw = raw.map_err(|_| IoError::InputOpen)?;
        if seen_end {
            break;
        }
        let line = match raw.find(';') {
            Some(pos) => &raw[..pos],
            None => &raw[..],
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('[') {
            match section_of(trimmed) {
                Some(Section::None) => seen_end = true,
                Some(s) => state = s,
                None => state = Section::Skip,
            }
            continue;
        }
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let lno = line_no + 1;
        match state {
            Section::Title => p.model.network.title.push(trimmed.to_string()),
            Section::Junctions => p.junction(&tokens, lno)?,
            Section::Reservoirs => p.reservoir(&tokens, lno)?,
            Section::Tanks => p.tank(&tokens, lno)?,
            Section::Pipes => p.pipe(&tokens, lno)?,
            Section::Pumps => p.pump(&tokens, lno)?,
            Section::Valves => p.valve(&tokens, lno)?,
            Section::Demands => p.demand(&tokens, lno)?,
            Section::Status => p.status(&tokens, lno)?,
            Section::Patterns => p.pattern(&tokens, lno)?,
            Section::Curves => p.curve(&tokens, lno)?,
            Section::Controls => p.control(&tokens, lno)?,
            Section::Rules => p.rule_line(trimmed),
            Section::Energy => p.energy(&tokens, lno)?,
            Section::Emitters => p.emitter(&tokens, lno)?,
            Section::Quality => p.quality(&tokens, lno)?,
            Section::Sources => p.source(&tokens, lno)?,
            Section::Reactions => p.reaction(&tokens, lno)?,
            Section::Mixing => p.mixing(&tokens, lno)?,
            Section::Times => p.times(&tokens, lno)?,
            Section::Report => p.report(&tokens, lno)?,
            Section::Options => p.option(&tokens, lno)?,
            Section::Coordinates => p.coordinate(&tokens, lno)?,
            Section::Skip | Section::Rules | Section::None => {}
        }
    }

    p.finish()
}

fn num(token: &str, lno: usize) -> IoResult<f64> {
    token
        .parse::<f64>()
        .map_err(|_| IoError::Syntax(format!("expected a number, found '{token}'"), lno))
}

/// Time values accept `h:m[:s]` or a number with an optional unit word.
fn time_value(tokens: &[&str], lno: usize) -> IoResult<Seconds> {
    let first = tokens
        .first()
        .ok_or_else(|| IoError::Syntax("missing time value".into(), lno))?;
    if first.contains(':') {
        return parse_clock(first)
            .ok_or_else(|| IoError::Syntax(format!("bad time value '{first}'"), lno));
    }
    let v = num(first, lno)?;
    let scale = match tokens.get(1).map(|s| s.to_ascii_uppercase()) {
        Some(u) if u.starts_with("SEC") => 1.0,
        Some(u) if u.starts_with("MIN") => 60.0,
        Some(u) if u.starts_with("HOUR") || u == "HRS" => 3600.0,
        Some(u) if u.starts_with("DAY") => 86400.0,
        Some(u) if u == "AM" || u == "PM" => {
            let mut secs = (v * 3600.0).round() as Seconds;
            if u == "PM" && secs < 12 * SECS_PER_HOUR {
                secs += 12 * SECS_PER_HOUR;
            }
            if u == "AM" && (12 * SECS_PER_HOUR..13 * SECS_PER_HOUR).contains(&secs) {
                secs -= 12 * SECS_PER_HOUR;
            }
            return Ok(secs);
        }
        _ => 3600.0,
    };
    Ok((v * scale).round() as Seconds)
}

impl Parser {
    fn net(&mut self) -> &mut Network {
        &mut self.model.network
    }

    fn pattern_ref(&mut self, id: &str) -> IoResult<aq_core::PatternIdx> {
        if let Some(idx) = self.model.network.find_pattern(id) {
            return Ok(idx);
        }
        Ok(self.net().add_pattern(id)?)
    }

    fn curve_ref(&mut self, id: &str) -> IoResult<aq_core::CurveIdx> {
        if let Some(idx) = self.model.network.find_curve(id) {
            return Ok(idx);
        }
        Ok(self.net().add_curve(id)?)
    }

    fn node_ref(&self, id: &str) -> IoResult<aq_core::NodeIdx> {
        self.model
            .network
            .find_node(id)
            .ok_or_else(|| IoError::Network(aq_network::NetworkError::UndefinedNode))
    }

    fn link_ref(&self, id: &str) -> IoResult<aq_core::LinkIdx> {
        self.model
            .network
            .find_link(id)
            .ok_or_else(|| IoError::Network(aq_network::NetworkError::UndefinedLink))
    }

    // id  elev  [demand]  [pattern]
    fn junction(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        let idx = self.net().add_node(t[0], NodeKind::Junction)?;
        let elev = t
            .get(1)
            .map(|s| num(s, lno))
            .transpose()?
            .unwrap_or(0.0);
        let base = t.get(2).map(|s| num(s, lno)).transpose()?.unwrap_or(0.0);
        let pattern = match t.get(3) {
            Some(id) => Some(self.pattern_ref(id)?),
            None => None,
        };
        let node = self.net().node_mut(idx).expect("node just added");
        node.elevation = elev;
        node.demands.clear();
        node.demands.push(Demand {
            base,
            pattern,
            name: String::new(),
        });
        Ok(())
    }

    // id  head  [pattern]
    fn reservoir(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        let idx = self.net().add_node(t[0], NodeKind::Reservoir)?;
        let head = t.get(1).map(|s| num(s, lno)).transpose()?.unwrap_or(0.0);
        let pattern = match t.get(2) {
            Some(id) => Some(self.pattern_ref(id)?),
            None => None,
        };
        self.net().node_mut(idx).expect("node just added").elevation = head;
        let tank = self.net().tank_of_mut(idx).expect("reservoir record");
        tank.h0 = head;
        tank.hmin = head;
        tank.hmax = head;
        tank.pattern = pattern;
        Ok(())
    }

    // id  elev  initlvl  minlvl  maxlvl  diam  [minvol]  [volcurve]
    fn tank(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 6 {
            return Err(IoError::Syntax("tank needs 6 fields".into(), lno));
        }
        let idx = self.net().add_node(t[0], NodeKind::Tank)?;
        let elev = num(t[1], lno)?;
        let h0 = num(t[2], lno)?;
        let hmin = num(t[3], lno)?;
        let hmax = num(t[4], lno)?;
        let diam = num(t[5], lno)?;
        let vmin = t.get(6).map(|s| num(s, lno)).transpose()?.unwrap_or(0.0);
        let vol_curve = match t.get(7) {
            Some(id) if *id != "*" => Some(self.curve_ref(id)?),
            _ => None,
        };
        self.net().node_mut(idx).expect("node just added").elevation = elev;
        let tank = self.net().tank_of_mut(idx).expect("tank record");
        // raw levels and diameter; the unit-conversion pass turns these into
        // absolute grades and a surface area
        tank.h0 = h0;
        tank.hmin = hmin;
        tank.hmax = hmax;
        tank.area = diam;
        tank.vmin = vmin;
        tank.vol_curve = vol_curve;
        if let Some(c) = vol_curve {
            self.net().curve_mut(c).expect("curve").kind = CurveKind::Volume;
        }
        Ok(())
    }

    // id  node1  node2  length  diam  roughness  [minorloss]  [status]
    fn pipe(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 6 {
            return Err(IoError::Syntax("pipe needs 6 fields".into(), lno));
        }
        let n1 = self.node_ref(t[1])?;
        let n2 = self.node_ref(t[2])?;
        let length = num(t[3], lno)?;
        let diam = num(t[4], lno)?;
        let rough = num(t[5], lno)?;
        let km = t.get(6).map(|s| num(s, lno)).transpose()?.unwrap_or(0.0);
        let mut kind = LinkKind::Pipe;
        let mut status = LinkStatus::Open;
        if let Some(word) = t.get(7) {
            match word.to_ascii_uppercase().as_str() {
                "CV" => kind = LinkKind::CvPipe,
                "CLOSED" => status = LinkStatus::Closed,
                "OPEN" => {}
                other => {
                    return Err(IoError::Syntax(format!("bad pipe status '{other}'"), lno));
                }
            }
        }
        let idx = self.net().add_link(t[0], kind, n1, n2)?;
        let link = self.net().link_mut(idx).expect("link just added");
        link.length = length;
        link.diameter = diam;
        link.kc = rough;
        link.km = km;
        link.init_status = status;
        Ok(())
    }

    // id  node1  node2  (HEAD curve | POWER hp | SPEED s | PATTERN p)...
    fn pump(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 3 {
            return Err(IoError::Syntax("pump needs end nodes".into(), lno));
        }
        let n1 = self.node_ref(t[1])?;
        let n2 = self.node_ref(t[2])?;
        let idx = self.net().add_link(t[0], LinkKind::Pump, n1, n2)?;
        let mut rest = t[3..].iter();
        while let Some(keyword) = rest.next() {
            let value = rest.next().ok_or_else(|| {
                IoError::Syntax(format!("pump keyword '{keyword}' needs a value"), lno)
            })?;
            match keyword.to_ascii_uppercase().as_str() {
                "HEAD" => {
                    let c = self.curve_ref(value)?;
                    self.net().curve_mut(c).expect("curve").kind = CurveKind::Pump;
                    let p = self.net().pump_index(idx).expect("pump record");
                    self.net().pumps[p].hcurve = Some(c);
                }
                "POWER" => {
                    let hp = num(value, lno)?;
                    if hp <= 0.0 {
                        return Err(IoError::Network(
                            aq_network::NetworkError::InvalidPumpData {
                                id: t[0].to_string(),
                            },
                        ));
                    }
                    let p = self.net().pump_index(idx).expect("pump record");
                    self.net().pumps[p].kind = aq_network::PumpKind::ConstHp;
                    self.net().link_mut(idx).expect("link").kc = hp;
                }
                "SPEED" => {
                    let speed = num(value, lno)?;
                    if speed < 0.0 {
                        return Err(IoError::Network(
                            aq_network::NetworkError::InvalidPumpData {
                                id: t[0].to_string(),
                            },
                        ));
                    }
                    // kc doubles as the initial speed until params are built
                    let link = self.net().link_mut(idx).expect("link");
                    link.init_status = if speed == 0.0 {
                        LinkStatus::Closed
                    } else {
                        LinkStatus::Open
                    };
                    if speed > 0.0 {
                        link.kc = speed;
                    }
                }
                "PATTERN" => {
                    let pat = self.pattern_ref(value)?;
                    let p = self.net().pump_index(idx).expect("pump record");
                    self.net().pumps[p].upat = Some(pat);
                }
                other => {
                    return Err(IoError::Syntax(format!("bad pump keyword '{other}'"), lno));
                }
            }
        }
        Ok(())
    }

    // id  node1  node2  diam  type  setting  [minorloss]
    fn valve(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 6 {
            return Err(IoError::Syntax("valve needs 6 fields".into(), lno));
        }
        let n1 = self.node_ref(t[1])?;
        let n2 = self.node_ref(t[2])?;
        let diam = num(t[3], lno)?;
        let kind = match t[4].to_ascii_uppercase().as_str() {
            "PRV" => LinkKind::Prv,
            "PSV" => LinkKind::Psv,
            "PBV" => LinkKind::Pbv,
            "FCV" => LinkKind::Fcv,
            "TCV" => LinkKind::Tcv,
            "GPV" => LinkKind::Gpv,
            other => {
                return Err(IoError::Syntax(format!("bad valve type '{other}'"), lno));
            }
        };
        let km = t.get(6).map(|s| num(s, lno)).transpose()?.unwrap_or(0.0);
        let idx = self.net().add_link(t[0], kind, n1, n2)?;
        if kind == LinkKind::Gpv {
            let c = self.curve_ref(t[5])?;
            self.net().curve_mut(c).expect("curve").kind = CurveKind::Hloss;
            let link = self.net().link_mut(idx).expect("link");
            link.kc = c.position() as f64;
            link.diameter = diam;
            link.km = km;
            link.init_status = LinkStatus::Open;
        } else {
            let setting = num(t[5], lno)?;
            let link = self.net().link_mut(idx).expect("link");
            link.kc = setting;
            link.diameter = diam;
            link.km = km;
            link.init_status = LinkStatus::Active;
        }
        Ok(())
    }

    // junction  demand  [pattern]
    fn demand(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 2 {
            return Err(IoError::Syntax("demand needs a value".into(), lno));
        }
        let idx = self.node_ref(t[0])?;
        if !self.model.network.is_junction(idx) {
            return Err(IoError::Network(aq_network::NetworkError::UndefinedNode));
        }
        let base = num(t[1], lno)?;
        let pattern = match t.get(2) {
            Some(id) => Some(self.pattern_ref(id)?),
            None => None,
        };
        // the first explicit demand replaces the [JUNCTIONS] entry;
        // further categories at the same junction accumulate
        let first = self.fresh_demands.insert(t[0].to_string());
        let node = self.net().node_mut(idx).expect("node");
        if first {
            node.demands.clear();
        }
        node.demands.push(Demand {
            base,
            pattern,
            name: String::new(),
        });
        Ok(())
    }

    // link  OPEN|CLOSED|setting
    fn status(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 2 {
            return Err(IoError::Syntax("status needs a value".into(), lno));
        }
        let idx = self.link_ref(t[0])?;
        let kind = self.model.network.link(idx).expect("link").kind;
        if kind == LinkKind::CvPipe {
            return Err(IoError::Network(
                aq_network::NetworkError::ControlOnCheckValve,
            ));
        }
        let link = self.net().link_mut(idx).expect("link");
        match t[1].to_ascii_uppercase().as_str() {
            "OPEN" => link.init_status = LinkStatus::Open,
            "CLOSED" => link.init_status = LinkStatus::Closed,
            value => {
                link.kc = num(value, lno)?;
                if kind.is_valve() {
                    link.init_status = LinkStatus::Active;
                }
            }
        }
        Ok(())
    }

    // id  factor...
    fn pattern(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 2 {
            return Err(IoError::Syntax("pattern needs factors".into(), lno));
        }
        let idx = self.pattern_ref(t[0])?;
        if self.fresh_patterns.insert(t[0].to_string()) {
            self.net().pattern_mut(idx).expect("pattern").factors.clear();
        }
        for tok in &t[1..] {
            let f = num(tok, lno)?;
            self.net().pattern_mut(idx).expect("pattern").factors.push(f);
        }
        Ok(())
    }

    // id  x  y [x y ...]
    fn curve(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 3 {
            return Err(IoError::Syntax("curve needs x and y".into(), lno));
        }
        let idx = self.curve_ref(t[0])?;
        if self.fresh_curves.insert(t[0].to_string()) {
            let curve = self.net().curve_mut(idx).expect("curve");
            curve.x.clear();
            curve.y.clear();
        }
        let mut pairs = t[1..].chunks_exact(2);
        for pair in &mut pairs {
            let x = num(pair[0], lno)?;
            let y = num(pair[1], lno)?;
            let curve = self.net().curve_mut(idx).expect("curve");
            curve.x.push(x);
            curve.y.push(y);
        }
        Ok(())
    }

    // LINK id status IF NODE id ABOVE|BELOW value
    // LINK id status AT TIME t / AT CLOCKTIME c [AM|PM]
    fn control(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 5 || !t[0].eq_ignore_ascii_case("LINK") {
            return Err(IoError::Syntax("malformed control".into(), lno));
        }
        let link = self.link_ref(t[1])?;
        if self.model.network.link(link).expect("link").kind == LinkKind::CvPipe {
            return Err(IoError::Network(
                aq_network::NetworkError::ControlOnCheckValve,
            ));
        }
        let mut status = LinkStatus::Open;
        let mut setting = aq_core::MISSING;
        match t[2].to_ascii_uppercase().as_str() {
            "OPEN" => status = LinkStatus::Open,
            "CLOSED" => status = LinkStatus::Closed,
            value => {
                setting = num(value, lno)?;
                status = LinkStatus::Active;
            }
        }
        match t[3].to_ascii_uppercase().as_str() {
            "IF" => {
                if t.len() < 7 || !t[4].eq_ignore_ascii_case("NODE") {
                    return Err(IoError::Syntax("malformed level control".into(), lno));
                }
                let node = self.node_ref(t[5])?;
                let kind = match t[6].to_ascii_uppercase().as_str() {
                    "ABOVE" => ControlKind::HiLevel,
                    "BELOW" => ControlKind::LowLevel,
                    other => {
                        return Err(IoError::Syntax(
                            format!("bad control trigger '{other}'"),
                            lno,
                        ));
                    }
                };
                let grade = num(
                    t.get(7)
                        .ok_or_else(|| IoError::Syntax("control needs a level".into(), lno))?,
                    lno,
                )?;
                self.net().add_control(Control {
                    kind,
                    link,
                    node: Some(node),
                    status,
                    setting,
                    grade,
                    time: 0,
                })?;
            }
            "AT" => {
                let word = t
                    .get(4)
                    .map(|s| s.to_ascii_uppercase())
                    .unwrap_or_default();
                let kind = match word.as_str() {
                    "TIME" => ControlKind::Timer,
                    "CLOCKTIME" => ControlKind::TimeOfDay,
                    other => {
                        return Err(IoError::Syntax(
                            format!("bad control trigger '{other}'"),
                            lno,
                        ));
                    }
                };
                let time = time_value(&t[5..], lno)?;
                self.net().add_control(Control {
                    kind,
                    link,
                    node: None,
                    status,
                    setting,
                    grade: 0.0,
                    time,
                })?;
            }
            other => {
                return Err(IoError::Syntax(
                    format!("bad control clause '{other}'"),
                    lno,
                ));
            }
        }
        Ok(())
    }

    fn rule_line(&mut self, line: &str) {
        let first = line.split_whitespace().next().unwrap_or("");
        if first.eq_ignore_ascii_case("RULE") || self.rule_texts.is_empty() {
            self.rule_texts.push(String::new());
        }
        let text = self.rule_texts.last_mut().expect("rule text started");
        text.push_str(line);
        text.push('\n');
    }

    // GLOBAL EFFIC|PRICE|PATTERN v / PUMP id EFFIC|PRICE|PATTERN v / DEMAND CHARGE v
    fn energy(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 3 {
            return Err(IoError::Syntax("malformed energy line".into(), lno));
        }
        match t[0].to_ascii_uppercase().as_str() {
            "GLOBAL" => match t[1].to_ascii_uppercase().as_str() {
                "EFFIC" | "EFFICIENCY" => self.net().options.epump_effic = num(t[2], lno)?,
                "PRICE" => self.net().options.eprice = num(t[2], lno)?,
                "PATTERN" => {
                    let pat = self.pattern_ref(t[2])?;
                    self.net().options.epat = Some(pat);
                }
                other => {
                    return Err(IoError::Syntax(format!("bad energy item '{other}'"), lno));
                }
            },
            "PUMP" => {
                if t.len() < 4 {
                    return Err(IoError::Syntax("malformed pump energy line".into(), lno));
                }
                let link = self.link_ref(t[1])?;
                let p = self
                    .model
                    .network
                    .pump_index(link)
                    .ok_or_else(|| IoError::Network(aq_network::NetworkError::UndefinedLink))?;
                match t[2].to_ascii_uppercase().as_str() {
                    "PRICE" => self.net().pumps[p].ecost = num(t[3], lno)?,
                    "PATTERN" => {
                        let pat = self.pattern_ref(t[3])?;
                        self.net().pumps[p].epat = Some(pat);
                    }
                    "EFFIC" | "EFFICIENCY" => {
                        let c = self.curve_ref(t[3])?;
                        self.net().curve_mut(c).expect("curve").kind = CurveKind::Effic;
                        self.net().pumps[p].ecurve = Some(c);
                    }
                    other => {
                        return Err(IoError::Syntax(format!("bad energy item '{other}'"), lno));
                    }
                }
            }
            "DEMAND" => self.net().options.demand_charge = num(t[2], lno)?,
            other => {
                return Err(IoError::Syntax(format!("bad energy item '{other}'"), lno));
            }
        }
        Ok(())
    }

    // junction  coefficient
    fn emitter(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 2 {
            return Err(IoError::Syntax("emitter needs a coefficient".into(), lno));
        }
        let idx = self.node_ref(t[0])?;
        let k = num(t[1], lno)?;
        if k < 0.0 {
            return Err(IoError::Network(aq_network::NetworkError::BadValue {
                what: "emitter coefficient",
            }));
        }
        self.net().node_mut(idx).expect("node").emitter = k;
        Ok(())
    }

    // node  initqual
    fn quality(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 2 {
            return Err(IoError::Syntax("quality needs a value".into(), lno));
        }
        let idx = self.node_ref(t[0])?;
        self.net().node_mut(idx).expect("node").init_qual = num(t[1], lno)?;
        Ok(())
    }

    // node  type  strength  [pattern]
    fn source(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 3 {
            return Err(IoError::Syntax("source needs type and strength".into(), lno));
        }
        let idx = self.node_ref(t[0])?;
        let kind = match t[1].to_ascii_uppercase().as_str() {
            "CONCEN" => SourceKind::Concen,
            "MASS" => SourceKind::Mass,
            "SETPOINT" => SourceKind::Setpoint,
            "FLOWPACED" => SourceKind::FlowPaced,
            other => {
                return Err(IoError::Syntax(format!("bad source type '{other}'"), lno));
            }
        };
        let base = num(t[2], lno)?;
        let pattern = match t.get(3) {
            Some(id) => Some(self.pattern_ref(id)?),
            None => None,
        };
        self.net().node_mut(idx).expect("node").source = Some(Source {
            kind,
            base,
            pattern,
        });
        Ok(())
    }

    // ORDER BULK|WALL|TANK n / GLOBAL BULK|WALL k / BULK|WALL link k /
    // TANK node k / LIMITING POTENTIAL c / ROUGHNESS CORRELATION f
    fn reaction(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 3 {
            return Err(IoError::Syntax("malformed reaction line".into(), lno));
        }
        match t[0].to_ascii_uppercase().as_str() {
            "ORDER" => {
                let v = num(t[2], lno)?;
                match t[1].to_ascii_uppercase().as_str() {
                    "BULK" => self.net().options.bulk_order = v,
                    "WALL" => {
                        if v != 0.0 && v != 1.0 {
                            return Err(IoError::Network(aq_network::NetworkError::BadValue {
                                what: "wall reaction order",
                            }));
                        }
                        self.net().options.wall_order = v;
                    }
                    "TANK" => self.net().options.tank_order = v,
                    other => {
                        return Err(IoError::Syntax(format!("bad order kind '{other}'"), lno));
                    }
                }
            }
            "GLOBAL" => {
                let v = num(t[2], lno)?;
                match t[1].to_ascii_uppercase().as_str() {
                    "BULK" => self.net().options.kbulk = v,
                    "WALL" => self.net().options.kwall = v,
                    other => {
                        return Err(IoError::Syntax(format!("bad global kind '{other}'"), lno));
                    }
                }
            }
            "BULK" => {
                let idx = self.link_ref(t[1])?;
                self.net().link_mut(idx).expect("link").kb = num(t[2], lno)?;
            }
            "WALL" => {
                let idx = self.link_ref(t[1])?;
                self.net().link_mut(idx).expect("link").kw = num(t[2], lno)?;
            }
            "TANK" => {
                let idx = self.node_ref(t[1])?;
                let kb = num(t[2], lno)?;
                let tank = self
                    .net()
                    .tank_of_mut(idx)
                    .ok_or_else(|| IoError::Network(aq_network::NetworkError::UndefinedNode))?;
                tank.kb = kb;
            }
            "LIMITING" => self.net().options.climit = num(t[2], lno)?,
            "ROUGHNESS" => self.net().options.rfactor = num(t[2], lno)?,
            other => {
                return Err(IoError::Syntax(format!("bad reaction item '{other}'"), lno));
            }
        }
        Ok(())
    }

    // tank  MIXED|2COMP|FIFO|LIFO  [fraction]
    fn mixing(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 2 {
            return Err(IoError::Syntax("mixing needs a model".into(), lno));
        }
        let idx = self.node_ref(t[0])?;
        let model = match t[1].to_ascii_uppercase().as_str() {
            "MIXED" => MixModel::Mix1,
            "2COMP" => MixModel::Mix2,
            "FIFO" => MixModel::Fifo,
            "LIFO" => MixModel::Lifo,
            other => {
                return Err(IoError::Syntax(format!("bad mixing model '{other}'"), lno));
            }
        };
        let frac = t.get(2).map(|s| num(s, lno)).transpose()?.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&frac) || (model == MixModel::Mix2 && frac == 0.0) {
            return Err(IoError::Network(aq_network::NetworkError::BadValue {
                what: "mixing fraction",
            }));
        }
        let tank = self
            .net()
            .tank_of_mut(idx)
            .ok_or_else(|| IoError::Network(aq_network::NetworkError::UndefinedNode))?;
        tank.mix_model = model;
        tank.v1_frac = frac;
        Ok(())
    }

    fn times(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        let keyword = t[0].to_ascii_uppercase();
        let second = t.get(1).map(|s| s.to_ascii_uppercase()).unwrap_or_default();
        let times = &mut self.net().times;
        match (keyword.as_str(), second.as_str()) {
            ("DURATION", _) => times.duration = time_value(&t[1..], lno)?,
            ("HYDRAULIC", "TIMESTEP") => times.hstep = time_value(&t[2..], lno)?,
            ("QUALITY", "TIMESTEP") => times.qstep = time_value(&t[2..], lno)?,
            ("PATTERN", "TIMESTEP") => times.pstep = time_value(&t[2..], lno)?,
            ("PATTERN", "START") => times.pstart = time_value(&t[2..], lno)?,
            ("REPORT", "TIMESTEP") => times.rstep = time_value(&t[2..], lno)?,
            ("REPORT", "START") => times.rstart = time_value(&t[2..], lno)?,
            ("RULE", "TIMESTEP") => times.rulestep = time_value(&t[2..], lno)?,
            ("START", "CLOCKTIME") => times.start_clock = time_value(&t[2..], lno)?,
            ("STATISTIC", _) => {
                let s = t
                    .get(1)
                    .ok_or_else(|| IoError::Syntax("statistic needs a value".into(), lno))?;
                times.statistic = match s.to_ascii_uppercase().as_str() {
                    "NONE" => Statistic::Series,
                    "AVERAGE" | "AVERAGED" => Statistic::Average,
                    "MINIMUM" => Statistic::Minimum,
                    "MAXIMUM" => Statistic::Maximum,
                    "RANGE" => Statistic::Range,
                    other => {
                        return Err(IoError::Syntax(format!("bad statistic '{other}'"), lno));
                    }
                };
            }
            _ => {
                return Err(IoError::Syntax(format!("bad time option '{keyword}'"), lno));
            }
        }
        Ok(())
    }

    fn report(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        let report = &mut self.model.report;
        match t[0].to_ascii_uppercase().as_str() {
            "PAGE" | "PAGESIZE" => {
                report.page_size = num(
                    t.get(1)
                        .ok_or_else(|| IoError::Syntax("page needs a size".into(), lno))?,
                    lno,
                )? as usize;
            }
            "SUMMARY" => report.summary = yes_no(t.get(1), lno)?,
            "ENERGY" => report.energy = yes_no(t.get(1), lno)?,
            "STATUS" => {
                report.status = match t.get(1).map(|s| s.to_ascii_uppercase()).as_deref() {
                    Some("YES") => StatusLevel::Normal,
                    Some("NO") => StatusLevel::None,
                    Some("FULL") => StatusLevel::Full,
                    _ => return Err(IoError::Syntax("bad status option".into(), lno)),
                };
            }
            "NODES" => match t.get(1).map(|s| s.to_ascii_uppercase()).as_deref() {
                Some("ALL") => report.all_nodes = true,
                Some("NONE") => report.all_nodes = false,
                _ => {
                    for id in &t[1..] {
                        let idx = self.node_ref(id)?;
                        self.net().node_mut(idx).expect("node").report = true;
                    }
                }
            },
            "LINKS" => match t.get(1).map(|s| s.to_ascii_uppercase()).as_deref() {
                Some("ALL") => report.all_links = true,
                Some("NONE") => report.all_links = false,
                _ => {
                    for id in &t[1..] {
                        let idx = self.link_ref(id)?;
                        self.net().link_mut(idx).expect("link").report = true;
                    }
                }
            },
            // per-variable precision/filters are accepted but not retained
            _ => {}
        }
        Ok(())
    }

    fn option(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        let keyword = t[0].to_ascii_uppercase();
        match keyword.as_str() {
            "UNITS" => {
                let u = t
                    .get(1)
                    .and_then(|s| FlowUnits::parse(s))
                    .ok_or_else(|| IoError::Syntax("bad flow units".into(), lno))?;
                self.net().options.flow_units = u;
            }
            "PRESSURE" => {
                let p = match t.get(1).map(|s| s.to_ascii_uppercase()).as_deref() {
                    Some("PSI") => PressureUnits::Psi,
                    Some("KPA") => PressureUnits::Kpa,
                    Some("METERS") => PressureUnits::Meters,
                    Some("EXPONENT") => {
                        self.net().options.pexp = positive(t.get(2), lno)?;
                        return Ok(());
                    }
                    _ => return Err(IoError::Syntax("bad pressure units".into(), lno)),
                };
                self.net().options.pressure_units = p;
            }
            "HEADLOSS" => {
                let h = match t.get(1).map(|s| s.to_ascii_uppercase()).as_deref() {
                    Some("H-W") => HeadlossModel::HazenWilliams,
                    Some("D-W") => HeadlossModel::DarcyWeisbach,
                    Some("C-M") => HeadlossModel::ChezyManning,
                    _ => return Err(IoError::Syntax("bad headloss formula".into(), lno)),
                };
                self.net().options.headloss = h;
            }
            "QUALITY" => {
                match t.get(1).map(|s| s.to_ascii_uppercase()).as_deref() {
                    Some("NONE") => self.net().options.qual = QualKind::None,
                    Some("AGE") => self.net().options.qual = QualKind::Age,
                    Some("TRACE") => {
                        let id = t
                            .get(2)
                            .ok_or_else(|| IoError::Syntax("trace needs a node".into(), lno))?;
                        let idx = self.node_ref(id)?;
                        self.net().options.qual = QualKind::Trace;
                        self.net().options.trace_node = Some(idx);
                    }
                    Some(_) => {
                        self.net().options.qual = QualKind::Chem;
                        self.net().options.chem_name = t[1].to_string();
                        if let Some(units) = t.get(2) {
                            self.net().options.chem_units = units.to_string();
                        }
                    }
                    None => return Err(IoError::Syntax("bad quality option".into(), lno)),
                }
            }
            "VISCOSITY" => self.net().options.viscos = positive(t.get(1), lno)?,
            "DIFFUSIVITY" => self.net().options.diffus = positive(t.get(1), lno)?,
            "SPECIFIC" => self.net().options.spgrav = positive(t.get(2), lno)?,
            "TRIALS" => {
                self.net().options.trials = positive(t.get(1), lno)? as usize;
            }
            "ACCURACY" => self.net().options.accuracy = positive(t.get(1), lno)?,
            "HEADERROR" => self.net().options.head_error = positive(t.get(1), lno)?,
            "FLOWCHANGE" => self.net().options.flow_change = positive(t.get(1), lno)?,
            "TOLERANCE" => self.net().options.ctol = positive(t.get(1), lno)?,
            "CHECKFREQ" => self.net().options.check_freq = positive(t.get(1), lno)? as usize,
            "MAXCHECK" => self.net().options.max_check = positive(t.get(1), lno)? as usize,
            "DAMPLIMIT" => self.net().options.damp_limit = positive(t.get(1), lno)?,
            "EMITTER" => self.net().options.emit_expon = positive(t.get(2), lno)?,
            "DEMAND" => match t.get(1).map(|s| s.to_ascii_uppercase()).as_deref() {
                Some("MULTIPLIER") => self.net().options.demand_mult = positive(t.get(2), lno)?,
                Some("MODEL") => {
                    let m = match t.get(2).map(|s| s.to_ascii_uppercase()).as_deref() {
                        Some("DDA") => DemandModel::Dda,
                        Some("PDA") => DemandModel::Pda,
                        _ => return Err(IoError::Syntax("bad demand model".into(), lno)),
                    };
                    self.net().options.demand_model = m;
                }
                _ => return Err(IoError::Syntax("bad demand option".into(), lno)),
            },
            "MINIMUM" => {
                // MINIMUM PRESSURE
                self.net().options.pmin = num(
                    t.get(2)
                        .ok_or_else(|| IoError::Syntax("missing value".into(), lno))?,
                    lno,
                )?;
            }
            "REQUIRED" => {
                self.net().options.preq = num(
                    t.get(2)
                        .ok_or_else(|| IoError::Syntax("missing value".into(), lno))?,
                    lno,
                )?;
            }
            "PATTERN" => {
                self.def_pattern_id = t
                    .get(1)
                    .ok_or_else(|| IoError::Syntax("pattern needs an id".into(), lno))?
                    .to_string();
            }
            "UNBALANCED" | "MAP" | "HYDRAULICS" => {}
            _ => {
                return Err(IoError::Syntax(format!("bad option '{keyword}'"), lno));
            }
        }
        Ok(())
    }

    fn coordinate(&mut self, t: &[&str], lno: usize) -> IoResult<()> {
        if t.len() < 3 {
            return Err(IoError::Syntax("coordinates need x and y".into(), lno));
        }
        let idx = self.node_ref(t[0])?;
        let x = num(t[1], lno)?;
        let y = num(t[2], lno)?;
        self.net().node_mut(idx).expect("node").coords = Some((x, y));
        Ok(())
    }

    fn finish(mut self) -> IoResult<ParsedModel> {
        // default demand pattern: named by [OPTIONS] PATTERN, created on
        // demand, applied to every category without an explicit pattern
        let def_id = self.def_pattern_id.clone();
        let def = match self.model.network.find_pattern(&def_id) {
            Some(idx) => idx,
            None => self.net().add_pattern(&def_id)?,
        };
        self.net().options.def_pattern = Some(def);
        for node in 0..self.model.network.n_nodes() {
            let idx = aq_core::Idx::from_index(node);
            if !self.model.network.is_junction(idx) {
                continue;
            }
            let node = self.net().node_mut(idx).expect("node");
            for demand in &mut node.demands {
                if demand.pattern.is_none() {
                    demand.pattern = Some(def);
                }
            }
        }

        // rules parse once every element they reference exists
        for text in std::mem::take(&mut self.rule_texts) {
            let rule = parse_rule(&text, &self.model.network)?;
            self.model.rules.add(rule);
        }

        // pump characteristics derive from their curves
        for p in 0..self.model.network.n_pumps() {
            if self.model.network.pumps[p].kind == aq_network::PumpKind::ConstHp {
                self.model.network.update_pump_params(p)?;
            }
        }
        Ok(self.model)
    }
}

fn yes_no(token: Option<&&str>, lno: usize) -> IoResult<bool> {
    match token.map(|s| s.to_ascii_uppercase()).as_deref() {
        Some("YES") => Ok(true),
        Some("NO") => Ok(false),
        _ => Err(IoError::Syntax("expected YES or NO".into(), lno)),
    }
}

fn positive(token: Option<&&str>, lno: usize) -> IoResult<f64> {
    let tok = token.ok_or_else(|| IoError::Syntax("missing value".into(), lno))?;
    let v = num(tok, lno)?;
    if v <= 0.0 {
        return Err(IoError::Network(aq_network::NetworkError::BadValue {
            what: "option value",
        }));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = "\
[TITLE]
Small test system

[JUNCTIONS]
 J1   700   10
 J2   710   5   Day

[RESERVOIRS]
 R1   800

[TANKS]
 T1   850  15  5  25  40  0

[PIPES]
 P1   R1  J1  1000  12  100  0
 P2   J1  J2  2000  10  100  0
 P3   J2  T1  1500  10  100  0   CV

[PATTERNS]
 Day  1.0  1.2
 Day  0.8

[TIMES]
 DURATION 24:00
 HYDRAULIC TIMESTEP 1:00
 QUALITY TIMESTEP 0:05

[OPTIONS]
 UNITS GPM
 HEADLOSS H-W
 QUALITY Chlorine mg/L

[CONTROLS]
 LINK P2 CLOSED IF NODE T1 ABOVE 20
 LINK P2 OPEN AT CLOCKTIME 6 AM

[RULES]
 RULE R1
 IF TANK T1 LEVEL BELOW 8
 THEN LINK P2 STATUS = OPEN

[COORDINATES]
 J1  10.5  20.5

[END]
";

    #[test]
    fn parses_small_network() {
        let model = read_inp_str(SMALL).unwrap();
        let net = &model.network;
        assert_eq!(net.n_juncs(), 2);
        assert_eq!(net.n_tanks(), 2); // tank + reservoir
        assert_eq!(net.n_links(), 3);
        assert_eq!(net.n_pipes(), 3);
        assert_eq!(net.options.flow_units, FlowUnits::Gpm);
        assert_eq!(net.options.qual, QualKind::Chem);
        assert_eq!(net.options.chem_name, "Chlorine");
        assert_eq!(net.times.duration, 24 * 3600);
        assert_eq!(net.times.qstep, 300);
        assert_eq!(net.controls.len(), 2);
        assert_eq!(net.controls[1].time, 6 * 3600);
        assert_eq!(model.rules.len(), 1);

        // the CV pipe keeps its kind
        let p3 = net.find_link("P3").unwrap();
        assert_eq!(net.link(p3).unwrap().kind, LinkKind::CvPipe);

        // pattern accumulated across two lines
        let day = net.find_pattern("Day").unwrap();
        assert_eq!(net.pattern(day).unwrap().factors, vec![1.0, 1.2, 0.8]);

        // default pattern assigned where missing
        let j1 = net.find_node("J1").unwrap();
        let def = net.options.def_pattern.unwrap();
        assert_eq!(net.node(j1).unwrap().demands[0].pattern, Some(def));

        let coords = net.node(j1).unwrap().coords.unwrap();
        assert_eq!(coords, (10.5, 20.5));
    }

    #[test]
    fn unknown_node_in_pipe_fails() {
        let text = "[JUNCTIONS]\nJ1 0\n[PIPES]\nP1 J1 NOPE 100 12 100\n";
        assert!(read_inp_str(text).is_err());
    }

    #[test]
    fn tank_with_too_few_fields_fails() {
        let text = "[TANKS]\nT1 100 15\n";
        assert!(read_inp_str(text).is_err());
    }

    #[test]
    fn nonpositive_pump_power_is_invalid_pump_data() {
        let text = "\
[JUNCTIONS]
 J1 0
[RESERVOIRS]
 R1 100
[PUMPS]
 PU1 R1 J1 POWER 0
";
        let err = read_inp_str(text).unwrap_err();
        assert_eq!(err.code(), aq_core::Code::InvalidPumpData);
    }

    #[test]
    fn negative_pump_speed_is_invalid_pump_data() {
        let text = "\
[JUNCTIONS]
 J1 0
[RESERVOIRS]
 R1 100
[PUMPS]
 PU1 R1 J1 SPEED -0.5
";
        let err = read_inp_str(text).unwrap_err();
        assert_eq!(err.code(), aq_core::Code::InvalidPumpData);
    }
}
