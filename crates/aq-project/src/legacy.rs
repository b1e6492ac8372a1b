//! Legacy facade: a hidden process-wide default project.
//!
//! Callers that predate explicit handles drive one lazily created project
//! through free functions returning integer codes (0 = success, 1-6 =
//! warnings, 100+ = errors). Concurrent use from multiple threads is
//! unsupported: calls serialize on an internal lock, but interleaved
//! lifecycle calls from different threads will see each other's state.

use std::sync::{Mutex, OnceLock};

use aq_core::Warn;
use aq_network::NodeKind;

use crate::enums::{ActionCode, CountType, InitHydFlag, LinkProperty, NodeProperty, OptionParam, TimeParam};
use crate::error::ProjectResult;
use crate::project::Project;

static DEFAULT: OnceLock<Mutex<Option<Project>>> = OnceLock::new();

fn with_project<T>(f: impl FnOnce(&mut Project) -> ProjectResult<T>) -> Result<T, i32> {
    let cell = DEFAULT.get_or_init(|| Mutex::new(None));
    let mut guard = match cell.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    if guard.is_none() {
        match Project::new() {
            Ok(p) => *guard = Some(p),
            Err(e) => return Err(e.code().value() as i32),
        }
    }
    let project = guard.as_mut().expect("default project exists");
    f(project).map_err(|e| e.code().value() as i32)
}

fn code_of(result: Result<(), i32>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(code) => code,
    }
}

fn warn_code(result: Result<Option<Warn>, i32>) -> i32 {
    match result {
        Ok(Some(w)) => w.value() as i32,
        Ok(None) => 0,
        Err(code) => code,
    }
}

// --- lifecycle ---

pub fn en_open(inp: &str, rpt: &str, out: &str) -> i32 {
    code_of(with_project(|p| p.open(inp, rpt, out)))
}

pub fn en_init(rpt: &str, out: &str, units: i32, headloss: i32) -> i32 {
    code_of(with_project(|p| {
        let units = aq_core::units::FlowUnits::from_value(units as u8)
            .ok_or(crate::ProjectError::CodeOutOfRange)?;
        let headloss = aq_core::units::HeadlossModel::from_value(headloss as u8)
            .ok_or(crate::ProjectError::CodeOutOfRange)?;
        p.init(rpt, out, units, headloss)
    }))
}

pub fn en_close() -> i32 {
    code_of(with_project(|p| p.close()))
}

pub fn en_runproject(inp: &str, rpt: &str, out: &str) -> i32 {
    warn_code(with_project(|p| p.run_project(inp, rpt, out)))
}

pub fn en_saveinpfile(path: &str) -> i32 {
    code_of(with_project(|p| p.save_inp_file(path)))
}

// --- hydraulics ---

pub fn en_solveh() -> i32 {
    warn_code(with_project(|p| p.solve_h()))
}

pub fn en_saveh() -> i32 {
    code_of(with_project(|p| p.save_h()))
}

pub fn en_openh() -> i32 {
    code_of(with_project(|p| p.open_h()))
}

pub fn en_inith(flag: i32) -> i32 {
    code_of(with_project(|p| p.init_h(InitHydFlag::try_from(flag)?)))
}

pub fn en_runh(t: &mut i64) -> i32 {
    match with_project(|p| p.run_h()) {
        Ok(time) => {
            *t = time;
            0
        }
        Err(code) => code,
    }
}

pub fn en_nexth(tstep: &mut i64) -> i32 {
    match with_project(|p| p.next_h()) {
        Ok(step) => {
            *tstep = step;
            0
        }
        Err(code) => code,
    }
}

pub fn en_closeh() -> i32 {
    code_of(with_project(|p| p.close_h()))
}

pub fn en_savehydfile(path: &str) -> i32 {
    code_of(with_project(|p| p.save_hyd_file(path)))
}

pub fn en_usehydfile(path: &str) -> i32 {
    code_of(with_project(|p| p.use_hyd_file(path)))
}

// --- quality ---

pub fn en_solveq() -> i32 {
    warn_code(with_project(|p| p.solve_q()))
}

pub fn en_openq() -> i32 {
    code_of(with_project(|p| p.open_q()))
}

pub fn en_initq(save: i32) -> i32 {
    code_of(with_project(|p| p.init_q(save != 0)))
}

pub fn en_runq(t: &mut i64) -> i32 {
    match with_project(|p| p.run_q()) {
        Ok(time) => {
            *t = time;
            0
        }
        Err(code) => code,
    }
}

pub fn en_nextq(tstep: &mut i64) -> i32 {
    match with_project(|p| p.next_q()) {
        Ok(step) => {
            *tstep = step;
            0
        }
        Err(code) => code,
    }
}

pub fn en_stepq(tleft: &mut i64) -> i32 {
    match with_project(|p| p.step_q()) {
        Ok(left) => {
            *tleft = left;
            0
        }
        Err(code) => code,
    }
}

pub fn en_closeq() -> i32 {
    code_of(with_project(|p| p.close_q()))
}

// --- reporting ---

pub fn en_report() -> i32 {
    code_of(with_project(|p| p.report()))
}

pub fn en_writeline(line: &str) -> i32 {
    code_of(with_project(|p| p.write_line(line)))
}

pub fn en_resetreport() -> i32 {
    code_of(with_project(|p| p.reset_report()))
}

pub fn en_setreport(directive: &str) -> i32 {
    code_of(with_project(|p| p.set_report(directive)))
}

// --- network queries and edits ---

pub fn en_getcount(what: i32, count: &mut i32) -> i32 {
    match with_project(|p| p.count(CountType::try_from(what)?)) {
        Ok(n) => {
            *count = n as i32;
            0
        }
        Err(code) => code,
    }
}

pub fn en_getnodeindex(id: &str, index: &mut i32) -> i32 {
    match with_project(|p| p.node_index(id)) {
        Ok(i) => {
            *index = i as i32;
            0
        }
        Err(code) => code,
    }
}

pub fn en_getnodeid(index: i32, id: &mut String) -> i32 {
    match with_project(|p| p.node_id(index.max(0) as usize)) {
        Ok(s) => {
            *id = s;
            0
        }
        Err(code) => code,
    }
}

pub fn en_getnodevalue(index: i32, property: i32, value: &mut f64) -> i32 {
    match with_project(|p| p.node_value(index.max(0) as usize, NodeProperty::try_from(property)?)) {
        Ok(v) => {
            *value = v;
            0
        }
        Err(code) => code,
    }
}

pub fn en_setnodevalue(index: i32, property: i32, value: f64) -> i32 {
    code_of(with_project(|p| {
        p.set_node_value(index.max(0) as usize, NodeProperty::try_from(property)?, value)
    }))
}

pub fn en_getlinkindex(id: &str, index: &mut i32) -> i32 {
    match with_project(|p| p.link_index(id)) {
        Ok(i) => {
            *index = i as i32;
            0
        }
        Err(code) => code,
    }
}

pub fn en_getlinknodes(index: i32, node1: &mut i32, node2: &mut i32) -> i32 {
    match with_project(|p| p.link_nodes(index.max(0) as usize)) {
        Ok((n1, n2)) => {
            *node1 = n1 as i32;
            *node2 = n2 as i32;
            0
        }
        Err(code) => code,
    }
}

pub fn en_getlinkvalue(index: i32, property: i32, value: &mut f64) -> i32 {
    match with_project(|p| p.link_value(index.max(0) as usize, LinkProperty::try_from(property)?)) {
        Ok(v) => {
            *value = v;
            0
        }
        Err(code) => code,
    }
}

pub fn en_setlinkvalue(index: i32, property: i32, value: f64) -> i32 {
    code_of(with_project(|p| {
        p.set_link_value(index.max(0) as usize, LinkProperty::try_from(property)?, value)
    }))
}

pub fn en_addnode(id: &str, node_type: i32, index: &mut i32) -> i32 {
    let kind = match node_type {
        0 => NodeKind::Junction,
        1 => NodeKind::Reservoir,
        2 => NodeKind::Tank,
        _ => return aq_core::Code::CodeOutOfRange.value() as i32,
    };
    match with_project(|p| p.add_node(id, kind)) {
        Ok(i) => {
            *index = i as i32;
            0
        }
        Err(code) => code,
    }
}

pub fn en_addlink(id: &str, link_type: i32, from: &str, to: &str, index: &mut i32) -> i32 {
    let Some(kind) = aq_network::LinkKind::from_value(link_type.max(0) as u8) else {
        return aq_core::Code::CodeOutOfRange.value() as i32;
    };
    match with_project(|p| p.add_link(id, kind, from, to)) {
        Ok(i) => {
            *index = i as i32;
            0
        }
        Err(code) => code,
    }
}

pub fn en_deletenode(index: i32, action: i32) -> i32 {
    code_of(with_project(|p| {
        p.delete_node(index.max(0) as usize, ActionCode::try_from(action)?)
    }))
}

pub fn en_deletelink(index: i32, action: i32) -> i32 {
    code_of(with_project(|p| {
        p.delete_link(index.max(0) as usize, ActionCode::try_from(action)?)
    }))
}

// --- patterns, options, times ---

pub fn en_addpattern(id: &str) -> i32 {
    code_of(with_project(|p| p.add_pattern(id).map(|_| ())))
}

pub fn en_getpatternvalue(index: i32, period: i32, value: &mut f64) -> i32 {
    match with_project(|p| p.pattern_value(index.max(0) as usize, period.max(0) as usize)) {
        Ok(v) => {
            *value = v;
            0
        }
        Err(code) => code,
    }
}

pub fn en_setpatternvalue(index: i32, period: i32, value: f64) -> i32 {
    code_of(with_project(|p| {
        p.set_pattern_value(index.max(0) as usize, period.max(0) as usize, value)
    }))
}

pub fn en_getoption(option: i32, value: &mut f64) -> i32 {
    match with_project(|p| p.option(OptionParam::try_from(option)?)) {
        Ok(v) => {
            *value = v;
            0
        }
        Err(code) => code,
    }
}

pub fn en_setoption(option: i32, value: f64) -> i32 {
    code_of(with_project(|p| {
        p.set_option(OptionParam::try_from(option)?, value)
    }))
}

pub fn en_gettimeparam(param: i32, value: &mut i64) -> i32 {
    match with_project(|p| p.time_param(TimeParam::try_from(param)?)) {
        Ok(v) => {
            *value = v;
            0
        }
        Err(code) => code,
    }
}

pub fn en_settimeparam(param: i32, value: i64) -> i32 {
    code_of(with_project(|p| {
        p.set_time_param(TimeParam::try_from(param)?, value)
    }))
}

pub fn en_getflowunits(units: &mut i32) -> i32 {
    match with_project(|p| p.flow_units()) {
        Ok(u) => {
            *units = u as i32;
            0
        }
        Err(code) => code,
    }
}

pub fn en_setflowunits(units: i32) -> i32 {
    code_of(with_project(|p| {
        let units = aq_core::units::FlowUnits::from_value(units.max(0) as u8)
            .ok_or(crate::ProjectError::CodeOutOfRange)?;
        p.set_flow_units(units)
    }))
}

// --- diagnostics ---

pub fn en_geterror(code: i32, text: &mut String) -> i32 {
    *text = Project::error_text(code.max(0) as u16);
    0
}

pub fn en_getversion(version: &mut i32) -> i32 {
    *version = Project::version();
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serialized end-to-end exercise of the default project; the legacy
    /// facade shares one hidden instance, so one test drives it.
    #[test]
    fn default_project_lifecycle() {
        assert_eq!(en_close(), 0);
        assert_eq!(en_init("", "", 1, 0), 0);

        let mut index = 0;
        assert_eq!(en_addnode("J1", 0, &mut index), 0);
        assert_eq!(index, 1);
        assert_eq!(en_addnode("T1", 2, &mut index), 0);
        let mut found = 0;
        assert_eq!(en_getnodeindex("T1", &mut found), 0);
        assert_eq!(found, 2);

        let mut link = 0;
        assert_eq!(en_addlink("P1", 1, "J1", "T1", &mut link), 0);
        assert_eq!(link, 1);

        // undefined elements come back as 203/204
        assert_eq!(en_getnodeindex("NOPE", &mut found), 203);
        let mut value = 0.0;
        assert_eq!(en_getlinkvalue(99, 8, &mut value), 204);

        let mut version = 0;
        assert_eq!(en_getversion(&mut version), 0);
        assert!(version > 0);

        let mut text = String::new();
        assert_eq!(en_geterror(203, &mut text), 0);
        assert!(text.contains("undefined node"));

        assert_eq!(en_close(), 0);
    }
}
