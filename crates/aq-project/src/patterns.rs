//! Pattern and curve operations.

use aq_core::Idx;
use aq_network::{CurveKind, NetworkError};

use crate::error::{ProjectError, ProjectResult};
use crate::project::Project;

impl Project {
    // --- patterns ---

    pub fn add_pattern(&mut self, id: &str) -> ProjectResult<usize> {
        self.require_open()?;
        Ok(self.network.add_pattern(id)?.position())
    }

    pub fn pattern_index(&self, id: &str) -> ProjectResult<usize> {
        self.require_open()?;
        self.network
            .find_pattern(id)
            .map(|i| i.position())
            .ok_or_else(|| NetworkError::UndefinedPattern.into())
    }

    pub fn pattern_id(&self, index: usize) -> ProjectResult<String> {
        let idx = self.pattern_idx(index)?;
        Ok(self.network.pattern(idx).expect("checked").id().to_string())
    }

    pub fn pattern_len(&self, index: usize) -> ProjectResult<usize> {
        let idx = self.pattern_idx(index)?;
        Ok(self.network.pattern(idx).expect("checked").len())
    }

    /// Multiplier for a 1-based period, cycling modulo pattern length.
    pub fn pattern_value(&self, index: usize, period: usize) -> ProjectResult<f64> {
        let idx = self.pattern_idx(index)?;
        if period == 0 {
            return Err(ProjectError::CodeOutOfRange);
        }
        Ok(self.network.pattern(idx).expect("checked").value(period - 1))
    }

    pub fn set_pattern_value(
        &mut self,
        index: usize,
        period: usize,
        value: f64,
    ) -> ProjectResult<()> {
        let idx = self.pattern_idx(index)?;
        if value < 0.0 || !value.is_finite() {
            return Err(ProjectError::BadValue);
        }
        let pattern = self.network.pattern_mut(idx).expect("checked");
        if period == 0 || period > pattern.len() {
            return Err(ProjectError::CodeOutOfRange);
        }
        pattern.factors[period - 1] = value;
        Ok(())
    }

    /// Replace the whole multiplier sequence.
    pub fn set_pattern(&mut self, index: usize, factors: &[f64]) -> ProjectResult<()> {
        let idx = self.pattern_idx(index)?;
        if factors.is_empty() || factors.iter().any(|f| *f < 0.0 || !f.is_finite()) {
            return Err(ProjectError::BadValue);
        }
        self.network.pattern_mut(idx).expect("checked").factors = factors.to_vec();
        Ok(())
    }

    pub fn average_pattern_value(&self, index: usize) -> ProjectResult<f64> {
        let idx = self.pattern_idx(index)?;
        Ok(self.network.pattern(idx).expect("checked").average())
    }

    // --- curves ---

    pub fn add_curve(&mut self, id: &str) -> ProjectResult<usize> {
        self.require_open()?;
        Ok(self.network.add_curve(id)?.position())
    }

    pub fn curve_index(&self, id: &str) -> ProjectResult<usize> {
        self.require_open()?;
        self.network
            .find_curve(id)
            .map(|i| i.position())
            .ok_or_else(|| NetworkError::UndefinedCurve.into())
    }

    pub fn curve_id(&self, index: usize) -> ProjectResult<String> {
        let idx = self.curve_idx(index)?;
        Ok(self.network.curve(idx).expect("checked").id().to_string())
    }

    pub fn curve_len(&self, index: usize) -> ProjectResult<usize> {
        let idx = self.curve_idx(index)?;
        Ok(self.network.curve(idx).expect("checked").len())
    }

    pub fn curve_type(&self, index: usize) -> ProjectResult<CurveKind> {
        let idx = self.curve_idx(index)?;
        Ok(self.network.curve(idx).expect("checked").kind)
    }

    /// One (x, y) point, 1-based, in user units.
    pub fn curve_value(&self, index: usize, point: usize) -> ProjectResult<(f64, f64)> {
        let idx = self.curve_idx(index)?;
        let curve = self.network.curve(idx).expect("checked");
        if point == 0 || point > curve.len() {
            return Err(ProjectError::CodeOutOfRange);
        }
        let (fx, fy) = aq_io::convert::curve_factors(curve.kind, self.ucf());
        Ok((curve.x[point - 1] * fx, curve.y[point - 1] * fy))
    }

    pub fn set_curve_value(
        &mut self,
        index: usize,
        point: usize,
        x: f64,
        y: f64,
    ) -> ProjectResult<()> {
        let idx = self.curve_idx(index)?;
        if !x.is_finite() || !y.is_finite() {
            return Err(ProjectError::BadValue);
        }
        let (fx, fy) = {
            let curve = self.network.curve(idx).expect("checked");
            if point == 0 || point > curve.len() {
                return Err(ProjectError::CodeOutOfRange);
            }
            aq_io::convert::curve_factors(curve.kind, self.ucf())
        };
        let id = self.network.curve(idx).expect("checked").id().to_string();
        let curve = self.network.curve_mut(idx).expect("checked");
        curve.x[point - 1] = x / fx;
        curve.y[point - 1] = y / fy;
        if !curve.is_increasing() {
            return Err(NetworkError::CurveNotIncreasing { id }.into());
        }
        self.refit_pumps_on(idx)?;
        Ok(())
    }

    /// Replace all points of a curve, in user units.
    pub fn set_curve(&mut self, index: usize, points: &[(f64, f64)]) -> ProjectResult<()> {
        let idx = self.curve_idx(index)?;
        if points.is_empty() {
            return Err(ProjectError::BadValue);
        }
        let (fx, fy) = {
            let curve = self.network.curve(idx).expect("checked");
            aq_io::convert::curve_factors(curve.kind, self.ucf())
        };
        let id = self.network.curve(idx).expect("checked").id().to_string();
        let curve = self.network.curve_mut(idx).expect("checked");
        curve.x = points.iter().map(|p| p.0 / fx).collect();
        curve.y = points.iter().map(|p| p.1 / fy).collect();
        if !curve.is_increasing() {
            return Err(NetworkError::CurveNotIncreasing { id }.into());
        }
        self.refit_pumps_on(idx)?;
        Ok(())
    }

    /// Full curve contents: id plus user-unit points.
    pub fn curve(&self, index: usize) -> ProjectResult<(String, Vec<(f64, f64)>)> {
        let idx = self.curve_idx(index)?;
        let curve = self.network.curve(idx).expect("checked");
        let (fx, fy) = aq_io::convert::curve_factors(curve.kind, self.ucf());
        let points = curve
            .x
            .iter()
            .zip(curve.y.iter())
            .map(|(x, y)| (x * fx, y * fy))
            .collect();
        Ok((curve.id().to_string(), points))
    }

    // --- helpers ---

    pub(crate) fn pattern_idx(&self, index: usize) -> ProjectResult<Idx> {
        self.require_open()?;
        Idx::from_position(index as i64)
            .filter(|i| i.index() < self.network.patterns.len())
            .ok_or_else(|| NetworkError::UndefinedPattern.into())
    }

    pub(crate) fn curve_idx(&self, index: usize) -> ProjectResult<Idx> {
        self.require_open()?;
        Idx::from_position(index as i64)
            .filter(|i| i.index() < self.network.curves.len())
            .ok_or_else(|| NetworkError::UndefinedCurve.into())
    }

    /// Reclassify a curve, re-expressing its stored points so the
    /// user-visible values are unchanged by the kind switch.
    pub(crate) fn assign_curve_kind(&mut self, idx: Idx, kind: CurveKind) {
        let ucf = *self.ucf();
        let curve = self.network.curve_mut(idx).expect("curve exists");
        if curve.kind == kind {
            return;
        }
        let (fx_old, fy_old) = aq_io::convert::curve_factors(curve.kind, &ucf);
        let (fx_new, fy_new) = aq_io::convert::curve_factors(kind, &ucf);
        for x in &mut curve.x {
            *x *= fx_old / fx_new;
        }
        for y in &mut curve.y {
            *y *= fy_old / fy_new;
        }
        curve.kind = kind;
    }

    /// Pump coefficients derive from their head curves; refit any pump
    /// whose curve just changed.
    fn refit_pumps_on(&mut self, curve: Idx) -> ProjectResult<()> {
        for p in 0..self.network.n_pumps() {
            if self.network.pumps[p].hcurve == Some(curve) {
                self.network.pumps[p].kind = aq_network::PumpKind::NoCurve;
                self.network.update_pump_params(p)?;
            }
        }
        Ok(())
    }
}
