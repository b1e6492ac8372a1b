//! Time patterns: ordered multiplier sequences cycled over the simulation.

/// A time pattern. The factor list is never empty once the pattern is part
/// of an initialized network; indexing past the end wraps modulo length.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub(crate) id: String,
    pub factors: Vec<f64>,
    pub comment: String,
}

impl Pattern {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            factors: vec![1.0],
            comment: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Multiplier for a 0-based time period, cycling modulo length.
    pub fn value(&self, period: usize) -> f64 {
        if self.factors.is_empty() {
            return 1.0;
        }
        self.factors[period % self.factors.len()]
    }

    /// Average of all multipliers.
    pub fn average(&self) -> f64 {
        if self.factors.is_empty() {
            return 1.0;
        }
        self.factors.iter().sum::<f64>() / self.factors.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pattern_has_unit_factor() {
        let p = Pattern::new("1");
        assert_eq!(p.len(), 1);
        assert_eq!(p.value(0), 1.0);
        assert_eq!(p.value(17), 1.0);
    }

    #[test]
    fn value_wraps_modulo_length() {
        let p = Pattern {
            id: "day".into(),
            factors: vec![0.5, 1.0, 1.5],
            comment: String::new(),
        };
        assert_eq!(p.value(0), 0.5);
        assert_eq!(p.value(3), 0.5);
        assert_eq!(p.value(4), 1.0);
        assert_eq!(p.value(302), 1.5);
    }

    #[test]
    fn average_of_factors() {
        let p = Pattern {
            id: "day".into(),
            factors: vec![0.5, 1.0, 1.5],
            comment: String::new(),
        };
        assert!((p.average() - 1.0).abs() < 1e-12);
    }
}
