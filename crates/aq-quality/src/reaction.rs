//! Reaction kinetics.
//!
//! Bulk reactions follow `dC/dt = Kb C^n`, optionally saturating at a
//! limiting concentration. Wall reactions are zero or first order with a
//! mass-transfer limitation derived from the flow regime; their effective
//! rate is refreshed whenever the hydraulics change.

/// Integrate a bulk reaction over `dt` seconds.
///
/// First-order kinetics use the closed form; other orders take an explicit
/// Euler step. `kb` is per second, negative for decay.
pub fn bulk(c: f64, kb: f64, order: f64, climit: f64, dt: f64) -> f64 {
    if kb == 0.0 || dt <= 0.0 {
        return c;
    }
    let new = if climit == 0.0 && (order - 1.0).abs() < f64::EPSILON {
        c * (kb * dt).exp()
    } else if climit == 0.0 && order == 0.0 {
        c + kb * dt
    } else {
        // saturating kinetics: rate scales with distance from the limit
        let c1 = if climit > 0.0 {
            if kb > 0.0 { climit - c } else { c - climit }
        } else {
            1.0
        };
        c + kb * c1 * c.max(0.0).powf(order - 1.0) * c * dt / c.max(1e-12)
    };
    new.max(0.0)
}

/// Integrate a first-order combined bulk+wall reaction over `dt`.
pub fn first_order(c: f64, kb: f64, kw_eff: f64, dt: f64) -> f64 {
    (c * ((kb + kw_eff) * dt).exp()).max(0.0)
}

/// Mass-transfer coefficient for wall reactions, ft/s, from the Sherwood
/// number of the current flow regime.
pub fn mass_transfer_coeff(flow: f64, diameter: f64, viscos: f64, diffus: f64) -> f64 {
    if diffus <= 0.0 {
        return 0.0;
    }
    let q = flow.abs();
    let area = std::f64::consts::PI / 4.0 * diameter * diameter;
    let velocity = if area > 0.0 { q / area } else { 0.0 };
    let re = velocity * diameter / viscos;
    let sc = viscos / diffus;
    let sh = if re < 2300.0 {
        // laminar asymptote
        3.65 + 0.0668 * (diameter * re * sc) / (1.0 + 0.04 * (diameter * re * sc).powf(2.0 / 3.0))
    } else {
        0.0149 * re.powf(0.88) * sc.powf(1.0 / 3.0)
    };
    sh * diffus / diameter
}

/// Effective first-order wall rate (per second) for a pipe, combining the
/// wall coefficient `kw` (ft/s) with the mass-transfer limit.
pub fn wall_rate(kw: f64, diameter: f64, kf: f64, wall_order: f64) -> f64 {
    if kw == 0.0 || diameter <= 0.0 {
        return 0.0;
    }
    if wall_order == 0.0 {
        // zero order: mass flux per wall area; conversion happens at use
        return kw;
    }
    let kw = kw.abs();
    let rate = if kf > 0.0 {
        kw * kf / (kw + kf)
    } else {
        kw
    };
    // surface-to-volume ratio 4/d turns flux into a volumetric rate
    -(4.0 * rate / diameter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_order_decay_closed_form() {
        // half life check: ln(2)/k
        let k: f64 = -0.5 / 86400.0; // -0.5 per day
        let c = bulk(1.0, k, 1.0, 0.0, 86400.0);
        assert!((c - (-0.5_f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn zero_order_growth_is_linear() {
        let c = bulk(1.0, 2.0, 0.0, 0.0, 3.0);
        assert!((c - 7.0).abs() < 1e-12);
    }

    #[test]
    fn decay_never_goes_negative() {
        let c = bulk(0.1, -1.0, 0.0, 0.0, 10.0);
        assert_eq!(c, 0.0);
    }

    #[test]
    fn wall_rate_limited_by_mass_transfer() {
        let unlimited = wall_rate(1.0, 1.0, 0.0, 1.0);
        let limited = wall_rate(1.0, 1.0, 0.5, 1.0);
        assert!(limited.abs() < unlimited.abs());
        assert!(limited < 0.0);
    }

    #[test]
    fn transfer_coeff_grows_with_flow() {
        let slow = mass_transfer_coeff(0.1, 1.0, 1.1e-5, 1.3e-8);
        let fast = mass_transfer_coeff(10.0, 1.0, 1.1e-5, 1.3e-8);
        assert!(fast > slow);
    }
}
