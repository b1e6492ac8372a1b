//! Tank mixing models.
//!
//! Each tank tracks its stored water per its mixing model and answers two
//! questions each substep: what concentration leaves, and how does inflow
//! change the store.

use std::collections::VecDeque;

use crate::segment::{Segment, drain, feed, total_mass, total_volume};

/// Stored water inside one tank.
#[derive(Debug, Clone)]
pub enum TankStore {
    /// Single fully mixed compartment.
    Mix1 { volume: f64, concen: f64 },
    /// Inlet mixing zone capped at `v1max`, plus an ambient zone.
    Mix2 {
        v1max: f64,
        zone1: Segment,
        zone2: Segment,
    },
    /// Plug flow, oldest water leaves first.
    Fifo { segs: VecDeque<Segment> },
    /// Stacked plugs, newest water leaves first.
    Lifo { segs: VecDeque<Segment> },
}

impl TankStore {
    pub fn new_mix1(volume: f64, concen: f64) -> Self {
        TankStore::Mix1 { volume, concen }
    }

    pub fn new_mix2(volume: f64, concen: f64, v1max: f64) -> Self {
        let v1 = volume.min(v1max.max(0.0));
        TankStore::Mix2 {
            v1max,
            zone1: Segment {
                volume: v1,
                concen,
            },
            zone2: Segment {
                volume: volume - v1,
                concen,
            },
        }
    }

    pub fn new_fifo(volume: f64, concen: f64) -> Self {
        let mut segs = VecDeque::new();
        if volume > 0.0 {
            segs.push_back(Segment { volume, concen });
        }
        TankStore::Fifo { segs }
    }

    pub fn new_lifo(volume: f64, concen: f64) -> Self {
        let mut segs = VecDeque::new();
        if volume > 0.0 {
            segs.push_back(Segment { volume, concen });
        }
        TankStore::Lifo { segs }
    }

    /// Concentration currently at the outlet.
    pub fn outlet_concen(&self) -> f64 {
        match self {
            TankStore::Mix1 { concen, .. } => *concen,
            TankStore::Mix2 { zone1, .. } => zone1.concen,
            TankStore::Fifo { segs } => segs.front().map(|s| s.concen).unwrap_or(0.0),
            TankStore::Lifo { segs } => segs.front().map(|s| s.concen).unwrap_or(0.0),
        }
    }

    pub fn volume(&self) -> f64 {
        match self {
            TankStore::Mix1 { volume, .. } => *volume,
            TankStore::Mix2 { zone1, zone2, .. } => zone1.volume + zone2.volume,
            TankStore::Fifo { segs } | TankStore::Lifo { segs } => total_volume(segs),
        }
    }

    pub fn mass(&self) -> f64 {
        match self {
            TankStore::Mix1 { volume, concen } => volume * concen,
            TankStore::Mix2 { zone1, zone2, .. } => {
                zone1.volume * zone1.concen + zone2.volume * zone2.concen
            }
            TankStore::Fifo { segs } | TankStore::Lifo { segs } => total_mass(segs),
        }
    }

    /// Apply one substep: `vin` volume entering at `cin`, `vout` leaving.
    /// Returns the mass that left.
    pub fn exchange(&mut self, vin: f64, cin: f64, vout: f64, ctol: f64) -> f64 {
        match self {
            TankStore::Mix1 { volume, concen } => {
                // inflow mixes instantly with the whole store
                if vin > 0.0 {
                    let mass = *volume * *concen + vin * cin;
                    *volume += vin;
                    *concen = if *volume > 0.0 { mass / *volume } else { 0.0 };
                }
                let out = vout.min(*volume);
                *volume -= out;
                out * *concen
            }
            TankStore::Mix2 {
                v1max,
                zone1,
                zone2,
            } => {
                // inflow enters the mixing zone; overflow spills to ambient
                if vin > 0.0 {
                    let mass = zone1.volume * zone1.concen + vin * cin;
                    zone1.volume += vin;
                    zone1.concen = if zone1.volume > 0.0 {
                        mass / zone1.volume
                    } else {
                        0.0
                    };
                    if zone1.volume > *v1max {
                        let spill = zone1.volume - *v1max;
                        let mass2 = zone2.volume * zone2.concen + spill * zone1.concen;
                        zone2.volume += spill;
                        zone2.concen = if zone2.volume > 0.0 {
                            mass2 / zone2.volume
                        } else {
                            0.0
                        };
                        zone1.volume = *v1max;
                    }
                }
                // outflow drains the mixing zone, backfilled from ambient
                let mut out_mass = 0.0;
                let mut need = vout;
                if need > 0.0 {
                    let take = need.min(zone1.volume);
                    zone1.volume -= take;
                    out_mass += take * zone1.concen;
                    need -= take;
                    if need > 0.0 {
                        let take2 = need.min(zone2.volume);
                        zone2.volume -= take2;
                        out_mass += take2 * zone2.concen;
                    }
                    // refill the mixing zone from ambient
                    if zone1.volume < *v1max && zone2.volume > 0.0 {
                        let refill = (*v1max - zone1.volume).min(zone2.volume);
                        let mass = zone1.volume * zone1.concen + refill * zone2.concen;
                        zone1.volume += refill;
                        zone2.volume -= refill;
                        zone1.concen = if zone1.volume > 0.0 {
                            mass / zone1.volume
                        } else {
                            0.0
                        };
                    }
                }
                out_mass
            }
            TankStore::Fifo { segs } => {
                feed(segs, vin, cin, ctol);
                drain(segs, vout)
            }
            TankStore::Lifo { segs } => {
                // inflow stacks on the outlet side: newest leaves first
                if vin > 0.0 {
                    if let Some(front) = segs.front_mut() {
                        if (front.concen - cin).abs() <= ctol {
                            let mass = front.volume * front.concen + vin * cin;
                            front.volume += vin;
                            front.concen = mass / front.volume;
                        } else {
                            segs.push_front(Segment {
                                volume: vin,
                                concen: cin,
                            });
                        }
                    } else {
                        segs.push_front(Segment {
                            volume: vin,
                            concen: cin,
                        });
                    }
                }
                drain(segs, vout)
            }
        }
    }

    /// Apply a reaction update to every parcel of stored water, returning
    /// the mass change (negative for decay).
    pub fn react(&mut self, f: impl Fn(f64) -> f64) -> f64 {
        let before = self.mass();
        match self {
            TankStore::Mix1 { concen, .. } => *concen = f(*concen),
            TankStore::Mix2 { zone1, zone2, .. } => {
                zone1.concen = f(zone1.concen);
                zone2.concen = f(zone2.concen);
            }
            TankStore::Fifo { segs } | TankStore::Lifo { segs } => {
                for seg in segs.iter_mut() {
                    seg.concen = f(seg.concen);
                }
            }
        }
        self.mass() - before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix1_dilutes_toward_inflow() {
        let mut tank = TankStore::new_mix1(1000.0, 0.0);
        tank.exchange(100.0, 1.0, 0.0, 0.0);
        let c = tank.outlet_concen();
        assert!((c - 100.0 / 1100.0).abs() < 1e-12);
    }

    #[test]
    fn fifo_outlet_sees_oldest_water() {
        let mut tank = TankStore::new_fifo(100.0, 1.0);
        tank.exchange(50.0, 9.0, 0.0, 0.0);
        // outlet still old water
        assert_eq!(tank.outlet_concen(), 1.0);
        // drain beyond the old plug
        tank.exchange(0.0, 0.0, 120.0, 0.0);
        assert_eq!(tank.outlet_concen(), 9.0);
    }

    #[test]
    fn lifo_outlet_sees_newest_water() {
        let mut tank = TankStore::new_lifo(100.0, 1.0);
        tank.exchange(50.0, 9.0, 0.0, 0.0);
        assert_eq!(tank.outlet_concen(), 9.0);
        tank.exchange(0.0, 0.0, 60.0, 0.0);
        // the new plug is gone, old water resurfaces
        assert_eq!(tank.outlet_concen(), 1.0);
    }

    #[test]
    fn mix2_overflow_reaches_ambient_zone() {
        let mut tank = TankStore::new_mix2(1000.0, 0.0, 200.0);
        // large inflow at high concentration spills into zone 2
        tank.exchange(300.0, 5.0, 0.0, 0.0);
        let TankStore::Mix2 { zone1, zone2, .. } = &tank else {
            panic!("mix2 expected");
        };
        assert!((zone1.volume - 200.0).abs() < 1e-9);
        assert!(zone2.concen > 0.0);
        assert!(zone1.concen > zone2.concen);
    }

    #[test]
    fn exchange_conserves_mass() {
        for mut tank in [
            TankStore::new_mix1(500.0, 2.0),
            TankStore::new_mix2(500.0, 2.0, 100.0),
            TankStore::new_fifo(500.0, 2.0),
            TankStore::new_lifo(500.0, 2.0),
        ] {
            let before = tank.mass();
            let out = tank.exchange(40.0, 7.0, 60.0, 0.0);
            let after = tank.mass();
            let balance = before + 40.0 * 7.0 - out - after;
            assert!(balance.abs() < 1e-9, "imbalance {balance}");
        }
    }
}
