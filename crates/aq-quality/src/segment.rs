//! Water segments: finite plugs of uniform quality.
//!
//! Each open link carries a deque of segments ordered downstream-first: the
//! front segment leaves through the downstream node next, new water enters
//! at the back. When a link's flow reverses sign, the order flips.

use std::collections::VecDeque;

/// One plug of water.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Volume, ft3.
    pub volume: f64,
    /// Constituent concentration (or age in seconds, or trace percent).
    pub concen: f64,
}

/// Remove `vol` from the downstream (front) end, returning the mass taken.
/// Short deques yield whatever mass is present.
pub fn drain(segs: &mut VecDeque<Segment>, mut vol: f64) -> f64 {
    let mut mass = 0.0;
    while vol > 0.0 {
        let Some(front) = segs.front_mut() else {
            break;
        };
        if front.volume > vol {
            front.volume -= vol;
            mass += vol * front.concen;
            break;
        }
        let seg = segs.pop_front().expect("front exists");
        mass += seg.volume * seg.concen;
        vol -= seg.volume;
    }
    mass
}

/// Add water at the upstream (back) end, merging into the trailing segment
/// when the concentration difference is inside the tolerance.
pub fn feed(segs: &mut VecDeque<Segment>, volume: f64, concen: f64, ctol: f64) {
    if volume <= 0.0 {
        return;
    }
    if let Some(back) = segs.back_mut() {
        if (back.concen - concen).abs() <= ctol {
            // weighted merge keeps the mass exact
            let mass = back.volume * back.concen + volume * concen;
            back.volume += volume;
            back.concen = mass / back.volume;
            return;
        }
    }
    segs.push_back(Segment { volume, concen });
}

/// Total volume held.
pub fn total_volume(segs: &VecDeque<Segment>) -> f64 {
    segs.iter().map(|s| s.volume).sum()
}

/// Total constituent mass held.
pub fn total_mass(segs: &VecDeque<Segment>) -> f64 {
    segs.iter().map(|s| s.volume * s.concen).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deque(segs: &[(f64, f64)]) -> VecDeque<Segment> {
        segs.iter()
            .map(|(v, c)| Segment {
                volume: *v,
                concen: *c,
            })
            .collect()
    }

    #[test]
    fn drain_takes_from_front() {
        let mut segs = deque(&[(10.0, 1.0), (20.0, 2.0)]);
        let mass = drain(&mut segs, 15.0);
        // 10 at c=1 plus 5 at c=2
        assert!((mass - 20.0).abs() < 1e-12);
        assert_eq!(segs.len(), 1);
        assert!((segs[0].volume - 15.0).abs() < 1e-12);
    }

    #[test]
    fn drain_beyond_contents_returns_partial_mass() {
        let mut segs = deque(&[(5.0, 1.0)]);
        let mass = drain(&mut segs, 20.0);
        assert!((mass - 5.0).abs() < 1e-12);
        assert!(segs.is_empty());
    }

    #[test]
    fn feed_merges_within_tolerance() {
        let mut segs = deque(&[(10.0, 1.0)]);
        feed(&mut segs, 10.0, 1.0005, 0.001);
        assert_eq!(segs.len(), 1);
        assert!((total_volume(&segs) - 20.0).abs() < 1e-12);
        feed(&mut segs, 5.0, 3.0, 0.001);
        assert_eq!(segs.len(), 2);
    }

    #[test]
    fn mass_is_conserved_through_feed_and_drain() {
        let mut segs = VecDeque::new();
        feed(&mut segs, 10.0, 2.0, 0.0);
        feed(&mut segs, 10.0, 4.0, 0.0);
        let before = total_mass(&segs);
        let taken = drain(&mut segs, 12.0);
        assert!((before - taken - total_mass(&segs)).abs() < 1e-9);
    }
}
