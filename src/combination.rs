//! Enumeration of geometrically consistent assignments of feature lines to
//! the six marker positions of the plane.

use crate::feature_line::{FeatureLine, Orientation};
use crate::geometry::point_line_distance;

/// Upper bound on simultaneously tracked candidate assignments; the frame
/// is rejected when the enumeration exceeds it.
const MAX_COMBINATIONS: usize = 2048;

/// Minimum perpendicular separation in pixels between lines on opposite
/// plane edges.
const MIN_LINE_SEPARATION: f64 = 20.0;

/// Lines on the same plane edge must diverge by at least this angle.
const MIN_COLINEAR_ANGLE_DEG: f64 = 5.0;

/// The six named marker positions on the plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineSlot {
    /// Left half of the top edge.
    TopLeft,
    /// Right half of the top edge.
    TopRight,
    /// Left half of the bottom edge.
    BottomLeft,
    /// Right half of the bottom edge.
    BottomRight,
    /// The left edge.
    Left,
    /// The right edge.
    Right,
}

impl LineSlot {
    /// All slots, in the order object/image correspondences are assembled.
    pub const ALL: [LineSlot; 6] = [
        LineSlot::TopLeft,
        LineSlot::TopRight,
        LineSlot::BottomLeft,
        LineSlot::BottomRight,
        LineSlot::Left,
        LineSlot::Right,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            LineSlot::TopLeft => 0,
            LineSlot::TopRight => 1,
            LineSlot::BottomLeft => 2,
            LineSlot::BottomRight => 3,
            LineSlot::Left => 4,
            LineSlot::Right => 5,
        }
    }

    fn is_top(self) -> bool {
        matches!(self, LineSlot::TopLeft | LineSlot::TopRight)
    }

    fn is_bottom(self) -> bool {
        matches!(self, LineSlot::BottomLeft | LineSlot::BottomRight)
    }

    /// The slot sharing a plane edge, whose line would be colinear.
    fn colinear_partner(self) -> Option<LineSlot> {
        match self {
            LineSlot::TopLeft => Some(LineSlot::TopRight),
            LineSlot::TopRight => Some(LineSlot::TopLeft),
            LineSlot::BottomLeft => Some(LineSlot::BottomRight),
            LineSlot::BottomRight => Some(LineSlot::BottomLeft),
            LineSlot::Left | LineSlot::Right => None,
        }
    }
}

/// The slots a feature line with the given orientation may occupy. Each
/// marker points inward, so the detected arrow direction determines its
/// physical location on the plane.
fn legal_slots(orientation: Orientation) -> &'static [LineSlot] {
    match orientation {
        Orientation::Left => &[LineSlot::TopLeft, LineSlot::BottomLeft],
        Orientation::Right => &[LineSlot::TopRight, LineSlot::BottomRight],
        Orientation::Top => &[LineSlot::Right],
        Orientation::Bottom => &[LineSlot::Left],
    }
}

/// A partial assignment of feature lines (by index) to line slots.
#[derive(Clone, Debug, Default)]
pub struct LineCombination {
    slots: [Option<usize>; 6],
}

impl LineCombination {
    /// The feature-line index assigned to `slot`, if any.
    pub fn get(&self, slot: LineSlot) -> Option<usize> {
        self.slots[slot.index()]
    }

    /// Assigns `line` to `slot`.
    pub(crate) fn set(&mut self, slot: LineSlot, line: usize) {
        self.slots[slot.index()] = Some(line);
    }

    /// Number of filled slots.
    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Iterates over `(slot, line index)` pairs of filled slots.
    pub fn iter_filled(&self) -> impl Iterator<Item = (LineSlot, usize)> + '_ {
        LineSlot::ALL
            .into_iter()
            .filter_map(|slot| self.get(slot).map(|idx| (slot, idx)))
    }
}

/// Incrementally enumerates all slot assignments consistent with a single
/// rectangular plane, sorted by slot count descending.
///
/// Every feature line either extends a candidate assignment or is treated
/// as a false positive, so the enumeration is worst-case exponential; it is
/// aborted (returning `None`, i.e. frame-rejected) past the safety cap.
pub(crate) fn enumerate_combinations(lines: &[FeatureLine]) -> Option<Vec<LineCombination>> {
    let mut combinations = vec![LineCombination::default()];
    for (line_idx, line) in lines.iter().enumerate() {
        let mut next = Vec::with_capacity(combinations.len());
        for combination in &combinations {
            for &slot in legal_slots(line.orientation()) {
                if combination.get(slot).is_some() {
                    continue;
                }
                if !placement_is_consistent(combination, slot, line, lines) {
                    continue;
                }
                let mut extended = combination.clone();
                extended.set(slot, line_idx);
                next.push(extended);
            }
            // The line may be a false positive the assignment does not use.
            next.push(combination.clone());
            if next.len() > MAX_COMBINATIONS {
                return None;
            }
        }
        combinations = next;
    }

    combinations.retain(is_viable);
    combinations.sort_by(|a, b| b.filled_count().cmp(&a.filled_count()));
    Some(combinations)
}

fn placement_is_consistent(
    combination: &LineCombination,
    slot: LineSlot,
    line: &FeatureLine,
    lines: &[FeatureLine],
) -> bool {
    colinearity_ok(combination, slot, line, lines)
        && separation_ok(combination, slot, line, lines)
        && horizontal_order_ok(combination, slot, line, lines)
        && vertical_order_ok(combination, slot, line, lines)
}

/// Lines that would share a plane edge must not be near-parallel; two
/// near-parallel detections on one edge are a double detection.
fn colinearity_ok(
    combination: &LineCombination,
    slot: LineSlot,
    line: &FeatureLine,
    lines: &[FeatureLine],
) -> bool {
    let Some(partner) = slot.colinear_partner() else {
        return true;
    };
    let Some(other_idx) = combination.get(partner) else {
        return true;
    };
    let dir1 = line.direction();
    let dir2 = lines[other_idx].direction();
    let cos = dir1.dot(&dir2) / (dir1.norm() * dir2.norm());
    let angle = cos.clamp(-1.0, 1.0).acos();
    angle >= MIN_COLINEAR_ANGLE_DEG.to_radians()
}

/// Lines on opposite plane edges must be clearly separated in the image.
fn separation_ok(
    combination: &LineCombination,
    slot: LineSlot,
    line: &FeatureLine,
    lines: &[FeatureLine],
) -> bool {
    let opposite = |other: LineSlot| {
        (slot.is_top() && other.is_bottom())
            || (slot.is_bottom() && other.is_top())
            || (slot == LineSlot::Left && other == LineSlot::Right)
            || (slot == LineSlot::Right && other == LineSlot::Left)
    };
    for (other_slot, other_idx) in combination.iter_filled() {
        if !opposite(other_slot) {
            continue;
        }
        let other = &lines[other_idx];
        let distance = point_line_distance(line.first(), line.direction(), other.first())
            .min(point_line_distance(line.first(), line.direction(), other.last()));
        if distance < MIN_LINE_SEPARATION {
            return false;
        }
    }
    true
}

/// Within slot pairs that share an edge (and for LEFT/RIGHT), the
/// x-ordering of the canonical first points must match the slot names.
fn horizontal_order_ok(
    combination: &LineCombination,
    slot: LineSlot,
    line: &FeatureLine,
    lines: &[FeatureLine],
) -> bool {
    let ordered_pairs = [
        (LineSlot::Left, LineSlot::Right),
        (LineSlot::TopLeft, LineSlot::TopRight),
        (LineSlot::BottomLeft, LineSlot::BottomRight),
    ];
    for (left_slot, right_slot) in ordered_pairs {
        if slot == left_slot {
            if let Some(other_idx) = combination.get(right_slot) {
                if line.first().x > lines[other_idx].first().x {
                    return false;
                }
            }
        } else if slot == right_slot {
            if let Some(other_idx) = combination.get(left_slot) {
                if lines[other_idx].first().x > line.first().x {
                    return false;
                }
            }
        }
    }
    true
}

/// Any top-edge line must start above any bottom-edge line.
fn vertical_order_ok(
    combination: &LineCombination,
    slot: LineSlot,
    line: &FeatureLine,
    lines: &[FeatureLine],
) -> bool {
    for (other_slot, other_idx) in combination.iter_filled() {
        let other_first = lines[other_idx].first();
        if slot.is_top() && other_slot.is_bottom() && line.first().y > other_first.y {
            return false;
        }
        if slot.is_bottom() && other_slot.is_top() && other_first.y > line.first().y {
            return false;
        }
    }
    true
}

/// A viable assignment fills at least two slots, and a two-slot assignment
/// must not consist of a single colinear pair (geometrically
/// underdetermined for the pose solve).
fn is_viable(combination: &LineCombination) -> bool {
    match combination.filled_count() {
        0 | 1 => false,
        2 => {
            let both = |a: LineSlot, b: LineSlot| {
                combination.get(a).is_some() && combination.get(b).is_some()
            };
            !both(LineSlot::TopLeft, LineSlot::TopRight)
                && !both(LineSlot::BottomLeft, LineSlot::BottomRight)
        }
        _ => true,
    }
}
