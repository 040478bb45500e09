// =============================================================================
// Shape Classification
// =============================================================================
//
// Layout of the observed cells in the age-cohort plane. Working with offsets
// a' = age - age_min and c' = cohort - cohort_min, a cell lies on the relative
// calendar diagonal s = a' + c'.
//
//   Rectangle    every (a', c') of the bounding box is observed
//   Triangle     square box, observed cells are exactly s <= side - 1
//   SubTriangle  non-square box, observed cells are exactly s <= s_max
//   Trapezoid    anything else (period bands, cut corners, ...)
//
// =============================================================================

use std::collections::HashSet;

use super::IndexRanges;

/// Layout class of a validated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeClass {
    Triangle,
    SubTriangle,
    Rectangle,
    Trapezoid,
}

/// Classify a set of distinct (age, cohort) cells lying inside `ranges`.
pub fn classify_shape(cells: &HashSet<(i64, i64)>, ranges: &IndexRanges) -> ShapeClass {
    let n_age = ranges.age.len();
    let n_coh = ranges.cohort.len();

    if cells.len() == n_age * n_coh {
        return ShapeClass::Rectangle;
    }

    let offsets = |&(age, cohort): &(i64, i64)| {
        (
            (age - ranges.age.from) as usize,
            (cohort - ranges.cohort.from) as usize,
        )
    };
    let s_max = cells
        .iter()
        .map(|c| {
            let (a, c) = offsets(c);
            a + c
        })
        .max()
        .unwrap_or(0);

    let mut expected = 0usize;
    for a in 0..n_age {
        for c in 0..n_coh {
            if a + c > s_max {
                continue;
            }
            expected += 1;
            let cell = (ranges.age.from + a as i64, ranges.cohort.from + c as i64);
            if !cells.contains(&cell) {
                return ShapeClass::Trapezoid;
            }
        }
    }
    if expected != cells.len() {
        return ShapeClass::Trapezoid;
    }

    if n_age == n_coh && s_max + 1 == n_age {
        ShapeClass::Triangle
    } else {
        ShapeClass::SubTriangle
    }
}
