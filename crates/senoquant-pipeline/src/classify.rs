//! Per-nucleus senescent / quiescent classification.
//!
//! Each 8-connected nucleus in the detector mask is averaged over the
//! marker planes and assigned to exactly one class, so the two output
//! masks partition the input mask.

use std::fmt;

use image::Luma;
use serde::Serialize;

use crate::components::{self, Component, Connectivity};
use crate::types::{ClassificationRule, FOREGROUND, FloatPlane, Mask};

/// Class assigned to a nucleus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NucleusClass {
    /// Senescent-marker dominant.
    Senescent,
    /// Everything else.
    Quiescent,
}

impl fmt::Display for NucleusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Senescent => f.write_str("senescent"),
            Self::Quiescent => f.write_str("quiescent"),
        }
    }
}

impl ClassificationRule {
    /// Decide the class of a nucleus from its mean marker intensities.
    #[must_use]
    pub fn decide(self, senescent_mean: f64, quiescent_mean: f64) -> NucleusClass {
        let senescent = match self {
            Self::Absolute { threshold } => senescent_mean > f64::from(threshold),
            Self::Comparative => senescent_mean > quiescent_mean,
        };
        if senescent {
            NucleusClass::Senescent
        } else {
            NucleusClass::Quiescent
        }
    }
}

/// Working-grid intensities the classifier averages over.
#[derive(Debug, Clone, Copy)]
pub struct MarkerPlanes<'a> {
    /// Senescent-marker channel.
    pub senescent: &'a FloatPlane,
    /// Quiescent-marker channel.
    pub quiescent: &'a FloatPlane,
    /// Nuclear-stain channel.
    pub nuclear: &'a FloatPlane,
}

/// Measurements and class of one nucleus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NucleusObject {
    /// Label, area, and centroid on the working grid.
    pub component: Component,
    /// Mean senescent-marker intensity.
    pub senescent_mean: f64,
    /// Mean quiescent-marker intensity.
    pub quiescent_mean: f64,
    /// Mean nuclear-stain intensity.
    pub nuclear_mean: f64,
    /// Assigned class.
    pub class: NucleusClass,
}

/// Two disjoint masks whose union is the detector mask.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Nuclei classified senescent.
    pub senescent: Mask,
    /// Nuclei classified quiescent.
    pub quiescent: Mask,
    /// Per-nucleus diagnostics, ordered by label.
    pub objects: Vec<NucleusObject>,
}

impl Classification {
    /// Number of nuclei of `class`.
    #[must_use]
    pub fn count(&self, class: NucleusClass) -> usize {
        self.objects.iter().filter(|o| o.class == class).count()
    }
}

/// Classify every nucleus in `mask`.
///
/// An empty mask yields two empty masks.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn classify(mask: &Mask, planes: MarkerPlanes<'_>, rule: ClassificationRule) -> Classification {
    let labels = components::label(mask, Connectivity::Eight);
    let n = components::component_count(&labels);

    let mut sums = vec![[0.0_f64; 3]; n + 1];
    for (x, y, p) in labels.enumerate_pixels() {
        let l = p.0[0] as usize;
        if l == 0 {
            continue;
        }
        let s = &mut sums[l];
        s[0] += f64::from(planes.senescent.get_pixel(x, y).0[0]);
        s[1] += f64::from(planes.quiescent.get_pixel(x, y).0[0]);
        s[2] += f64::from(planes.nuclear.get_pixel(x, y).0[0]);
    }

    let mut class_of = vec![None; n + 1];
    let objects: Vec<NucleusObject> = components::components(&labels)
        .into_iter()
        .map(|component| {
            let l = component.label as usize;
            let area = component.area as f64;
            let [s, q, b] = sums[l].map(|v| v / area);
            let class = rule.decide(s, q);
            class_of[l] = Some(class);
            NucleusObject {
                component,
                senescent_mean: s,
                quiescent_mean: q,
                nuclear_mean: b,
                class,
            }
        })
        .collect();

    let (w, h) = mask.dimensions();
    let paint = |wanted: NucleusClass| {
        Mask::from_fn(w, h, |x, y| {
            let l = labels.get_pixel(x, y).0[0] as usize;
            if class_of[l] == Some(wanted) {
                Luma([FOREGROUND])
            } else {
                Luma([0])
            }
        })
    };
    let classification = Classification {
        senescent: paint(NucleusClass::Senescent),
        quiescent: paint(NucleusClass::Quiescent),
        objects,
    };
    tracing::debug!(
        senescent = classification.count(NucleusClass::Senescent),
        quiescent = classification.count(NucleusClass::Quiescent),
        "classified nuclei"
    );
    classification
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two 3x3 nuclei: left at x 1..4, right at x 6..9.
    fn two_nuclei() -> Mask {
        Mask::from_fn(10, 5, |x, y| {
            let in_row = (1..4).contains(&y);
            if in_row && ((1..4).contains(&x) || (6..9).contains(&x)) {
                Luma([FOREGROUND])
            } else {
                Luma([0])
            }
        })
    }

    /// Left half at `left`, right half at `right`.
    fn halves(left: f32, right: f32) -> FloatPlane {
        FloatPlane::from_fn(10, 5, |x, _| if x < 5 { Luma([left]) } else { Luma([right]) })
    }

    fn assert_partition(mask: &Mask, c: &Classification) {
        for ((m, s), q) in mask.pixels().zip(c.senescent.pixels()).zip(c.quiescent.pixels()) {
            let (m, s, q) = (m.0[0] != 0, s.0[0] != 0, q.0[0] != 0);
            assert!(!(s && q), "masks overlap");
            assert_eq!(m, s || q, "union differs from input");
        }
    }

    // --- rule tests ---

    #[test]
    fn comparative_rule_is_strict() {
        let rule = ClassificationRule::Comparative;
        assert_eq!(rule.decide(0.6, 0.5), NucleusClass::Senescent);
        assert_eq!(rule.decide(0.5, 0.5), NucleusClass::Quiescent);
        assert_eq!(rule.decide(0.4, 0.5), NucleusClass::Quiescent);
    }

    #[test]
    fn absolute_rule_ignores_quiescent_marker() {
        let rule = ClassificationRule::Absolute { threshold: 0.3 };
        assert_eq!(rule.decide(0.31, 0.9), NucleusClass::Senescent);
        assert_eq!(rule.decide(0.3, 0.0), NucleusClass::Quiescent);
    }

    // --- classify tests ---

    #[test]
    fn nuclei_are_split_by_marker_dominance() {
        let mask = two_nuclei();
        let senescent = halves(0.8, 0.1);
        let quiescent = halves(0.2, 0.7);
        let nuclear = halves(0.5, 0.5);
        let planes = MarkerPlanes {
            senescent: &senescent,
            quiescent: &quiescent,
            nuclear: &nuclear,
        };
        let c = classify(&mask, planes, ClassificationRule::Comparative);
        assert_eq!(c.count(NucleusClass::Senescent), 1);
        assert_eq!(c.count(NucleusClass::Quiescent), 1);
        assert_eq!(c.senescent.get_pixel(2, 2).0[0], FOREGROUND);
        assert_eq!(c.quiescent.get_pixel(7, 2).0[0], FOREGROUND);
        assert_partition(&mask, &c);
    }

    #[test]
    fn object_means_are_reported() {
        let mask = two_nuclei();
        let senescent = halves(0.8, 0.1);
        let quiescent = halves(0.2, 0.7);
        let nuclear = halves(0.5, 0.25);
        let planes = MarkerPlanes {
            senescent: &senescent,
            quiescent: &quiescent,
            nuclear: &nuclear,
        };
        let c = classify(&mask, planes, ClassificationRule::Comparative);
        let right = c.objects[1];
        assert_eq!(right.component.area, 9);
        assert!((right.senescent_mean - 0.1).abs() < 1e-6);
        assert!((right.quiescent_mean - 0.7).abs() < 1e-6);
        assert!((right.nuclear_mean - 0.25).abs() < 1e-6);
    }

    #[test]
    fn empty_mask_yields_empty_masks() {
        let mask = Mask::new(10, 5);
        let plane = halves(1.0, 1.0);
        let planes = MarkerPlanes {
            senescent: &plane,
            quiescent: &plane,
            nuclear: &plane,
        };
        let c = classify(&mask, planes, ClassificationRule::Comparative);
        assert!(c.objects.is_empty());
        assert!(c.senescent.pixels().all(|p| p.0[0] == 0));
        assert!(c.quiescent.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn equal_markers_are_quiescent() {
        let mask = two_nuclei();
        let plane = halves(0.5, 0.5);
        let planes = MarkerPlanes {
            senescent: &plane,
            quiescent: &plane,
            nuclear: &plane,
        };
        let c = classify(&mask, planes, ClassificationRule::Comparative);
        assert_eq!(c.count(NucleusClass::Quiescent), 2);
        assert_partition(&mask, &c);
    }
}
