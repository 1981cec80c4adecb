use rayon::prelude::*;

use crate::data::grid::{ProbabilityGrid, ReferenceGrid};
use crate::error::{ForestError, Result};

/// Rates computed as 0/0 count as zero, so scores stay totally ordered.
fn zero_if_nan(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

/// Per-pixel detection counts of one class at one probability threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetectionCounts {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
}

impl DetectionCounts {
    /// Counts pixels whose probability of `class` reaches `threshold` against the reference.
    ///
    /// # Errors
    ///
    /// Fails when the grids differ in shape or `class` is not a class of `probabilities`.
    pub fn count(
        probabilities: &ProbabilityGrid,
        reference: &ReferenceGrid,
        class: usize,
        threshold: f32,
    ) -> Result<Self> {
        if (probabilities.frames(), probabilities.bins()) != reference.shape() {
            return Err(ForestError::DimensionMismatch {
                expected: reference.shape(),
                found: (probabilities.frames(), probabilities.bins()),
            });
        }
        if class >= probabilities.num_classes() {
            return Err(ForestError::InvalidParameter(format!(
                "class {class} is outside the {} classified classes",
                probabilities.num_classes()
            )));
        }

        let mut counts = Self::default();
        for x in 0..reference.frames() {
            for y in 0..reference.bins() {
                let detected = probabilities.pixel(x, y)[class] >= threshold;
                let expected = reference[(x, y)] as usize == class;
                match (detected, expected) {
                    (true, true) => counts.true_positives += 1,
                    (true, false) => counts.false_positives += 1,
                    (false, true) => counts.false_negatives += 1,
                    (false, false) => {}
                }
            }
        }
        Ok(counts)
    }

    pub fn merge(&mut self, other: &DetectionCounts) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
    }

    /// Share of reference pixels of the class that were detected.
    pub fn detection_rate(&self) -> f64 {
        let tp = self.true_positives as f64;
        zero_if_nan(tp / (tp + self.false_negatives as f64))
    }

    /// Share of detections that are wrong; no detections at all gives zero.
    pub fn false_detection_rate(&self) -> f64 {
        let fp = self.false_positives as f64;
        zero_if_nan(fp / (self.true_positives as f64 + fp))
    }

    pub fn f_measure(&self) -> f64 {
        let precision = 1.0 - self.false_detection_rate();
        let recall = self.detection_rate();
        zero_if_nan(2.0 * precision * recall / (precision + recall))
    }
}

/// Score of one threshold of a sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdScore {
    pub threshold: f32,
    pub counts: DetectionCounts,
    pub f_measure: f64,
}

/// Sweeps `steps + 1` evenly spaced thresholds over `[0, 1]` and returns the one with the
/// highest F-measure; the lowest threshold wins a tie.
pub fn best_threshold(
    probabilities: &ProbabilityGrid,
    reference: &ReferenceGrid,
    class: usize,
    steps: usize,
) -> Result<ThresholdScore> {
    if steps < 1 {
        return Err(ForestError::InvalidParameter(
            "The number of threshold steps must be greater than 0.".into(),
        ));
    }
    let scores = (0..=steps)
        .into_par_iter()
        .map(|step| {
            let threshold = step as f32 / steps as f32;
            let counts = DetectionCounts::count(probabilities, reference, class, threshold)?;
            Ok(ThresholdScore {
                threshold,
                counts,
                f_measure: counts.f_measure(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut scores = scores.into_iter();
    let mut best = scores.next().ok_or_else(|| {
        ForestError::InvalidParameter("The threshold sweep produced no scores.".into())
    })?;
    for score in scores {
        if score.f_measure > best.f_measure {
            best = score;
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grids() -> (ProbabilityGrid, ReferenceGrid) {
        let mut probabilities = ProbabilityGrid::new(1, 4, 2);
        for (y, p) in [0.9f32, 0.6, 0.3, 0.1].iter().enumerate() {
            probabilities.pixel_mut(0, y).copy_from_slice(&[1.0 - p, *p]);
        }
        let reference = ReferenceGrid::from_frames(1, 4, &[1, 0, 1, 0]).unwrap();
        (probabilities, reference)
    }

    #[test]
    fn test_count() {
        let (probabilities, reference) = grids();
        let counts = DetectionCounts::count(&probabilities, &reference, 1, 0.5).unwrap();
        assert_eq!(
            counts,
            DetectionCounts {
                true_positives: 1,
                false_positives: 1,
                false_negatives: 1,
            }
        );
        assert_relative_eq!(counts.detection_rate(), 0.5);
        assert_relative_eq!(counts.false_detection_rate(), 0.5);
        assert_relative_eq!(counts.f_measure(), 0.5);
    }

    #[test]
    fn test_no_detections_is_not_nan() {
        let counts = DetectionCounts::default();
        assert_eq!(counts.false_detection_rate(), 0.0);
        assert_eq!(counts.detection_rate(), 0.0);
        assert_eq!(counts.f_measure(), 0.0);

        let missed = DetectionCounts {
            false_negatives: 3,
            ..DetectionCounts::default()
        };
        assert_eq!(missed.false_detection_rate(), 0.0);
        assert_eq!(missed.f_measure(), 0.0);
    }

    #[test]
    fn test_count_checks_shapes_and_class() {
        let (probabilities, _) = grids();
        let reference = ReferenceGrid::zeros(2, 4);
        assert!(matches!(
            DetectionCounts::count(&probabilities, &reference, 1, 0.5),
            Err(ForestError::DimensionMismatch { .. })
        ));
        let (probabilities, reference) = grids();
        assert!(DetectionCounts::count(&probabilities, &reference, 2, 0.5).is_err());
    }

    #[test]
    fn test_best_threshold() {
        let (probabilities, reference) = grids();
        let best = best_threshold(&probabilities, &reference, 1, 10).unwrap();
        // lowest threshold catching both onsets with a single false detection
        assert_relative_eq!(best.threshold, 0.2, epsilon = 1e-6);
        assert_eq!(best.counts.true_positives, 2);
        assert!(best_threshold(&probabilities, &reference, 1, 0).is_err());
    }

    #[test]
    fn test_merge() {
        let mut a = DetectionCounts {
            true_positives: 1,
            false_positives: 2,
            false_negatives: 3,
        };
        let b = a;
        a.merge(&b);
        assert_eq!(a.false_negatives, 6);
    }
}
