//! Real-vs-fake detection quality of learned confidences.
//!
//! Degenerate inputs (one class only, or nothing predicted positive) yield
//! NaN entries rather than errors.

use crate::graph::Triple;

/// Classification metrics of one positive class, AUC included, all taken
/// over hard predictions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub auc: f64,
}

impl DetectionMetrics {
    /// `labels[i]` marks the positive class; `predicted[i]` is the hard prediction.
    pub fn compute(predicted: &[bool], labels: &[bool]) -> Self {
        debug_assert_eq!(predicted.len(), labels.len());
        let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
        for (&p, &y) in predicted.iter().zip(labels) {
            match (p, y) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, true) => fn_ += 1,
                (false, false) => {}
            }
        }
        let precision = tp as f64 / (tp + fp) as f64;
        let recall = tp as f64 / (tp + fn_) as f64;
        let binary: Vec<f32> = predicted.iter().map(|&p| if p { 1.0 } else { 0.0 }).collect();
        Self {
            precision,
            recall,
            f1: 2.0 * precision * recall / (precision + recall),
            auc: auc(&binary, labels),
        }
    }

    pub fn entries(&self) -> [(&'static str, f64); 4] {
        [
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1", self.f1),
            ("auc", self.auc),
        ]
    }
}

/// Area under the ROC curve via the Mann-Whitney statistic, ties averaged.
pub fn auc(scores: &[f32], labels: &[bool]) -> f64 {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0f64; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }

    let positives = labels.iter().filter(|&&y| y).count() as f64;
    let negatives = labels.len() as f64 - positives;
    let rank_sum: f64 = ranks.iter().zip(labels).filter(|(_, y)| **y).map(|(r, _)| r).sum();
    (rank_sum - positives * (positives + 1.0) / 2.0) / (positives * negatives)
}

/// Detection metrics from both points of view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionReport {
    /// Real triples as the positive class, predicted real when confidence `> threshold`.
    pub real: DetectionMetrics,
    /// Fake triples as the positive class, predicted fake when confidence `< threshold`.
    pub fake: DetectionMetrics,
    pub real_count: usize,
    pub fake_count: usize,
}

impl DetectionReport {
    /// Score each distinct real triple (training triples that are not fakes) and
    /// each fake with `confidence`.
    ///
    /// A confidence equal to `threshold` counts as a prediction for neither class.
    pub fn build(
        train: &[Triple],
        fakes: &[Triple],
        threshold: f32,
        confidence: impl Fn(&Triple) -> f32,
    ) -> Self {
        let fake_set: std::collections::HashSet<&Triple> = fakes.iter().collect();
        let mut real: Vec<Triple> = train
            .iter()
            .filter(|t| !fake_set.contains(t))
            .copied()
            .collect();
        real.sort_unstable();
        real.dedup();

        let mut scores = Vec::with_capacity(real.len() + fakes.len());
        let mut labels = Vec::with_capacity(real.len() + fakes.len());
        for t in &real {
            scores.push(confidence(t));
            labels.push(true);
        }
        for t in fakes {
            scores.push(confidence(t));
            labels.push(false);
        }

        let predicted_real: Vec<bool> = scores.iter().map(|&s| s > threshold).collect();
        let predicted_fake: Vec<bool> = scores.iter().map(|&s| s < threshold).collect();
        let fake_labels: Vec<bool> = labels.iter().map(|y| !y).collect();
        Self {
            real: DetectionMetrics::compute(&predicted_real, &labels),
            fake: DetectionMetrics::compute(&predicted_fake, &fake_labels),
            real_count: real.len(),
            fake_count: fakes.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: bool = true;
    const F: bool = false;

    #[test]
    fn perfect_separation() {
        let m = DetectionMetrics::compute(&[T, T, F, F], &[T, T, F, F]);
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.f1, 1.0);
        assert_eq!(m.auc, 1.0);
    }

    #[test]
    fn mixed_predictions() {
        // tp = 1, fp = 1, fn = 1
        let m = DetectionMetrics::compute(&[T, T, F, F], &[T, F, T, F]);
        assert_eq!(m.precision, 0.5);
        assert_eq!(m.recall, 0.5);
        assert!((m.auc - 0.5).abs() < 1e-12);
    }

    #[test]
    fn auc_is_taken_over_binarized_confidences() {
        let train = [Triple::new(0, 0, 1), Triple::new(1, 0, 2)];
        let fakes = [Triple::new(2, 0, 3), Triple::new(3, 0, 4)];
        // Continuous confidences rank the classes perfectly apart but both
        // reals fall on the fake side of 0.5.
        let confidence = |t: &Triple| match t.head {
            0 => 0.9,
            1 => 0.4,
            2 => 0.3,
            _ => 0.1,
        };
        let report = DetectionReport::build(&train, &fakes, 0.5, confidence);
        assert!((report.real.auc - 0.75).abs() < 1e-12);
        assert_eq!(report.real.precision, 1.0);
        assert_eq!(report.real.recall, 0.5);
        assert!((report.fake.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.fake.auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn threshold_score_is_predicted_as_neither_class() {
        let train = [Triple::new(0, 0, 1), Triple::new(1, 0, 2)];
        let fakes = [Triple::new(2, 0, 3)];
        let report = DetectionReport::build(&train, &fakes, 0.5, |_| 0.5);
        assert_eq!(report.real.recall, 0.0);
        assert_eq!(report.fake.recall, 0.0);
        assert!((report.real.auc - 0.5).abs() < 1e-12);
        assert!((report.fake.auc - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ties_count_half() {
        assert!((auc(&[0.5, 0.5], &[true, false]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn single_class_is_nan() {
        let m = DetectionMetrics::compute(&[T, T], &[T, T]);
        assert!(m.auc.is_nan());
    }

    #[test]
    fn report_excludes_fakes_from_real_side() {
        let train = [Triple::new(0, 0, 1), Triple::new(1, 0, 2), Triple::new(3, 0, 3)];
        let fakes = [Triple::new(3, 0, 3)];
        let weight = |t: &Triple| if t.head == 3 { 0.1 } else { 0.9 };
        let report = DetectionReport::build(&train, &fakes, 0.5, weight);
        assert_eq!(report.real_count, 2);
        assert_eq!(report.fake_count, 1);
        assert_eq!(report.real.auc, 1.0);
        assert_eq!(report.fake.precision, 1.0);
        assert_eq!(report.fake.recall, 1.0);
    }
}
