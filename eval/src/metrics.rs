// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation metrics for binary classification
//!
//! Implements:
//! - Confusion Matrix
//! - Accuracy, per-class Precision, Recall, F1-Score
//! - Macro and support-weighted averages
//! - AUC-ROC (from positive-class probabilities)

use crate::datasets::Label;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Confusion matrix for binary classification, indexed `[true][predicted]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    /// Create from predictions and ground truth labels
    pub fn from_predictions(predictions: &[Label], ground_truth: &[Label]) -> Self {
        let mut matrix = Self::default();
        for (pred, truth) in predictions.iter().zip(ground_truth.iter()) {
            matrix.counts[truth.index()][pred.index()] += 1;
        }
        matrix
    }

    pub fn get(&self, truth: Label, predicted: Label) -> usize {
        self.counts[truth.index()][predicted.index()]
    }

    /// Total number of samples
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Samples whose true class is `label`
    pub fn support(&self, label: Label) -> usize {
        self.counts[label.index()].iter().sum()
    }

    /// Samples predicted as `label`
    pub fn predicted(&self, label: Label) -> usize {
        self.counts.iter().map(|row| row[label.index()]).sum()
    }

    /// Accuracy: trace / total
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.counts[0][0] + self.counts[1][1]) as f64 / total as f64
    }

    /// Precision for one class, 0.0 when nothing was predicted as it
    pub fn precision(&self, label: Label) -> f64 {
        ratio(self.get(label, label), self.predicted(label))
    }

    /// Recall for one class, 0.0 when the class has no support
    pub fn recall(&self, label: Label) -> f64 {
        ratio(self.get(label, label), self.support(label))
    }

    pub fn f1_score(&self, label: Label) -> f64 {
        let precision = self.precision(label);
        let recall = self.recall(label);
        let denom = precision + recall;
        if denom == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / denom
    }

    pub fn is_diagonal(&self) -> bool {
        self.counts[0][1] == 0 && self.counts[1][0] == 0
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

/// One row of the classification report
///
/// The `accuracy` row only carries the F1 column (the accuracy itself) and
/// the total support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub label: String,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class metrics plus `accuracy`, `macro avg` and `weighted avg` rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub rows: Vec<ReportRow>,
}

impl ClassificationReport {
    pub const COLUMNS: [&'static str; 5] = ["labels", "precision", "recall", "f1-score", "support"];

    pub fn from_confusion_matrix(cm: &ConfusionMatrix) -> Self {
        let total = cm.total();
        let mut rows: Vec<ReportRow> = Label::ALL
            .iter()
            .map(|&label| ReportRow {
                label: label.to_string(),
                precision: Some(cm.precision(label)),
                recall: Some(cm.recall(label)),
                f1_score: cm.f1_score(label),
                support: cm.support(label),
            })
            .collect();

        let mean = |f: &dyn Fn(&ReportRow) -> f64| -> f64 {
            rows.iter().map(f).sum::<f64>() / rows.len() as f64
        };
        let weighted = |f: &dyn Fn(&ReportRow) -> f64| -> f64 {
            if total == 0 {
                return 0.0;
            }
            rows.iter().map(|r| f(r) * r.support as f64).sum::<f64>() / total as f64
        };

        let precision = |r: &ReportRow| r.precision.unwrap_or(0.0);
        let recall = |r: &ReportRow| r.recall.unwrap_or(0.0);
        let f1 = |r: &ReportRow| r.f1_score;

        let macro_avg = ReportRow {
            label: "macro avg".to_string(),
            precision: Some(mean(&precision)),
            recall: Some(mean(&recall)),
            f1_score: mean(&f1),
            support: total,
        };
        let weighted_avg = ReportRow {
            label: "weighted avg".to_string(),
            precision: Some(weighted(&precision)),
            recall: Some(weighted(&recall)),
            f1_score: weighted(&f1),
            support: total,
        };
        let accuracy = ReportRow {
            label: "accuracy".to_string(),
            precision: None,
            recall: None,
            f1_score: cm.accuracy(),
            support: total,
        };

        rows.push(accuracy);
        rows.push(macro_avg);
        rows.push(weighted_avg);

        Self { rows }
    }

    pub fn row(&self, label: &str) -> Option<&ReportRow> {
        self.rows.iter().find(|r| r.label == label)
    }

    /// Rows as display strings, in `COLUMNS` order
    pub fn cells(&self) -> Vec<[String; 5]> {
        let fmt_opt = |v: Option<f64>| v.map_or_else(String::new, |v| format!("{:.4}", v));
        self.rows
            .iter()
            .map(|r| {
                [
                    r.label.clone(),
                    fmt_opt(r.precision),
                    fmt_opt(r.recall),
                    format!("{:.4}", r.f1_score),
                    r.support.to_string(),
                ]
            })
            .collect()
    }

    /// Format as a human-readable table
    pub fn format(&self) -> String {
        let mut output = format!(
            "{:>14} {:>10} {:>10} {:>10} {:>10}\n",
            "", Self::COLUMNS[1], Self::COLUMNS[2], Self::COLUMNS[3], Self::COLUMNS[4]
        );
        for cells in self.cells() {
            output.push_str(&format!(
                "{:>14} {:>10} {:>10} {:>10} {:>10}\n",
                cells[0], cells[1], cells[2], cells[3], cells[4]
            ));
        }
        output
    }
}

/// Complete evaluation of one model on the held-out split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub accuracy: f64,
    pub roc_auc: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub report: ClassificationReport,
}

impl EvaluationResult {
    /// Format as human-readable string
    pub fn format(&self) -> String {
        let cm = &self.confusion_matrix.counts;
        format!(
            r#"Accuracy:  {:.4}
ROC AUC:   {:.4}

Confusion Matrix:
              Predicted
              0        1
Actual 0 {:>6}   {:>6}
       1 {:>6}   {:>6}

{}"#,
            self.accuracy,
            self.roc_auc,
            cm[0][0],
            cm[0][1],
            cm[1][0],
            cm[1][1],
            self.report.format()
        )
    }
}

/// Compute all metrics from predicted labels, positive-class probabilities
/// and ground truth
pub fn evaluate(predictions: &[Label], probabilities: &[f64], ground_truth: &[Label]) -> Result<EvaluationResult> {
    if predictions.len() != ground_truth.len() || probabilities.len() != ground_truth.len() {
        return Err(PipelineError::InvalidInput(format!(
            "length mismatch: {} predictions, {} probabilities, {} labels",
            predictions.len(),
            probabilities.len(),
            ground_truth.len()
        )));
    }

    let roc_auc = roc_auc(ground_truth, probabilities)?;
    let confusion_matrix = ConfusionMatrix::from_predictions(predictions, ground_truth);

    Ok(EvaluationResult {
        accuracy: confusion_matrix.accuracy(),
        roc_auc,
        report: ClassificationReport::from_confusion_matrix(&confusion_matrix),
        confusion_matrix,
    })
}

/// Area under the ROC curve by the trapezoidal rule
///
/// Samples with equal scores are added as one step, so a constant score
/// yields exactly 0.5.
pub fn roc_auc(ground_truth: &[Label], scores: &[f64]) -> Result<f64> {
    let n_pos = ground_truth.iter().filter(|l| **l == Label::Afib).count();
    let n_neg = ground_truth.len() - n_pos;

    if n_pos == 0 || n_neg == 0 {
        return Err(PipelineError::MetricUndefined(format!(
            "ROC AUC needs both classes in the test set ({} positive, {} negative)",
            n_pos, n_neg
        )));
    }
    if scores.iter().any(|s| s.is_nan()) {
        return Err(PipelineError::InvalidInput("NaN score passed to ROC AUC".to_string()));
    }

    let mut pairs: Vec<(f64, Label)> = scores.iter().copied().zip(ground_truth.iter().copied()).collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let (mut tp, mut fp) = (0usize, 0usize);
    let (mut tpr_prev, mut fpr_prev) = (0.0, 0.0);
    let mut auc = 0.0;

    let mut i = 0;
    while i < pairs.len() {
        let threshold = pairs[i].0;
        while i < pairs.len() && pairs[i].0 == threshold {
            match pairs[i].1 {
                Label::Afib => tp += 1,
                Label::Normal => fp += 1,
            }
            i += 1;
        }

        let tpr = tp as f64 / n_pos as f64;
        let fpr = fp as f64 / n_neg as f64;
        auc += (fpr - fpr_prev) * (tpr + tpr_prev) / 2.0;
        tpr_prev = tpr;
        fpr_prev = fpr;
    }

    Ok(auc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(bits: &[usize]) -> Vec<Label> {
        bits.iter().map(|&b| Label::from_index(b)).collect()
    }

    #[test]
    fn test_confusion_matrix_perfect() {
        let truth = labels(&[1, 1, 0, 0, 0]);
        let cm = ConfusionMatrix::from_predictions(&truth, &truth);

        assert_eq!(cm.counts, [[3, 0], [0, 2]]);
        assert!(cm.is_diagonal());
        assert!((cm.accuracy() - 1.0).abs() < 1e-12);
        assert!((cm.f1_score(Label::Afib) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_matrix_layout() {
        let truth = labels(&[0, 0, 1, 1, 1]);
        let preds = labels(&[0, 1, 0, 1, 1]);
        let cm = ConfusionMatrix::from_predictions(&preds, &truth);

        assert_eq!(cm.counts, [[1, 1], [1, 2]]);
        assert_eq!(cm.get(Label::Normal, Label::Afib), 1);
        assert!((cm.precision(Label::Afib) - 2.0 / 3.0).abs() < 1e-12);
        assert!((cm.recall(Label::Afib) - 2.0 / 3.0).abs() < 1e-12);
        assert!((cm.precision(Label::Normal) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_perfect() {
        let truth = labels(&[1, 1, 0, 0]);
        let result = evaluate(&truth, &[0.9, 0.8, 0.2, 0.1], &truth).unwrap();

        assert!((result.accuracy - 1.0).abs() < 1e-12);
        assert!((result.roc_auc - 1.0).abs() < 1e-12);
        assert!(result.confusion_matrix.is_diagonal());
    }

    #[test]
    fn test_constant_predictor() {
        let truth: Vec<Label> = (0..32).map(|i| Label::from_index(usize::from(i >= 16))).collect();
        let preds = vec![Label::Normal; 32];
        let probs = vec![0.5; 32];

        let result = evaluate(&preds, &probs, &truth).unwrap();

        assert_eq!(result.confusion_matrix.counts, [[16, 0], [16, 0]]);
        assert!((result.accuracy - 0.5).abs() < 1e-12);
        assert!((result.roc_auc - 0.5).abs() < 1e-12);

        // Nothing predicted as class 1: precision falls back to zero
        let afib = result.report.row("1").unwrap();
        assert_eq!(afib.precision, Some(0.0));
        assert_eq!(afib.support, 16);
    }

    #[test]
    fn test_report_rows() {
        let truth = labels(&[0, 0, 0, 1]);
        let preds = labels(&[0, 0, 1, 1]);
        let result = evaluate(&preds, &[0.1, 0.2, 0.7, 0.9], &truth).unwrap();

        let names: Vec<&str> = result.report.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(names, vec!["0", "1", "accuracy", "macro avg", "weighted avg"]);

        let normal = result.report.row("0").unwrap();
        assert_eq!(normal.precision, Some(1.0));
        assert!((normal.recall.unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(normal.support, 3);

        let macro_avg = result.report.row("macro avg").unwrap();
        let expected_macro = (0.8 + 2.0 / 3.0) / 2.0;
        assert!((macro_avg.f1_score - expected_macro).abs() < 1e-12);

        let weighted = result.report.row("weighted avg").unwrap();
        let expected_weighted = (0.8 * 3.0 + 2.0 / 3.0) / 4.0;
        assert!((weighted.f1_score - expected_weighted).abs() < 1e-12);

        let accuracy = result.report.row("accuracy").unwrap();
        assert_eq!(accuracy.precision, None);
        assert!((accuracy.f1_score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_auc_with_ties() {
        // One positive ties with one negative at 0.5
        let truth = labels(&[1, 1, 0, 0]);
        let auc = roc_auc(&truth, &[0.9, 0.5, 0.5, 0.1]).unwrap();
        assert!((auc - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_auc_inverted() {
        let truth = labels(&[1, 1, 0, 0]);
        let auc = roc_auc(&truth, &[0.1, 0.2, 0.8, 0.9]).unwrap();
        assert!(auc.abs() < 1e-12);
    }

    #[test]
    fn test_single_class_is_undefined() {
        let truth = labels(&[1, 1, 1]);
        let err = evaluate(&truth, &[0.9, 0.8, 0.7], &truth).unwrap_err();
        assert!(matches!(err, PipelineError::MetricUndefined(_)));
    }

    #[test]
    fn test_length_mismatch() {
        let truth = labels(&[1, 0]);
        let err = evaluate(&truth, &[0.9], &truth).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn test_format() {
        let truth = labels(&[1, 0, 1, 0]);
        let result = evaluate(&truth, &[0.9, 0.1, 0.8, 0.3], &truth).unwrap();
        let formatted = result.format();

        assert!(formatted.contains("Accuracy"));
        assert!(formatted.contains("Confusion Matrix"));
        assert!(formatted.contains("weighted avg"));
    }
}
