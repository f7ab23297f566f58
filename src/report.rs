//! Caller-side presentation of predictions.
//!
//! The engine only knows the three model classes. Mapping them to a clinical
//! Normal/Abnormal finding and summarizing batches is a policy of whoever
//! displays the results; the CLI uses the helpers here.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::inference::decode::PredictionResult;
use crate::model::labels::{ClassLabel, NUM_CLASSES};

/// Two-way finding derived from the model class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClinicalFinding {
    Normal,
    Abnormal,
}

impl ClinicalFinding {
    /// `non-nodule` is Normal, any nodule (benign or malignant) is Abnormal
    pub fn from_label(label: ClassLabel) -> Self {
        match label {
            ClassLabel::NonNodule => ClinicalFinding::Normal,
            ClassLabel::Benign | ClassLabel::Malignant => ClinicalFinding::Abnormal,
        }
    }
}

impl fmt::Display for ClinicalFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClinicalFinding::Normal => f.write_str("Normal"),
            ClinicalFinding::Abnormal => f.write_str("Abnormal"),
        }
    }
}

/// One classified image, as shown to a user or written as JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionReport {
    /// Where the image came from (file path or upload name)
    pub source: String,
    pub result: ClinicalFinding,
    pub category: ClassLabel,
    pub confidence: f32,
    pub probabilities: [f32; NUM_CLASSES],
    pub inference_time_ms: f64,
}

impl PredictionReport {
    pub fn new(
        source: impl Into<String>,
        prediction: &PredictionResult,
        elapsed: Duration,
    ) -> Self {
        Self {
            source: source.into(),
            result: ClinicalFinding::from_label(prediction.label),
            category: prediction.label,
            confidence: prediction.confidence,
            probabilities: prediction.probabilities,
            inference_time_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

/// Batch prediction statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Images classified successfully
    pub total_images: usize,

    /// Images that failed (bad input or runtime fault)
    pub failed_images: usize,

    /// Count per class in `ClassLabel::ALL` order
    pub class_counts: [usize; NUM_CLASSES],

    pub normal_count: usize,
    pub abnormal_count: usize,

    pub avg_time_per_image_ms: f64,
    pub min_time_ms: f64,
    pub max_time_ms: f64,

    /// Predictions at or above `confidence_threshold`
    pub high_confidence_count: usize,
    pub confidence_threshold: f32,
}

impl BatchSummary {
    pub fn from_reports(
        reports: &[PredictionReport],
        failed_images: usize,
        confidence_threshold: f32,
    ) -> Self {
        let mut summary = Self {
            failed_images,
            confidence_threshold,
            ..Default::default()
        };
        if reports.is_empty() {
            return summary;
        }

        for report in reports {
            summary.class_counts[report.category.index()] += 1;
            match report.result {
                ClinicalFinding::Normal => summary.normal_count += 1,
                ClinicalFinding::Abnormal => summary.abnormal_count += 1,
            }
            if report.confidence >= confidence_threshold {
                summary.high_confidence_count += 1;
            }
        }

        let times: Vec<f64> = reports.iter().map(|r| r.inference_time_ms).collect();
        summary.total_images = reports.len();
        summary.avg_time_per_image_ms = times.iter().sum::<f64>() / times.len() as f64;
        summary.min_time_ms = times.iter().copied().fold(f64::INFINITY, f64::min);
        summary.max_time_ms = times.iter().copied().fold(0.0, f64::max);
        summary
    }

    pub fn count(&self, label: ClassLabel) -> usize {
        self.class_counts[label.index()]
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch Summary:")?;
        writeln!(f, "  Classified: {}", self.total_images)?;
        writeln!(f, "  Failed:     {}", self.failed_images)?;
        for label in ClassLabel::ALL {
            writeln!(f, "  {:<11} {}", format!("{}:", label), self.count(label))?;
        }
        writeln!(f, "  Normal / Abnormal: {} / {}", self.normal_count, self.abnormal_count)?;
        if self.total_images > 0 {
            writeln!(
                f,
                "  Time/image: {:.2} ms avg ({:.2} min, {:.2} max)",
                self.avg_time_per_image_ms, self.min_time_ms, self.max_time_ms
            )?;
            writeln!(
                f,
                "  High confidence (>={:.0}%): {} ({:.1}%)",
                self.confidence_threshold * 100.0,
                self.high_confidence_count,
                100.0 * self.high_confidence_count as f64 / self.total_images as f64
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::decode::decode;
    use crate::model::config::OutputActivation;

    fn report(scores: [f32; 3], ms: u64) -> PredictionReport {
        let prediction = decode(&scores, OutputActivation::Identity).unwrap();
        PredictionReport::new("scan.png", &prediction, Duration::from_millis(ms))
    }

    #[test]
    fn test_clinical_mapping() {
        assert_eq!(ClinicalFinding::from_label(ClassLabel::NonNodule), ClinicalFinding::Normal);
        assert_eq!(ClinicalFinding::from_label(ClassLabel::Benign), ClinicalFinding::Abnormal);
        assert_eq!(ClinicalFinding::from_label(ClassLabel::Malignant), ClinicalFinding::Abnormal);
    }

    #[test]
    fn test_report_json() {
        let json = serde_json::to_value(report([0.1, 0.1, 0.8], 12)).unwrap();
        assert_eq!(json["result"], "Normal");
        assert_eq!(json["category"], "non-nodule");
        assert_eq!(json["source"], "scan.png");
    }

    #[test]
    fn test_batch_summary() {
        let reports = vec![
            report([0.7, 0.2, 0.1], 10),
            report([0.05, 0.95, 0.0], 20),
            report([0.1, 0.1, 0.8], 30),
            report([0.0, 0.0, 1.0], 40),
        ];
        let summary = BatchSummary::from_reports(&reports, 1, 0.9);

        assert_eq!(summary.total_images, 4);
        assert_eq!(summary.failed_images, 1);
        assert_eq!(summary.count(ClassLabel::Benign), 1);
        assert_eq!(summary.count(ClassLabel::Malignant), 1);
        assert_eq!(summary.count(ClassLabel::NonNodule), 2);
        assert_eq!(summary.normal_count, 2);
        assert_eq!(summary.abnormal_count, 2);
        assert_eq!(summary.high_confidence_count, 2);
        assert!((summary.avg_time_per_image_ms - 25.0).abs() < 1e-9);
        assert!((summary.min_time_ms - 10.0).abs() < 1e-9);
        assert!((summary.max_time_ms - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_batch() {
        let summary = BatchSummary::from_reports(&[], 3, 0.9);
        assert_eq!(summary.total_images, 0);
        assert_eq!(summary.failed_images, 3);
        assert!(summary.to_string().contains("Failed:     3"));
    }
}
