//! Output decoding: raw network vector to labeled prediction.

use serde::{Deserialize, Serialize};

use crate::model::config::OutputActivation;
use crate::model::labels::{ClassLabel, NUM_CLASSES};
use crate::utils::error::{NoduleScanError, Result};

/// Result of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Class at the argmax of `probabilities`
    pub label: ClassLabel,

    /// `probabilities[label.index()]`
    pub confidence: f32,

    /// Score per class in `ClassLabel::ALL` order
    pub probabilities: [f32; NUM_CLASSES],
}

impl PredictionResult {
    /// Check whether the prediction clears a confidence threshold
    pub fn is_high_confidence(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    /// Shannon entropy of the distribution (higher means less certain)
    pub fn entropy(&self) -> f32 {
        self.probabilities
            .iter()
            .filter(|&&p| p > 0.0)
            .map(|&p| -p * p.ln())
            .sum()
    }

    /// Gap between the best and second-best score
    pub fn margin(&self) -> f32 {
        let runner_up = self
            .probabilities
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != self.label.index())
            .map(|(_, &p)| p)
            .fold(f32::NEG_INFINITY, f32::max);
        self.confidence - runner_up
    }
}

impl std::fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:.2}%)", self.label, self.confidence * 100.0)?;
        for (label, p) in ClassLabel::ALL.iter().zip(self.probabilities.iter()) {
            write!(f, " {}={:.4}", label, p)?;
        }
        Ok(())
    }
}

/// Index of the largest value; the first occurrence wins ties
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, max)) if v <= max => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Numerically stable softmax
pub fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Decode a raw output vector.
///
/// With `OutputActivation::Identity` the vector is returned verbatim and
/// `confidence` is its maximum, so it is only calibrated when the network ends
/// in softmax.
pub fn decode(raw: &[f32], activation: OutputActivation) -> Result<PredictionResult> {
    if raw.len() != NUM_CLASSES {
        return Err(NoduleScanError::Inference(format!(
            "model returned {} scores, expected {}",
            raw.len(),
            NUM_CLASSES
        )));
    }
    if let Some(bad) = raw.iter().find(|v| !v.is_finite()) {
        return Err(NoduleScanError::Inference(format!(
            "model returned a non-finite score ({})",
            bad
        )));
    }

    let scores = match activation {
        OutputActivation::Identity => raw.to_vec(),
        OutputActivation::Softmax => softmax(raw),
    };

    let mut probabilities = [0.0f32; NUM_CLASSES];
    probabilities.copy_from_slice(&scores);

    let index = argmax(&probabilities)
        .ok_or_else(|| NoduleScanError::Inference("empty score vector".into()))?;
    let label = ClassLabel::from_index(index)
        .ok_or_else(|| NoduleScanError::Inference(format!("no label for index {}", index)))?;

    Ok(PredictionResult {
        label,
        confidence: probabilities[index],
        probabilities,
    })
}
