//! Ranked class predictions returned by the inference service.

use super::labels::LabelSet;
use crate::core::AcneError;
use crate::core::errors::SimpleError;
use serde::{Deserialize, Serialize};

/// One class and its confidence, as a percentage in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPrediction {
    pub class_name: String,
    pub probability: f32,
}

/// All classes sorted by descending confidence, plus the top entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub top_prediction: ClassPrediction,
    pub all_predictions: Vec<ClassPrediction>,
}

impl PredictionResult {
    /// Turns a probability distribution indexed by `labels` into a ranked result.
    ///
    /// Probabilities are scaled to percentages and clamped to `[0, 100]`. Sorting is
    /// stable, so exactly equal confidences keep label order.
    pub fn from_probabilities(probabilities: &[f32], labels: &LabelSet) -> Result<Self, AcneError> {
        if probabilities.len() != labels.len() {
            return Err(AcneError::post_processing(
                format!(
                    "classifier returned {} scores for {} classes",
                    probabilities.len(),
                    labels.len()
                ),
                SimpleError::new("class count mismatch"),
            ));
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(AcneError::post_processing(
                "classifier returned a non-finite probability",
                SimpleError::new("non-finite probability"),
            ));
        }

        let mut all_predictions: Vec<ClassPrediction> = labels
            .iter()
            .zip(probabilities)
            .map(|((_, name), &p)| ClassPrediction {
                class_name: name.to_string(),
                probability: (p * 100.0).clamp(0.0, 100.0),
            })
            .collect();
        all_predictions.sort_by(|a, b| b.probability.total_cmp(&a.probability));

        let top_prediction = all_predictions[0].clone();
        Ok(Self {
            top_prediction,
            all_predictions,
        })
    }

    /// The `k` most confident entries.
    pub fn top_k(&self, k: usize) -> &[ClassPrediction] {
        &self.all_predictions[..k.min(self.all_predictions.len())]
    }

    /// Sum of all percentages; about 100 for a well-formed result.
    pub fn total_percentage(&self) -> f32 {
        self.all_predictions.iter().map(|p| p.probability).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> LabelSet {
        LabelSet::new(1, vec!["a".into(), "b".into(), "c".into(), "d".into()]).unwrap()
    }

    #[test]
    fn test_sorted_descending_with_top() {
        let result = PredictionResult::from_probabilities(&[0.1, 0.6, 0.05, 0.25], &labels())
            .unwrap();
        let names: Vec<_> = result
            .all_predictions
            .iter()
            .map(|p| p.class_name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "d", "a", "c"]);
        assert_eq!(result.top_prediction.class_name, "b");
        assert!((result.top_prediction.probability - 60.0).abs() < 1e-4);
        assert!((result.total_percentage() - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_ties_keep_label_order() {
        let result =
            PredictionResult::from_probabilities(&[0.25, 0.25, 0.25, 0.25], &labels()).unwrap();
        let names: Vec<_> = result
            .all_predictions
            .iter()
            .map(|p| p.class_name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert_eq!(result.top_prediction.class_name, "a");
    }

    #[test]
    fn test_clamps_and_validates() {
        let result =
            PredictionResult::from_probabilities(&[1.2, -0.1, 0.0, 0.0], &labels()).unwrap();
        assert_eq!(result.top_prediction.probability, 100.0);
        assert!(result.all_predictions.iter().all(|p| p.probability >= 0.0));

        assert!(PredictionResult::from_probabilities(&[0.5, 0.5], &labels()).is_err());
        assert!(
            PredictionResult::from_probabilities(&[f32::NAN, 0.0, 0.0, 1.0], &labels()).is_err()
        );
    }

    #[test]
    fn test_top_k_and_json_shape() {
        let result = PredictionResult::from_probabilities(&[0.1, 0.6, 0.05, 0.25], &labels())
            .unwrap();
        assert_eq!(result.top_k(2).len(), 2);
        assert_eq!(result.top_k(10).len(), 4);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["topPrediction"]["className"], "b");
        assert_eq!(json["allPredictions"].as_array().unwrap().len(), 4);
    }
}
