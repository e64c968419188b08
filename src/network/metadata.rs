use serde::{Deserialize, Serialize};

/// Labels used when a two-class model carries no labels of its own.
/// Class 0 is the infected class.
pub const DEFAULT_LABELS: [&str; 2] = ["Infected", "Uninfected"];

/// Per-channel normalization applied after pixels are scaled to [0, 1]:
/// `(x - mean[c]) / std[c]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: [f64; 3],
    pub std: [f64; 3],
}

impl Normalization {
    /// ImageNet statistics, matching the preprocessing the models were
    /// trained with.
    pub const IMAGENET: Normalization = Normalization {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
    };

    /// Means must be finite and deviations finite and positive.
    pub fn validate(&self) -> Result<(), String> {
        for c in 0..3 {
            if !self.mean[c].is_finite() {
                return Err(format!("normalization mean[{}] is {}", c, self.mean[c]));
            }
            if !(self.std[c].is_finite() && self.std[c] > 0.0) {
                return Err(format!("normalization std[{}] must be positive, got {}", c, self.std[c]));
            }
        }
        Ok(())
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization::IMAGENET
    }
}

/// Optional annotations attached to a saved Network.
/// All fields are Option<> so models without metadata deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelMetadata {
    pub description: Option<String>,
    /// Human-readable class labels, indexed by class id.
    pub output_labels: Option<Vec<String>>,
    pub normalization: Option<Normalization>,
}

impl ModelMetadata {
    /// Labels for `num_classes` outputs. Falls back to [`DEFAULT_LABELS`] for
    /// two-class models and to `class N` otherwise.
    pub fn labels(&self, num_classes: usize) -> Vec<String> {
        match &self.output_labels {
            Some(labels) if labels.len() == num_classes => labels.clone(),
            _ if num_classes == DEFAULT_LABELS.len() => {
                DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
            }
            _ => (0..num_classes).map(|i| format!("class {}", i)).collect(),
        }
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_class_models_default_to_infection_labels() {
        let meta = ModelMetadata::default();
        assert_eq!(meta.labels(2), vec!["Infected", "Uninfected"]);
        assert_eq!(meta.labels(3), vec!["class 0", "class 1", "class 2"]);
    }

    #[test]
    fn explicit_labels_win_when_count_matches() {
        let meta = ModelMetadata {
            output_labels: Some(vec!["parasitized".into(), "healthy".into()]),
            ..ModelMetadata::default()
        };
        assert_eq!(meta.labels(2), vec!["parasitized", "healthy"]);
    }

    #[test]
    fn normalization_rejects_degenerate_deviations() {
        assert!(Normalization::IMAGENET.validate().is_ok());
        for bad in [0.0, -0.2, f64::NAN, f64::INFINITY] {
            let n = Normalization { std: [0.229, bad, 0.225], ..Normalization::IMAGENET };
            assert!(n.validate().is_err(), "std {} accepted", bad);
        }
        let n = Normalization { mean: [f64::NAN, 0.0, 0.0], ..Normalization::IMAGENET };
        assert!(n.validate().is_err());
    }
}
