use serde::Serialize;
use tracing::{info, warn};

use crate::config::ExplainConfig;
use crate::error::{DiagnoseError, EvalError};
use crate::explain::capture::argmax;
use crate::explain::engine::{explain, AttributionMethod};
use crate::math::tensor::ImageTensor;
use crate::network::classifier::Classifier;
use crate::network::context::EvalContext;
use crate::preprocess::PreparedImage;
use crate::visual::compose::VisualizationBundle;
use crate::visual::encode::EncodedImage;

/// Top class of one forward pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub class_id: usize,
    pub label: String,
    /// Softmax probability of `class_id` in percent, rounded to 2 decimals.
    pub confidence: f64,
    pub probabilities: Vec<f64>,
}

/// A prediction with its visual explanation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    pub prediction: Prediction,
    pub visualization: VisualizationBundle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<AttributionMethod>,
    /// Reading guide for the overlay; only set when one was rendered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation_error: Option<String>,
}

/// Which class, if any, [`diagnose`] should explain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExplainTarget {
    /// Prediction only.
    Skip,
    /// The predicted class.
    #[default]
    Predicted,
    Class(usize),
}

/// Numerically stable softmax.
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn percent(probability: f64) -> f64 {
    (probability * 10_000.0).round() / 100.0
}

pub fn explanation_text(label: &str) -> String {
    format!(
        "Red and yellow areas mark the regions that most influenced the '{}' prediction.",
        label
    )
}

/// Classifies `image`. `labels` are indexed by class id; missing entries are
/// reported as `class N`.
pub fn predict<C>(classifier: &C, image: &ImageTensor, labels: &[String]) -> Result<Prediction, EvalError>
where
    C: Classifier + ?Sized,
{
    let mut ctx = EvalContext::new();
    let scores = classifier.forward(image, &mut ctx)?;
    let class_id = argmax(&scores).ok_or(EvalError::EmptyScores)?;
    let probabilities = softmax(&scores);
    let label = labels
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class {}", class_id));

    Ok(Prediction {
        class_id,
        label,
        confidence: percent(probabilities[class_id]),
        probabilities,
    })
}

/// Predicts and explains the class selected by `target`.
///
/// Only a failed prediction is an error. A failed explanation is reported in
/// `explanation_error` next to an original-only visualization.
pub fn diagnose<C>(
    classifier: &C,
    prepared: &PreparedImage,
    labels: &[String],
    config: &ExplainConfig,
    target: ExplainTarget,
) -> Result<Diagnosis, DiagnoseError>
where
    C: Classifier + ?Sized,
{
    let prediction = predict(classifier, &prepared.tensor, labels)?;
    info!(class_id = prediction.class_id, label = %prediction.label, confidence = prediction.confidence, "prediction made");

    let target_class = match target {
        ExplainTarget::Skip => None,
        ExplainTarget::Predicted => Some(prediction.class_id),
        ExplainTarget::Class(class) => Some(class),
    };
    let Some(target_class) = target_class else {
        return Ok(Diagnosis {
            prediction,
            visualization: VisualizationBundle::original_only(EncodedImage::png(&prepared.original)?, None),
            method: None,
            explanation: None,
            explanation_error: None,
        });
    };

    match explain(classifier, &prepared.tensor, &prepared.original, Some(target_class), config) {
        Ok((explanation, visualization)) => {
            let label = labels
                .get(explanation.target_class)
                .map(String::as_str)
                .unwrap_or(&prediction.label);
            let text = (!visualization.is_degraded()).then(|| explanation_text(label));
            let explanation_error = visualization.failure.as_ref().map(ToString::to_string);
            Ok(Diagnosis {
                prediction,
                visualization,
                method: Some(explanation.method),
                explanation: text,
                explanation_error,
            })
        }
        Err(err) => {
            warn!(error = %err, "explanation failed, returning prediction only");
            Ok(Diagnosis {
                prediction,
                visualization: VisualizationBundle::original_only(EncodedImage::png(&prepared.original)?, None),
                method: None,
                explanation: None,
                explanation_error: Some(err.to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::{Shape, Tensor3};
    use crate::network::network::Network;
    use crate::network::spec::NetworkSpec;
    use approx::assert_abs_diff_eq;
    use image::{Rgb, RgbImage};

    fn labels() -> Vec<String> {
        vec!["Infected".to_owned(), "Uninfected".to_owned()]
    }

    fn prepared(shape: Shape) -> PreparedImage {
        PreparedImage {
            tensor: Tensor3::from_fn(shape, |c, y, x| ((c + 2 * y + 3 * x) % 5) as f64 * 0.2 - 0.5),
            original: RgbImage::from_fn(20, 20, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 128])),
        }
    }

    #[test]
    fn softmax_is_stable_and_sums_to_one() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert_abs_diff_eq!(probs[0], 0.5, epsilon = 1e-12);
        let probs = softmax(&[0.0, 2.0, -1.0]);
        assert_abs_diff_eq!(probs.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(probs[1] > probs[0] && probs[0] > probs[2]);
    }

    #[test]
    fn confidence_is_rounded_percent() {
        assert_eq!(percent(0.912345), 91.23);
        assert_eq!(percent(1.0), 100.0);
    }

    #[test]
    fn prediction_uses_labels() {
        let shape = Shape::new(3, 8, 8);
        let net = Network::from_spec(&NetworkSpec::dense_only(shape, 2), 3).unwrap();
        let prediction = predict(&net, &prepared(shape).tensor, &labels()).unwrap();
        assert_eq!(prediction.label, labels()[prediction.class_id]);
        assert!(prediction.confidence >= 50.0 && prediction.confidence <= 100.0);
    }

    #[test]
    fn diagnosis_explains_predicted_class() {
        let shape = Shape::new(3, 16, 16);
        let net = Network::from_spec(&NetworkSpec::plain_conv(shape, 2), 3).unwrap();
        let diagnosis = diagnose(&net, &prepared(shape), &labels(), &ExplainConfig::default(), ExplainTarget::Predicted).unwrap();
        assert_eq!(diagnosis.method, Some(AttributionMethod::GradCam));
        assert!(!diagnosis.visualization.is_degraded());
        assert!(diagnosis.explanation.as_deref().unwrap().contains(&diagnosis.prediction.label));
        assert!(diagnosis.explanation_error.is_none());
    }

    #[test]
    fn disabled_explanation_returns_original_only() {
        let shape = Shape::new(3, 8, 8);
        let net = Network::from_spec(&NetworkSpec::dense_only(shape, 2), 3).unwrap();
        let diagnosis = diagnose(&net, &prepared(shape), &labels(), &ExplainConfig::default(), ExplainTarget::Skip).unwrap();
        assert!(diagnosis.visualization.is_degraded());
        assert!(diagnosis.visualization.failure.is_none());
        assert!(diagnosis.explanation.is_none() && diagnosis.explanation_error.is_none());
    }

    #[test]
    fn out_of_range_target_is_reported_not_fatal() {
        let shape = Shape::new(3, 16, 16);
        let net = Network::from_spec(&NetworkSpec::plain_conv(shape, 2), 3).unwrap();
        let diagnosis = diagnose(&net, &prepared(shape), &labels(), &ExplainConfig::default(), ExplainTarget::Class(5)).unwrap();
        assert!(diagnosis.visualization.is_degraded());
        assert!(diagnosis.explanation_error.as_deref().unwrap().contains("out of range"));
        assert!(net.hooks().is_empty());
    }

    #[test]
    fn failed_prediction_is_an_error() {
        let net = Network::from_spec(&NetworkSpec::dense_only(Shape::new(3, 8, 8), 2), 3).unwrap();
        let wrong = prepared(Shape::new(3, 4, 4));
        let err = diagnose(&net, &wrong, &labels(), &ExplainConfig::default(), ExplainTarget::Predicted).unwrap_err();
        assert!(matches!(err, DiagnoseError::Prediction(EvalError::InputShape { .. })));
    }
}
