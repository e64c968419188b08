use serde::Serialize;
use tiny_http::Request;
use tracing::{info, warn};

use malaria_cam::diagnose::{diagnose, Diagnosis, ExplainTarget};
use malaria_cam::explain::AttributionMethod;
use malaria_cam::preprocess::prepare;
use malaria_cam::{Classifier, EncodedImage};

use crate::routes::{error_response, json_response, JsonResponse};
use crate::state::AppState;
use crate::util::body::{read_capped, BodyError};
use crate::util::multipart::{extract_boundary, extract_file_part};

#[derive(Debug, Serialize)]
struct PredictResult {
    prediction: String,
    confidence: f64,
    class_id: usize,
    original_image: EncodedImage,
    #[serde(skip_serializing_if = "Option::is_none")]
    heatmap: Option<EncodedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overlay: Option<EncodedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<AttributionMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    explanation_error: Option<String>,
}

impl From<Diagnosis> for PredictResult {
    fn from(diagnosis: Diagnosis) -> Self {
        let Diagnosis { prediction, visualization, method, explanation, explanation_error } = diagnosis;
        PredictResult {
            prediction: prediction.label,
            confidence: prediction.confidence,
            class_id: prediction.class_id,
            original_image: visualization.original,
            heatmap: visualization.heatmap,
            overlay: visualization.overlay,
            method,
            explanation,
            explanation_error,
        }
    }
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    filename: Option<String>,
    status: &'static str,
    result: PredictResult,
}

/// `POST /predict`: multipart upload with one image file.
pub fn handle(request: &mut Request, state: &AppState) -> JsonResponse {
    let Some(model) = state.model.as_ref() else {
        return error_response(503, "Model not loaded");
    };

    let content_type = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_owned())
        .unwrap_or_default();
    let Some(boundary) = extract_boundary(&content_type) else {
        return error_response(400, "Expected a multipart/form-data upload");
    };

    let limit = state.config.max_upload_bytes;
    if request.body_length().is_some_and(|len| len as u64 > limit) {
        return error_response(413, &format!("Upload exceeds {} bytes", limit));
    }
    let body = match read_capped(request.as_reader(), limit) {
        Ok(body) => body,
        Err(BodyError::TooLarge { limit }) => {
            return error_response(413, &format!("Upload exceeds {} bytes", limit));
        }
        Err(BodyError::Io(err)) => return error_response(400, &format!("Error reading file: {}", err)),
    };

    let Some(file) = extract_file_part(&body, &boundary) else {
        return error_response(400, "No file found in the upload");
    };
    if let Some(part_type) = file.content_type.as_deref() {
        if !part_type.starts_with("image/") {
            return error_response(400, "The file must be an image (jpeg, png, etc.)");
        }
    }

    let prepared = match prepare(&file.data, model.input_shape(), &model.metadata.normalization()) {
        Ok(prepared) => prepared,
        Err(err) => {
            warn!(error = %err, filename = ?file.filename, "rejecting upload");
            return error_response(400, &format!("Error processing image: {}", err));
        }
    };

    let target = if state.config.include_gradcam {
        ExplainTarget::Predicted
    } else {
        ExplainTarget::Skip
    };
    let diagnosis = match diagnose(model, &prepared, state.labels(), &state.config.explain, target) {
        Ok(diagnosis) => diagnosis,
        Err(err) => {
            warn!(error = %err, filename = ?file.filename, "prediction failed");
            return error_response(400, &format!("Error processing image: {}", err));
        }
    };

    info!(
        field = ?file.field,
        filename = ?file.filename,
        prediction = %diagnosis.prediction.label,
        confidence = diagnosis.prediction.confidence,
        explained = !diagnosis.visualization.is_degraded(),
        "prediction served"
    );

    json_response(200, &PredictResponse {
        filename: file.filename,
        status: "success",
        result: diagnosis.into(),
    })
}
