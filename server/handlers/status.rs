use serde_json::json;

use crate::routes::{json_response, JsonResponse};
use crate::state::AppState;

pub fn handle_root(state: &AppState) -> JsonResponse {
    json_response(200, &json!({
        "message": "Malaria Detection API",
        "status": "active",
        "model": state.input_description(),
        "features": ["Prediction", "Grad-CAM Visualization", "Explainable AI"],
        "endpoints": {
            "predict": "/predict - POST with image",
            "health": "/health - GET to check status"
        }
    }))
}

pub fn handle_health(state: &AppState) -> JsonResponse {
    json_response(200, &json!({
        "status": "healthy",
        "model_loaded": state.model_loaded(),
        "gradcam_enabled": state.config.include_gradcam,
    }))
}
