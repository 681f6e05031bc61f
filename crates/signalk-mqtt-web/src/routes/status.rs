//! Connection status and statistics routes.

use axum::{extract::State, response::Json, routing::get, routing::post, Router};
use serde::Serialize;
use serde_json::{json, Value};

use signalk_mqtt_server::ImportStats;

use crate::{ApiError, AppState};

/// Body of `GET /api/mqtt-status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttStatus {
    pub success: bool,
    pub connected: bool,
    pub broker: String,
    pub client_id: String,
}

/// Body of `GET /api/stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: ImportStats,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/mqtt-status", get(mqtt_status))
        .route("/test-mqtt", post(test_mqtt))
        .route("/stats", get(stats))
}

/// GET /api/mqtt-status
async fn mqtt_status(State(state): State<AppState>) -> Json<MqttStatus> {
    let status = state.status();
    Json(MqttStatus {
        success: true,
        connected: status.is_connected(),
        broker: status.broker().to_string(),
        client_id: status.client_id().to_string(),
    })
}

/// POST /api/test-mqtt
async fn test_mqtt(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if !state.is_connected() {
        return Err(ApiError::Unavailable("MQTT not connected".to_string()));
    }
    Ok(Json(json!({
        "success": true,
        "message": "MQTT connection is active and receiving messages",
    })))
}

/// GET /api/stats
async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        success: true,
        stats: state.stats(),
    })
}
