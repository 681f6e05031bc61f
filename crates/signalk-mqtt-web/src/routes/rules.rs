//! Import rule routes.
//!
//! # Endpoints
//!
//! ### `GET /api/rules`
//! Returns the current rules in evaluation order.
//!
//! **Response:**
//! ```json
//! { "success": true, "rules": [ ... ], "mqttConnected": true }
//! ```
//!
//! ### `POST /api/rules`
//! Replaces the whole rule list. The new list is validated and saved before
//! it takes effect; on any error the running rules stay as they were.
//!
//! **Request:**
//! ```json
//! { "rules": [ { "id": "nav", "mqttTopic": "vessels/+/navigation/#" } ] }
//! ```

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use serde_json::{json, Value};

use signalk_mqtt_core::ImportRule;

use crate::{ApiError, AppState};

const UPDATED_MESSAGE: &str = "Import rules updated and saved to persistent storage";

/// Body of `GET /api/rules`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesResponse {
    pub success: bool,
    pub rules: Vec<ImportRule>,
    pub mqtt_connected: bool,
}

/// Create rule routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/rules", get(get_rules).post(post_rules))
}

/// GET /api/rules
async fn get_rules(State(state): State<AppState>) -> Json<RulesResponse> {
    Json(RulesResponse {
        success: true,
        rules: state.rules(),
        mqtt_connected: state.is_connected(),
    })
}

/// POST /api/rules
async fn post_rules(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let rules = parse_rules(body)?;
    state.replace_rules(rules).await?;
    Ok(Json(json!({
        "success": true,
        "message": UPDATED_MESSAGE,
    })))
}

fn parse_rules(mut body: Value) -> Result<Vec<ImportRule>, ApiError> {
    let rules = match body.get_mut("rules").map(Value::take) {
        Some(rules @ Value::Array(_)) => rules,
        _ => return Err(ApiError::BadRequest("Rules must be an array".to_string())),
    };
    serde_json::from_value(rules).map_err(|e| ApiError::BadRequest(format!("Invalid rule: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use signalk_mqtt_core::{
        default_rules, ImportConfig, MemoryRuleStorage, MemorySink, RuleStorage,
    };
    use signalk_mqtt_server::ImportService;

    fn app_with(storage: Arc<MemoryRuleStorage>) -> (Router, AppState) {
        let service = ImportService::new(
            &ImportConfig::default(),
            storage,
            Arc::new(MemorySink::new()),
        )
        .unwrap();
        let state = Arc::new(service);
        (routes().with_state(state.clone()), state)
    }

    fn post(body: Value) -> Request<Body> {
        Request::post("/rules")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_rules() {
        let (app, state) = app_with(Arc::new(MemoryRuleStorage::new()));
        state.status().set_connected(true);

        let response = app
            .oneshot(Request::get("/rules").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["mqttConnected"], true);
        assert_eq!(body["rules"].as_array().unwrap().len(), default_rules().len());
        assert_eq!(body["rules"][0]["mqttTopic"], "vessels/+/#");
    }

    #[tokio::test]
    async fn test_post_rules_replaces_and_saves() {
        let storage = Arc::new(MemoryRuleStorage::new());
        let (app, state) = app_with(storage.clone());

        let response = app
            .oneshot(post(json!({
                "rules": [
                    { "id": "wind", "mqttTopic": "sensors/wind/speed", "payloadFormat": "value-only" }
                ]
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "success": true, "message": UPDATED_MESSAGE })
        );

        let rules = state.rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].topic_pattern, "sensors/wind/speed");
        assert_eq!(storage.load_rules().unwrap(), Some(rules));
    }

    #[tokio::test]
    async fn test_post_rules_requires_array() {
        let (app, state) = app_with(Arc::new(MemoryRuleStorage::new()));

        for body in [json!({ "rules": {} }), json!({})] {
            let response = app.clone().oneshot(post(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(
                json_body(response).await,
                json!({ "success": false, "error": "Rules must be an array" })
            );
        }
        assert_eq!(state.rules(), default_rules());
    }

    #[tokio::test]
    async fn test_post_invalid_rules_rejected() {
        let (app, state) = app_with(Arc::new(MemoryRuleStorage::new()));

        // Missing topic pattern
        let response = app
            .clone()
            .oneshot(post(json!({ "rules": [ { "id": "a" } ] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Duplicate ids
        let response = app
            .oneshot(post(json!({
                "rules": [
                    { "id": "a", "mqttTopic": "x/#" },
                    { "id": "a", "mqttTopic": "y/#" }
                ]
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);
        assert_eq!(state.rules(), default_rules());
    }

    #[tokio::test]
    async fn test_post_rules_save_failure() {
        let (app, state) = app_with(Arc::new(MemoryRuleStorage::read_only()));

        let response = app
            .oneshot(post(json!({ "rules": [ { "id": "a", "mqttTopic": "x/#" } ] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await["error"],
            "Failed to save rules to persistent storage"
        );
        assert_eq!(state.rules(), default_rules());
    }
}
