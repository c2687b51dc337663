//! HTTP surface
//!
//! A small axum app exposing the tool registry: discovery under `/tools`,
//! invocation under `/tools/{name}`. Every response is wrapped in the same
//! envelope and gateway errors are translated to HTTP statuses by kind.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerSettings;
use crate::error::{GatewayError, Result};
use crate::tools::{ToolDescriptor, ToolInput, ToolRegistry};

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
}

fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::NotFound(_) | GatewayError::ToolNotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::Connection(_) | GatewayError::Authentication(_) | GatewayError::Request(_) => {
            StatusCode::BAD_GATEWAY
        }
        GatewayError::InvalidInput(_) | GatewayError::Serialization(_) => StatusCode::BAD_REQUEST,
        GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn health() -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(json!({
        "status": "healthy",
        "service": "ledger-gateway"
    })))
}

async fn list_tools(State(state): State<AppState>) -> Json<ApiResponse<Vec<ToolDescriptor>>> {
    Json(ApiResponse::success(state.registry.descriptors()))
}

/// Invoke a tool by name. The request body carries the tool parameters; an
/// empty body means defaults, anything else must be valid JSON.
async fn run_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: String,
) -> (StatusCode, Json<ApiResponse<Value>>) {
    let parameters = if body.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(err) => {
                let err = GatewayError::InvalidInput(format!("malformed parameters: {err}"));
                return (status_for(&err), Json(ApiResponse::error(err.to_string())));
            }
        }
    };
    let input = ToolInput {
        tool_name: name,
        parameters,
    };

    match state.registry.dispatch(input).await {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Err(err) => (status_for(&err), Json(ApiResponse::error(err.to_string()))),
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/tools/:name", post(run_tool))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(router: Router, settings: &ServerSettings) -> Result<()> {
    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "gateway API listening");
    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ErpClient;
    use crate::config::BackendSettings;
    use crate::rpc::mock::MockTransport;
    use crate::tools::create_default_registry;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state() -> (AppState, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::scripted(vec![
            Ok(json!(1)),
            Ok(json!([])),
        ]));
        let client = Arc::new(ErpClient::with_transport(
            BackendSettings::new("http://erp.test", "db", "user", "pw"),
            transport.clone(),
        ));
        let state = AppState {
            registry: Arc::new(create_default_registry(client, Duration::from_secs(60))),
        };
        (state, transport)
    }

    #[test]
    fn statuses_follow_the_error_taxonomy() {
        assert_eq!(
            status_for(&GatewayError::NotFound("invoice 9".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&GatewayError::ToolNotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&GatewayError::Timeout("deadline".into())),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&GatewayError::Connection("refused".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&GatewayError::Authentication("rejected".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&GatewayError::InvalidInput("bad".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn response_envelope_hides_unused_fields() {
        let ok = serde_json::to_value(ApiResponse::success(json!({"n": 1}))).unwrap();
        assert_eq!(ok["success"], json!(true));
        assert!(ok.get("error").is_none());
        assert!(ok.get("timestamp").is_some());

        let err = serde_json::to_value(ApiResponse::<Value>::error("boom")).unwrap();
        assert_eq!(err["success"], json!(false));
        assert!(err.get("data").is_none());
        assert_eq!(err["error"], json!("boom"));
    }

    #[tokio::test]
    async fn unknown_tool_maps_to_not_found() {
        let (state, _) = state();
        let (status, Json(response)) = run_tool(
            State(state),
            Path("list_sales_orders".to_string()),
            String::new(),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!response.success);
    }

    #[tokio::test]
    async fn missing_body_runs_the_tool_with_defaults() {
        let (state, _) = state();
        let (status, Json(response)) = run_tool(
            State(state),
            Path("list_vendor_bills".to_string()),
            String::new(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(response.success);
        assert_eq!(response.data, Some(json!([])));
    }

    #[tokio::test]
    async fn unparseable_body_is_rejected_before_the_tool_runs() {
        let (state, transport) = state();
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tools/list_vendor_bills")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"pending": tr"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let envelope: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope["success"], json!(false));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_body_means_defaults_through_the_router_too() {
        let (state, _) = state();
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tools/list_vendor_bills")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let envelope: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope["success"], json!(true));
        assert_eq!(envelope["data"], json!([]));
    }
}
