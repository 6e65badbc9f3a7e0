//! HTTP dispatch for a deployed stack
//!
//! Every request flows through one dispatcher: preflight first, then route
//! matching against the stack's routing tree, then admission, then unit
//! invocation. A unit fault becomes the platform 502 and never takes the
//! server down.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use poststack_compute::{HandlerUnit, UnitRequest};
use poststack_core::{ApiError, ErrorCode, RequestId};
use poststack_gateway::{ApiGatewayStorage, RestApi, RouteError, UsagePlanStorage};

use crate::assembly::DeployedStack;

/// Header carrying the credential
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared state for the dispatcher
pub struct AppState {
    gateway: Arc<ApiGatewayStorage>,
    usage: Arc<UsagePlanStorage>,
    units: HashMap<String, Arc<dyn HandlerUnit>>,
    api: RestApi,
    stage_name: String,
}

/// Build the axum router serving a deployed stack
pub fn create_router(stack: &DeployedStack) -> Router {
    let state = Arc::new(AppState {
        gateway: stack.gateway.clone(),
        usage: stack.usage.clone(),
        units: stack.units.clone(),
        api: stack.api.clone(),
        stage_name: stack.stage_name.clone(),
    });

    Router::new()
        .route("/health", get(health_check))
        .route("/", any(dispatch))
        .route("/*path", any(dispatch))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, r#"{"status": "running"}"#)
}

async fn dispatch(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = RequestId::new();
    let path = uri.path();
    info!(method = %method, path = %path, request_id = %request_id, "gateway request");

    // Preflight is answered at the gateway, before admission.
    if method == Method::OPTIONS {
        return preflight(&state);
    }

    let matched = match state
        .gateway
        .match_request(&state.api.api_id, &method, path)
    {
        Ok(m) => m,
        Err(RouteError::PathNotFound) => {
            return reject(&state, ErrorCode::NotFound, "Not Found", &request_id)
        }
        Err(RouteError::MethodNotAllowed) => {
            return reject(
                &state,
                ErrorCode::MethodNotAllowed,
                "Method Not Allowed",
                &request_id,
            )
        }
    };

    // Admission: a request without a recognized key never reaches a unit.
    if matched.api_key_required {
        let provided = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if let Err(err) = state
            .usage
            .admission(&state.api.api_id, &state.stage_name, provided)
        {
            info!(request_id = %request_id, %err, "request rejected at admission");
            return reject(&state, ErrorCode::Forbidden, "Forbidden", &request_id);
        }
    }

    let Some(unit) = state.units.get(&matched.unit_name) else {
        error!(unit = %matched.unit_name, "route integration targets an unknown unit");
        return reject(
            &state,
            ErrorCode::InternalError,
            "Internal server error",
            &request_id,
        );
    };

    let request = UnitRequest {
        method,
        path_params: matched.path_params,
        body: if body.is_empty() { None } else { Some(body) },
    };

    match unit.invoke(request).await {
        Ok(response) => json_response(&state, response.status, response.body.to_string()),
        Err(err) => {
            // The invocation is isolated; surface the fault and keep serving.
            error!(unit = %matched.unit_name, request_id = %request_id, %err, "handler unit fault");
            reject(
                &state,
                ErrorCode::InternalError,
                "Internal server error",
                &request_id,
            )
        }
    }
}

fn preflight(state: &AppState) -> Response {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            state.api.cors.allow_origin_header(),
        )
        .header(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            state.api.cors.allow_methods_header(),
        )
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, "*")
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::NO_CONTENT.into_response())
}

fn reject(state: &AppState, code: ErrorCode, message: &str, request_id: &RequestId) -> Response {
    let error = ApiError::new(code, message).with_request_id(request_id.as_str());
    json_response(
        state,
        error.code.http_status(),
        error.to_json(),
    )
}

fn json_response(state: &AppState, status: u16, body: String) -> Response {
    Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .header(header::CONTENT_TYPE, "application/json")
        .header(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            state.api.cors.allow_origin_header(),
        )
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
