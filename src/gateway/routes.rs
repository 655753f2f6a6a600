//! Registration-driven route binding.
//!
//! # Responsibilities
//! - Consume register/unregister events and mutate the route matcher
//! - Build the bus-dispatch handler for REST operations
//! - Content negotiation against an operation's `produces` list
//! - Describe the directory with fully-qualified operation URLs

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use url::Url;

use crate::cluster::{BusError, BusMessage};
use crate::gateway::server::AppState;
use crate::registry::model::{Operation, OperationType, ServiceInfo, ServiceInfoHolder};
use crate::routing::{RouteHandler, RouteRequest};

/// Consume register events until shutdown.
pub(crate) async fn register_event_loop(
    state: AppState,
    mut rx: mpsc::UnboundedReceiver<BusMessage>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                match msg.body_as::<ServiceInfo>() {
                    Ok(info) => bind_service(&state, &info).await,
                    Err(e) => tracing::warn!(error = %e, "Discarding malformed register event"),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Consume unregister events until shutdown.
pub(crate) async fn unregister_event_loop(
    state: AppState,
    mut rx: mpsc::UnboundedReceiver<BusMessage>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                match msg.body_as::<ServiceInfo>() {
                    Ok(info) => unbind_service(&state, &info).await,
                    Err(e) => tracing::warn!(error = %e, "Discarding malformed unregister event"),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Bind every operation of `info` that is not already bound.
pub(crate) async fn bind_service(state: &AppState, info: &ServiceInfo) {
    let mut bound = state.bound_urls.write().await;
    for op in &info.operations {
        if bound.contains(&op.url) {
            continue;
        }
        let added = match op.kind {
            OperationType::RestGet => bind_http(state, op, Method::GET).await,
            OperationType::RestPost => bind_http(state, op, Method::POST).await,
            OperationType::Websocket => {
                state.ws_routes.write().await.insert(op.url.clone());
                true
            }
            // Bus-only operations need no gateway binding.
            OperationType::Eventbus => false,
        };
        if added {
            bound.insert(op.url.clone());
            tracing::info!(
                service = %info.service_name,
                url = %op.url,
                kind = ?op.kind,
                "Route bound"
            );
        }
    }
}

/// Retract every route belonging to `info`'s operations.
pub(crate) async fn unbind_service(state: &AppState, info: &ServiceInfo) {
    let mut bound = state.bound_urls.write().await;
    let mut matcher = state.matcher.write().await;
    let mut ws_routes = state.ws_routes.write().await;
    for op in &info.operations {
        matcher.remove_all(&op.url);
        ws_routes.remove(&op.url);
        if bound.remove(&op.url) {
            tracing::info!(service = %info.service_name, url = %op.url, "Route retracted");
        }
    }
}

async fn bind_http(state: &AppState, op: &Operation, method: Method) -> bool {
    let handler = rest_handler(state, op);
    let mut matcher = state.matcher.write().await;
    match matcher.add_pattern(method, &op.url, handler) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(url = %op.url, error = %e, "Rejecting operation with invalid pattern");
            false
        }
    }
}

/// Handler for a matched REST operation: serialize the request's
/// parameters, dispatch over the bus with a bounded timeout, convert the
/// reply to an HTTP response. Timeouts become error responses; there is
/// no retry.
fn rest_handler(state: &AppState, op: &Operation) -> RouteHandler {
    let bus = state.bus.clone();
    let op = op.clone();
    let timeout = Duration::from_millis(state.config.gateway.dispatch_timeout_ms);

    Arc::new(move |req: RouteRequest| {
        let bus = bus.clone();
        let op = op.clone();
        Box::pin(async move {
            let payload = serde_json::json!({
                "path": req.path,
                "params": req.params,
                "query": req.query,
                "body": String::from_utf8_lossy(&req.body),
            });
            let body = match serde_json::to_vec(&payload) {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!(url = %op.url, error = %e, "Failed to encode dispatch payload");
                    return (StatusCode::INTERNAL_SERVER_ERROR, "encoding failure").into_response();
                }
            };

            match bus.request(&op.url, body, timeout).await {
                Ok(reply) => negotiated_response(&op.produces, req.accept.as_deref(), reply),
                Err(e @ BusError::Timeout(_)) => {
                    tracing::warn!(url = %op.url, error = %e, "Service did not answer in time");
                    (StatusCode::GATEWAY_TIMEOUT, "service did not answer in time").into_response()
                }
                Err(e) => {
                    tracing::warn!(url = %op.url, error = %e, "Dispatch failed");
                    (StatusCode::BAD_GATEWAY, "service unreachable").into_response()
                }
            }
        })
    })
}

/// Build the HTTP response for a service reply.
///
/// With an Accept header, an exact case-insensitive match against the
/// declared `produces` mimes sets the content type; no match leaves it
/// unset. Without one, every declared mime is set as a response header.
pub(crate) fn negotiated_response(
    produces: &[String],
    accept: Option<&str>,
    body: Vec<u8>,
) -> Response {
    let mut response = Response::new(Body::from(body));
    match accept {
        Some(accept) => {
            if let Some(mime) = negotiate(produces, accept) {
                if let Ok(value) = HeaderValue::from_str(&mime) {
                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                }
            }
        }
        None => {
            for mime in produces {
                if let Ok(value) = HeaderValue::from_str(mime) {
                    response.headers_mut().append(header::CONTENT_TYPE, value);
                }
            }
        }
    }
    response
}

fn negotiate(produces: &[String], accept: &str) -> Option<String> {
    for offered in accept.split(',') {
        let offered = offered.split(';').next().unwrap_or("").trim();
        if let Some(mime) = produces.iter().find(|p| p.eq_ignore_ascii_case(offered)) {
            return Some(mime.clone());
        }
    }
    None
}

/// Directory document served on `GET /serviceInfo`.
#[derive(Serialize)]
pub struct DirectoryDoc {
    pub services: Vec<ServiceDoc>,
}

#[derive(Serialize)]
pub struct ServiceDoc {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub last_connection: u64,
    pub operations: Vec<OperationDoc>,
}

#[derive(Serialize)]
pub struct OperationDoc {
    pub name: String,
    pub description: String,
    /// Fully-qualified URL: ws:// for WEBSOCKET operations, http://
    /// otherwise, prefixed with the advertising host:port.
    pub url: String,
    #[serde(rename = "type")]
    pub kind: OperationType,
    pub produces: Vec<String>,
    pub consumes: Vec<String>,
    pub parameters: Vec<String>,
}

pub(crate) fn describe_directory(holder: &ServiceInfoHolder) -> DirectoryDoc {
    DirectoryDoc {
        services: holder
            .services
            .iter()
            .map(|info| ServiceDoc {
                service_name: info.service_name.clone(),
                host: info.host.clone(),
                port: info.port,
                last_connection: info.last_connection,
                operations: info
                    .operations
                    .iter()
                    .map(|op| OperationDoc {
                        name: op.name.clone(),
                        description: op.description.clone(),
                        url: qualified_url(info, op),
                        kind: op.kind,
                        produces: op.produces.clone(),
                        consumes: op.consumes.clone(),
                        parameters: op.parameters.clone(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn qualified_url(info: &ServiceInfo, op: &Operation) -> String {
    let scheme = match op.kind {
        OperationType::Websocket => "ws",
        _ => "http",
    };
    let raw = format!("{scheme}://{}:{}{}", info.host, info.port, op.url);
    Url::parse(&raw).map(|u| u.to_string()).unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_accept_match_sets_content_type() {
        let produces = vec!["text/plain".to_string()];
        let response = negotiated_response(&produces, Some("TEXT/PLAIN"), b"ok".to_vec());
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
    }

    #[test]
    fn test_accept_list_with_quality_params() {
        let produces = vec!["application/json".to_string()];
        let response = negotiated_response(
            &produces,
            Some("text/html, application/json;q=0.9"),
            b"{}".to_vec(),
        );
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_absent_accept_sets_all_declared_mimes() {
        let produces = vec!["text/plain".to_string(), "application/json".to_string()];
        let response = negotiated_response(&produces, None, b"ok".to_vec());
        let values: Vec<_> = response
            .headers()
            .get_all(header::CONTENT_TYPE)
            .iter()
            .collect();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_no_match_leaves_content_type_unset() {
        let produces = vec!["text/plain".to_string()];
        let response = negotiated_response(&produces, Some("application/xml"), b"ok".to_vec());
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_qualified_url_scheme_by_operation_type() {
        let info = ServiceInfo::new("/chat", "10.0.0.5", 9100, Vec::new());
        let ws = Operation::new("socket", "/chat/room", OperationType::Websocket);
        let rest = Operation::new("list", "/chat/rooms", OperationType::RestGet);

        assert_eq!(qualified_url(&info, &ws), "ws://10.0.0.5:9100/chat/room");
        assert_eq!(qualified_url(&info, &rest), "http://10.0.0.5:9100/chat/rooms");
    }
}
