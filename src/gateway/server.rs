//! Gateway HTTP server and dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all dispatch handler
//! - Wire middleware (tracing, request timeout)
//! - Subscribe to registry events and WS reply addresses
//! - Deploy the service registry
//! - Serve the `/serviceInfo` directory document

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, RwLock};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::cluster::{BusMessage, Cluster, MessageBus, SharedMap};
use crate::config::MeshConfig;
use crate::gateway::{routes, websocket};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::registry::model::ServiceInfoHolder;
use crate::registry::registry::{ServiceRegistry, SERVICE_HOLDER_KEY};
use crate::routing::{RouteMatcher, RouteRequest};
use crate::ws::endpoint::{Audience, WsMessageWrapper};
use crate::ws::registry::WsEndpointRegistry;

/// Largest request body the dispatch path will buffer.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub matcher: Arc<RwLock<RouteMatcher>>,
    /// Operation urls currently bound (any kind).
    pub bound_urls: Arc<RwLock<HashSet<String>>>,
    /// Urls accepting WebSocket upgrades.
    pub ws_routes: Arc<RwLock<HashSet<String>>>,
    pub ws_registry: Arc<WsEndpointRegistry>,
    pub bus: MessageBus,
    /// Replicated directory map, read by `/serviceInfo`.
    pub directory: SharedMap,
    pub config: Arc<MeshConfig>,
}

/// Entry-point router: composes the registry, the route matcher and the
/// WS endpoint registry behind one listener.
pub struct GatewayServer {
    config: Arc<MeshConfig>,
    cluster: Cluster,
    state: AppState,
    registry: Arc<ServiceRegistry>,
}

impl GatewayServer {
    pub fn new(config: MeshConfig, cluster: Cluster) -> Self {
        let config = Arc::new(config);

        let ws_registry = if config.gateway.clustered {
            WsEndpointRegistry::clustered(&cluster, &config.ws)
        } else {
            WsEndpointRegistry::local(&cluster, &config.ws)
        };

        let registry = Arc::new(ServiceRegistry::new(
            cluster.clone(),
            config.registry.clone(),
        ));

        let state = AppState {
            matcher: Arc::new(RwLock::new(RouteMatcher::new())),
            bound_urls: Arc::new(RwLock::new(HashSet::new())),
            ws_routes: Arc::new(RwLock::new(HashSet::new())),
            ws_registry: Arc::new(ws_registry),
            bus: cluster.bus().clone(),
            directory: cluster.replicated_map(),
            config: config.clone(),
        };

        Self {
            config,
            cluster,
            state,
            registry,
        }
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Run the gateway on `listener` until shutdown.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, clustered = self.config.gateway.clustered, "Gateway starting");

        // Registration-driven route binding.
        let register_rx = self.cluster.bus().consumer(&self.config.registry.register_path);
        tokio::spawn(routes::register_event_loop(
            self.state.clone(),
            register_rx,
            shutdown.subscribe(),
        ));
        let unregister_rx = self
            .cluster
            .bus()
            .consumer(&self.config.registry.unregister_path);
        tokio::spawn(routes::unregister_event_loop(
            self.state.clone(),
            unregister_rx,
            shutdown.subscribe(),
        ));

        // WS reply relay. The fan-out addresses force their audience so a
        // service cannot smuggle a different policy through them.
        for (path, audience) in [
            (self.config.ws.reply_path.clone(), None),
            (self.config.ws.reply_all_path.clone(), Some(Audience::All)),
            (
                self.config.ws.reply_all_but_sender_path.clone(),
                Some(Audience::AllButSender),
            ),
        ] {
            let rx = self.cluster.bus().consumer(&path);
            tokio::spawn(ws_reply_loop(
                self.state.clone(),
                rx,
                shutdown.subscribe(),
                audience,
            ));
        }

        // Deploy the registry component.
        self.registry.run(shutdown);

        let app = Router::new()
            .route("/serviceInfo", get(service_info_handler))
            .route("/", any(dispatch_handler))
            .route("/{*path}", any(dispatch_handler))
            .with_state(self.state.clone())
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(self.config.gateway.request_timeout_secs),
            ))
            .layer(TraceLayer::new_for_http());

        let mut rx = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.recv().await;
            })
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Relay service replies back to sockets. One loop per reply address.
async fn ws_reply_loop(
    state: AppState,
    mut rx: mpsc::UnboundedReceiver<BusMessage>,
    mut shutdown: broadcast::Receiver<()>,
    forced_audience: Option<Audience>,
) {
    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                let mut wrapper: WsMessageWrapper = match msg.body_as() {
                    Ok(wrapper) => wrapper,
                    Err(e) => {
                        tracing::warn!(error = %e, "Discarding malformed WS reply wrapper");
                        continue;
                    }
                };
                if let Some(audience) = forced_audience {
                    wrapper.audience = audience;
                }
                match wrapper.audience {
                    Audience::Sender => {
                        if let Err(e) = state.ws_registry.reply_to_caller(&wrapper) {
                            tracing::debug!(error = %e, "WS reply dropped, socket gone");
                        }
                    }
                    Audience::All | Audience::AllButSender => {
                        if let Err(e) = state.ws_registry.reply_to_url(&wrapper).await {
                            tracing::warn!(error = %e, "WS fan-out failed");
                        }
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Main dispatch handler: WebSocket upgrades go to the accept path, plain
/// HTTP goes through the dynamic route matcher.
async fn dispatch_handler(State(state): State<AppState>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    if is_websocket_upgrade(&parts.headers) {
        if state.ws_routes.read().await.contains(&path) {
            return match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
                Ok(upgrade) => {
                    let state = state.clone();
                    upgrade.on_upgrade(move |socket| websocket::handle_socket(state, socket, path))
                }
                Err(rejection) => rejection.into_response(),
            };
        }
        tracing::debug!(path = %path, "WebSocket upgrade on unknown route");
        metrics::record_route("WS", false);
        return StatusCode::NOT_FOUND.into_response();
    }

    let method = parts.method.clone();
    let query = parts
        .uri
        .query()
        .map(parse_query)
        .unwrap_or_default();
    let accept = parts
        .headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Unreadable request body");
            return (StatusCode::BAD_REQUEST, "unreadable request body").into_response();
        }
    };

    let mut route_request = RouteRequest::new(method.clone(), path);
    route_request.query = query;
    route_request.body = body;
    route_request.accept = accept;

    let (handler, params) = {
        let matcher = state.matcher.read().await;
        match matcher.lookup(&method, &route_request.path) {
            Some(found) => {
                metrics::record_route(method.as_str(), true);
                found
            }
            None => {
                metrics::record_route(method.as_str(), false);
                (matcher.fallback_handler(), HashMap::new())
            }
        }
    };
    route_request.params = params;
    handler(route_request).await
}

/// Directory endpoint: the current holder, operations enriched with
/// fully-qualified URLs.
async fn service_info_handler(State(state): State<AppState>) -> Response {
    let holder = match state
        .directory
        .get::<ServiceInfoHolder>(SERVICE_HOLDER_KEY)
        .await
    {
        Ok(read) => read.map(|v| v.value).unwrap_or_default(),
        Err(e) => {
            tracing::error!(error = %e, "Directory read failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "directory read failed").into_response();
        }
    };
    Json(routes::describe_directory(&holder)).into_response()
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}
