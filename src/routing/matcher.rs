//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Hold method-keyed, append-only binding lists
//! - First-match lookup in registration order
//! - Remove bindings by original pattern string across all methods
//! - Invoke the fallback handler on a miss (default: 404, empty body)

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;

use crate::observability::metrics;
use crate::routing::pattern::{CompiledPattern, PatternError};

/// A matched request handed to a route handler.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub method: Method,
    pub path: String,
    /// Query string pairs.
    pub query: HashMap<String, String>,
    /// Parameters extracted by the matched pattern.
    pub params: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Raw Accept header, if the client sent one.
    pub accept: Option<String>,
}

impl RouteRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            params: HashMap::new(),
            body: Vec::new(),
            accept: None,
        }
    }
}

/// Boxed asynchronous route handler.
pub type RouteHandler = Arc<dyn Fn(RouteRequest) -> BoxFuture<'static, Response> + Send + Sync>;

struct RouteBinding {
    pattern: CompiledPattern,
    handler: RouteHandler,
}

/// Method-keyed collection of compiled URL patterns.
///
/// Plain data: the entry-point router guards mutation with its own lock,
/// matching the single-writer dispatch model.
pub struct RouteMatcher {
    bindings: HashMap<Method, Vec<RouteBinding>>,
    fallback: RouteHandler,
}

impl Default for RouteMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteMatcher {
    /// Matcher with the default 404 empty-body fallback.
    pub fn new() -> Self {
        Self::with_fallback(Arc::new(|_req| {
            Box::pin(async { StatusCode::NOT_FOUND.into_response() })
        }))
    }

    pub fn with_fallback(fallback: RouteHandler) -> Self {
        Self {
            bindings: HashMap::new(),
            fallback,
        }
    }

    /// Bind a `:name` token pattern. Appends to the method's list,
    /// preserving registration order.
    pub fn add_pattern(
        &mut self,
        method: Method,
        pattern: &str,
        handler: RouteHandler,
    ) -> Result<(), PatternError> {
        let pattern = CompiledPattern::compile(pattern)?;
        self.bindings
            .entry(method)
            .or_default()
            .push(RouteBinding { pattern, handler });
        Ok(())
    }

    /// Bind a raw regular expression.
    pub fn add_regex(
        &mut self,
        method: Method,
        regex: &str,
        handler: RouteHandler,
    ) -> Result<(), PatternError> {
        let pattern = CompiledPattern::from_regex(regex)?;
        self.bindings
            .entry(method)
            .or_default()
            .push(RouteBinding { pattern, handler });
        Ok(())
    }

    /// Remove every binding whose original pattern string equals `pattern`,
    /// across all methods. No-op when absent.
    pub fn remove_all(&mut self, pattern: &str) {
        for bindings in self.bindings.values_mut() {
            bindings.retain(|b| b.pattern.raw() != pattern);
        }
    }

    /// Find the first binding matching `path` in registration order.
    pub fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(RouteHandler, HashMap<String, String>)> {
        self.bindings.get(method)?.iter().find_map(|binding| {
            binding
                .pattern
                .matches(path)
                .map(|params| (binding.handler.clone(), params))
        })
    }

    /// The configured fallback handler.
    pub fn fallback_handler(&self) -> RouteHandler {
        self.fallback.clone()
    }

    /// Route a request: first match wins, miss falls back.
    pub async fn route(&self, mut request: RouteRequest) -> Response {
        match self.lookup(&request.method, &request.path) {
            Some((handler, params)) => {
                metrics::record_route(request.method.as_str(), true);
                request.params = params;
                handler(request).await
            }
            None => {
                metrics::record_route(request.method.as_str(), false);
                (self.fallback)(request).await
            }
        }
    }

    /// Number of bindings for `method`.
    pub fn bound_count(&self, method: &Method) -> usize {
        self.bindings.get(method).map(|b| b.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(tag: &'static str) -> RouteHandler {
        Arc::new(move |_req| Box::pin(async move { (StatusCode::OK, tag).into_response() }))
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_first_match_wins_in_registration_order() {
        let mut matcher = RouteMatcher::new();
        matcher
            .add_pattern(Method::GET, "/items/:id", tagged("by-id"))
            .unwrap();
        matcher
            .add_pattern(Method::GET, "/items/special", tagged("special"))
            .unwrap();

        // "/items/special" also matches the earlier ":id" binding.
        let response = matcher
            .route(RouteRequest::new(Method::GET, "/items/special"))
            .await;
        assert_eq!(body_text(response).await, "by-id");
    }

    #[tokio::test]
    async fn test_params_attached_to_request() {
        let mut matcher = RouteMatcher::new();
        matcher
            .add_pattern(
                Method::GET,
                "/orders/:id",
                Arc::new(|req| {
                    Box::pin(async move {
                        (StatusCode::OK, req.params["id"].clone()).into_response()
                    })
                }),
            )
            .unwrap();

        let response = matcher
            .route(RouteRequest::new(Method::GET, "/orders/42"))
            .await;
        assert_eq!(body_text(response).await, "42");
    }

    #[tokio::test]
    async fn test_miss_falls_back_to_404_empty_body() {
        let matcher = RouteMatcher::new();
        let response = matcher
            .route(RouteRequest::new(Method::GET, "/nowhere"))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_all_spans_methods() {
        let mut matcher = RouteMatcher::new();
        matcher
            .add_pattern(Method::GET, "/svc/op", tagged("get"))
            .unwrap();
        matcher
            .add_pattern(Method::POST, "/svc/op", tagged("post"))
            .unwrap();
        matcher.remove_all("/svc/op");

        assert_eq!(matcher.bound_count(&Method::GET), 0);
        assert_eq!(matcher.bound_count(&Method::POST), 0);

        // Removing again is a no-op.
        matcher.remove_all("/svc/op");
    }

    #[tokio::test]
    async fn test_methods_are_isolated() {
        let mut matcher = RouteMatcher::new();
        matcher
            .add_pattern(Method::POST, "/svc/op", tagged("post"))
            .unwrap();

        let response = matcher
            .route(RouteRequest::new(Method::GET, "/svc/op"))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
