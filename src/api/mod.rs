// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Axum web server layer

use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    routing::{get, post},
    BoxError, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

pub mod handlers;
pub mod middleware;
pub mod responses;

use crate::bridge::{ConnectionManager, Dispatcher, HealthReporter, ToolRouter};
use crate::config::Config;
use responses::ApiError;

/// Application state containing all shared dependencies
///
/// Built once at startup; every component is shared behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub health: Arc<HealthReporter>,
    pub connections: Arc<ConnectionManager>,
    pub router: Arc<ToolRouter>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(connections: Arc<ConnectionManager>, router: Arc<ToolRouter>, config: Config) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(router.clone(), connections.clone())),
            health: Arc::new(HealthReporter::new(connections.clone())),
            connections,
            router,
            config: Arc::new(config),
        }
    }
}

/// Create the Axum router with all routes and middleware
pub fn create_router(app_state: &AppState) -> Router<AppState> {
    // `:name` is a backend for GET and a tool for POST; the segment must use
    // one parameter name across both routes.
    let router = Router::new()
        .route("/api/health", get(handlers::health_handler))
        .route("/api/health/:server", get(handlers::server_health_handler))
        .route("/api/servers", get(handlers::servers_handler))
        .route(
            "/api/tools/:name",
            get(handlers::list_tools_handler).post(handlers::call_tool_handler),
        )
        .route(
            "/api/tools/:name/:tool",
            post(handlers::call_server_tool_handler),
        );

    let body_limit = app_state.config.body_size_limit_bytes;
    let timeout_secs = app_state.config.request_timeout_secs;

    // Layers wrap outward: the last one added runs first.
    let timeout_stack = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(|e: BoxError| async move {
            let status = if e.is::<tower::timeout::error::Elapsed>() {
                StatusCode::REQUEST_TIMEOUT
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            ApiError::new(status, e.to_string())
        }))
        .timeout(Duration::from_secs(timeout_secs))
        .into_inner();

    router
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(timeout_stack)
        .layer(axum::middleware::from_fn(middleware::request_id))
        .layer(middleware::tracing_layer())
        .layer(CorsLayer::permissive())
}
