// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and router construction.

use std::sync::Arc;

use axum::{
	routing::{get, post},
	Router,
};
use sqlx::SqlitePool;

use crate::audit::AuditService;
use crate::cache::FlagCache;
use crate::hub::ChangeHub;
use crate::repository::{FlagsRepository, SqliteFlagsRepository};
use crate::routes;

/// Shared state handed to every handler.
///
/// The configuration cache and the change hub are the only long-lived
/// mutable structures; both are constructed here at startup and torn down
/// on shutdown. The management API mutates storage through `repo` and then
/// invokes `cache.refresh` and `hub.broadcast`.
#[derive(Clone)]
pub struct AppState {
	pub repo: Arc<dyn FlagsRepository>,
	pub cache: Arc<FlagCache>,
	pub hub: ChangeHub,
	pub audit: Arc<AuditService>,
}

/// Build the application state from a database pool.
pub fn create_app_state(pool: SqlitePool) -> AppState {
	AppState {
		repo: Arc::new(SqliteFlagsRepository::new(pool.clone())),
		cache: Arc::new(FlagCache::new()),
		hub: ChangeHub::with_defaults(),
		audit: Arc::new(AuditService::new(pool)),
	}
}

/// Build the HTTP router for the SDK-facing surface.
pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(routes::health::health))
		.route("/api/v1/evaluate", post(routes::evaluate::evaluate_all))
		.route(
			"/api/v1/evaluate/{flag_key}",
			post(routes::evaluate::evaluate_single),
		)
		.route("/api/v1/stream", get(routes::stream::stream_flags))
		.route(
			"/api/docs/openapi.json",
			get(crate::api_docs::openapi_json),
		)
		.with_state(state)
}
