// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Liveness endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::AppState;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
	pub status: &'static str,
	pub cached_scopes: usize,
	pub cached_flags: usize,
	pub stream_subscribers: usize,
}

#[utoipa::path(
	get,
	path = "/health",
	responses(
		(status = 200, description = "Server is live", body = HealthResponse)
	),
	tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
	let hub_stats = state.hub.stats();
	Json(HealthResponse {
		status: "ok",
		cached_scopes: state.cache.scope_count(),
		cached_flags: state.cache.entry_count(),
		stream_subscribers: hub_stats.subscriber_count,
	})
}
