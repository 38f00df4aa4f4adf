// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SSE stream handler for real-time flag updates.
//!
//! Frames each hub event as `event: <type>` / `data: <json>` and emits a
//! `: keepalive` comment on an interval while the connection is idle. The
//! subscription lives exactly as long as the connection: dropping the
//! stream drops the guard, which removes the subscriber from the hub.
//! Slow consumers lose events (bounded queue) and are expected to
//! reconcile by re-polling `/api/v1/evaluate` on reconnect.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
	extract::State,
	response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, instrument};

use togglerino_core::Scope;

use crate::api::AppState;
use crate::sdk_auth::SdkAuth;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Subscribe the caller to its scope's flag change stream.
#[utoipa::path(
	get,
	path = "/api/v1/stream",
	responses(
		(status = 200, description = "SSE stream established; emits flag_update and flag_deleted events"),
		(status = 401, description = "Missing, unknown, or revoked SDK key")
	),
	tag = "evaluation"
)]
#[instrument(skip(state), fields(project = %sdk.project_key, environment = %sdk.env_key))]
pub async fn stream_flags(
	SdkAuth(sdk): SdkAuth,
	State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
	let scope = Scope::new(sdk.project_key.clone(), sdk.env_key.clone());
	info!(scope = %scope, "SDK client connected to flag stream");

	let (receiver, guard) = state.hub.subscribe(scope);

	let stream = ReceiverStream::new(receiver).map(move |event| {
		// Holding the guard in the closure ties the subscription to the
		// connection lifetime.
		let _subscription = &guard;
		let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
		Ok::<_, Infallible>(Event::default().event(event.event_type()).data(json))
	});

	Sse::new(stream).keep_alive(
		KeepAlive::new()
			.interval(KEEPALIVE_INTERVAL)
			.text("keepalive"),
	)
}
