// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Evaluation HTTP handlers.
//!
//! Both handlers run entirely against the in-memory cache snapshot; the
//! only storage work they trigger is fire-and-forget tracking (context
//! attribute names, unknown-flag counters) on detached tasks so it
//! outlives the request.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::IntoResponse,
	Json,
};
use serde::{Deserialize, Serialize};

use togglerino_core::{evaluate_flag, EvaluationContext, EvaluationResult, ProjectId};

use crate::api::AppState;
use crate::api_response::not_found;
use crate::impl_api_error_response;
use crate::sdk_auth::SdkAuth;

/// Error response for evaluation endpoints.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct FlagsErrorResponse {
	pub error: String,
	pub message: String,
}

impl_api_error_response!(FlagsErrorResponse);

/// Request body for both evaluation endpoints.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct EvaluateRequest {
	#[serde(default)]
	pub context: EvaluationContextApi,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct EvaluationContextApi {
	#[serde(default)]
	pub user_id: String,
	#[serde(default)]
	#[schema(value_type = Object)]
	pub attributes: HashMap<String, serde_json::Value>,
}

impl From<EvaluationContextApi> for EvaluationContext {
	fn from(api: EvaluationContextApi) -> Self {
		EvaluationContext {
			user_id: api.user_id,
			attributes: api.attributes,
		}
	}
}

/// One flag decision on the wire.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct FlagResultApi {
	#[schema(value_type = Object)]
	pub value: serde_json::Value,
	pub variant: String,
	#[schema(value_type = String)]
	pub reason: togglerino_core::EvaluationReason,
}

impl From<EvaluationResult> for FlagResultApi {
	fn from(result: EvaluationResult) -> Self {
		FlagResultApi {
			value: result.value.to_json(),
			variant: result.variant,
			reason: result.reason,
		}
	}
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EvaluateAllResponse {
	pub flags: BTreeMap<String, FlagResultApi>,
}

/// Record context attribute names for the project, detached from the
/// request lifetime.
fn track_context_attributes(state: &AppState, project_id: ProjectId, context: &EvaluationContextApi) {
	if context.attributes.is_empty() {
		return;
	}
	let names: Vec<String> = context.attributes.keys().cloned().collect();
	let repo = Arc::clone(&state.repo);
	tokio::spawn(async move {
		if let Err(e) = repo.record_context_attributes(project_id, &names).await {
			tracing::debug!(error = %e, "failed to record context attribute names");
		}
	});
}

/// Evaluate every flag in the caller's scope.
#[utoipa::path(
	post,
	path = "/api/v1/evaluate",
	request_body = EvaluateRequest,
	responses(
		(status = 200, description = "Decisions for every flag in scope", body = EvaluateAllResponse),
		(status = 401, description = "Missing, unknown, or revoked SDK key")
	),
	tag = "evaluation"
)]
#[tracing::instrument(skip(state, payload), fields(project = %sdk.project_key, environment = %sdk.env_key))]
pub async fn evaluate_all(
	SdkAuth(sdk): SdkAuth,
	State(state): State<AppState>,
	Json(payload): Json<EvaluateRequest>,
) -> impl IntoResponse {
	track_context_attributes(&state, sdk.project_id, &payload.context);
	let context: EvaluationContext = payload.context.into();

	let mut flags = BTreeMap::new();
	if let Some(entries) = state.cache.get_flags(&sdk.project_key, &sdk.env_key) {
		for (key, entry) in entries.iter() {
			let result = evaluate_flag(&entry.flag, &entry.config, &context);
			flags.insert(key.clone(), FlagResultApi::from(result));
		}
	}

	(StatusCode::OK, Json(EvaluateAllResponse { flags }))
}

/// Evaluate a single flag by key. Unknown keys are 404 and counted for
/// the dashboard's unknown-flag report.
#[utoipa::path(
	post,
	path = "/api/v1/evaluate/{flag_key}",
	params(
		("flag_key" = String, Path, description = "Flag key")
	),
	request_body = EvaluateRequest,
	responses(
		(status = 200, description = "Decision for the flag", body = FlagResultApi),
		(status = 401, description = "Missing, unknown, or revoked SDK key"),
		(status = 404, description = "No such flag in this scope", body = FlagsErrorResponse)
	),
	tag = "evaluation"
)]
#[tracing::instrument(skip(state, payload), fields(project = %sdk.project_key, environment = %sdk.env_key, flag_key = %flag_key))]
pub async fn evaluate_single(
	SdkAuth(sdk): SdkAuth,
	State(state): State<AppState>,
	Path(flag_key): Path<String>,
	Json(payload): Json<EvaluateRequest>,
) -> impl IntoResponse {
	track_context_attributes(&state, sdk.project_id, &payload.context);
	let context: EvaluationContext = payload.context.into();

	let Some(entry) = state.cache.get_flag(&sdk.project_key, &sdk.env_key, &flag_key) else {
		// Count the miss for the dashboard, detached from this request.
		let repo = Arc::clone(&state.repo);
		let project_id = sdk.project_id;
		let environment_id = sdk.environment_id;
		tokio::spawn(async move {
			if let Err(e) = repo
				.record_unknown_flag(project_id, environment_id, &flag_key)
				.await
			{
				tracing::debug!(error = %e, "failed to record unknown flag");
			}
		});
		return not_found::<FlagsErrorResponse>("flag not found").into_response();
	};

	let result = evaluate_flag(&entry.flag, &entry.config, &context);
	(StatusCode::OK, Json(FlagResultApi::from(result))).into_response()
}
