// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! OpenAPI document for the SDK-facing surface.

use axum::Json;
use utoipa::OpenApi;

use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::evaluate::evaluate_all,
		routes::evaluate::evaluate_single,
		routes::stream::stream_flags,
		routes::health::health,
	),
	components(schemas(
		routes::evaluate::EvaluateRequest,
		routes::evaluate::EvaluationContextApi,
		routes::evaluate::FlagResultApi,
		routes::evaluate::EvaluateAllResponse,
		routes::evaluate::FlagsErrorResponse,
		routes::health::HealthResponse,
		crate::sdk_auth::AuthErrorResponse,
	)),
	tags(
		(name = "evaluation", description = "SDK evaluation and streaming endpoints"),
		(name = "health", description = "Liveness")
	),
	info(
		title = "Togglerino SDK API",
		description = "Client-facing evaluation and streaming surface"
	)
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
	Json(ApiDoc::openapi())
}
