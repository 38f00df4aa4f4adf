// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SDK key authentication for the evaluation and stream endpoints.
//!
//! Keys are opaque bearer tokens of the form `tgl_<env>_<hex>`. Only a
//! SHA-256 digest is stored; the extractor hashes the presented token and
//! resolves it to exactly one (project, environment) scope before any
//! handler body runs. Management endpoints use a separate session path.

use axum::{
	extract::FromRequestParts,
	http::{header::AUTHORIZATION, request::Parts},
	response::{IntoResponse, Response},
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::api::AppState;
use crate::api_response::{internal_error, unauthorized};
use crate::impl_api_error_response;
use crate::repository::SdkKeyScope;

/// Error response for authentication failures.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthErrorResponse {
	pub error: String,
	pub message: String,
}

impl_api_error_response!(AuthErrorResponse);

/// Generate a fresh SDK key for an environment. The raw key is shown to
/// the operator once and never stored.
pub fn generate_sdk_key(env_key: &str) -> String {
	format!("tgl_{}_{}", env_key, Uuid::new_v4().simple())
}

/// Digest a raw SDK key for storage and lookup.
pub fn hash_sdk_key(key: &str) -> String {
	hex::encode(Sha256::digest(key.as_bytes()))
}

/// Extractor that authenticates the `Authorization: Bearer <sdk-key>`
/// header and resolves the caller's scope.
pub struct SdkAuth(pub SdkKeyScope);

impl FromRequestParts<AppState> for SdkAuth {
	type Rejection = Response;

	async fn from_request_parts(
		parts: &mut Parts,
		state: &AppState,
	) -> Result<Self, Self::Rejection> {
		let token = parts
			.headers
			.get(AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.strip_prefix("Bearer "))
			.map(str::trim)
			.filter(|token| !token.is_empty());

		let Some(token) = token else {
			return Err(
				unauthorized::<AuthErrorResponse>("missing_sdk_key", "SDK key required")
					.into_response(),
			);
		};

		let scope = match state.repo.find_sdk_key(&hash_sdk_key(token)).await {
			Ok(Some(scope)) => scope,
			Ok(None) => {
				return Err(
					unauthorized::<AuthErrorResponse>("invalid_sdk_key", "Unknown SDK key")
						.into_response(),
				);
			}
			Err(e) => {
				tracing::error!(error = %e, "SDK key lookup failed");
				return Err(
					internal_error::<AuthErrorResponse>("Internal server error").into_response(),
				);
			}
		};

		if scope.revoked {
			tracing::warn!(sdk_key_id = %scope.sdk_key_id, "revoked SDK key presented");
			return Err(
				unauthorized::<AuthErrorResponse>("sdk_key_revoked", "SDK key has been revoked")
					.into_response(),
			);
		}

		// Best-effort last-used touch; the request does not wait on it.
		let repo = state.repo.clone();
		let sdk_key_id = scope.sdk_key_id;
		tokio::spawn(async move {
			if let Err(e) = repo.touch_sdk_key(sdk_key_id).await {
				tracing::debug!(error = %e, "failed to touch SDK key");
			}
		});

		Ok(SdkAuth(scope))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_generated_keys_carry_env_prefix_and_are_unique() {
		let a = generate_sdk_key("production");
		let b = generate_sdk_key("production");
		assert!(a.starts_with("tgl_production_"));
		assert_ne!(a, b);
	}

	#[test]
	fn test_hash_is_deterministic_hex() {
		let key = generate_sdk_key("staging");
		let h1 = hash_sdk_key(&key);
		let h2 = hash_sdk_key(&key);
		assert_eq!(h1, h2);
		assert_eq!(h1.len(), 64);
		assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[test]
	fn test_different_keys_hash_differently() {
		assert_ne!(
			hash_sdk_key("tgl_production_aaaa"),
			hash_sdk_key("tgl_production_aaab")
		);
	}
}
