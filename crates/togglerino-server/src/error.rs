// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Server-side error kinds.
///
/// The evaluation hot path never produces these: engine-internal problems
/// are absorbed into degraded results. They surface from storage access,
/// SDK-key resolution, and management hooks.
#[derive(Debug, Error)]
pub enum ServerError {
	#[error("not found: {0}")]
	NotFound(String),

	#[error("unauthorized: {0}")]
	Unauthorized(String),

	#[error("validation error: {0}")]
	Validation(String),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error(transparent)]
	Core(#[from] togglerino_core::FlagsError),

	#[error("internal error: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
