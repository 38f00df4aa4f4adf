// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors raised by flag and configuration validation.
///
/// These are save-time errors surfaced to the management surface.
/// Evaluation itself is total and never returns an error.
#[derive(Debug, Error)]
pub enum FlagsError {
	#[error("invalid flag key: {0}")]
	InvalidKey(String),

	#[error("variant `{0}` is declared more than once")]
	DuplicateVariant(String),

	#[error("default variant `{0}` is not declared in variants")]
	UnknownDefaultVariant(String),

	#[error("percentage rollout {0} exceeds 100")]
	RolloutOutOfRange(u8),

	#[error("value does not match declared value type `{0}`")]
	ValueTypeMismatch(String),

	#[error("invalid value: {0}")]
	InvalidValue(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FlagsError>;
