// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SSE event types for real-time flag updates.
//!
//! Each event serializes as an internally tagged JSON object:
//!
//! ```text
//! event: flag_update
//! data: {"type":"flag_update","flag_key":"dark-mode","value":true,"variant":"on"}
//! ```
//!
//! `flag_deleted` omits `value` and `variant`. Deserialization is lenient:
//! an unknown `type` is read as `flag_update` so older SDKs keep working
//! against newer servers.

use serde::{Deserialize, Deserializer, Serialize};

use crate::flag::FlagValue;

/// A change pushed to stream subscribers of one (project, environment)
/// scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum FlagStreamEvent {
	/// A flag or its environment config changed.
	#[serde(rename = "flag_update")]
	FlagUpdate {
		flag_key: String,
		value: FlagValue,
		variant: String,
	},

	/// A flag was deleted from the scope.
	#[serde(rename = "flag_deleted")]
	FlagDeleted { flag_key: String },
}

impl FlagStreamEvent {
	/// The SSE `event:` field name.
	pub fn event_type(&self) -> &'static str {
		match self {
			FlagStreamEvent::FlagUpdate { .. } => "flag_update",
			FlagStreamEvent::FlagDeleted { .. } => "flag_deleted",
		}
	}

	pub fn flag_update(
		flag_key: impl Into<String>,
		value: FlagValue,
		variant: impl Into<String>,
	) -> Self {
		FlagStreamEvent::FlagUpdate {
			flag_key: flag_key.into(),
			value,
			variant: variant.into(),
		}
	}

	pub fn flag_deleted(flag_key: impl Into<String>) -> Self {
		FlagStreamEvent::FlagDeleted {
			flag_key: flag_key.into(),
		}
	}

	pub fn flag_key(&self) -> &str {
		match self {
			FlagStreamEvent::FlagUpdate { flag_key, .. } => flag_key,
			FlagStreamEvent::FlagDeleted { flag_key } => flag_key,
		}
	}
}

#[derive(Deserialize)]
struct RawEvent {
	#[serde(rename = "type")]
	kind: Option<String>,
	flag_key: String,
	#[serde(default)]
	value: Option<FlagValue>,
	#[serde(default)]
	variant: Option<String>,
}

impl<'de> Deserialize<'de> for FlagStreamEvent {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = RawEvent::deserialize(deserializer)?;
		match raw.kind.as_deref() {
			Some("flag_deleted") => Ok(FlagStreamEvent::FlagDeleted {
				flag_key: raw.flag_key,
			}),
			// Unknown or missing types are treated as updates for backward
			// compatibility with older SDK payloads.
			_ => Ok(FlagStreamEvent::FlagUpdate {
				flag_key: raw.flag_key,
				value: raw.value.unwrap_or(FlagValue::Json(serde_json::Value::Null)),
				variant: raw.variant.unwrap_or_default(),
			}),
		}
	}
}
