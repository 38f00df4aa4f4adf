// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flag, variant, and per-environment configuration types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::condition::Condition;
use crate::error::FlagsError;

/// Unique identifier for a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagId(pub Uuid);

/// Unique identifier for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub Uuid);

/// Unique identifier for an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentId(pub Uuid);

/// Unique identifier for an SDK key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SdkKeyId(pub Uuid);

macro_rules! impl_id {
	($ty:ident) => {
		impl $ty {
			pub fn new() -> Self {
				Self(Uuid::new_v4())
			}
		}

		impl Default for $ty {
			fn default() -> Self {
				Self::new()
			}
		}

		impl fmt::Display for $ty {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				self.0.fmt(f)
			}
		}

		impl FromStr for $ty {
			type Err = uuid::Error;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Ok(Self(Uuid::parse_str(s)?))
			}
		}
	};
}

impl_id!(FlagId);
impl_id!(ProjectId);
impl_id!(EnvironmentId);
impl_id!(SdkKeyId);

/// The (project, environment) pair that keys cache entries and hub
/// subscriptions. Both components are the human-readable keys, not ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
	pub project_key: String,
	pub env_key: String,
}

impl Scope {
	pub fn new(project_key: impl Into<String>, env_key: impl Into<String>) -> Self {
		Self {
			project_key: project_key.into(),
			env_key: env_key.into(),
		}
	}
}

impl fmt::Display for Scope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.project_key, self.env_key)
	}
}

/// The shape of the value a flag returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
	Boolean,
	String,
	Number,
	Json,
}

impl ValueType {
	pub fn as_str(&self) -> &'static str {
		match self {
			ValueType::Boolean => "boolean",
			ValueType::String => "string",
			ValueType::Number => "number",
			ValueType::Json => "json",
		}
	}

	/// Whether a payload matches this declared shape. `json` accepts any
	/// payload since its values are opaque to the engine.
	pub fn accepts(&self, value: &FlagValue) -> bool {
		match self {
			ValueType::Boolean => matches!(value, FlagValue::Boolean(_)),
			ValueType::String => matches!(value, FlagValue::String(_)),
			ValueType::Number => matches!(value, FlagValue::Number(_)),
			ValueType::Json => true,
		}
	}
}

impl fmt::Display for ValueType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ValueType {
	type Err = FlagsError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"boolean" => Ok(ValueType::Boolean),
			"string" => Ok(ValueType::String),
			"number" => Ok(ValueType::Number),
			"json" => Ok(ValueType::Json),
			other => Err(FlagsError::InvalidValue(format!("unknown value type `{other}`"))),
		}
	}
}

/// The purpose of a flag. Drives the default lifetime used by the
/// lifecycle checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagType {
	Release,
	Experiment,
	Operational,
	KillSwitch,
	Permission,
}

impl FlagType {
	pub fn as_str(&self) -> &'static str {
		match self {
			FlagType::Release => "release",
			FlagType::Experiment => "experiment",
			FlagType::Operational => "operational",
			FlagType::KillSwitch => "kill-switch",
			FlagType::Permission => "permission",
		}
	}

	/// Default lifetime in days before a flag of this type is considered
	/// potentially stale. `None` means permanent.
	pub fn default_lifetime_days(&self) -> Option<u32> {
		match self {
			FlagType::Release | FlagType::Experiment => Some(40),
			FlagType::Operational => Some(7),
			FlagType::KillSwitch | FlagType::Permission => None,
		}
	}
}

impl fmt::Display for FlagType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for FlagType {
	type Err = FlagsError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"release" => Ok(FlagType::Release),
			"experiment" => Ok(FlagType::Experiment),
			"operational" => Ok(FlagType::Operational),
			"kill-switch" => Ok(FlagType::KillSwitch),
			"permission" => Ok(FlagType::Permission),
			other => Err(FlagsError::InvalidValue(format!("unknown flag type `{other}`"))),
		}
	}
}

/// Staleness state of a flag.
///
/// Transitions along `active -> potentially_stale -> stale` are performed
/// by the lifecycle checker; `archived` and the way back to `active` belong
/// to the management surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
	Active,
	PotentiallyStale,
	Stale,
	Archived,
}

impl LifecycleStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			LifecycleStatus::Active => "active",
			LifecycleStatus::PotentiallyStale => "potentially_stale",
			LifecycleStatus::Stale => "stale",
			LifecycleStatus::Archived => "archived",
		}
	}
}

impl fmt::Display for LifecycleStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for LifecycleStatus {
	type Err = FlagsError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"active" => Ok(LifecycleStatus::Active),
			"potentially_stale" => Ok(LifecycleStatus::PotentiallyStale),
			"stale" => Ok(LifecycleStatus::Stale),
			"archived" => Ok(LifecycleStatus::Archived),
			other => Err(FlagsError::InvalidValue(format!(
				"unknown lifecycle status `{other}`"
			))),
		}
	}
}

/// A flag payload. Shape-polymorphic: the engine passes these through
/// opaquely; typed getters live in the SDKs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
	Boolean(bool),
	Number(f64),
	String(String),
	Json(serde_json::Value),
}

impl FlagValue {
	/// Convert a raw JSON node into the closest payload shape.
	pub fn from_json(value: serde_json::Value) -> Self {
		match value {
			serde_json::Value::Bool(b) => FlagValue::Boolean(b),
			serde_json::Value::Number(n) => match n.as_f64() {
				Some(f) => FlagValue::Number(f),
				None => FlagValue::Json(serde_json::Value::Number(n)),
			},
			serde_json::Value::String(s) => FlagValue::String(s),
			other => FlagValue::Json(other),
		}
	}

	pub fn to_json(&self) -> serde_json::Value {
		match self {
			FlagValue::Boolean(b) => serde_json::Value::Bool(*b),
			FlagValue::Number(n) => serde_json::Number::from_f64(*n)
				.map(serde_json::Value::Number)
				.unwrap_or(serde_json::Value::Null),
			FlagValue::String(s) => serde_json::Value::String(s.clone()),
			FlagValue::Json(v) => v.clone(),
		}
	}
}

impl From<FlagValue> for serde_json::Value {
	fn from(value: FlagValue) -> Self {
		value.to_json()
	}
}

/// A named, typed value a flag may return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
	pub key: String,
	pub value: FlagValue,
}

/// An ordered, conditional override: all conditions match -> serve this
/// variant, optionally gated by a deterministic percentage rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetingRule {
	pub conditions: Vec<Condition>,
	pub variant: String,
	#[serde(default)]
	pub percentage_rollout: Option<u8>,
}

/// Per-environment binding of a flag: the master switch, the variant set,
/// and the ordered targeting rules (first match wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagEnvironmentConfig {
	pub flag_id: FlagId,
	pub environment_id: EnvironmentId,
	pub enabled: bool,
	pub default_variant: String,
	pub variants: Vec<Variant>,
	pub targeting_rules: Vec<TargetingRule>,
}

impl FlagEnvironmentConfig {
	/// Look up a variant's value by key. An empty key never resolves.
	pub fn variant_value(&self, key: &str) -> Option<&FlagValue> {
		if key.is_empty() {
			return None;
		}
		self.variants.iter().find(|v| v.key == key).map(|v| &v.value)
	}

	/// Save-time validation: variant keys unique, default variant declared
	/// or empty, rollouts within 0..=100.
	pub fn validate(&self) -> crate::error::Result<()> {
		for (i, variant) in self.variants.iter().enumerate() {
			if self.variants[..i].iter().any(|v| v.key == variant.key) {
				return Err(FlagsError::DuplicateVariant(variant.key.clone()));
			}
		}

		if !self.default_variant.is_empty()
			&& !self.variants.iter().any(|v| v.key == self.default_variant)
		{
			return Err(FlagsError::UnknownDefaultVariant(
				self.default_variant.clone(),
			));
		}

		for rule in &self.targeting_rules {
			if let Some(rollout) = rule.percentage_rollout {
				if rollout > 100 {
					return Err(FlagsError::RolloutOutOfRange(rollout));
				}
			}
		}

		Ok(())
	}
}

/// A feature flag. Unique within a project by `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
	pub id: FlagId,
	pub project_id: ProjectId,
	pub key: String,
	pub name: String,
	pub description: Option<String>,
	pub value_type: ValueType,
	pub flag_type: FlagType,
	pub default_value: FlagValue,
	pub tags: Vec<String>,
	pub lifecycle_status: LifecycleStatus,
	pub lifecycle_status_changed_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Flag {
	/// Validate a flag key: 3..=100 chars, starts with a lowercase letter,
	/// then lowercase alphanumerics with `-`, `_`, or `.` separators.
	pub fn validate_key(key: &str) -> bool {
		is_valid_key(key)
	}

	/// Save-time validation: key shape and default value against the
	/// declared value type.
	pub fn validate(&self) -> crate::error::Result<()> {
		if !Self::validate_key(&self.key) {
			return Err(FlagsError::InvalidKey(self.key.clone()));
		}
		if !self.value_type.accepts(&self.default_value) {
			return Err(FlagsError::ValueTypeMismatch(
				self.value_type.as_str().to_string(),
			));
		}
		Ok(())
	}

	pub fn is_archived(&self) -> bool {
		self.lifecycle_status == LifecycleStatus::Archived
	}
}

/// Shared key validation used for flag, project, and environment keys.
pub(crate) fn is_valid_key(key: &str) -> bool {
	let len = key.len();
	if !(3..=100).contains(&len) {
		return false;
	}
	let mut chars = key.chars();
	match chars.next() {
		Some(c) if c.is_ascii_lowercase() => {}
		_ => return false,
	}
	chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn variant(key: &str, value: FlagValue) -> Variant {
		Variant {
			key: key.to_string(),
			value,
		}
	}

	#[test]
	fn test_validate_key() {
		assert!(Flag::validate_key("dark-mode"));
		assert!(Flag::validate_key("checkout.new_flow"));
		assert!(Flag::validate_key("abc"));
		assert!(!Flag::validate_key("ab"));
		assert!(!Flag::validate_key("Dark-Mode"));
		assert!(!Flag::validate_key("1dark"));
		assert!(!Flag::validate_key("dark mode"));
		assert!(!Flag::validate_key(&"a".repeat(101)));
	}

	#[test]
	fn test_flag_value_from_json_shapes() {
		assert_eq!(
			FlagValue::from_json(serde_json::json!(true)),
			FlagValue::Boolean(true)
		);
		assert_eq!(
			FlagValue::from_json(serde_json::json!(2.5)),
			FlagValue::Number(2.5)
		);
		assert_eq!(
			FlagValue::from_json(serde_json::json!("on")),
			FlagValue::String("on".to_string())
		);
		assert_eq!(
			FlagValue::from_json(serde_json::json!({"a": 1})),
			FlagValue::Json(serde_json::json!({"a": 1}))
		);
	}

	#[test]
	fn test_flag_value_serializes_untagged() {
		let json = serde_json::to_string(&FlagValue::Boolean(false)).unwrap();
		assert_eq!(json, "false");
		let json = serde_json::to_string(&FlagValue::String("blue".to_string())).unwrap();
		assert_eq!(json, "\"blue\"");
	}

	#[test]
	fn test_value_type_accepts() {
		assert!(ValueType::Boolean.accepts(&FlagValue::Boolean(true)));
		assert!(!ValueType::Boolean.accepts(&FlagValue::Number(1.0)));
		assert!(ValueType::Json.accepts(&FlagValue::Boolean(true)));
		assert!(ValueType::Json.accepts(&FlagValue::Json(serde_json::json!([1, 2]))));
	}

	#[test]
	fn test_config_validate_duplicate_variant() {
		let config = FlagEnvironmentConfig {
			flag_id: FlagId::new(),
			environment_id: EnvironmentId::new(),
			enabled: true,
			default_variant: "on".to_string(),
			variants: vec![
				variant("on", FlagValue::Boolean(true)),
				variant("on", FlagValue::Boolean(false)),
			],
			targeting_rules: vec![],
		};
		assert!(matches!(
			config.validate(),
			Err(FlagsError::DuplicateVariant(_))
		));
	}

	#[test]
	fn test_config_validate_unknown_default() {
		let config = FlagEnvironmentConfig {
			flag_id: FlagId::new(),
			environment_id: EnvironmentId::new(),
			enabled: true,
			default_variant: "missing".to_string(),
			variants: vec![variant("on", FlagValue::Boolean(true))],
			targeting_rules: vec![],
		};
		assert!(matches!(
			config.validate(),
			Err(FlagsError::UnknownDefaultVariant(_))
		));
	}

	#[test]
	fn test_config_validate_empty_default_is_raw_default() {
		let config = FlagEnvironmentConfig {
			flag_id: FlagId::new(),
			environment_id: EnvironmentId::new(),
			enabled: true,
			default_variant: String::new(),
			variants: vec![variant("on", FlagValue::Boolean(true))],
			targeting_rules: vec![],
		};
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_variant_value_empty_key_never_resolves() {
		let config = FlagEnvironmentConfig {
			flag_id: FlagId::new(),
			environment_id: EnvironmentId::new(),
			enabled: true,
			default_variant: String::new(),
			variants: vec![variant("on", FlagValue::Boolean(true))],
			targeting_rules: vec![],
		};
		assert!(config.variant_value("").is_none());
		assert!(config.variant_value("on").is_some());
	}

	#[test]
	fn test_enum_round_trips() {
		for vt in ["boolean", "string", "number", "json"] {
			assert_eq!(vt.parse::<ValueType>().unwrap().as_str(), vt);
		}
		for ft in [
			"release",
			"experiment",
			"operational",
			"kill-switch",
			"permission",
		] {
			assert_eq!(ft.parse::<FlagType>().unwrap().as_str(), ft);
		}
		for ls in ["active", "potentially_stale", "stale", "archived"] {
			assert_eq!(ls.parse::<LifecycleStatus>().unwrap().as_str(), ls);
		}
	}

	#[test]
	fn test_flag_validate_checks_default_value_shape() {
		let now = chrono::Utc::now();
		let mut flag = Flag {
			id: FlagId::new(),
			project_id: ProjectId::new(),
			key: "dark-mode".to_string(),
			name: "Dark mode".to_string(),
			description: None,
			value_type: ValueType::Boolean,
			flag_type: FlagType::Release,
			default_value: FlagValue::Boolean(false),
			tags: vec![],
			lifecycle_status: LifecycleStatus::Active,
			lifecycle_status_changed_at: None,
			created_at: now,
			updated_at: now,
		};
		assert!(flag.validate().is_ok());

		flag.default_value = FlagValue::String("off".to_string());
		assert!(matches!(
			flag.validate(),
			Err(FlagsError::ValueTypeMismatch(_))
		));

		flag.default_value = FlagValue::Boolean(true);
		flag.key = "Bad Key".to_string();
		assert!(matches!(flag.validate(), Err(FlagsError::InvalidKey(_))));
	}

	#[test]
	fn test_flag_type_default_lifetimes() {
		assert_eq!(FlagType::Release.default_lifetime_days(), Some(40));
		assert_eq!(FlagType::Experiment.default_lifetime_days(), Some(40));
		assert_eq!(FlagType::Operational.default_lifetime_days(), Some(7));
		assert_eq!(FlagType::KillSwitch.default_lifetime_days(), None);
		assert_eq!(FlagType::Permission.default_lifetime_days(), None);
	}
}
