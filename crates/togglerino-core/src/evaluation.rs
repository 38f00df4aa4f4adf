// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The flag evaluation engine.
//!
//! `evaluate_flag` is a pure function over a flag snapshot, its
//! per-environment configuration, and a caller-supplied context. It is
//! total: configuration problems degrade the individual flag to its default
//! value with `reason = error`, they never propagate as failures.
//!
//! The evaluation order is:
//! 1. Archived flags short-circuit to the flag default.
//! 2. A disabled environment config short-circuits to the flag default.
//! 3. Targeting rules are walked in document order; all conditions of a
//!    rule must hold, and a matched rule with a percentage rollout is
//!    further gated by a deterministic hash bucket. A rule that loses its
//!    rollout gate does not fall through to the default - the walk simply
//!    continues with the next rule.
//! 4. With no rule serving, the default variant (or the raw flag default)
//!    is returned.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::flag::{Flag, FlagEnvironmentConfig, FlagValue, LifecycleStatus};

/// Caller-supplied evaluation context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
	#[serde(default)]
	pub user_id: String,
	#[serde(default)]
	pub attributes: HashMap<String, Value>,
}

impl EvaluationContext {
	pub fn new(user_id: impl Into<String>) -> Self {
		Self {
			user_id: user_id.into(),
			attributes: HashMap::new(),
		}
	}

	pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
		self.attributes.insert(name.into(), value);
		self
	}
}

/// Why an evaluation returned the value it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationReason {
	Archived,
	Disabled,
	RuleMatch,
	Default,
	Error,
}

impl EvaluationReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			EvaluationReason::Archived => "archived",
			EvaluationReason::Disabled => "disabled",
			EvaluationReason::RuleMatch => "rule_match",
			EvaluationReason::Default => "default",
			EvaluationReason::Error => "error",
		}
	}
}

/// The decision produced for one flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
	pub value: FlagValue,
	pub variant: String,
	pub reason: EvaluationReason,
}

impl EvaluationResult {
	pub fn new(value: FlagValue, variant: impl Into<String>, reason: EvaluationReason) -> Self {
		Self {
			value,
			variant: variant.into(),
			reason,
		}
	}
}

/// Deterministic rollout bucket for a (flag, user) pair.
///
/// The flag key and user id are hashed with a NUL separator so that key and
/// user boundaries cannot alias (`ab`/`c` vs `a`/`bc`). The first eight
/// digest bytes are read as a big-endian unsigned integer and reduced
/// modulo 100.
pub fn rollout_bucket(flag_key: &str, user_id: &str) -> u64 {
	let mut hasher = Sha256::new();
	hasher.update(flag_key.as_bytes());
	hasher.update([0u8]);
	hasher.update(user_id.as_bytes());
	let digest = hasher.finalize();

	let mut prefix = [0u8; 8];
	prefix.copy_from_slice(&digest[..8]);
	u64::from_be_bytes(prefix) % 100
}

/// Evaluate a flag against its environment configuration and a context.
pub fn evaluate_flag(
	flag: &Flag,
	config: &FlagEnvironmentConfig,
	context: &EvaluationContext,
) -> EvaluationResult {
	if flag.lifecycle_status == LifecycleStatus::Archived {
		return EvaluationResult::new(flag.default_value.clone(), "", EvaluationReason::Archived);
	}

	if !config.enabled {
		return EvaluationResult::new(flag.default_value.clone(), "", EvaluationReason::Disabled);
	}

	let mut rule_errored = false;

	'rules: for rule in &config.targeting_rules {
		for condition in &rule.conditions {
			match condition.holds(&context.attributes) {
				Ok(true) => {}
				Ok(false) => continue 'rules,
				// Broken conditions disqualify the rule; other rules still run.
				Err(_) => {
					rule_errored = true;
					continue 'rules;
				}
			}
		}

		if let Some(rollout) = rule.percentage_rollout {
			if rollout_bucket(&flag.key, &context.user_id) >= u64::from(rollout) {
				continue;
			}
		}

		// The declared variant name is surfaced even when its value cannot
		// be resolved against the variant set.
		let value = config
			.variant_value(&rule.variant)
			.cloned()
			.unwrap_or_else(|| flag.default_value.clone());
		return EvaluationResult::new(value, rule.variant.clone(), EvaluationReason::RuleMatch);
	}

	if rule_errored {
		return EvaluationResult::new(flag.default_value.clone(), "", EvaluationReason::Error);
	}

	match config.variant_value(&config.default_variant) {
		Some(value) => EvaluationResult::new(
			value.clone(),
			config.default_variant.clone(),
			EvaluationReason::Default,
		),
		None => EvaluationResult::new(
			flag.default_value.clone(),
			config.default_variant.clone(),
			EvaluationReason::Default,
		),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::condition::{Condition, Operator};
	use crate::flag::{
		EnvironmentId, FlagId, FlagType, ProjectId, TargetingRule, ValueType, Variant,
	};
	use chrono::Utc;
	use serde_json::json;

	fn boolean_flag(key: &str) -> Flag {
		Flag {
			id: FlagId::new(),
			project_id: ProjectId::new(),
			key: key.to_string(),
			name: key.to_string(),
			description: None,
			value_type: ValueType::Boolean,
			flag_type: FlagType::Release,
			default_value: FlagValue::Boolean(false),
			tags: vec![],
			lifecycle_status: LifecycleStatus::Active,
			lifecycle_status_changed_at: None,
			created_at: Utc::now(),
			updated_at: Utc::now(),
		}
	}

	fn on_off_config(flag: &Flag) -> FlagEnvironmentConfig {
		FlagEnvironmentConfig {
			flag_id: flag.id,
			environment_id: EnvironmentId::new(),
			enabled: true,
			default_variant: "off".to_string(),
			variants: vec![
				Variant {
					key: "on".to_string(),
					value: FlagValue::Boolean(true),
				},
				Variant {
					key: "off".to_string(),
					value: FlagValue::Boolean(false),
				},
			],
			targeting_rules: vec![],
		}
	}

	fn plan_rule(plan: &str, variant: &str, rollout: Option<u8>) -> TargetingRule {
		TargetingRule {
			conditions: vec![Condition {
				attribute: "plan".to_string(),
				operator: Operator::Equals,
				value: json!(plan),
			}],
			variant: variant.to_string(),
			percentage_rollout: rollout,
		}
	}

	#[test]
	fn test_no_rules_serves_default_variant() {
		let flag = boolean_flag("dark-mode");
		let config = on_off_config(&flag);
		let context = EvaluationContext::new("u1");

		let result = evaluate_flag(&flag, &config, &context);
		assert_eq!(result.value, FlagValue::Boolean(false));
		assert_eq!(result.variant, "off");
		assert_eq!(result.reason, EvaluationReason::Default);
	}

	#[test]
	fn test_archived_short_circuits() {
		let mut flag = boolean_flag("dark-mode");
		flag.lifecycle_status = LifecycleStatus::Archived;
		let mut config = on_off_config(&flag);
		config.targeting_rules = vec![plan_rule("pro", "on", None)];

		let context = EvaluationContext::new("u1").with_attribute("plan", json!("pro"));
		let result = evaluate_flag(&flag, &config, &context);
		assert_eq!(result.value, FlagValue::Boolean(false));
		assert_eq!(result.variant, "");
		assert_eq!(result.reason, EvaluationReason::Archived);
	}

	#[test]
	fn test_disabled_config_short_circuits() {
		let flag = boolean_flag("dark-mode");
		let mut config = on_off_config(&flag);
		config.enabled = false;

		let result = evaluate_flag(&flag, &config, &EvaluationContext::new("u1"));
		assert_eq!(result.value, FlagValue::Boolean(false));
		assert_eq!(result.variant, "");
		assert_eq!(result.reason, EvaluationReason::Disabled);
	}

	#[test]
	fn test_rule_match_serves_variant() {
		let flag = boolean_flag("dark-mode");
		let mut config = on_off_config(&flag);
		config.targeting_rules = vec![plan_rule("pro", "on", None)];

		let context = EvaluationContext::new("u1").with_attribute("plan", json!("pro"));
		let result = evaluate_flag(&flag, &config, &context);
		assert_eq!(result.value, FlagValue::Boolean(true));
		assert_eq!(result.variant, "on");
		assert_eq!(result.reason, EvaluationReason::RuleMatch);

		let context = EvaluationContext::new("u1").with_attribute("plan", json!("free"));
		let result = evaluate_flag(&flag, &config, &context);
		assert_eq!(result.reason, EvaluationReason::Default);
	}

	#[test]
	fn test_all_conditions_must_hold() {
		let flag = boolean_flag("dark-mode");
		let mut config = on_off_config(&flag);
		config.targeting_rules = vec![TargetingRule {
			conditions: vec![
				Condition {
					attribute: "plan".to_string(),
					operator: Operator::Equals,
					value: json!("pro"),
				},
				Condition {
					attribute: "country".to_string(),
					operator: Operator::In,
					value: json!("DE,FR"),
				},
			],
			variant: "on".to_string(),
			percentage_rollout: None,
		}];

		let context = EvaluationContext::new("u1")
			.with_attribute("plan", json!("pro"))
			.with_attribute("country", json!("US"));
		assert_eq!(
			evaluate_flag(&flag, &config, &context).reason,
			EvaluationReason::Default
		);

		let context = EvaluationContext::new("u1")
			.with_attribute("plan", json!("pro"))
			.with_attribute("country", json!("DE"));
		assert_eq!(
			evaluate_flag(&flag, &config, &context).reason,
			EvaluationReason::RuleMatch
		);
	}

	#[test]
	fn test_rollout_buckets_are_fixed() {
		// sha256("dark-mode\0u1") -> bucket 2, "u2" -> 46, "u3" -> 95.
		assert_eq!(rollout_bucket("dark-mode", "u1"), 2);
		assert_eq!(rollout_bucket("dark-mode", "u2"), 46);
		assert_eq!(rollout_bucket("dark-mode", "u3"), 95);
	}

	#[test]
	fn test_rollout_gates_matched_rule() {
		let flag = boolean_flag("dark-mode");
		let mut config = on_off_config(&flag);
		config.targeting_rules = vec![TargetingRule {
			conditions: vec![Condition {
				attribute: "country".to_string(),
				operator: Operator::In,
				value: json!("DE,FR"),
			}],
			variant: "on".to_string(),
			percentage_rollout: Some(50),
		}];

		// u1 buckets to 2: inside a 50% rollout.
		let context = EvaluationContext::new("u1").with_attribute("country", json!("DE"));
		let result = evaluate_flag(&flag, &config, &context);
		assert_eq!(result.value, FlagValue::Boolean(true));
		assert_eq!(result.variant, "on");
		assert_eq!(result.reason, EvaluationReason::RuleMatch);

		// u3 buckets to 95: outside, falls through to the default variant.
		let context = EvaluationContext::new("u3").with_attribute("country", json!("DE"));
		let result = evaluate_flag(&flag, &config, &context);
		assert_eq!(result.value, FlagValue::Boolean(false));
		assert_eq!(result.variant, "off");
		assert_eq!(result.reason, EvaluationReason::Default);
	}

	#[test]
	fn test_rollout_loss_continues_with_next_rule() {
		let flag = boolean_flag("dark-mode");
		let mut config = on_off_config(&flag);
		// u3 (bucket 95) loses the first rule's rollout but matches the second.
		config.targeting_rules = vec![
			plan_rule("pro", "on", Some(50)),
			plan_rule("pro", "off", None),
		];

		let context = EvaluationContext::new("u3").with_attribute("plan", json!("pro"));
		let result = evaluate_flag(&flag, &config, &context);
		assert_eq!(result.variant, "off");
		assert_eq!(result.reason, EvaluationReason::RuleMatch);
	}

	#[test]
	fn test_rule_order_is_the_only_tiebreak() {
		let flag = boolean_flag("dark-mode");
		let mut config = on_off_config(&flag);
		config.targeting_rules = vec![
			plan_rule("pro", "on", None),
			plan_rule("pro", "off", None),
		];

		let context = EvaluationContext::new("u1").with_attribute("plan", json!("pro"));
		assert_eq!(evaluate_flag(&flag, &config, &context).variant, "on");

		config.targeting_rules.swap(0, 1);
		assert_eq!(evaluate_flag(&flag, &config, &context).variant, "off");
	}

	#[test]
	fn test_unresolvable_variant_surfaces_name_with_default_value() {
		let flag = boolean_flag("dark-mode");
		let mut config = on_off_config(&flag);
		config.targeting_rules = vec![plan_rule("pro", "ghost", None)];

		let context = EvaluationContext::new("u1").with_attribute("plan", json!("pro"));
		let result = evaluate_flag(&flag, &config, &context);
		assert_eq!(result.value, FlagValue::Boolean(false));
		assert_eq!(result.variant, "ghost");
		assert_eq!(result.reason, EvaluationReason::RuleMatch);
	}

	#[test]
	fn test_unresolvable_default_variant_falls_back_to_flag_default() {
		let flag = boolean_flag("dark-mode");
		let mut config = on_off_config(&flag);
		config.default_variant = String::new();

		let result = evaluate_flag(&flag, &config, &EvaluationContext::new("u1"));
		assert_eq!(result.value, FlagValue::Boolean(false));
		assert_eq!(result.variant, "");
		assert_eq!(result.reason, EvaluationReason::Default);
	}

	#[test]
	fn test_broken_rule_absorbs_into_error_reason() {
		let flag = boolean_flag("dark-mode");
		let mut config = on_off_config(&flag);
		config.targeting_rules = vec![TargetingRule {
			conditions: vec![Condition {
				attribute: "email".to_string(),
				operator: Operator::Matches,
				value: json!("[unclosed"),
			}],
			variant: "on".to_string(),
			percentage_rollout: None,
		}];

		let context = EvaluationContext::new("u1").with_attribute("email", json!("a@b.c"));
		let result = evaluate_flag(&flag, &config, &context);
		assert_eq!(result.value, FlagValue::Boolean(false));
		assert_eq!(result.variant, "");
		assert_eq!(result.reason, EvaluationReason::Error);
	}

	#[test]
	fn test_later_rule_match_wins_over_earlier_broken_rule() {
		let flag = boolean_flag("dark-mode");
		let mut config = on_off_config(&flag);
		config.targeting_rules = vec![
			TargetingRule {
				conditions: vec![Condition {
					attribute: "email".to_string(),
					operator: Operator::Matches,
					value: json!("[unclosed"),
				}],
				variant: "off".to_string(),
				percentage_rollout: None,
			},
			plan_rule("pro", "on", None),
		];

		let context = EvaluationContext::new("u1")
			.with_attribute("email", json!("a@b.c"))
			.with_attribute("plan", json!("pro"));
		let result = evaluate_flag(&flag, &config, &context);
		assert_eq!(result.variant, "on");
		assert_eq!(result.reason, EvaluationReason::RuleMatch);
	}

	#[test]
	fn test_reason_wire_names() {
		assert_eq!(
			serde_json::to_string(&EvaluationReason::RuleMatch).unwrap(),
			"\"rule_match\""
		);
		assert_eq!(
			serde_json::to_string(&EvaluationReason::Archived).unwrap(),
			"\"archived\""
		);
	}
}
