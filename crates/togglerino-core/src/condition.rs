// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Targeting conditions and the closed operator set.
//!
//! A condition compares one context attribute against a stored value with
//! one of fifteen operators. Conditions within a rule are ANDed by the
//! engine; each operator defines its own behavior for a missing attribute.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A single attribute comparison inside a targeting rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
	pub attribute: String,
	pub operator: Operator,
	pub value: Value,
}

impl Condition {
	/// Evaluate this condition against the request's context attributes.
	pub fn holds(&self, attributes: &HashMap<String, Value>) -> Result<bool, ConditionError> {
		self
			.operator
			.evaluate(attributes.get(&self.attribute), &self.value)
	}
}

/// Evaluation-time condition failures. These never abort a request: the
/// engine treats the enclosing rule as errored and keeps walking.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
	#[error("operand does not coerce to a number")]
	NonNumericOperand,

	#[error("operator argument does not coerce to a string")]
	NonStringArgument,

	#[error("invalid regular expression: {0}")]
	InvalidRegex(String),
}

/// The closed operator set. Operators are dispatched statically; there is
/// no runtime operator registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
	Equals,
	NotEquals,
	Contains,
	NotContains,
	StartsWith,
	EndsWith,
	GreaterThan,
	LessThan,
	Gte,
	Lte,
	In,
	NotIn,
	Exists,
	NotExists,
	Matches,
}

impl Operator {
	/// Apply the operator to an attribute (absent when the context does not
	/// carry it) and the condition's stored value.
	pub fn evaluate(
		&self,
		attribute: Option<&Value>,
		expected: &Value,
	) -> Result<bool, ConditionError> {
		match self {
			Operator::Equals => Ok(attribute.is_some_and(|a| string_eq(a, expected))),
			Operator::NotEquals => Ok(attribute.is_none_or(|a| !string_eq(a, expected))),
			Operator::Contains => Ok(attribute.is_some_and(|a| substring(a, expected))),
			Operator::NotContains => Ok(attribute.is_none_or(|a| !substring(a, expected))),
			Operator::StartsWith => Ok(attribute.is_some_and(|a| affix(a, expected, |s, p| s.starts_with(p)))),
			Operator::EndsWith => Ok(attribute.is_some_and(|a| affix(a, expected, |s, p| s.ends_with(p)))),
			Operator::GreaterThan => numeric(attribute, expected, |lhs, rhs| lhs > rhs),
			Operator::LessThan => numeric(attribute, expected, |lhs, rhs| lhs < rhs),
			Operator::Gte => numeric(attribute, expected, |lhs, rhs| lhs >= rhs),
			Operator::Lte => numeric(attribute, expected, |lhs, rhs| lhs <= rhs),
			Operator::In => Ok(membership(attribute, expected)?.unwrap_or(false)),
			Operator::NotIn => Ok(membership(attribute, expected)?.is_none_or(|m| !m)),
			Operator::Exists => Ok(attribute.is_some()),
			Operator::NotExists => Ok(attribute.is_none()),
			Operator::Matches => matches_regex(attribute, expected),
		}
	}
}

/// String coercion for scalar comparison. Only scalars coerce; null,
/// arrays, and objects do not.
fn coerce_string(value: &Value) -> Option<String> {
	match value {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		_ => None,
	}
}

fn coerce_number(value: &Value) -> Option<f64> {
	match value {
		Value::Number(n) => n.as_f64(),
		Value::String(s) => s.trim().parse().ok(),
		_ => None,
	}
}

fn string_eq(attribute: &Value, expected: &Value) -> bool {
	match (coerce_string(attribute), coerce_string(expected)) {
		(Some(lhs), Some(rhs)) => lhs == rhs,
		_ => false,
	}
}

fn substring(attribute: &Value, expected: &Value) -> bool {
	match (coerce_string(attribute), coerce_string(expected)) {
		(Some(haystack), Some(needle)) => haystack.contains(&needle),
		_ => false,
	}
}

fn affix(attribute: &Value, expected: &Value, check: impl Fn(&str, &str) -> bool) -> bool {
	match (coerce_string(attribute), coerce_string(expected)) {
		(Some(lhs), Some(rhs)) => check(&lhs, &rhs),
		_ => false,
	}
}

fn numeric(
	attribute: Option<&Value>,
	expected: &Value,
	compare: impl Fn(f64, f64) -> bool,
) -> Result<bool, ConditionError> {
	let Some(attribute) = attribute else {
		return Ok(false);
	};
	let lhs = coerce_number(attribute).ok_or(ConditionError::NonNumericOperand)?;
	let rhs = coerce_number(expected).ok_or(ConditionError::NonNumericOperand)?;
	Ok(compare(lhs, rhs))
}

/// Comma-separated membership. The list is split without trimming so
/// membership stays exact. Returns `None` when the attribute is missing so
/// `in` and `not_in` can apply their own defaults.
fn membership(
	attribute: Option<&Value>,
	expected: &Value,
) -> Result<Option<bool>, ConditionError> {
	let list = coerce_string(expected).ok_or(ConditionError::NonStringArgument)?;
	let Some(attribute) = attribute else {
		return Ok(None);
	};
	let Some(needle) = coerce_string(attribute) else {
		return Ok(Some(false));
	};
	Ok(Some(list.split(',').any(|entry| entry == needle)))
}

/// The pattern is free-form text from storage, so it is compiled at
/// evaluation time; a pattern that fails to compile is a condition error.
fn matches_regex(attribute: Option<&Value>, expected: &Value) -> Result<bool, ConditionError> {
	let pattern = coerce_string(expected).ok_or(ConditionError::NonStringArgument)?;
	let regex = Regex::new(&pattern).map_err(|e| ConditionError::InvalidRegex(e.to_string()))?;
	let Some(attribute) = attribute else {
		return Ok(false);
	};
	Ok(coerce_string(attribute).is_some_and(|s| regex.is_match(&s)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn eval(op: Operator, attribute: Option<Value>, expected: Value) -> Result<bool, ConditionError> {
		op.evaluate(attribute.as_ref(), &expected)
	}

	#[test]
	fn test_equals_coerces_both_sides() {
		assert_eq!(eval(Operator::Equals, Some(json!("pro")), json!("pro")), Ok(true));
		assert_eq!(eval(Operator::Equals, Some(json!(5)), json!("5")), Ok(true));
		assert_eq!(eval(Operator::Equals, Some(json!(true)), json!("true")), Ok(true));
		assert_eq!(eval(Operator::Equals, Some(json!("free")), json!("pro")), Ok(false));
	}

	#[test]
	fn test_equals_missing_attribute() {
		assert_eq!(eval(Operator::Equals, None, json!("pro")), Ok(false));
		assert_eq!(eval(Operator::NotEquals, None, json!("pro")), Ok(true));
	}

	#[test]
	fn test_not_equals_is_negation() {
		for (attr, expected) in [
			(json!("a"), json!("a")),
			(json!("a"), json!("b")),
			(json!(42), json!("42")),
		] {
			let eq = eval(Operator::Equals, Some(attr.clone()), expected.clone()).unwrap();
			let neq = eval(Operator::NotEquals, Some(attr), expected).unwrap();
			assert_eq!(eq, !neq);
		}
	}

	#[test]
	fn test_contains_family() {
		assert_eq!(
			eval(Operator::Contains, Some(json!("enterprise-eu")), json!("enterprise")),
			Ok(true)
		);
		assert_eq!(
			eval(Operator::NotContains, Some(json!("free")), json!("enterprise")),
			Ok(true)
		);
		assert_eq!(eval(Operator::Contains, None, json!("x")), Ok(false));
		assert_eq!(eval(Operator::NotContains, None, json!("x")), Ok(true));
	}

	#[test]
	fn test_starts_and_ends_with() {
		assert_eq!(
			eval(Operator::StartsWith, Some(json!("beta-tester")), json!("beta")),
			Ok(true)
		);
		assert_eq!(
			eval(Operator::EndsWith, Some(json!("beta-tester")), json!("tester")),
			Ok(true)
		);
		assert_eq!(eval(Operator::StartsWith, None, json!("beta")), Ok(false));
		assert_eq!(eval(Operator::EndsWith, None, json!("beta")), Ok(false));
	}

	#[test]
	fn test_numeric_comparisons() {
		assert_eq!(eval(Operator::GreaterThan, Some(json!(10)), json!(5)), Ok(true));
		assert_eq!(eval(Operator::LessThan, Some(json!("3")), json!(5)), Ok(true));
		assert_eq!(eval(Operator::Gte, Some(json!(5)), json!("5")), Ok(true));
		assert_eq!(eval(Operator::Lte, Some(json!(6)), json!(5)), Ok(false));
		assert_eq!(eval(Operator::GreaterThan, None, json!(5)), Ok(false));
	}

	#[test]
	fn test_numeric_coercion_failure_is_error() {
		assert_eq!(
			eval(Operator::GreaterThan, Some(json!("not-a-number")), json!(5)),
			Err(ConditionError::NonNumericOperand)
		);
		assert_eq!(
			eval(Operator::Lte, Some(json!(5)), json!("oops")),
			Err(ConditionError::NonNumericOperand)
		);
	}

	#[test]
	fn test_in_membership_is_exact() {
		assert_eq!(eval(Operator::In, Some(json!("DE")), json!("DE,FR")), Ok(true));
		assert_eq!(eval(Operator::In, Some(json!("D")), json!("DE,FR")), Ok(false));
		// no trimming: " FR" is not "FR"
		assert_eq!(eval(Operator::In, Some(json!("FR")), json!("DE, FR")), Ok(false));
		assert_eq!(eval(Operator::In, None, json!("DE,FR")), Ok(false));
		assert_eq!(eval(Operator::NotIn, None, json!("DE,FR")), Ok(true));
		assert_eq!(eval(Operator::NotIn, Some(json!("US")), json!("DE,FR")), Ok(true));
	}

	#[test]
	fn test_in_numeric_attribute_coerces() {
		assert_eq!(eval(Operator::In, Some(json!(5)), json!("3,5,7")), Ok(true));
	}

	#[test]
	fn test_exists() {
		assert_eq!(eval(Operator::Exists, Some(json!(null)), json!(null)), Ok(true));
		assert_eq!(eval(Operator::Exists, None, json!(null)), Ok(false));
		assert_eq!(eval(Operator::NotExists, None, json!(null)), Ok(true));
		assert_eq!(eval(Operator::NotExists, Some(json!("x")), json!(null)), Ok(false));
	}

	#[test]
	fn test_matches() {
		assert_eq!(
			eval(Operator::Matches, Some(json!("user@corp.example")), json!("@corp\\.")),
			Ok(true)
		);
		assert_eq!(
			eval(Operator::Matches, Some(json!("user@else.example")), json!("^admin")),
			Ok(false)
		);
		assert_eq!(eval(Operator::Matches, None, json!(".*")), Ok(false));
	}

	#[test]
	fn test_matches_invalid_regex_is_error() {
		assert!(matches!(
			eval(Operator::Matches, Some(json!("x")), json!("[unclosed")),
			Err(ConditionError::InvalidRegex(_))
		));
	}

	#[test]
	fn test_condition_holds_reads_attribute_by_name() {
		let condition = Condition {
			attribute: "plan".to_string(),
			operator: Operator::Equals,
			value: json!("pro"),
		};
		let mut attributes = HashMap::new();
		attributes.insert("plan".to_string(), json!("pro"));
		assert_eq!(condition.holds(&attributes), Ok(true));
		assert_eq!(condition.holds(&HashMap::new()), Ok(false));
	}

	#[test]
	fn test_operator_serde_names() {
		let names = [
			(Operator::Equals, "equals"),
			(Operator::NotEquals, "not_equals"),
			(Operator::Contains, "contains"),
			(Operator::NotContains, "not_contains"),
			(Operator::StartsWith, "starts_with"),
			(Operator::EndsWith, "ends_with"),
			(Operator::GreaterThan, "greater_than"),
			(Operator::LessThan, "less_than"),
			(Operator::Gte, "gte"),
			(Operator::Lte, "lte"),
			(Operator::In, "in"),
			(Operator::NotIn, "not_in"),
			(Operator::Exists, "exists"),
			(Operator::NotExists, "not_exists"),
			(Operator::Matches, "matches"),
		];
		for (op, name) in names {
			assert_eq!(serde_json::to_string(&op).unwrap(), format!("\"{name}\""));
		}
	}
}
