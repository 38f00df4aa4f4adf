// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Togglerino feature flag platform.
//!
//! This crate provides the shared vocabulary of the flag system - flags,
//! variants, per-environment configuration, targeting conditions - and the
//! pure evaluation engine that turns a (flag, config, context) triple into
//! a deterministic decision. It is consumed by the server runtime
//! (`togglerino-server`) and by client SDKs.
//!
//! # Overview
//!
//! - Multi-variant flags with boolean, string, number, or JSON payloads
//! - Ordered targeting rules with a closed set of fifteen operators
//! - Deterministic percentage rollouts (SHA-256 hash buckets)
//! - A staleness state machine driven by per-project lifetime policies
//! - SSE event types for real-time change propagation
//!
//! # Example
//!
//! ```
//! use togglerino_core::{evaluate_flag, EvaluationContext, EvaluationReason};
//! # use togglerino_core::{Flag, FlagEnvironmentConfig, FlagId, FlagType,
//! #     FlagValue, EnvironmentId, LifecycleStatus, ProjectId, ValueType, Variant};
//! # let now = chrono::Utc::now();
//! # let flag = Flag {
//! #     id: FlagId::new(), project_id: ProjectId::new(),
//! #     key: "dark-mode".to_string(), name: "Dark mode".to_string(),
//! #     description: None, value_type: ValueType::Boolean,
//! #     flag_type: FlagType::Release, default_value: FlagValue::Boolean(false),
//! #     tags: vec![], lifecycle_status: LifecycleStatus::Active,
//! #     lifecycle_status_changed_at: None, created_at: now, updated_at: now,
//! # };
//! # let config = FlagEnvironmentConfig {
//! #     flag_id: flag.id, environment_id: EnvironmentId::new(), enabled: true,
//! #     default_variant: "off".to_string(),
//! #     variants: vec![Variant { key: "off".to_string(), value: FlagValue::Boolean(false) }],
//! #     targeting_rules: vec![],
//! # };
//! let context = EvaluationContext::new("user-42")
//!     .with_attribute("plan", serde_json::json!("enterprise"));
//!
//! let result = evaluate_flag(&flag, &config, &context);
//! assert_eq!(result.reason, EvaluationReason::Default);
//! ```

pub mod condition;
pub mod error;
pub mod evaluation;
pub mod flag;
pub mod lifecycle;
pub mod project;
pub mod sse;

pub use condition::{Condition, ConditionError, Operator};
pub use error::{FlagsError, Result};
pub use evaluation::{
	evaluate_flag, rollout_bucket, EvaluationContext, EvaluationReason, EvaluationResult,
};
pub use flag::{
	EnvironmentId, Flag, FlagEnvironmentConfig, FlagId, FlagType, FlagValue, LifecycleStatus,
	ProjectId, Scope, SdkKeyId, TargetingRule, ValueType, Variant,
};
pub use lifecycle::{next_lifecycle_status, LifetimePolicy, STALE_GRACE_DAYS};
pub use project::{Environment, Project};
pub use sse::FlagStreamEvent;
