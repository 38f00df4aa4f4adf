// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Togglerino core runtime server.
//!
//! This crate wires the evaluation engine (`togglerino-core`) to the wire:
//! an in-memory configuration cache, a per-scope change-propagation hub
//! with SSE transport, SDK-key authentication, and the periodic lifecycle
//! checker. The management API is an external collaborator: it writes
//! through [`FlagsRepository`] and then calls the `cache.refresh` and
//! `hub.broadcast` hooks exposed on [`AppState`].

pub mod api;
pub mod api_docs;
pub mod api_response;
pub mod audit;
pub mod cache;
pub mod checker;
pub mod config;
pub mod db;
pub mod error;
pub mod hub;
pub mod repository;
pub mod routes;
pub mod sdk_auth;

pub use api::{create_app_state, create_router, AppState};
pub use api_docs::ApiDoc;
pub use audit::{AuditEventType, AuditLogBuilder, AuditLogEntry, AuditService};
pub use cache::{CacheEntry, FlagCache};
pub use checker::{LifecycleChecker, CHECK_INTERVAL};
pub use config::{load_config, ConfigError, CorsOrigins, LogFormat, ServerConfig};
pub use error::ServerError;
pub use hub::{ChangeHub, HubConfig, HubStats, SubscriptionGuard};
pub use repository::{
	FlagsRepository, SdkKeyRecord, SdkKeyScope, SqliteFlagsRepository, UnknownFlag,
};
pub use sdk_auth::{generate_sdk_key, hash_sdk_key, SdkAuth};
