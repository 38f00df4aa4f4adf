// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory flag configuration cache.
//!
//! Every flag's resolved configuration for every (project, environment)
//! scope is held in memory so evaluation never touches the database.
//!
//! Concurrency model: one reader-writer lock guards the outer scope map.
//! Storage reads happen entirely outside the lock; a refresh builds the
//! replacement scope sub-map first and then swaps it in under the write
//! lock, so readers always observe a scope either wholly before or wholly
//! after a refresh. Entries are immutable snapshots behind `Arc`s and are
//! never mutated in place.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use togglerino_core::{Flag, FlagEnvironmentConfig, Scope};

use crate::error::Result;
use crate::repository::FlagsRepository;

/// Immutable (flag, config) snapshot for one flag in one scope.
#[derive(Debug, Clone)]
pub struct CacheEntry {
	pub flag: Flag,
	pub config: FlagEnvironmentConfig,
}

type ScopeMap = HashMap<String, Arc<CacheEntry>>;

/// The process-wide configuration cache.
#[derive(Default)]
pub struct FlagCache {
	scopes: RwLock<HashMap<Scope, Arc<ScopeMap>>>,
}

impl FlagCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Populate every scope from durable storage. Called once at startup;
	/// a failure here is fatal to the process.
	pub async fn load_all(&self, repo: &dyn FlagsRepository) -> Result<()> {
		let rows = repo.list_all().await?;

		let mut scopes: HashMap<Scope, ScopeMap> = HashMap::new();
		for (scope, flag, config) in rows {
			scopes
				.entry(scope)
				.or_default()
				.insert(flag.key.clone(), Arc::new(CacheEntry { flag, config }));
		}

		let scope_count = scopes.len();
		let entry_count: usize = scopes.values().map(HashMap::len).sum();

		let mut guard = self.scopes.write().unwrap_or_else(PoisonError::into_inner);
		*guard = scopes
			.into_iter()
			.map(|(scope, map)| (scope, Arc::new(map)))
			.collect();
		drop(guard);

		info!(scope_count, entry_count, "flag configuration cache loaded");
		Ok(())
	}

	/// Replace one scope's entries with the current durable state.
	///
	/// Invoked by the management API after a successful storage write. The
	/// storage read happens before the lock is taken, so a failed read
	/// leaves the cached scope untouched.
	pub async fn refresh(
		&self,
		repo: &dyn FlagsRepository,
		project_key: &str,
		env_key: &str,
	) -> Result<()> {
		let rows = match repo.list_by_project_environment(project_key, env_key).await {
			Ok(rows) => rows,
			Err(e) => {
				warn!(
					project_key,
					env_key,
					error = %e,
					"cache refresh failed, keeping previous scope state"
				);
				return Err(e);
			}
		};

		let mut map = ScopeMap::with_capacity(rows.len());
		for (flag, config) in rows {
			map.insert(flag.key.clone(), Arc::new(CacheEntry { flag, config }));
		}

		let scope = Scope::new(project_key, env_key);
		debug!(scope = %scope, entries = map.len(), "refreshed cache scope");

		self
			.scopes
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(scope, Arc::new(map));
		Ok(())
	}

	/// Snapshot of every entry in a scope. Non-blocking beyond the brief
	/// read lock.
	pub fn get_flags(&self, project_key: &str, env_key: &str) -> Option<Arc<ScopeMap>> {
		let scope = Scope::new(project_key, env_key);
		self
			.scopes
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(&scope)
			.cloned()
	}

	/// Snapshot of a single flag's entry in a scope.
	pub fn get_flag(
		&self,
		project_key: &str,
		env_key: &str,
		flag_key: &str,
	) -> Option<Arc<CacheEntry>> {
		let scope = Scope::new(project_key, env_key);
		self
			.scopes
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(&scope)
			.and_then(|map| map.get(flag_key).cloned())
	}

	pub fn scope_count(&self) -> usize {
		self
			.scopes
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.len()
	}

	pub fn entry_count(&self) -> usize {
		self
			.scopes
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.values()
			.map(|map| map.len())
			.sum()
	}
}
