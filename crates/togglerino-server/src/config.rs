// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server configuration.
//!
//! Configuration is read once at startup from the environment:
//!
//! - `PORT` - HTTP listen port (default 8080)
//! - `DATABASE_URL` - sqlite connection string (required)
//! - `LOG_FORMAT` - `json` or `text` (default `text`)
//! - `CORS_ORIGINS` - comma-separated allowed origins, `*` for any

use std::str::FromStr;

use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("missing required environment variable {0}")]
	MissingVar(&'static str),

	#[error("invalid value `{value}` for {key}")]
	InvalidValue { key: &'static str, value: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
	Json,
	#[default]
	Text,
}

impl FromStr for LogFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"json" => Ok(LogFormat::Json),
			"text" => Ok(LogFormat::Text),
			other => Err(other.to_string()),
		}
	}
}

/// Allowed CORS origins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
	Any,
	List(Vec<String>),
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub port: u16,
	pub database_url: String,
	pub log_format: LogFormat,
	pub cors_origins: CorsOrigins,
}

impl ServerConfig {
	/// The socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("0.0.0.0:{}", self.port)
	}
}

/// Load configuration from the process environment.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_config_from(|name| std::env::var(name).ok().filter(|s| !s.is_empty()))
}

/// Load configuration through an arbitrary variable lookup. Split out so
/// tests can drive it without mutating the process environment.
pub fn load_config_from(
	lookup: impl Fn(&str) -> Option<String>,
) -> Result<ServerConfig, ConfigError> {
	let port = match lookup("PORT") {
		Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
			key: "PORT",
			value,
		})?,
		None => DEFAULT_PORT,
	};

	let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingVar("DATABASE_URL"))?;

	let log_format = match lookup("LOG_FORMAT") {
		Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
			key: "LOG_FORMAT",
			value,
		})?,
		None => LogFormat::default(),
	};

	let cors_origins = match lookup("CORS_ORIGINS") {
		None => CorsOrigins::Any,
		Some(value) if value.split(',').any(|o| o.trim() == "*") => CorsOrigins::Any,
		Some(value) => CorsOrigins::List(
			value
				.split(',')
				.map(|o| o.trim().to_string())
				.filter(|o| !o.is_empty())
				.collect(),
		),
	};

	Ok(ServerConfig {
		port,
		database_url,
		log_format,
		cors_origins,
	})
}
