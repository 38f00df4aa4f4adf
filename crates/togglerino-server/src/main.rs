// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Togglerino core runtime server binary.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use clap::{Parser, Subcommand};
use tower_http::{
	cors::{AllowOrigin, Any, CorsLayer},
	trace::TraceLayer,
};

use togglerino_server::config::{CorsOrigins, LogFormat};
use togglerino_server::{create_app_state, create_router, LifecycleChecker};

mod version;

/// Togglerino server - self-hosted feature flag runtime.
#[derive(Parser, Debug)]
#[command(
	name = "togglerino-server",
	about = "Togglerino feature flag server",
	version
)]
struct Args {
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	let config = match togglerino_server::load_config() {
		Ok(config) => config,
		Err(e) => {
			eprintln!("configuration error: {e}");
			std::process::exit(1);
		}
	};

	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
	match config.log_format {
		LogFormat::Json => tracing_subscriber::fmt()
			.with_env_filter(filter)
			.json()
			.init(),
		LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
	}

	tracing::info!(
		port = config.port,
		database = %config.database_url,
		"starting togglerino-server"
	);

	let pool = match togglerino_server::db::create_pool(&config.database_url).await {
		Ok(pool) => pool,
		Err(e) => {
			tracing::error!(error = %e, "failed to open database");
			std::process::exit(1);
		}
	};
	if let Err(e) = togglerino_server::db::run_migrations(&pool).await {
		tracing::error!(error = %e, "failed to run migrations");
		std::process::exit(1);
	}

	let state = create_app_state(pool);

	// Startup cache load is all-or-nothing: evaluation never touches the
	// database, so an empty cache would silently serve nothing.
	if let Err(e) = state.cache.load_all(state.repo.as_ref()).await {
		tracing::error!(error = %e, "failed to load flag configuration cache");
		std::process::exit(1);
	}

	let checker = LifecycleChecker::new(Arc::clone(&state.repo), Arc::clone(&state.audit));
	let checker_handle = checker.start();

	let cors = match &config.cors_origins {
		CorsOrigins::Any => CorsLayer::new()
			.allow_origin(Any)
			.allow_methods(Any)
			.allow_headers(Any),
		CorsOrigins::List(origins) => {
			let parsed: Vec<HeaderValue> = origins
				.iter()
				.filter_map(|origin| origin.parse().ok())
				.collect();
			CorsLayer::new()
				.allow_origin(AllowOrigin::list(parsed))
				.allow_methods(Any)
				.allow_headers(Any)
		}
	};

	let app = create_router(state.clone())
		.layer(TraceLayer::new_for_http())
		.layer(cors);

	let addr = config.socket_addr();
	tracing::info!("listening on {addr}");
	let listener = match tokio::net::TcpListener::bind(&addr).await {
		Ok(listener) => listener,
		Err(e) => {
			tracing::error!(error = %e, addr, "failed to bind listener");
			std::process::exit(1);
		}
	};

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	// Drain: terminate every SSE subscriber, stop the checker, and give
	// background tasks a bounded window to finish.
	tracing::info!("shutting down");
	state.hub.close();
	checker.shutdown();
	if tokio::time::timeout(Duration::from_secs(10), checker_handle)
		.await
		.is_err()
	{
		tracing::warn!("lifecycle checker did not stop within the drain deadline");
	}

	tracing::info!("server shutdown complete");
	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		let _ = tokio::signal::ctrl_c().await;
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(e) => {
				tracing::error!(error = %e, "failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
	tracing::info!("received shutdown signal");
}
