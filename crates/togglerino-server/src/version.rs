// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Version and build information.

/// Human-readable version line for the `version` subcommand.
pub fn format_version_info() -> String {
	let mut info = format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
	if let Some(sha) = option_env!("TOGGLERINO_BUILD_SHA") {
		info.push_str(&format!(" ({sha})"));
	}
	info
}
