/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains a "scaffold", in other words, functions that pre-configure a binary built on [`inbox_retention`](`crate`).
//!
//! The main entry point of this module is [`init`]

use std::process;

use tokio::sync::watch;
use tracing::subscriber::SetGlobalDefaultError;

use crate::cancellation_token::CancellationToken;

/// Initializes a tracing subscriber and returns a [`CancellationToken`] that is cancelled on Ctrl-C.
///
/// See [`set_up_logging`] and [`set_up_ctrl_c_handler`] for more info
#[must_use = "the token should be passed to the controller, otherwise Ctrl-C won't stop the run gracefully"]
pub fn init() -> CancellationToken {
	if set_up_logging().is_err() {
		tracing::debug!(
			"Unable to set up the default tracing subscriber. Another one is probably already registered"
		);
	}

	set_up_ctrl_c_handler()
}

/// Installs a tracing subscriber as the default.
///
/// The log level is read from `RUST_LOG` and defaults to INFO.
/// The subscriber shows compact one-line log messages when log level is > DEBUG,
/// and pretty multi-line log messages when it's set to <= DEBUG.
///
/// It also logs to systemd-journald if available but only when compiled in release
///
/// # Errors
/// If a different global tracing subscriber has already been registered.
pub fn set_up_logging() -> Result<(), SetGlobalDefaultError> {
	use tracing::Level;
	use tracing_subscriber::{
		EnvFilter, Layer, filter::LevelFilter, fmt::time::ChronoLocal, layer::SubscriberExt,
	};

	let env_filter = EnvFilter::builder()
		.with_default_directive(LevelFilter::INFO.into())
		.from_env_lossy();

	let is_debug_log_level = env_filter
		.max_level_hint()
		.is_some_and(|level| level >= Level::DEBUG);

	let stdout = tracing_subscriber::fmt::layer()
		.with_target(is_debug_log_level)
		.with_file(is_debug_log_level)
		.with_line_number(is_debug_log_level)
		.with_thread_ids(is_debug_log_level)
		.with_timer(ChronoLocal::rfc_3339());

	let stdout = if is_debug_log_level {
		stdout.pretty().boxed()
	} else {
		stdout.boxed()
	};

	// journald only in release, dev machines get enough output on stdout
	let journald = if cfg!(debug_assertions) {
		None
	} else {
		tracing_journald::layer().ok()
	};

	let subscriber = tracing_subscriber::registry()
		.with(journald.with_filter(LevelFilter::INFO))
		.with(stdout.with_filter(env_filter));

	tracing::subscriber::set_global_default(subscriber)
}

/// Starts a detached tokio task that listens for Ctrl-C.
///
/// The first Ctrl-C cancels the returned [`CancellationToken`]: no new rules are started and no new delete batches are sent,
/// but the batches already in flight are allowed to finish.
/// The second Ctrl-C exits the process right away
#[must_use]
pub fn set_up_ctrl_c_handler() -> CancellationToken {
	let (token, cancel_tx) = CancellationToken::new();

	tokio::spawn(async move {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!("Failed to set up a Ctrl-C signal handler, the run can't be cancelled: {e}");

			// a dropped sender reads as cancelled
			keep_alive(cancel_tx).await;
			return;
		}

		_ = cancel_tx.send(());
		tracing::info!("Finishing the batches in flight. Press Ctrl-C again to force close");

		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!("Failed to set up a Ctrl-C signal handler: {e}");
			return;
		}

		tracing::info!("Force closing...");
		#[expect(clippy::exit, reason = "user requested force close")]
		process::exit(1);
	});

	token
}

/// Holds on to `cancel_tx` for as long as the process lives, so the token it belongs to is never cancelled
async fn keep_alive(cancel_tx: watch::Sender<()>) {
	std::future::pending::<()>().await;
	drop(cancel_tx);
}
