/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`RetryPolicy`] used for every request sent to the mail service

use std::time::Duration;

use rand::Rng;
use tokio::{select, time::sleep};

use crate::{
	cancellation_token::{CancellationToken, cancel_wait},
	error::{BackendError, ErrorChainDisplay},
};

/// Retries requests that failed with a [`BackendError::Transient`] error, pausing for an exponentially increasing duration in between.
///
/// The pause starts at [`RetryPolicy::base_delay`] and doubles with each attempt:
/// - after the 1st attempt: 1 x base delay
/// - after the 2nd attempt: 2 x base delay
/// - after the 3rd attempt: 4 x base delay
///   And so on, never longer than [`RetryPolicy::max_delay`].
///
/// Any other error is returned right away
#[derive(Clone, Debug)]
pub struct RetryPolicy {
	/// Total number of attempts, including the first one.
	/// Defaults to [`DEFAULT_MAX_ATTEMPTS`](`Self::DEFAULT_MAX_ATTEMPTS`) (5).
	pub max_attempts: u32,

	/// Pause after the first failed attempt
	pub base_delay: Duration,

	/// Upper bound for a single pause, before jitter
	pub max_delay: Duration,

	/// Use jitter when calculating pause duration
	pub use_jitter: bool,
}

impl RetryPolicy {
	#[expect(missing_docs, reason = "self-explanatory")]
	pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
	#[expect(missing_docs, reason = "self-explanatory")]
	pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
	#[expect(missing_docs, reason = "self-explanatory")]
	pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

	/// Runs `op` until it succeeds, fails with a non-transient error, or [`RetryPolicy::max_attempts`] is exhausted.
	///
	/// `what` describes the request in logs.
	///
	/// # Errors
	/// The last error returned by `op`, or [`BackendError::Cancelled`] if `cancel` fired while waiting to retry
	pub async fn run<T, F, Fut>(
		&self,
		what: &str,
		cancel: Option<&CancellationToken>,
		mut op: F,
	) -> Result<T, BackendError>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, BackendError>>,
	{
		let max_attempts = self.max_attempts.max(1);
		let mut attempt = 1;

		loop {
			let err = match op().await {
				Ok(v) => return Ok(v),
				Err(e) => e,
			};

			if !err.is_transient() {
				return Err(err);
			}

			if attempt >= max_attempts {
				tracing::warn!(
					"{what} failed {attempt}/{max_attempts} times, giving up: {:#}",
					ErrorChainDisplay(&err)
				);
				return Err(err);
			}

			let pause = self.delay(attempt, rand::rng());
			tracing::warn!(
				attempt,
				"{what} failed ({attempt}/{max_attempts}), retrying in {}ms: {:#}",
				pause.as_millis(),
				ErrorChainDisplay(&err)
			);

			select! {
				() = sleep(pause) => (),
				() = cancel_wait(cancel) => {
					tracing::debug!("Cancelled mid retry pause");
					return Err(BackendError::Cancelled);
				}
			}

			attempt += 1;
		}
	}

	/// How long to pause after `attempt` has failed
	fn delay(&self, attempt: u32, rng: impl Rng) -> Duration {
		backoff_duration(attempt, self.base_delay, self.max_delay, self.use_jitter, rng)
	}
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
			base_delay: Self::DEFAULT_BASE_DELAY,
			max_delay: Self::DEFAULT_MAX_DELAY,
			use_jitter: true,
		}
	}
}

/// base * 2^(attempt - 1), capped at `max`, optionally multiplied by a random factor in [0.5, 1.5)
fn backoff_duration(
	attempt: u32,
	base: Duration,
	max: Duration,
	use_jitter: bool,
	mut rng: impl Rng,
) -> Duration {
	// 1 attempt -> base * 2^0
	// 2 attempt -> base * 2^1
	// 3 attempt -> base * 2^2
	let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
	let duration = base.saturating_mul(factor).min(max);

	if use_jitter {
		duration.mul_f64(rng.random::<f64>() + 0.5)
	} else {
		duration
	}
}
