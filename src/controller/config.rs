/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::num::NonZeroUsize;

use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Limits and knobs of a [`RetentionController`](`super::RetentionController`)
#[derive(bon::Builder, Deserialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
	/// Safety cap: the maximum number of messages a single rule may touch in a run
	#[builder(default = ControllerConfig::DEFAULT_MAX_EMAILS_PER_RUN)]
	pub max_emails_per_run: usize,

	/// The maximum number of messages all rules combined may touch in a run. Unlimited if `None`
	pub max_emails_total: Option<usize>,

	/// How many ids are sent in a single delete request
	#[builder(default = ControllerConfig::DEFAULT_BATCH_SIZE)]
	pub batch_size: NonZeroUsize,

	/// How many ids of each rule to include in reports
	#[builder(default = ControllerConfig::DEFAULT_SAMPLE_SIZE)]
	pub sample_size: usize,

	/// How many rules are processed at the same time
	#[builder(default = NonZeroUsize::MIN)]
	pub workers: NonZeroUsize,

	/// Fetch date, sender, and subject of sampled messages via [`MailboxGateway::summarize`](`crate::MailboxGateway::summarize`)
	#[builder(default)]
	pub describe_samples: bool,

	/// Used for every request sent to the mail service
	#[builder(default)]
	#[serde(skip)]
	pub retry: RetryPolicy,
}

impl ControllerConfig {
	#[expect(missing_docs, reason = "self-explanatory")]
	pub const DEFAULT_MAX_EMAILS_PER_RUN: usize = 1000;
	#[expect(missing_docs, reason = "self-explanatory")]
	pub const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(500) {
		Some(n) => n,
		None => unreachable!(),
	};
	#[expect(missing_docs, reason = "self-explanatory")]
	pub const DEFAULT_SAMPLE_SIZE: usize = 10;
}

impl Default for ControllerConfig {
	fn default() -> Self {
		Self::builder().build()
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use serde_json::json;

	use super::ControllerConfig;

	#[test]
	fn defaults() {
		let config = ControllerConfig::default();

		assert_eq!(config.max_emails_per_run, 1000);
		assert_eq!(config.max_emails_total, None);
		assert_eq!(config.batch_size.get(), 500);
		assert_eq!(config.sample_size, 10);
		assert_eq!(config.workers.get(), 1);
		assert!(!config.describe_samples);
		assert_eq!(config.retry.max_attempts, 5);
	}

	#[test]
	fn deserializes_partial_document() {
		let config: ControllerConfig = serde_json::from_value(json!({
			"max_emails_per_run": 200,
			"workers": 4,
		}))
		.unwrap();

		assert_eq!(config.max_emails_per_run, 200);
		assert_eq!(config.workers.get(), 4);
		assert_eq!(config.batch_size.get(), 500);
	}

	#[test]
	fn rejects_zero_batch_size() {
		assert_matches!(
			serde_json::from_value::<ControllerConfig>(json!({ "batch_size": 0 })),
			Err(_)
		);
	}

	#[test]
	fn rejects_unknown_fields() {
		assert_matches!(
			serde_json::from_value::<ControllerConfig>(json!({ "max_emails": 10 })),
			Err(_)
		);
	}
}
