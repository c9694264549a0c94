/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`RetentionRule`] and its [`RuleIdentity`],
//! as well as the [`RetentionConfig`] records they are parsed from

mod record;

pub use self::record::{RetentionConfig, RuleRecord};

use std::fmt;

use crate::error::ConfigError;

/// How long messages are kept when the rule doesn't say
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Which messages a rule is about
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RuleIdentity {
	/// All messages sent from this domain, e.g. `usps.com`
	Domain(String),

	/// All messages sent from this exact address, e.g. `no-reply@spotify.com`
	Sender(String),
}

impl RuleIdentity {
	/// The domain or the sender address, whichever this is
	#[must_use]
	pub fn key(&self) -> &str {
		match self {
			Self::Domain(s) | Self::Sender(s) => s,
		}
	}

	/// Returns `true` if `key` names this identity, ignoring ASCII case
	#[must_use]
	pub fn matches_key(&self, key: &str) -> bool {
		self.key().eq_ignore_ascii_case(key)
	}
}

impl fmt::Display for RuleIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Domain(domain) => write!(f, "domain {domain}"),
			Self::Sender(sender) => write!(f, "sender {sender}"),
		}
	}
}

/// A declarative retention policy: messages from [`identity`](`RetentionRule::identity`),
/// optionally only those with one of [`subject_contains`](`RetentionRule::subject_contains`) in the subject,
/// are kept for [`retention_days`](`RetentionRule::retention_days`) and are eligible for deletion afterwards
#[derive(bon::Builder, Clone, PartialEq, Eq, Debug)]
pub struct RetentionRule {
	/// Sender domain or exact sender address
	#[builder(start_fn)]
	pub identity: RuleIdentity,

	/// Match only messages whose subject contains any of these strings. Matches every subject if empty
	#[builder(field)]
	pub subject_contains: Vec<String>,

	/// How many days to keep the messages for.
	///
	/// [`None`] means the rule didn't specify it and [`DEFAULT_RETENTION_DAYS`] applies.
	/// This is different from `Some(0)` which makes every matching message eligible right away.
	pub retention_days: Option<u32>,

	/// Human readable description used in reports
	#[builder(into, default)]
	pub description: String,
}

impl<S: retention_rule_builder::State> RetentionRuleBuilder<S> {
	/// Adds a string that should be contained in the subject
	pub fn subject(mut self, value: impl Into<String>) -> Self {
		self.subject_contains.push(value.into());
		self
	}
}

impl RetentionRule {
	/// The configured retention period, or [`DEFAULT_RETENTION_DAYS`] if it wasn't set
	#[must_use]
	pub fn retention_days_or_default(&self) -> u32 {
		self.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS)
	}

	/// Checks invariants the type system can't express. `index` is only used to name the rule in the error
	///
	/// # Errors
	/// If the identity is blank or any of the subject terms is empty
	pub fn check(&self, index: usize) -> Result<(), ConfigError> {
		if self.identity.key().trim().is_empty() {
			return Err(ConfigError::EmptyIdentity {
				index,
				field: match self.identity {
					RuleIdentity::Domain(_) => "domain",
					RuleIdentity::Sender(_) => "sender",
				},
			});
		}

		if let Some(position) = self.subject_contains.iter().position(String::is_empty) {
			return Err(ConfigError::EmptySubjectTerm {
				index,
				identity: self.identity.clone(),
				position,
			});
		}

		Ok(())
	}
}

/// Validates the whole rule set at once, stopping at the first invalid rule
///
/// # Errors
/// See [`RetentionRule::check`]
pub fn validate(rules: &[RetentionRule]) -> Result<(), ConfigError> {
	rules
		.iter()
		.enumerate()
		.try_for_each(|(index, rule)| rule.check(index))
}
