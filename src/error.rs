/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains all errors that can happen during a retention run:
//! - [`ConfigError`] for rules and overrides that don't make sense, always raised before touching the mail service
//! - [`BackendError`] for failures reported by a [`MailboxGateway`](`crate::MailboxGateway`)
//! - [`RetentionError`] for everything that aborts a run as a whole

mod error_chain_display;

pub use self::error_chain_display::ErrorChainDisplay;

use std::error::Error as StdError;

use crate::rule::RuleIdentity;

/// A boxed error returned by a [`MailboxGateway`](`crate::MailboxGateway`) implementation
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Exit code used when the run aborted
pub const EXIT_FATAL: u8 = 1;

/// An error that aborts a run
#[derive(thiserror::Error, Debug)]
pub enum RetentionError {
	#[expect(missing_docs, reason = "error message is self-documenting")]
	#[error("Invalid retention configuration")]
	Config(#[from] ConfigError),

	/// The mail service rejected our identity. No other rule could succeed either, so the run is stopped
	#[error("Mail service denied access while processing rule {rule}, {deleted_count} messages had been deleted by then")]
	Unauthorized {
		/// The rule that was being processed when the error was reported
		rule: RuleIdentity,

		/// Number of messages the mail service confirmed as deleted during this run before access was denied
		deleted_count: usize,

		/// What the mail service reported
		#[source]
		source: BackendError,
	},
}

impl RetentionError {
	/// The process exit code that corresponds to this error
	#[must_use]
	pub fn exit_code(&self) -> u8 {
		EXIT_FATAL
	}
}

#[expect(missing_docs, reason = "error message is self-documenting")]
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
	#[error("Rule #{index} has neither a domain nor a sender")]
	MissingIdentity { index: usize },

	#[error("Rule #{index} has both a domain ({domain:?}) and a sender ({sender:?}), only one is allowed")]
	AmbiguousIdentity {
		index: usize,
		domain: String,
		sender: String,
	},

	#[error("Rule #{index} has an empty {field}")]
	EmptyIdentity { index: usize, field: &'static str },

	#[error("Rule #{index} ({identity}) has a negative retention period: {days} days")]
	NegativeRetention {
		index: usize,
		identity: RuleIdentity,
		days: i64,
	},

	#[error("Rule #{index} ({identity}) has a retention period that is too large: {days} days")]
	RetentionTooLarge {
		index: usize,
		identity: RuleIdentity,
		days: i64,
	},

	#[error("Rule #{index} ({identity}) has an empty entry at position {position} in subject_contains")]
	EmptySubjectTerm {
		index: usize,
		identity: RuleIdentity,
		position: usize,
	},

	#[error("Invalid override {token:?}: {reason}")]
	InvalidOverride {
		token: String,
		reason: InvalidOverrideReason,
	},

	#[error("Override for {key:?} is specified more than once")]
	DuplicateOverride { key: String },
}

/// Why an override token couldn't be parsed
#[derive(thiserror::Error, Debug)]
pub enum InvalidOverrideReason {
	#[expect(missing_docs, reason = "error message is self-documenting")]
	#[error("expected the form identifier:days")]
	MissingColon,

	#[expect(missing_docs, reason = "error message is self-documenting")]
	#[error("the identifier is empty")]
	EmptyKey,

	#[expect(missing_docs, reason = "error message is self-documenting")]
	#[error("days must be a non-negative integer")]
	Negative,

	#[expect(missing_docs, reason = "error message is self-documenting")]
	#[error("days is not a valid integer")]
	NotANumber(#[source] std::num::ParseIntError),
}

/// A failure reported by the mail service.
///
/// The variant decides what happens next:
/// retry it ([`Transient`](`BackendError::Transient`)),
/// give up on the current rule or batch ([`Rejected`](`BackendError::Rejected`)),
/// or stop the whole run ([`Unauthorized`](`BackendError::Unauthorized`))
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
	/// Rate limiting, a dropped connection, a timeout, etc. Worth trying again later
	#[error("Transient mail service failure")]
	Transient(#[source] BoxError),

	/// The request itself was refused, e.g. an invalid query. Retrying won't help
	#[error("Mail service rejected the request")]
	Rejected(#[source] BoxError),

	/// Authentication or permission failure
	#[error("Mail service denied access")]
	Unauthorized(#[source] BoxError),

	/// A retry wait was cut short because the run has been cancelled
	#[error("Cancelled while waiting to retry")]
	Cancelled,
}

impl BackendError {
	/// Creates a [`BackendError::Transient`] from any error
	pub fn transient(e: impl Into<BoxError>) -> Self {
		Self::Transient(e.into())
	}

	/// Creates a [`BackendError::Rejected`] from any error
	pub fn rejected(e: impl Into<BoxError>) -> Self {
		Self::Rejected(e.into())
	}

	/// Creates a [`BackendError::Unauthorized`] from any error
	pub fn unauthorized(e: impl Into<BoxError>) -> Self {
		Self::Unauthorized(e.into())
	}

	/// Returns `true` if the same request might succeed if retried
	#[must_use]
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Transient(_))
	}

	/// Returns `true` if nothing else in the run can succeed after this error
	#[must_use]
	pub fn is_fatal(&self) -> bool {
		matches!(self, Self::Unauthorized(_))
	}
}

#[cfg(test)]
mod tests {
	use super::{BackendError, ConfigError, RetentionError};
	use crate::rule::RuleIdentity;

	#[test]
	fn only_unauthorized_is_fatal() {
		assert!(BackendError::unauthorized("401").is_fatal());
		assert!(!BackendError::rejected("bad query").is_fatal());
		assert!(!BackendError::transient("429").is_fatal());
		assert!(BackendError::transient("429").is_transient());
	}

	#[test]
	fn config_error_names_the_rule() {
		let err = ConfigError::NegativeRetention {
			index: 3,
			identity: RuleIdentity::Domain("usps.com".to_owned()),
			days: -1,
		};

		assert_eq!(
			err.to_string(),
			"Rule #3 (domain usps.com) has a negative retention period: -1 days"
		);
		assert_eq!(RetentionError::from(err).exit_code(), 1);
	}
}
