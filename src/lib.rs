/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! `inbox_retention` decides which messages of a mailbox have outlived their retention policy
//! and removes them in bounded batches.
//!
//! A run goes through these steps:
//! 1. [`RetentionConfig`](`rule::RetentionConfig`) records are validated into [`RetentionRule`]s
//! 2. run-time [`Overrides`] are merged in, producing [`EffectiveRule`]s
//! 3. every effective rule is compiled into a [`SearchQuery`](`query::SearchQuery`)
//!    and searched for via a [`MailboxGateway`]
//! 4. depending on the mode, the matches are only counted, or deleted by the [`BatchDeleter`](`delete::BatchDeleter`)
//!
//! The [`RetentionController`] drives all of the above. The mail service itself is reached only through the
//! [`MailboxGateway`] trait, the crate doesn't ship a transport client of its own.

pub mod cancellation_token;
pub mod controller;
pub mod delete;
pub mod error;
pub mod gateway;
pub mod message_id;
pub mod overrides;
pub mod query;
pub mod retry;
pub mod rule;
pub mod safety_cap;

#[cfg(feature = "scaffold")]
pub mod scaffold;

pub use self::{
	cancellation_token::CancellationToken,
	controller::{ControllerConfig, Mode, RetentionController, RunOptions, prepare},
	error::{BackendError, ConfigError, RetentionError},
	gateway::MailboxGateway,
	message_id::MessageId,
	overrides::{EffectiveRule, Overrides},
	rule::{RetentionRule, RuleIdentity},
};
