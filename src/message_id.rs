/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`MessageId`] type which identifies a message on the mail service

use std::{fmt, ops::Deref};

use serde::{Deserialize, Serialize};
use tap::TapOptional;

/// An opaque, never empty identifier the mail service uses for a message
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Serialize, Deserialize, Debug)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
	/// Creates a new [`MessageId`] from the provided string, if it's not empty
	#[must_use]
	pub fn new(s: impl Into<String>) -> Option<Self> {
		let s = s.into();
		(!s.is_empty())
			.then_some(Self(s))
			.tap_none(|| tracing::warn!("Tried to create a message ID from an empty string"))
	}

	/// Returns a string slice containing the ID
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Deref for MessageId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// The string was empty
#[derive(thiserror::Error, Debug)]
#[error("Message ID can't be empty")]
pub struct EmptyMessageId;

impl TryFrom<String> for MessageId {
	type Error = EmptyMessageId;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value).ok_or(EmptyMessageId)
	}
}

impl TryFrom<&str> for MessageId {
	type Error = EmptyMessageId;

	fn try_from(value: &str) -> Result<Self, Self::Error> {
		Self::new(value).ok_or(EmptyMessageId)
	}
}

impl From<u32> for MessageId {
	fn from(value: u32) -> Self {
		Self(value.to_string())
	}
}

impl From<MessageId> for String {
	fn from(value: MessageId) -> Self {
		value.0
	}
}
