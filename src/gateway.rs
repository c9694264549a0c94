/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`MailboxGateway`] trait through which the mail service is reached,
//! and the lazily paginated [`search`] built on top of it

mod search;

pub use self::search::{CappedIds, collect_capped, search};

use chrono::{DateTime, Utc};

use crate::{error::BackendError, message_id::MessageId, query::SearchQuery};

/// A mail service that can search messages and delete them in bulk.
///
/// Implementations are expected to map their failures onto [`BackendError`]'s variants:
/// rate limits and network hiccups are [`Transient`](`BackendError::Transient`),
/// auth failures are [`Unauthorized`](`BackendError::Unauthorized`),
/// anything else is [`Rejected`](`BackendError::Rejected`).
/// Retrying is done by the caller
pub trait MailboxGateway: Sync {
	/// Fetches a single page of ids matching `query`, starting at `page_token` or at the beginning if it's `None`.
	///
	/// Ids must be returned in a stable order across pages.
	/// An empty page ends the search even if it carries a page token
	fn search_page(
		&self,
		query: &SearchQuery,
		page_token: Option<&PageToken>,
	) -> impl Future<Output = Result<SearchPage, BackendError>> + Send;

	/// Deletes all `ids` at once.
	///
	/// Ids that the service refused to delete are returned in [`BatchDeleteResponse::rejected`].
	/// Deleting an id that is already gone counts as a success
	fn delete_batch(
		&self,
		ids: &[MessageId],
	) -> impl Future<Output = Result<BatchDeleteResponse, BackendError>> + Send;

	/// Fetches date, sender, and subject of a message for previews. Returns `None` by default
	fn summarize(
		&self,
		_id: &MessageId,
	) -> impl Future<Output = Result<Option<MessageSummary>, BackendError>> + Send {
		async { Ok(None) }
	}
}

/// Opaque continuation token of a paginated search
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PageToken(pub String);

/// A single page of search results
#[derive(Default, Debug)]
pub struct SearchPage {
	/// Matching ids on this page
	pub ids: Vec<MessageId>,

	/// Token to get the next page with, `None` if this is the last one
	pub next_page_token: Option<PageToken>,
}

/// What happened to a bulk delete request
#[derive(Default, Debug)]
pub struct BatchDeleteResponse {
	/// Ids the mail service refused to delete. Everything else in the batch is considered deleted
	pub rejected: Vec<MessageId>,
}

/// A short description of a message used in previews
#[derive(Clone, Default, Debug)]
pub struct MessageSummary {
	/// When the message was received
	pub date: Option<DateTime<Utc>>,

	/// The `From` header
	pub sender: Option<String>,

	/// The `Subject` header
	pub subject: Option<String>,
}

impl BatchDeleteResponse {
	/// Every id of the batch was deleted
	#[must_use]
	pub fn all_deleted() -> Self {
		Self::default()
	}
}

impl<G> MailboxGateway for &G
where
	G: MailboxGateway + ?Sized,
{
	fn search_page(
		&self,
		query: &SearchQuery,
		page_token: Option<&PageToken>,
	) -> impl Future<Output = Result<SearchPage, BackendError>> + Send {
		(**self).search_page(query, page_token)
	}

	fn delete_batch(
		&self,
		ids: &[MessageId],
	) -> impl Future<Output = Result<BatchDeleteResponse, BackendError>> + Send {
		(**self).delete_batch(ids)
	}

	fn summarize(
		&self,
		id: &MessageId,
	) -> impl Future<Output = Result<Option<MessageSummary>, BackendError>> + Send {
		(**self).summarize(id)
	}
}
