/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::pin::pin;

use futures::{Stream, StreamExt, TryStreamExt, stream};

use super::{MailboxGateway, PageToken};
use crate::{
	cancellation_token::CancellationToken,
	error::{BackendError, ErrorChainDisplay},
	message_id::MessageId,
	query::SearchQuery,
	retry::RetryPolicy,
	safety_cap::RuleCap,
};

/// Ids collected from a search, up to the safety cap
#[derive(Default, Debug)]
pub struct CappedIds {
	/// Collected ids, in the order the mail service returned them
	pub ids: Vec<MessageId>,

	/// The cap stopped the collection while there were more matches
	pub truncated: bool,
}

enum Cursor {
	Start,
	Next(PageToken),
	Done,
}

/// Lazily searches for `query`, fetching the next page only once the previous one has been consumed.
///
/// Each page request goes through `retry`. The stream ends after the last page, or with the first page that failed for good.
/// Calling this again starts over from the first page
pub fn search<'a, G>(
	gateway: &'a G,
	query: &'a SearchQuery,
	retry: &'a RetryPolicy,
	cancel: Option<&'a CancellationToken>,
) -> impl Stream<Item = Result<MessageId, BackendError>> + 'a
where
	G: MailboxGateway + ?Sized,
{
	stream::try_unfold((Cursor::Start, 0usize), move |(cursor, page_num)| async move {
		let page_token = match cursor {
			Cursor::Start => None,
			Cursor::Next(token) => Some(token),
			Cursor::Done => return Ok(None),
		};

		let page = retry
			.run("Search page request", cancel, || {
				gateway.search_page(query, page_token.as_ref())
			})
			.await?;

		tracing::debug!(
			page = page_num,
			"Got {} ids for \"{query}\", more pages: {}",
			page.ids.len(),
			page.next_page_token.is_some()
		);

		let next = match page.next_page_token {
			Some(token) if !page.ids.is_empty() => Cursor::Next(token),
			_ => Cursor::Done,
		};

		let ids = stream::iter(page.ids.into_iter().map(Ok::<_, BackendError>));
		Ok(Some((ids, (next, page_num + 1))))
	})
	.try_flatten()
}

/// Consumes `ids` until it ends or `cap` runs out, whichever comes first.
///
/// If the cap ran out while the stream had more ids, the result is marked as truncated.
/// No more than one id past the cap is ever pulled from the stream
///
/// # Errors
/// The first error returned by the stream before the cap was reached
pub async fn collect_capped<S>(ids: S, cap: &mut RuleCap<'_>) -> Result<CappedIds, BackendError>
where
	S: Stream<Item = Result<MessageId, BackendError>>,
{
	let mut ids = pin!(ids);
	let mut collected = Vec::new();

	while let Some(next) = ids.next().await {
		let id = match next {
			Ok(id) => id,
			Err(e) if cap.is_exhausted() => {
				// we only wanted to know whether there's more. Assume there is
				tracing::warn!(
					"Search failed after the safety cap was reached: {:#}",
					ErrorChainDisplay(&e)
				);

				return Ok(CappedIds {
					ids: collected,
					truncated: true,
				});
			}
			Err(e) => return Err(e),
		};

		if !cap.try_take() {
			tracing::warn!(
				"Safety cap reached after {} messages, the rest is left for the next run",
				collected.len()
			);

			return Ok(CappedIds {
				ids: collected,
				truncated: true,
			});
		}

		collected.push(id);
	}

	Ok(CappedIds {
		ids: collected,
		truncated: false,
	})
}

#[cfg(test)]
mod tests {
	use std::sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	};

	use assert_matches::assert_matches;
	use futures::TryStreamExt;

	use super::{collect_capped, search};
	use crate::{
		error::BackendError,
		gateway::{BatchDeleteResponse, MailboxGateway, PageToken, SearchPage},
		message_id::MessageId,
		query::SearchQuery,
		retry::RetryPolicy,
		safety_cap::SafetyCap,
	};

	/// Serves `total` ids in pages of `page_size`, failing the request for page `fail_page` once, if set
	struct Paged {
		total: u32,
		page_size: u32,
		requests: AtomicUsize,
		fail_page: Mutex<Option<(u32, BackendError)>>,
	}

	impl Paged {
		fn new(total: u32, page_size: u32) -> Self {
			Self {
				total,
				page_size,
				requests: AtomicUsize::new(0),
				fail_page: Mutex::new(None),
			}
		}
	}

	impl MailboxGateway for Paged {
		async fn search_page(
			&self,
			_query: &SearchQuery,
			page_token: Option<&PageToken>,
		) -> Result<SearchPage, BackendError> {
			self.requests.fetch_add(1, Ordering::SeqCst);

			let start = page_token.map_or(0, |t| t.0.parse::<u32>().unwrap());

			{
				let mut fail = self.fail_page.lock().unwrap();
				if fail
					.as_ref()
					.is_some_and(|(page, _)| *page == start / self.page_size)
				{
					let (_, err) = fail.take().unwrap();
					return Err(err);
				}
			}

			let end = (start + self.page_size).min(self.total);
			Ok(SearchPage {
				ids: (start..end).map(MessageId::from).collect(),
				next_page_token: (end < self.total).then(|| PageToken(end.to_string())),
			})
		}

		async fn delete_batch(&self, _ids: &[MessageId]) -> Result<BatchDeleteResponse, BackendError> {
			Ok(BatchDeleteResponse::all_deleted())
		}
	}

	fn query() -> SearchQuery {
		SearchQuery::new_raw("from:usps.com older_than:7d -in:spam -in:trash")
	}

	fn instant_retry() -> RetryPolicy {
		RetryPolicy {
			base_delay: std::time::Duration::ZERO,
			max_delay: std::time::Duration::ZERO,
			use_jitter: false,
			..Default::default()
		}
	}

	#[tokio::test]
	async fn yields_every_page_in_order() {
		let gateway = Paged::new(1200, 500);
		let (query, retry) = (query(), instant_retry());

		let ids = search(&gateway, &query, &retry, None)
			.try_collect::<Vec<_>>()
			.await
			.unwrap();

		assert_eq!(ids.len(), 1200);
		assert_eq!(ids.first().unwrap().as_str(), "0");
		assert_eq!(ids.last().unwrap().as_str(), "1199");
		assert_eq!(gateway.requests.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn cap_stops_fetching_pages() {
		let gateway = Paged::new(1200, 500);
		let (query, retry) = (query(), instant_retry());
		let cap = SafetyCap::new(400, None);

		let capped = collect_capped(search(&gateway, &query, &retry, None), &mut cap.for_rule())
			.await
			.unwrap();

		assert_eq!(capped.ids.len(), 400);
		assert!(capped.truncated);
		assert_eq!(gateway.requests.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn exact_fit_is_not_truncated() {
		let gateway = Paged::new(1000, 500);
		let (query, retry) = (query(), instant_retry());
		let cap = SafetyCap::new(1000, None);

		let capped = collect_capped(search(&gateway, &query, &retry, None), &mut cap.for_rule())
			.await
			.unwrap();

		assert_eq!(capped.ids.len(), 1000);
		assert!(!capped.truncated);
	}

	#[tokio::test]
	async fn transient_page_failure_is_retried() {
		let gateway = Paged::new(700, 500);
		*gateway.fail_page.lock().unwrap() = Some((1, BackendError::transient("429")));
		let (query, retry) = (query(), instant_retry());

		let ids = search(&gateway, &query, &retry, None)
			.try_collect::<Vec<_>>()
			.await
			.unwrap();

		assert_eq!(ids.len(), 700);
		assert_eq!(gateway.requests.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn rejected_page_ends_search_with_error() {
		let gateway = Paged::new(700, 500);
		*gateway.fail_page.lock().unwrap() = Some((1, BackendError::rejected("bad query")));
		let (query, retry) = (query(), instant_retry());
		let cap = SafetyCap::new(1000, None);

		let res = collect_capped(search(&gateway, &query, &retry, None), &mut cap.for_rule()).await;
		assert_matches!(res, Err(BackendError::Rejected(_)));
	}

	#[tokio::test]
	async fn failure_past_the_cap_is_truncation() {
		let gateway = Paged::new(1000, 500);
		*gateway.fail_page.lock().unwrap() = Some((1, BackendError::rejected("boom")));
		let (query, retry) = (query(), instant_retry());
		let cap = SafetyCap::new(500, None);

		let capped = collect_capped(search(&gateway, &query, &retry, None), &mut cap.for_rule())
			.await
			.unwrap();

		assert_eq!(capped.ids.len(), 500);
		assert!(capped.truncated);
	}

	#[tokio::test]
	async fn restarts_from_the_first_page() {
		let gateway = Paged::new(10, 4);
		let (query, retry) = (query(), instant_retry());

		let first = search(&gateway, &query, &retry, None)
			.try_collect::<Vec<_>>()
			.await
			.unwrap();
		let second = search(&gateway, &query, &retry, None)
			.try_collect::<Vec<_>>()
			.await
			.unwrap();

		assert_eq!(first, second);
	}
}
