/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! An in-memory mailbox that answers queries from a prepared table, injects failures, and records every call

#![allow(dead_code, reason = "not every test uses every helper")]
#![allow(clippy::unwrap_used)]

use std::{
	collections::{HashMap, HashSet},
	sync::Mutex,
	time::Duration,
};

use inbox_retention::{
	BackendError, ControllerConfig, MailboxGateway, MessageId,
	gateway::{BatchDeleteResponse, MessageSummary, PageToken, SearchPage},
	query::SearchQuery,
	retry::RetryPolicy,
	rule::RetentionConfig,
};

/// A failure to inject into a request
#[derive(Clone, Copy, Debug)]
pub enum Failure {
	/// Fail with a transient error this many more times, then succeed
	Transient { times: usize },
	Rejected,
	Unauthorized,
}

#[derive(Default)]
pub struct Mailbox {
	pub page_size: usize,
	state: Mutex<State>,
}

#[derive(Default)]
struct State {
	results: HashMap<String, Vec<MessageId>>,
	delays: HashMap<String, Duration>,
	summaries: HashMap<MessageId, MessageSummary>,
	deleted: HashSet<MessageId>,
	reject: HashSet<MessageId>,
	search_failures: HashMap<String, Failure>,
	page_failures: HashMap<(String, usize), Failure>,
	delete_failure: Option<Failure>,
	delete_failure_after: usize,
	searches: Vec<String>,
	delete_batches: Vec<Vec<MessageId>>,
}

impl Failure {
	fn trigger(&mut self) -> Option<BackendError> {
		match self {
			Self::Transient { times: 0 } => None,
			Self::Transient { times } => {
				*times -= 1;
				Some(BackendError::transient("429 rate limit exceeded"))
			}
			Self::Rejected => Some(BackendError::rejected("400 invalid request")),
			Self::Unauthorized => Some(BackendError::unauthorized("401 invalid credentials")),
		}
	}
}

impl Mailbox {
	pub fn new() -> Self {
		Self {
			page_size: 500,
			state: Mutex::default(),
		}
	}

	/// Makes `query` match ids `first..first + count`
	pub fn with_results(self, query: &str, first: u32, count: u32) -> Self {
		self.state
			.lock()
			.unwrap()
			.results
			.insert(query.to_owned(), (first..first + count).map(MessageId::from).collect());
		self
	}

	pub fn with_delay(self, query: &str, delay: Duration) -> Self {
		self.state
			.lock()
			.unwrap()
			.delays
			.insert(query.to_owned(), delay);
		self
	}

	pub fn with_summary(self, id: u32, summary: MessageSummary) -> Self {
		self.state
			.lock()
			.unwrap()
			.summaries
			.insert(MessageId::from(id), summary);
		self
	}

	pub fn with_search_failure(self, query: &str, failure: Failure) -> Self {
		self.state
			.lock()
			.unwrap()
			.search_failures
			.insert(query.to_owned(), failure);
		self
	}

	/// Fails only the request for the `page`th page of `query`, counting from 0
	pub fn with_page_failure(self, query: &str, page: usize, failure: Failure) -> Self {
		self.state
			.lock()
			.unwrap()
			.page_failures
			.insert((query.to_owned(), page), failure);
		self
	}

	pub fn with_delete_failure(self, failure: Failure) -> Self {
		self.with_delete_failure_after(0, failure)
	}

	/// Lets the first `batches` delete requests through before failing
	pub fn with_delete_failure_after(self, batches: usize, failure: Failure) -> Self {
		{
			let mut state = self.state.lock().unwrap();
			state.delete_failure = Some(failure);
			state.delete_failure_after = batches;
		}
		self
	}

	pub fn with_rejected(self, ids: impl IntoIterator<Item = u32>) -> Self {
		self.state
			.lock()
			.unwrap()
			.reject
			.extend(ids.into_iter().map(MessageId::from));
		self
	}

	/// Every query that was searched for, once per page request
	pub fn searches(&self) -> Vec<String> {
		self.state.lock().unwrap().searches.clone()
	}

	pub fn delete_batches(&self) -> Vec<Vec<MessageId>> {
		self.state.lock().unwrap().delete_batches.clone()
	}

	pub fn deleted_count(&self) -> usize {
		self.state.lock().unwrap().deleted.len()
	}
}

impl MailboxGateway for Mailbox {
	async fn search_page(
		&self,
		query: &SearchQuery,
		page_token: Option<&PageToken>,
	) -> Result<SearchPage, BackendError> {
		let delay = {
			let mut state = self.state.lock().unwrap();
			state.searches.push(query.to_string());

			if let Some(err) = state
				.search_failures
				.get_mut(query.as_str())
				.and_then(Failure::trigger)
			{
				return Err(err);
			}

			let page = page_token.map_or(0, |t| t.0.parse::<usize>().unwrap() / self.page_size);
			if let Some(err) = state
				.page_failures
				.get_mut(&(query.to_string(), page))
				.and_then(Failure::trigger)
			{
				return Err(err);
			}

			state.delays.get(query.as_str()).copied()
		};

		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}

		let state = self.state.lock().unwrap();
		let matching = state
			.results
			.get(query.as_str())
			.map(|ids| {
				ids.iter()
					.filter(|id| !state.deleted.contains(*id))
					.cloned()
					.collect::<Vec<_>>()
			})
			.unwrap_or_default();

		let start = page_token.map_or(0, |t| t.0.parse::<usize>().unwrap());
		let end = (start + self.page_size).min(matching.len());

		Ok(SearchPage {
			ids: matching[start.min(end)..end].to_vec(),
			next_page_token: (end < matching.len()).then(|| PageToken(end.to_string())),
		})
	}

	async fn delete_batch(&self, ids: &[MessageId]) -> Result<BatchDeleteResponse, BackendError> {
		let mut state = self.state.lock().unwrap();
		state.delete_batches.push(ids.to_vec());

		if state.delete_failure_after > 0 {
			state.delete_failure_after -= 1;
		} else if let Some(err) = state.delete_failure.as_mut().and_then(Failure::trigger) {
			return Err(err);
		}

		let mut rejected = Vec::new();
		for id in ids {
			if state.reject.contains(id) {
				rejected.push(id.clone());
			} else {
				state.deleted.insert(id.clone());
			}
		}

		Ok(BatchDeleteResponse { rejected })
	}

	async fn summarize(&self, id: &MessageId) -> Result<Option<MessageSummary>, BackendError> {
		Ok(self.state.lock().unwrap().summaries.get(id).cloned())
	}
}

pub fn instant_retry(max_attempts: u32) -> RetryPolicy {
	RetryPolicy {
		max_attempts,
		base_delay: Duration::ZERO,
		max_delay: Duration::ZERO,
		use_jitter: false,
	}
}

pub fn config() -> ControllerConfig {
	ControllerConfig::builder().retry(instant_retry(3)).build()
}

pub fn rules(value: serde_json::Value) -> RetentionConfig {
	serde_json::from_value(value).unwrap()
}
