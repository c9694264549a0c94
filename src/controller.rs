/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`RetentionController`] that drives a whole retention run
//! and the [`ControllerConfig`] it's set up with.
//!
//! A run walks these states, in order:
//! 1. load rules: config records are parsed and validated
//! 2. resolve overrides: run-time overrides are parsed and merged into the rules
//! 3. analyze or clean up, depending on [`RunOptions::mode`]
//! 4. report retained messages, if [`RunOptions::report_retained`] is set
//!
//! Any [`ConfigError`] is raised in the first two states, before the mail service is contacted at all

mod config;
pub mod report;

pub use self::config::ControllerConfig;

use std::{
	fmt,
	sync::atomic::{AtomicUsize, Ordering},
};

use futures::{StreamExt, TryStreamExt, stream};
use tracing::Instrument;

use self::report::{
	AnalysisReport, CleanupReport, CleanupResult, RetainedReport, RetainedResult,
	RetentionAnalysis, RunOutcome, RunReport, Sample,
};
use crate::{
	cancellation_token::{CancellationToken, is_cancelled},
	delete::BatchDeleter,
	error::{BackendError, ConfigError, ErrorChainDisplay, RetentionError},
	gateway::{CappedIds, MailboxGateway, collect_capped, search},
	message_id::MessageId,
	overrides::{self, EffectiveRule, Overrides, Resolved},
	query::{self, SearchQuery},
	rule::RetentionConfig,
	safety_cap::SafetyCap,
};

/// Applies retention rules to a mailbox reached through a [`MailboxGateway`]
#[derive(Debug)]
pub struct RetentionController<G> {
	gateway: G,
	config: ControllerConfig,
	cancel: Option<CancellationToken>,
}

/// What [`RetentionController::run`] should do once the rules are ready
#[derive(Clone, Copy, Debug)]
pub struct RunOptions {
	#[expect(missing_docs, reason = "self-explanatory")]
	pub mode: Mode,

	/// Also search for the messages that are still kept by each rule
	pub report_retained: bool,
}

/// The main phase of a run
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
	/// Count what would be deleted, never modify anything
	Analyze,

	/// Delete everything that is past its retention period.
	/// When `dry_run` is set, only find the messages without deleting them
	Cleanup {
		#[expect(missing_docs, reason = "self-explanatory")]
		dry_run: bool,
	},
}

#[derive(Clone, Copy, Debug)]
enum RunState {
	LoadRules,
	ResolveOverrides,
	Analyze,
	Cleanup,
	ReportRetained,
	Done,
}

/// Outcome of a search for a single rule
enum Search {
	Found(CappedIds),
	Failed(BackendError),
	Interrupted,
}

/// Parses the rules and the overrides and merges them together, in that order.
///
/// Nothing here touches the mail service, so any mistake in the configuration surfaces before anything is deleted
///
/// # Errors
/// If any of the rules or any of the overrides is invalid
pub fn prepare(config: RetentionConfig, overrides: Option<&str>) -> Result<Resolved, ConfigError> {
	let rules = config.into_rules()?;

	let overrides = match overrides {
		Some(s) => s.parse::<Overrides>()?,
		None => Overrides::default(),
	};

	Ok(overrides::resolve(rules, &overrides))
}

impl<G> RetentionController<G>
where
	G: MailboxGateway,
{
	/// Creates a new [`RetentionController`] that isn't bound to any cancellation token
	pub fn new(gateway: G, config: ControllerConfig) -> Self {
		Self {
			gateway,
			config,
			cancel: None,
		}
	}

	/// Stops starting new rules and sending new delete batches once `token` is cancelled
	#[must_use]
	pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
		self.cancel = Some(token);
		self
	}

	/// Walks a whole run: loads `config`, applies `overrides`, then does what `options` ask for
	///
	/// # Errors
	/// * [`RetentionError::Config`] if the rules or the overrides are invalid. Nothing has been searched for at this point
	/// * [`RetentionError::Unauthorized`] if the mail service denied access midway.
	///   It counts every message deleted before that, including those of a finished cleanup
	pub async fn run(
		&self,
		config: RetentionConfig,
		overrides: Option<&str>,
		options: RunOptions,
	) -> Result<RunReport, RetentionError> {
		let mut state = RunState::LoadRules;
		tracing::info!("{state}: {} rule records", config.retention_rules.len());

		let rules = config
			.into_rules()
			.inspect_err(|e| tracing::error!("{state} failed: {}", ErrorChainDisplay(e)))?;

		state = transition(state, RunState::ResolveOverrides);
		let overrides = overrides
			.map(str::parse::<Overrides>)
			.transpose()
			.inspect_err(|e| tracing::error!("{state} failed: {}", ErrorChainDisplay(e)))?
			.unwrap_or_default();

		let Resolved { rules, unmatched } = overrides::resolve(rules, &overrides);

		let outcome = match options.mode {
			Mode::Analyze => {
				state = transition(state, RunState::Analyze);
				RunOutcome::Analysis(self.analyze(&rules).await?)
			}
			Mode::Cleanup { dry_run } => {
				state = transition(state, RunState::Cleanup);
				RunOutcome::Cleanup(self.cleanup(&rules, dry_run).await?)
			}
		};

		let retained = if options.report_retained {
			state = transition(state, RunState::ReportRetained);

			let deleted = match &outcome {
				RunOutcome::Cleanup(report) => report.total_deleted(),
				RunOutcome::Analysis(_) => 0,
			};

			Some(
				self.report_retained(&rules)
					.await
					.map_err(|e| add_deleted(e, deleted))?,
			)
		} else {
			None
		};

		transition(state, RunState::Done);

		Ok(RunReport {
			unmatched_overrides: unmatched,
			outcome,
			retained,
		})
	}

	/// Counts the messages each rule would delete, without deleting anything
	///
	/// # Errors
	/// * [`RetentionError::Config`] if any of the rules is invalid, before anything is searched for
	/// * [`RetentionError::Unauthorized`] if the mail service denied access.
	///
	/// Any other failure is recorded on the rule's result
	pub async fn analyze(&self, rules: &[EffectiveRule]) -> Result<AnalysisReport, RetentionError> {
		check_rules(rules)?;
		let cap = self.safety_cap();

		let results = self
			.for_each_rule(rules, |rule| self.analyze_rule(rule, &cap))
			.await?;

		Ok(AnalysisReport { results })
	}

	/// Deletes every message that is past its rule's retention period, up to the safety cap.
	///
	/// With `dry_run` set, messages are only searched for and no delete request is ever sent
	///
	/// # Errors
	/// * [`RetentionError::Config`] if any of the rules is invalid, before anything is searched for
	/// * [`RetentionError::Unauthorized`] if the mail service denied access.
	///   It carries the number of messages deleted by then, across all rules
	///
	/// Any other failure is recorded on the rule's result
	pub async fn cleanup(
		&self,
		rules: &[EffectiveRule],
		dry_run: bool,
	) -> Result<CleanupReport, RetentionError> {
		check_rules(rules)?;
		let cap = self.safety_cap();
		let deleted = AtomicUsize::new(0);

		let results = self
			.for_each_rule(rules, |rule| self.cleanup_rule(rule, dry_run, &cap, &deleted))
			.await
			.map_err(|e| add_deleted(e, deleted.load(Ordering::Acquire)))?;

		Ok(CleanupReport { results, dry_run })
	}

	/// Counts every message each rule selects, regardless of its age.
	///
	/// Run after a cleanup, this is what the rule keeps, plus whatever the safety cap left behind
	///
	/// # Errors
	/// * [`RetentionError::Config`] if any of the rules is invalid, before anything is searched for
	/// * [`RetentionError::Unauthorized`] if the mail service denied access.
	///
	/// Any other failure is recorded on the rule's result
	pub async fn report_retained(
		&self,
		rules: &[EffectiveRule],
	) -> Result<RetainedReport, RetentionError> {
		check_rules(rules)?;
		let cap = self.safety_cap();

		let results = self
			.for_each_rule(rules, |rule| self.retained_rule(rule, &cap))
			.await?;

		Ok(RetainedReport { results })
	}

	fn safety_cap(&self) -> SafetyCap {
		SafetyCap::new(self.config.max_emails_per_run, self.config.max_emails_total)
	}

	/// Runs `f` for every rule, up to [`ControllerConfig::workers`] at a time, keeping the results in the order of `rules`
	async fn for_each_rule<'a, T, F, Fut>(
		&'a self,
		rules: &'a [EffectiveRule],
		f: F,
	) -> Result<Vec<T>, RetentionError>
	where
		F: Fn(&'a EffectiveRule) -> Fut,
		Fut: Future<Output = Result<T, RetentionError>>,
	{
		stream::iter(rules)
			.map(|rule| {
				let span = tracing::info_span!("rule", rule = %rule.identity());
				f(rule).instrument(span)
			})
			.buffered(self.config.workers.get())
			.try_collect()
			.await
	}

	async fn analyze_rule(
		&self,
		rule: &EffectiveRule,
		cap: &SafetyCap,
	) -> Result<RetentionAnalysis, RetentionError> {
		let query = query::compile(rule);
		let mut analysis = RetentionAnalysis {
			rule: rule.clone(),
			query,
			matched_count: 0,
			sample: Vec::new(),
			truncated: false,
			interrupted: false,
			failure: None,
		};

		match self.find_ids(rule, &analysis.query, cap).await? {
			Search::Found(found) => {
				tracing::info!("{} messages eligible for deletion", found.ids.len());

				analysis.matched_count = found.ids.len();
				analysis.truncated = found.truncated;
				analysis.sample = self.sample(rule, &found.ids).await?;
			}
			Search::Failed(e) => analysis.failure = Some(e),
			Search::Interrupted => analysis.interrupted = true,
		}

		Ok(analysis)
	}

	async fn cleanup_rule(
		&self,
		rule: &EffectiveRule,
		dry_run: bool,
		cap: &SafetyCap,
		deleted: &AtomicUsize,
	) -> Result<CleanupResult, RetentionError> {
		let query = query::compile(rule);
		let mut result = CleanupResult {
			rule: rule.clone(),
			query,
			found_count: 0,
			deleted_count: 0,
			failed_ids: Default::default(),
			sample: Vec::new(),
			truncated: false,
			dry_run,
			interrupted: false,
			failure: None,
		};

		let found = match self.find_ids(rule, &result.query, cap).await? {
			Search::Found(found) => found,
			Search::Failed(e) => {
				result.failure = Some(e);
				return Ok(result);
			}
			Search::Interrupted => {
				result.interrupted = true;
				return Ok(result);
			}
		};

		result.found_count = found.ids.len();
		result.truncated = found.truncated;

		if dry_run {
			tracing::info!("Dry run: would delete {} messages", found.ids.len());
			result.sample = self.sample(rule, &found.ids).await?;
			return Ok(result);
		}

		let outcome = BatchDeleter::builder()
			.gateway(&self.gateway)
			.batch_size(self.config.batch_size)
			.retry(&self.config.retry)
			.maybe_cancel(self.cancel.as_ref())
			.deleted_counter(deleted)
			.build()
			.delete(&found.ids)
			.await
			.map_err(|source| unauthorized(rule, source))?;

		tracing::info!(
			"Deleted {} of {} messages in {} batches, {} failed",
			outcome.deleted_count,
			found.ids.len(),
			outcome.batches,
			outcome.failed_ids.len()
		);

		result.deleted_count = outcome.deleted_count;
		result.failed_ids = outcome.failed_ids;
		result.interrupted = outcome.interrupted;

		Ok(result)
	}

	async fn retained_rule(
		&self,
		rule: &EffectiveRule,
		cap: &SafetyCap,
	) -> Result<RetainedResult, RetentionError> {
		let query = query::compile_retained(rule);
		let mut retained = RetainedResult {
			rule: rule.clone(),
			query,
			retained_count: 0,
			sample: Vec::new(),
			truncated: false,
			interrupted: false,
			failure: None,
		};

		match self.find_ids(rule, &retained.query, cap).await? {
			Search::Found(found) => {
				tracing::info!("{} messages retained", found.ids.len());

				retained.retained_count = found.ids.len();
				retained.truncated = found.truncated;
				retained.sample = self.sample(rule, &found.ids).await?;
			}
			Search::Failed(e) => retained.failure = Some(e),
			Search::Interrupted => retained.interrupted = true,
		}

		Ok(retained)
	}

	/// Collects every id matching `query`, up to the cap.
	///
	/// Fatal errors abort the run, every other one is returned as [`Search::Failed`]
	async fn find_ids(
		&self,
		rule: &EffectiveRule,
		query: &SearchQuery,
		cap: &SafetyCap,
	) -> Result<Search, RetentionError> {
		if is_cancelled(self.cancel.as_ref()) {
			tracing::info!("Cancelled, skipping");
			return Ok(Search::Interrupted);
		}

		tracing::debug!("Searching for \"{query}\"");

		let ids = search(&self.gateway, query, &self.config.retry, self.cancel.as_ref());
		let mut rule_cap = cap.for_rule();
		let found = collect_capped(ids, &mut rule_cap).await;

		// a failed search processes none of its ids
		if found.is_err() {
			rule_cap.release();
		}

		match found {
			Ok(found) => Ok(Search::Found(found)),
			Err(BackendError::Cancelled) => Ok(Search::Interrupted),
			Err(e) if e.is_fatal() => Err(unauthorized(rule, e)),
			Err(e) => {
				tracing::error!(
					"Search failed, skipping this rule: {:#}",
					ErrorChainDisplay(&e)
				);
				Ok(Search::Failed(e))
			}
		}
	}

	/// Picks the first few `ids` to show in a report, describing them if asked to
	async fn sample(
		&self,
		rule: &EffectiveRule,
		ids: &[MessageId],
	) -> Result<Vec<Sample>, RetentionError> {
		let ids = ids.iter().take(self.config.sample_size);

		if !self.config.describe_samples {
			return Ok(ids
				.map(|id| Sample {
					id: id.clone(),
					summary: None,
				})
				.collect());
		}

		let mut sample = Vec::with_capacity(self.config.sample_size);
		for id in ids {
			let summary = self
				.config
				.retry
				.run("Message summary request", self.cancel.as_ref(), || {
					self.gateway.summarize(id)
				})
				.await;

			let summary = match summary {
				Ok(summary) => summary,
				Err(e) if e.is_fatal() => return Err(unauthorized(rule, e)),
				Err(e) => {
					tracing::warn!("Couldn't describe message {id}: {:#}", ErrorChainDisplay(&e));
					None
				}
			};

			sample.push(Sample {
				id: id.clone(),
				summary,
			});
		}

		Ok(sample)
	}
}

/// Checks every rule the same way [`RetentionConfig::into_rules`] does,
/// since an [`EffectiveRule`] can also be built by hand
fn check_rules(rules: &[EffectiveRule]) -> Result<(), ConfigError> {
	rules
		.iter()
		.enumerate()
		.try_for_each(|(index, rule)| rule.rule.check(index))
		.inspect_err(|e| tracing::error!("Refusing to run: {}", ErrorChainDisplay(e)))
}

/// Adds `count` to the number of deleted messages an [`Unauthorized`](`RetentionError::Unauthorized`) error reports
fn add_deleted(mut err: RetentionError, count: usize) -> RetentionError {
	if let RetentionError::Unauthorized { deleted_count, .. } = &mut err {
		*deleted_count += count;
	}

	err
}

fn unauthorized(rule: &EffectiveRule, source: BackendError) -> RetentionError {
	tracing::error!(
		"Mail service denied access, aborting the run: {:#}",
		ErrorChainDisplay(&source)
	);

	RetentionError::Unauthorized {
		rule: rule.identity().clone(),
		deleted_count: 0,
		source,
	}
}

fn transition(from: RunState, to: RunState) -> RunState {
	tracing::info!("{from} -> {to}");
	to
}

impl fmt::Display for RunState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::LoadRules => "load rules",
			Self::ResolveOverrides => "resolve overrides",
			Self::Analyze => "analyze",
			Self::Cleanup => "cleanup",
			Self::ReportRetained => "report retained",
			Self::Done => "done",
		})
	}
}
