/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Per-rule results of a run and their human readable rendering

use std::{
	collections::BTreeSet,
	fmt::{self, Display},
};

use crate::{
	error::{BackendError, ErrorChainDisplay},
	gateway::MessageSummary,
	message_id::MessageId,
	overrides::EffectiveRule,
	query::SearchQuery,
};

/// Exit code of a run where every rule finished without issues
pub const EXIT_COMPLETE: u8 = 0;

/// Exit code of a run that finished but left some work undone
pub const EXIT_PARTIAL: u8 = 2;

const MAX_SUBJECT_LEN: usize = 100;

/// A message included in a report as an example
#[derive(Clone, Debug)]
pub struct Sample {
	#[expect(missing_docs, reason = "self-explanatory")]
	pub id: MessageId,

	/// Only present if the controller was asked to describe samples and the mail service could
	pub summary: Option<MessageSummary>,
}

/// What [`analyze`](`super::RetentionController::analyze`) found for a single rule
#[derive(Debug)]
pub struct RetentionAnalysis {
	#[expect(missing_docs, reason = "self-explanatory")]
	pub rule: EffectiveRule,
	#[expect(missing_docs, reason = "self-explanatory")]
	pub query: SearchQuery,

	/// Number of messages eligible for deletion, up to the safety cap
	pub matched_count: usize,
	#[expect(missing_docs, reason = "self-explanatory")]
	pub sample: Vec<Sample>,

	/// There were more matches than the safety cap allowed to count
	pub truncated: bool,

	/// The run was cancelled before this rule could finish
	pub interrupted: bool,

	/// Why this rule couldn't be analyzed
	pub failure: Option<BackendError>,
}

/// What [`cleanup`](`super::RetentionController::cleanup`) did for a single rule
#[derive(Debug)]
pub struct CleanupResult {
	#[expect(missing_docs, reason = "self-explanatory")]
	pub rule: EffectiveRule,
	#[expect(missing_docs, reason = "self-explanatory")]
	pub query: SearchQuery,

	/// Number of messages eligible for deletion, up to the safety cap
	pub found_count: usize,

	/// Number of messages actually deleted. Always 0 in a dry run
	pub deleted_count: usize,

	/// Messages that were attempted but not deleted
	pub failed_ids: BTreeSet<MessageId>,

	/// Messages that would be deleted. Only filled in a dry run
	pub sample: Vec<Sample>,

	/// There were more matches than the safety cap allowed to delete
	pub truncated: bool,
	#[expect(missing_docs, reason = "self-explanatory")]
	pub dry_run: bool,

	/// The run was cancelled before all of the found messages were attempted
	pub interrupted: bool,

	/// Why this rule couldn't be processed
	pub failure: Option<BackendError>,
}

/// What [`report_retained`](`super::RetentionController::report_retained`) found for a single rule
#[derive(Debug)]
pub struct RetainedResult {
	#[expect(missing_docs, reason = "self-explanatory")]
	pub rule: EffectiveRule,
	#[expect(missing_docs, reason = "self-explanatory")]
	pub query: SearchQuery,

	/// Number of messages still in the mailbox that match the rule, up to the safety cap
	pub retained_count: usize,
	#[expect(missing_docs, reason = "self-explanatory")]
	pub sample: Vec<Sample>,
	#[expect(missing_docs, reason = "self-explanatory")]
	pub truncated: bool,
	#[expect(missing_docs, reason = "self-explanatory")]
	pub interrupted: bool,
	#[expect(missing_docs, reason = "self-explanatory")]
	pub failure: Option<BackendError>,
}

#[expect(missing_docs, reason = "self-explanatory")]
#[derive(Debug)]
pub struct AnalysisReport {
	pub results: Vec<RetentionAnalysis>,
}

#[expect(missing_docs, reason = "self-explanatory")]
#[derive(Debug)]
pub struct CleanupReport {
	pub results: Vec<CleanupResult>,
	pub dry_run: bool,
}

#[expect(missing_docs, reason = "self-explanatory")]
#[derive(Debug)]
pub struct RetainedReport {
	pub results: Vec<RetainedResult>,
}

/// Everything [`run`](`super::RetentionController::run`) did
#[derive(Debug)]
pub struct RunReport {
	/// Override keys that didn't match any rule
	pub unmatched_overrides: Vec<String>,

	/// Result of the analysis or the cleanup, depending on the mode
	pub outcome: RunOutcome,

	/// Present if the retained messages were asked for
	pub retained: Option<RetainedReport>,
}

#[expect(missing_docs, reason = "self-explanatory")]
#[derive(Debug)]
pub enum RunOutcome {
	Analysis(AnalysisReport),
	Cleanup(CleanupReport),
}

/// How a run that didn't abort ended
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RunStatus {
	/// Every rule finished, nothing was left undone
	Complete,

	/// At least one rule has failed ids, was truncated or interrupted, or failed
	Partial,
}

impl RunStatus {
	/// The process exit code that corresponds to this status
	#[must_use]
	pub fn exit_code(self) -> u8 {
		match self {
			Self::Complete => EXIT_COMPLETE,
			Self::Partial => EXIT_PARTIAL,
		}
	}

	fn from_incomplete(mut incomplete: impl Iterator<Item = bool>) -> Self {
		if incomplete.any(|x| x) {
			Self::Partial
		} else {
			Self::Complete
		}
	}

	fn worst(self, other: Self) -> Self {
		if self == Self::Partial || other == Self::Partial {
			Self::Partial
		} else {
			Self::Complete
		}
	}
}

impl RetentionAnalysis {
	fn is_incomplete(&self) -> bool {
		self.truncated || self.interrupted || self.failure.is_some()
	}
}

impl CleanupResult {
	fn is_incomplete(&self) -> bool {
		!self.failed_ids.is_empty() || self.truncated || self.interrupted || self.failure.is_some()
	}
}

impl RetainedResult {
	fn is_incomplete(&self) -> bool {
		self.truncated || self.interrupted || self.failure.is_some()
	}
}

impl AnalysisReport {
	/// Number of messages eligible for deletion across all rules
	#[must_use]
	pub fn total_matched(&self) -> usize {
		self.results.iter().map(|r| r.matched_count).sum()
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn status(&self) -> RunStatus {
		RunStatus::from_incomplete(self.results.iter().map(RetentionAnalysis::is_incomplete))
	}
}

impl CleanupReport {
	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn total_found(&self) -> usize {
		self.results.iter().map(|r| r.found_count).sum()
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn total_deleted(&self) -> usize {
		self.results.iter().map(|r| r.deleted_count).sum()
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn total_failed(&self) -> usize {
		self.results.iter().map(|r| r.failed_ids.len()).sum()
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn status(&self) -> RunStatus {
		RunStatus::from_incomplete(self.results.iter().map(CleanupResult::is_incomplete))
	}
}

impl RetainedReport {
	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn total_retained(&self) -> usize {
		self.results.iter().map(|r| r.retained_count).sum()
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn status(&self) -> RunStatus {
		RunStatus::from_incomplete(self.results.iter().map(RetainedResult::is_incomplete))
	}
}

impl RunReport {
	/// [`RunStatus::Partial`] if either the main phase or the retained report is
	#[must_use]
	pub fn status(&self) -> RunStatus {
		let main = match &self.outcome {
			RunOutcome::Analysis(r) => r.status(),
			RunOutcome::Cleanup(r) => r.status(),
		};

		self.retained
			.as_ref()
			.map_or(main, |retained| main.worst(retained.status()))
	}
}

fn write_header(f: &mut fmt::Formatter<'_>, rule: &EffectiveRule, query: &SearchQuery) -> fmt::Result {
	let title = if rule.description().is_empty() {
		rule.identity().key()
	} else {
		rule.description()
	};

	writeln!(f, "=== {title} ===")?;
	writeln!(
		f,
		"{}, kept for {} days ({})",
		rule.identity(),
		rule.retention_days,
		rule.source
	)?;
	writeln!(f, "Query: {query}")
}

fn write_samples(f: &mut fmt::Formatter<'_>, sample: &[Sample], total: usize) -> fmt::Result {
	for s in sample {
		writeln!(f, "  {s}")?;
	}

	if total > sample.len() && !sample.is_empty() {
		writeln!(f, "  ... and {} more", total - sample.len())?;
	}

	Ok(())
}

fn write_flags(
	f: &mut fmt::Formatter<'_>,
	truncated: bool,
	interrupted: bool,
	failure: Option<&BackendError>,
) -> fmt::Result {
	if truncated {
		writeln!(f, "  (stopped at the safety cap, more messages remain)")?;
	}

	if interrupted {
		writeln!(f, "  (interrupted)")?;
	}

	if let Some(failure) = failure {
		writeln!(f, "  FAILED: {:#}", ErrorChainDisplay(failure))?;
	}

	Ok(())
}

/// Cuts `s` down to `max` characters, replacing the tail with `...`
fn shorten(s: &str, max: usize) -> String {
	if s.chars().count() <= max {
		return s.to_owned();
	}

	let mut short = s.chars().take(max.saturating_sub(3)).collect::<String>();
	short.push_str("...");
	short
}

impl Display for Sample {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let Some(summary) = &self.summary else {
			return write!(f, "{}", self.id);
		};

		match summary.date {
			Some(date) => write!(f, "{}", date.format("%Y-%m-%d"))?,
			None => f.write_str("????-??-??")?,
		}

		write!(
			f,
			" | {} | {}",
			summary.sender.as_deref().unwrap_or("(unknown sender)"),
			shorten(
				summary.subject.as_deref().unwrap_or("(no subject)"),
				MAX_SUBJECT_LEN
			)
		)
	}
}

impl Display for AnalysisReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for r in &self.results {
			write_header(f, &r.rule, &r.query)?;
			writeln!(f, "Eligible for deletion: {}", r.matched_count)?;
			write_samples(f, &r.sample, r.matched_count)?;
			write_flags(f, r.truncated, r.interrupted, r.failure.as_ref())?;
			writeln!(f)?;
		}

		write!(
			f,
			"Total: {} messages eligible for deletion across {} rules",
			self.total_matched(),
			self.results.len()
		)
	}
}

impl Display for CleanupReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for r in &self.results {
			write_header(f, &r.rule, &r.query)?;

			if r.dry_run {
				writeln!(f, "Would delete: {}", r.found_count)?;
				write_samples(f, &r.sample, r.found_count)?;
			} else {
				writeln!(f, "Found: {}, deleted: {}", r.found_count, r.deleted_count)?;
			}

			if !r.failed_ids.is_empty() {
				writeln!(f, "  Failed to delete {} messages:", r.failed_ids.len())?;
				for id in &r.failed_ids {
					writeln!(f, "    {id}")?;
				}
			}

			write_flags(f, r.truncated, r.interrupted, r.failure.as_ref())?;
			writeln!(f)?;
		}

		if self.dry_run {
			write!(
				f,
				"Dry run: {} messages would be deleted across {} rules",
				self.total_found(),
				self.results.len()
			)
		} else {
			write!(
				f,
				"Total: {} found, {} deleted, {} failed across {} rules",
				self.total_found(),
				self.total_deleted(),
				self.total_failed(),
				self.results.len()
			)
		}
	}
}

impl Display for RetainedReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for r in &self.results {
			write_header(f, &r.rule, &r.query)?;
			writeln!(f, "Retained: {}", r.retained_count)?;
			write_samples(f, &r.sample, r.retained_count)?;
			write_flags(f, r.truncated, r.interrupted, r.failure.as_ref())?;
			writeln!(f)?;
		}

		write!(
			f,
			"Total: {} messages retained across {} rules",
			self.total_retained(),
			self.results.len()
		)
	}
}

impl Display for RunReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if !self.unmatched_overrides.is_empty() {
			writeln!(
				f,
				"Ignored overrides that match no rule: {}",
				self.unmatched_overrides.join(", ")
			)?;
			writeln!(f)?;
		}

		match &self.outcome {
			RunOutcome::Analysis(r) => write!(f, "{r}")?,
			RunOutcome::Cleanup(r) => write!(f, "{r}")?,
		}

		if let Some(retained) = &self.retained {
			write!(f, "\n\n--- Retained messages ---\n\n{retained}")?;
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeSet;

	use chrono::{TimeZone, Utc};

	use super::{
		AnalysisReport, CleanupReport, CleanupResult, RetentionAnalysis, RunOutcome, RunReport,
		RunStatus, Sample, shorten,
	};
	use crate::{
		error::BackendError,
		gateway::MessageSummary,
		message_id::MessageId,
		overrides::EffectiveRule,
		query::{self, SearchQuery},
		rule::{RetentionRule, RuleIdentity},
	};

	fn rule() -> EffectiveRule {
		RetentionRule::builder(RuleIdentity::Domain("usps.com".to_owned()))
			.retention_days(7)
			.description("USPS delivery notifications")
			.build()
			.into()
	}

	fn cleanup_result(found: usize, deleted: usize) -> CleanupResult {
		let rule = rule();
		CleanupResult {
			query: query::compile(&rule),
			rule,
			found_count: found,
			deleted_count: deleted,
			failed_ids: BTreeSet::new(),
			sample: Vec::new(),
			truncated: false,
			dry_run: false,
			interrupted: false,
			failure: None,
		}
	}

	#[test]
	fn shorten_long_subjects() {
		let long = "x".repeat(150);
		let short = shorten(&long, 100);

		assert_eq!(short.chars().count(), 100);
		assert!(short.ends_with("..."));
		assert_eq!(shorten("short", 100), "short");
		assert_eq!(shorten(&"y".repeat(100), 100), "y".repeat(100));
	}

	#[test]
	fn sample_line() {
		let sample = Sample {
			id: MessageId::from(1),
			summary: Some(MessageSummary {
				date: Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).single(),
				sender: Some("USPS <auto-reply@usps.com>".to_owned()),
				subject: Some("Your package was delivered".to_owned()),
			}),
		};

		assert_eq!(
			sample.to_string(),
			"2024-03-09 | USPS <auto-reply@usps.com> | Your package was delivered"
		);

		let bare = Sample {
			id: MessageId::from(42),
			summary: None,
		};
		assert_eq!(bare.to_string(), "42");
	}

	#[test]
	fn status_of_cleanup() {
		let mut report = CleanupReport {
			results: vec![cleanup_result(5, 5), cleanup_result(0, 0)],
			dry_run: false,
		};
		assert_eq!(report.status(), RunStatus::Complete);
		assert_eq!(report.status().exit_code(), 0);

		report.results[1].failed_ids.insert(MessageId::from(3));
		assert_eq!(report.status(), RunStatus::Partial);
		assert_eq!(report.status().exit_code(), 2);
		assert_eq!(report.total_failed(), 1);
	}

	#[test]
	fn failure_or_truncation_is_partial() {
		let rule = rule();
		let analysis = RetentionAnalysis {
			query: query::compile(&rule),
			rule,
			matched_count: 1000,
			sample: Vec::new(),
			truncated: true,
			interrupted: false,
			failure: None,
		};

		let report = RunReport {
			unmatched_overrides: Vec::new(),
			outcome: RunOutcome::Analysis(AnalysisReport {
				results: vec![analysis],
			}),
			retained: None,
		};
		assert_eq!(report.status(), RunStatus::Partial);

		let mut failed = cleanup_result(0, 0);
		failed.failure = Some(BackendError::rejected("invalid query"));
		assert_eq!(
			CleanupReport {
				results: vec![failed],
				dry_run: false
			}
			.status(),
			RunStatus::Partial
		);
	}

	#[test]
	fn renders_totals_and_more_marker() {
		let mut result = cleanup_result(12, 0);
		result.dry_run = true;
		result.sample = (0..10)
			.map(|i| Sample {
				id: MessageId::from(i),
				summary: None,
			})
			.collect();

		let report = CleanupReport {
			results: vec![result],
			dry_run: true,
		}
		.to_string();

		assert!(report.starts_with("=== USPS delivery notifications ===\n"), "{report}");
		assert!(report.contains("domain usps.com, kept for 7 days (configured)"), "{report}");
		assert!(
			report.contains("Query: from:usps.com older_than:7d -in:spam -in:trash"),
			"{report}"
		);
		assert!(report.contains("  ... and 2 more"), "{report}");
		assert!(
			report.ends_with("Dry run: 12 messages would be deleted across 1 rules"),
			"{report}"
		);
	}

	#[test]
	fn renders_failure_chain() {
		let mut result = cleanup_result(0, 0);
		result.query = SearchQuery::new_raw("from:usps.com");
		result.failure = Some(BackendError::rejected("invalid query"));

		let report = CleanupReport {
			results: vec![result],
			dry_run: false,
		}
		.to_string();

		assert!(
			report.contains("FAILED: Mail service rejected the request: invalid query"),
			"{report}"
		);
	}
}
