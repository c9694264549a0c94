/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module compiles [`EffectiveRule`]s into [`SearchQuery`]s understood by the mail service.
//!
//! A query is made up of these clauses, in this order, separated by a single space:
//! 1. identity: `from:<domain>` or `from:<sender>`
//! 2. subject, only if the rule has subject terms: `(subject:"t1" OR subject:"t2")`
//! 3. age: `older_than:<days>d`
//! 4. exclusion: `-in:spam -in:trash`
//!
//! Subject terms are used verbatim. A term that contains a `"` produces a broken query, quotes are not escaped.

use std::fmt::{self, Write as _};

use itertools::Itertools;

use crate::{overrides::EffectiveRule, rule::RuleIdentity};

const EXCLUSION_CLAUSE: &str = "-in:spam -in:trash";

/// A search query string in the mail service's search syntax
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SearchQuery(String);

impl SearchQuery {
	/// Wraps a raw query string without checking it
	#[must_use]
	pub fn new_raw(query: impl Into<String>) -> Self {
		Self(query.into())
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for SearchQuery {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Compiles the query that finds messages that have outlived the rule's retention period
#[must_use]
pub fn compile(rule: &EffectiveRule) -> SearchQuery {
	let mut query = selection(rule);
	_ = write!(query, " older_than:{}d {EXCLUSION_CLAUSE}", rule.retention_days);

	SearchQuery(query)
}

/// Compiles the query that finds every message the rule applies to regardless of its age,
/// i.e. the same as [`compile`] without the age clause
#[must_use]
pub fn compile_retained(rule: &EffectiveRule) -> SearchQuery {
	let mut query = selection(rule);
	_ = write!(query, " {EXCLUSION_CLAUSE}");

	SearchQuery(query)
}

/// Identity and subject clauses
fn selection(rule: &EffectiveRule) -> String {
	let mut query = match rule.identity() {
		RuleIdentity::Domain(domain) => format!("from:{domain}"),
		RuleIdentity::Sender(sender) => format!("from:{sender}"),
	};

	let subjects = rule.subject_contains();
	if !subjects.is_empty() {
		_ = write!(
			query,
			" ({})",
			subjects
				.iter()
				.format_with(" OR ", |term, f| f(&format_args!(r#"subject:"{term}""#)))
		);
	}

	query
}

#[cfg(test)]
mod tests {
	use super::{compile, compile_retained};
	use crate::{
		overrides::EffectiveRule,
		rule::{RetentionRule, RuleIdentity},
	};

	fn rule(identity: RuleIdentity, days: u32, subjects: &[&str]) -> EffectiveRule {
		let mut rule = RetentionRule::builder(identity).retention_days(days).build();
		rule.subject_contains = subjects.iter().map(|&s| s.to_owned()).collect();

		rule.into()
	}

	#[test]
	fn domain_without_subjects() {
		let rule = rule(RuleIdentity::Domain("usps.com".to_owned()), 7, &[]);
		assert_eq!(
			compile(&rule).as_str(),
			"from:usps.com older_than:7d -in:spam -in:trash"
		);
	}

	#[test]
	fn domain_with_subjects() {
		let rule = rule(
			RuleIdentity::Domain("accounts.google.com".to_owned()),
			90,
			&["security alert", "sign-in"],
		);

		assert_eq!(
			compile(&rule).as_str(),
			r#"from:accounts.google.com (subject:"security alert" OR subject:"sign-in") older_than:90d -in:spam -in:trash"#
		);
	}

	#[test]
	fn sender_with_single_subject() {
		let rule = rule(
			RuleIdentity::Sender("no-reply@spotify.com".to_owned()),
			0,
			&["Your receipt"],
		);

		assert_eq!(
			compile(&rule).as_str(),
			r#"from:no-reply@spotify.com (subject:"Your receipt") older_than:0d -in:spam -in:trash"#
		);
	}

	#[test]
	fn clauses_appear_once_and_in_order() {
		let rules = [
			rule(RuleIdentity::Domain("hulumail.com".to_owned()), 14, &[]),
			rule(
				RuleIdentity::Sender("veteransaffairs@messages.va.gov".to_owned()),
				365,
				&["a", "b", "c"],
			),
		];

		for rule in &rules {
			let query = compile(rule);
			let query = query.as_str();

			assert_eq!(query.matches("from:").count(), 1, "{query}");
			assert_eq!(query.matches("older_than:").count(), 1, "{query}");
			assert_eq!(query.matches("-in:spam -in:trash").count(), 1, "{query}");

			let from = query.find("from:").unwrap();
			let age = query.find("older_than:").unwrap();
			let exclusion = query.find("-in:spam").unwrap();
			assert!(from < age && age < exclusion, "{query}");
			assert!(query.ends_with("-in:spam -in:trash"), "{query}");
		}
	}

	#[test]
	fn compile_is_deterministic() {
		let rule = rule(
			RuleIdentity::Domain("accounts.google.com".to_owned()),
			90,
			&["security alert"],
		);

		assert_eq!(compile(&rule), compile(&rule.clone()));
	}

	#[test]
	fn quotes_are_not_escaped() {
		let rule = rule(
			RuleIdentity::Domain("example.com".to_owned()),
			1,
			&[r#"say "hi""#],
		);

		assert_eq!(
			compile(&rule).as_str(),
			r#"from:example.com (subject:"say "hi"") older_than:1d -in:spam -in:trash"#
		);
	}

	#[test]
	fn retained_query_has_no_age_clause() {
		let rule = rule(
			RuleIdentity::Domain("accounts.google.com".to_owned()),
			90,
			&["security alert"],
		);

		assert_eq!(
			compile_retained(&rule).as_str(),
			r#"from:accounts.google.com (subject:"security alert") -in:spam -in:trash"#
		);
	}
}
