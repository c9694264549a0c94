/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`Overrides`], run-time adjustments of retention periods,
//! and the [`EffectiveRule`]s that result from applying them with [`resolve`]

use std::{fmt, str::FromStr};

use crate::{
	error::{ConfigError, InvalidOverrideReason},
	rule::{RetentionRule, RuleIdentity},
};

/// Retention periods that take precedence over the ones in the rules for a single run.
///
/// Parsed from `key1:days1,key2:days2` where a key is matched against a rule's domain or sender ignoring case
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Overrides(Vec<Override>);

/// A single `key:days` pair
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Override {
	/// Domain or sender, as typed
	pub key: String,

	/// Replacement retention period
	pub days: u32,
}

/// A [`RetentionRule`] with its retention period set in stone. All queries are compiled from these
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EffectiveRule {
	/// The rule as it was loaded, untouched
	pub rule: RetentionRule,

	/// Retention period to use for this run
	pub retention_days: u32,

	/// Where [`EffectiveRule::retention_days`] came from
	pub source: RetentionSource,
}

/// Where the retention period of an [`EffectiveRule`] came from
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RetentionSource {
	/// The rule didn't specify one
	Default,

	/// The rule itself
	Configured,

	/// A run-time override
	Override,
}

/// The result of [`resolve`]
#[derive(Debug)]
pub struct Resolved {
	/// One effective rule for every input rule, in the same order
	pub rules: Vec<EffectiveRule>,

	/// Override keys that didn't match any rule, most likely typos
	pub unmatched: Vec<String>,
}

impl Overrides {
	/// Returns `true` if there are no overrides
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterates over all overrides in the order they were written
	pub fn iter(&self) -> impl Iterator<Item = &Override> {
		self.0.iter()
	}
}

impl FromStr for Overrides {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut overrides: Vec<Override> = Vec::new();

		for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
			let invalid = |reason| ConfigError::InvalidOverride {
				token: token.to_owned(),
				reason,
			};

			let (key, days) = token
				.split_once(':')
				.ok_or_else(|| invalid(InvalidOverrideReason::MissingColon))?;

			let key = key.trim();
			if key.is_empty() {
				return Err(invalid(InvalidOverrideReason::EmptyKey));
			}

			let days = days.trim();
			let days = match days.parse::<u32>() {
				Ok(days) => days,
				Err(_) if days.parse::<i64>().is_ok_and(|d| d < 0) => {
					return Err(invalid(InvalidOverrideReason::Negative));
				}
				Err(e) => return Err(invalid(InvalidOverrideReason::NotANumber(e))),
			};

			if overrides.iter().any(|o| o.key.eq_ignore_ascii_case(key)) {
				return Err(ConfigError::DuplicateOverride {
					key: key.to_owned(),
				});
			}

			overrides.push(Override {
				key: key.to_owned(),
				days,
			});
		}

		Ok(Self(overrides))
	}
}

impl fmt::Display for Overrides {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, o) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str(",")?;
			}

			write!(f, "{}:{}", o.key, o.days)?;
		}

		Ok(())
	}
}

impl fmt::Display for RetentionSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Default => "default",
			Self::Configured => "configured",
			Self::Override => "override",
		})
	}
}

impl EffectiveRule {
	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn identity(&self) -> &RuleIdentity {
		&self.rule.identity
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn subject_contains(&self) -> &[String] {
		&self.rule.subject_contains
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn description(&self) -> &str {
		&self.rule.description
	}
}

impl From<RetentionRule> for EffectiveRule {
	fn from(rule: RetentionRule) -> Self {
		let source = if rule.retention_days.is_some() {
			RetentionSource::Configured
		} else {
			RetentionSource::Default
		};

		Self {
			retention_days: rule.retention_days_or_default(),
			rule,
			source,
		}
	}
}

/// Applies `overrides` to `rules`.
///
/// Only the retention period of rules with a matching override changes.
/// Keys that don't match any rule are logged and returned in [`Resolved::unmatched`] but are not an error
pub fn resolve(rules: Vec<RetentionRule>, overrides: &Overrides) -> Resolved {
	let mut used = vec![false; overrides.0.len()];

	let rules = rules
		.into_iter()
		.map(|rule| {
			let matched = overrides
				.0
				.iter()
				.position(|o| rule.identity.matches_key(&o.key));

			let mut effective = EffectiveRule::from(rule);
			if let Some(pos) = matched {
				used[pos] = true;

				let days = overrides.0[pos].days;
				tracing::info!(
					"Overriding retention for {}: {} -> {days} days",
					effective.identity(),
					effective.retention_days,
				);

				effective.retention_days = days;
				effective.source = RetentionSource::Override;
			}

			effective
		})
		.collect::<Vec<_>>();

	let unmatched = overrides
		.0
		.iter()
		.zip(used)
		.filter(|(_, used)| !used)
		.map(|(o, _)| {
			tracing::warn!(
				"Override {:?} doesn't match any retention rule and was ignored",
				o.key
			);
			o.key.clone()
		})
		.collect();

	Resolved { rules, unmatched }
}
