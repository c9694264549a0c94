/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use serde::{Deserialize, Serialize};

use super::{RetentionRule, RuleIdentity};
use crate::error::ConfigError;

/// The retention part of the configuration document, as produced by whatever loaded it
#[derive(Deserialize, Serialize, Default, Debug)]
pub struct RetentionConfig {
	/// Retention rules in the order they were declared. A missing key is an empty rule set
	#[serde(default)]
	pub retention_rules: Vec<RuleRecord>,
}

/// A single rule as written in the configuration document.
///
/// Domain and sender are two separate optional fields here, [`RuleRecord::parse`] makes sure exactly one of them is set
#[derive(Deserialize, Serialize, Default, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RuleRecord {
	#[expect(missing_docs, reason = "field names are self-documenting")]
	pub domain: Option<String>,
	#[expect(missing_docs, reason = "field names are self-documenting")]
	pub sender: Option<String>,
	#[expect(missing_docs, reason = "field names are self-documenting")]
	pub retention_days: Option<i64>,
	#[expect(missing_docs, reason = "field names are self-documenting")]
	pub subject_contains: Option<Vec<String>>,
	#[expect(missing_docs, reason = "field names are self-documenting")]
	pub description: Option<String>,
}

impl RetentionConfig {
	/// Parses and validates every rule.
	///
	/// Nothing is returned unless all of the rules are valid
	///
	/// # Errors
	/// The first rule that failed to parse, see [`RuleRecord::parse`]
	pub fn into_rules(self) -> Result<Vec<RetentionRule>, ConfigError> {
		let rules = self
			.retention_rules
			.into_iter()
			.enumerate()
			.map(|(index, record)| record.parse(index))
			.collect::<Result<Vec<_>, _>>()?;

		tracing::debug!("Loaded {} retention rules", rules.len());
		Ok(rules)
	}
}

impl RuleRecord {
	/// Converts the record into a [`RetentionRule`]. `index` is the position of the record and is used to name it in errors
	///
	/// # Errors
	/// If the record has no identity or two of them, a negative or an absurdly large retention period,
	/// or an empty subject term
	pub fn parse(self, index: usize) -> Result<RetentionRule, ConfigError> {
		let identity = match (self.domain, self.sender) {
			(Some(domain), None) => RuleIdentity::Domain(domain),
			(None, Some(sender)) => RuleIdentity::Sender(sender),
			(None, None) => return Err(ConfigError::MissingIdentity { index }),
			(Some(domain), Some(sender)) => {
				return Err(ConfigError::AmbiguousIdentity {
					index,
					domain,
					sender,
				});
			}
		};

		let retention_days = self
			.retention_days
			.map(|days| {
				if days < 0 {
					return Err(ConfigError::NegativeRetention {
						index,
						identity: identity.clone(),
						days,
					});
				}

				u32::try_from(days).map_err(|_| ConfigError::RetentionTooLarge {
					index,
					identity: identity.clone(),
					days,
				})
			})
			.transpose()?;

		let rule = RetentionRule {
			identity,
			retention_days,
			subject_contains: self.subject_contains.unwrap_or_default(),
			description: self.description.unwrap_or_default(),
		};

		rule.check(index)?;
		Ok(rule)
	}
}
