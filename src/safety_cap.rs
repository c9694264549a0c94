/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`SafetyCap`] that bounds how many messages a single run considers

use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

/// Limits the number of messages considered per rule and, optionally, per run.
///
/// The run-wide budget is shared between all clones, so rules processed concurrently draw from the same pool
#[derive(Clone, Debug)]
pub struct SafetyCap {
	per_rule: usize,
	budget: Option<Arc<AtomicUsize>>,
}

/// A [`SafetyCap`] as seen by a single rule
#[derive(Debug)]
pub struct RuleCap<'a> {
	cap: &'a SafetyCap,
	taken: usize,
}

impl SafetyCap {
	/// Creates a new [`SafetyCap`] that lets through up to `per_rule` messages per rule
	/// and, if set, up to `total` messages for all rules combined
	#[must_use]
	pub fn new(per_rule: usize, total: Option<usize>) -> Self {
		Self {
			per_rule,
			budget: total.map(|total| Arc::new(AtomicUsize::new(total))),
		}
	}

	/// Starts counting for a new rule
	#[must_use]
	pub fn for_rule(&self) -> RuleCap<'_> {
		RuleCap {
			cap: self,
			taken: 0,
		}
	}

	/// How much of the run-wide budget is left, if there is one
	#[must_use]
	pub fn remaining_budget(&self) -> Option<usize> {
		self.budget.as_ref().map(|b| b.load(Ordering::Acquire))
	}
}

impl RuleCap<'_> {
	/// Reserves room for one more message.
	/// Returns `false` if either the per-rule cap or the run-wide budget has been reached
	pub fn try_take(&mut self) -> bool {
		if self.taken >= self.cap.per_rule {
			return false;
		}

		if let Some(budget) = &self.cap.budget {
			let reserved = budget
				.fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1))
				.is_ok();

			if !reserved {
				return false;
			}
		}

		self.taken += 1;
		true
	}

	/// Returns `true` if [`RuleCap::try_take`] would definitely fail
	#[must_use]
	pub fn is_exhausted(&self) -> bool {
		self.taken >= self.cap.per_rule || self.cap.remaining_budget() == Some(0)
	}

	/// How many messages this rule has taken so far
	#[must_use]
	pub fn taken(&self) -> usize {
		self.taken
	}

	/// Gives everything this rule has taken back to the run-wide budget, e.g. when the rule's search failed
	/// and none of the reserved messages are going to be processed
	pub fn release(&mut self) {
		if let Some(budget) = &self.cap.budget {
			budget.fetch_add(self.taken, Ordering::AcqRel);
		}

		self.taken = 0;
	}
}
