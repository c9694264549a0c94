/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`BatchDeleter`] which deletes messages in fixed-size batches

use std::{
	collections::BTreeSet,
	num::NonZeroUsize,
	sync::atomic::{AtomicUsize, Ordering},
};

use crate::{
	cancellation_token::{CancellationToken, is_cancelled},
	error::{BackendError, ErrorChainDisplay},
	gateway::MailboxGateway,
	message_id::MessageId,
	retry::RetryPolicy,
};

/// Deletes messages via [`MailboxGateway::delete_batch`], `batch_size` ids at a time.
///
/// A failed batch doesn't stop the following ones, its ids are recorded in [`DeleteOutcome::failed_ids`] instead.
/// Only an [`Unauthorized`](`BackendError::Unauthorized`) error stops the deletion
#[derive(bon::Builder, Debug)]
pub struct BatchDeleter<'a, G> {
	gateway: &'a G,

	/// Maximum number of ids sent in a single request
	batch_size: NonZeroUsize,

	retry: &'a RetryPolicy,

	/// Stop sending new batches when cancelled
	cancel: Option<&'a CancellationToken>,

	/// Incremented by every deletion the mail service confirms, as soon as it's confirmed.
	/// Unlike [`DeleteOutcome::deleted_count`], this survives an aborted deletion
	deleted_counter: Option<&'a AtomicUsize>,
}

/// What [`BatchDeleter::delete`] managed to do
#[derive(Default, Debug)]
pub struct DeleteOutcome {
	/// Number of messages the mail service confirmed as deleted
	pub deleted_count: usize,

	/// Messages that weren't deleted, either rejected individually or as part of a failed batch
	pub failed_ids: BTreeSet<MessageId>,

	/// Number of ids that were sent to the mail service
	pub attempted: usize,

	/// Number of batches sent
	pub batches: usize,

	/// Cancellation stopped the deletion before all ids were attempted
	pub interrupted: bool,
}

impl<G> BatchDeleter<'_, G>
where
	G: MailboxGateway,
{
	/// Deletes all `ids`, batch by batch
	///
	/// # Errors
	/// If the mail service returned [`BackendError::Unauthorized`]. Batches deleted before that stay deleted
	/// and are still counted in the `deleted_counter`
	pub async fn delete(&self, ids: &[MessageId]) -> Result<DeleteOutcome, BackendError> {
		let mut outcome = DeleteOutcome::default();
		let total_batches = ids.len().div_ceil(self.batch_size.get());

		for (batch_num, batch) in ids.chunks(self.batch_size.get()).enumerate() {
			if is_cancelled(self.cancel) {
				tracing::warn!(
					"Cancelled, {} of {} messages were not attempted",
					ids.len() - outcome.attempted,
					ids.len()
				);
				outcome.interrupted = true;
				break;
			}

			outcome.batches += 1;
			outcome.attempted += batch.len();

			let res = self
				.retry
				.run("Delete batch request", self.cancel, || {
					self.gateway.delete_batch(batch)
				})
				.await;

			match res {
				Ok(response) => {
					let (rejected, unknown): (BTreeSet<_>, BTreeSet<_>) = response
						.rejected
						.into_iter()
						.partition(|id| batch.contains(id));

					if !unknown.is_empty() {
						tracing::warn!(
							"Mail service rejected {} ids that weren't part of the batch, ignoring them",
							unknown.len()
						);
					}

					if !rejected.is_empty() {
						tracing::warn!(
							batch = batch_num + 1,
							"Mail service refused to delete {} of {} messages",
							rejected.len(),
							batch.len()
						);
					}

					let deleted = batch.iter().filter(|id| !rejected.contains(*id)).count();
					tracing::debug!(
						batch = batch_num + 1,
						"Deleted {deleted} messages (batch {}/{total_batches})",
						batch_num + 1
					);

					outcome.deleted_count += deleted;
					if let Some(counter) = self.deleted_counter {
						counter.fetch_add(deleted, Ordering::AcqRel);
					}
					outcome.failed_ids.extend(rejected);
				}
				Err(e) if e.is_fatal() => {
					tracing::error!(
						"Deletion aborted after {} messages: {:#}",
						outcome.deleted_count,
						ErrorChainDisplay(&e)
					);
					return Err(e);
				}
				Err(e) => {
					if matches!(e, BackendError::Cancelled) {
						outcome.interrupted = true;
					}

					tracing::error!(
						batch = batch_num + 1,
						"Failed to delete a batch of {} messages: {:#}",
						batch.len(),
						ErrorChainDisplay(&e)
					);
					outcome.failed_ids.extend(batch.iter().cloned());
				}
			}
		}

		Ok(outcome)
	}
}
