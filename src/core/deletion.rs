//! Deletion engine (spec §4.5): exact-version/pending/last-committed
//! deletes, zombie and expired sweeps, and bucket wipes. Grounded in
//! `garage_block::manager.rs`'s resync-queue batch processing for the
//! bounded-concurrency sweep shape, and `garage_model::s3::object_table`'s
//! delete-marker insertion for the versioned/suspended delete paths.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use metabase_db::{AdapterExt, ObjectLockDeleteOptions, ObjectRow, ObjectStatus, TransactionOptions};
use metabase_util::data::{ObjectLocation, StreamId, Version};
use metabase_util::error::{Error, Result};

use crate::precommit;
use crate::Core;

/// Result of a delete call that may have inserted a delete marker.
#[derive(Clone, Debug)]
pub struct DeleteResult {
	pub deleted: Option<ObjectRow>,
	pub delete_marker: Option<ObjectRow>,
}

impl Core {
	/// `DeletePendingObject` (spec §4.5): removes a `Pending` row by exact
	/// `(Version, StreamID)`, used to abort an in-progress upload.
	pub fn delete_pending_object(
		&self,
		loc: &ObjectLocation,
		version: Version,
		stream_id: StreamId,
	) -> Result<Option<ObjectRow>> {
		let adapter = self.router.choose_adapter(loc.project_id);
		adapter.delete_pending_object(loc, version, stream_id)
	}

	/// `DeleteObjectExactVersion` (spec §4.5): removes one row by exact
	/// version, honoring retention/legal hold unless bypassed.
	pub fn delete_object_exact_version(
		&self,
		loc: &ObjectLocation,
		version: Version,
		bypass_governance: bool,
	) -> Result<Option<(ObjectRow, Vec<metabase_db::SegmentRow>)>> {
		let adapter = self.router.choose_adapter(loc.project_id);
		adapter.with_tx(TransactionOptions::tagged("delete_exact_version"), |tx| {
			if let Some(existing) = adapter.get_object_exact_version(loc, version)? {
				if existing.retention.blocks_delete(Utc::now(), bypass_governance) {
					return Err(Error::ObjectLock("retention period has not elapsed".into()));
				}
			}
			tx.delete_object_exact_version(loc, version)
		})
	}

	/// `DeleteObjectLastCommittedPlain` (spec §4.5): unversioned-bucket
	/// delete, no delete marker.
	pub fn delete_object_last_committed_plain(&self, loc: &ObjectLocation) -> Result<Option<(ObjectRow, Vec<metabase_db::SegmentRow>)>> {
		let adapter = self.router.choose_adapter(loc.project_id);
		if let Some(existing) = adapter.get_object_last_committed(loc)? {
			if existing.retention.blocks_delete(Utc::now(), false) {
				return Err(Error::ObjectLock("retention period has not elapsed".into()));
			}
		}
		adapter.delete_object_last_committed_plain(loc)
	}

	/// `DeleteObjectLastCommittedVersioned` (spec §4.5): inserts a delete
	/// marker on top of the highest version, rather than removing rows.
	pub fn delete_object_last_committed_versioned(&self, loc: &ObjectLocation) -> Result<DeleteResult> {
		let adapter = self.router.choose_adapter(loc.project_id);
		adapter.with_tx(TransactionOptions::tagged("delete_versioned"), |tx| {
			let constraint = precommit::constraint(tx, loc, true, false)?;
			if constraint.deleted.is_some() {
				return Err(Error::internal(
					"versioned delete unexpectedly removed a row via precommit_constraint",
				));
			}
			let marker_version = Version(constraint.highest_version.0 + 1);
			let marker = tx.insert_delete_marker(
				loc,
				marker_version,
				StreamId::random_delete_marker(),
				ObjectStatus::DeleteMarkerVersioned,
			)?;
			Ok(DeleteResult {
				deleted: None,
				delete_marker: Some(marker),
			})
		})
	}

	/// `DeleteObjectLastCommittedSuspended` (spec §4.5): versioning-suspended
	/// bucket; inserts a single unversioned delete marker, replacing any
	/// prior unversioned row the way a normal commit would.
	pub fn delete_object_last_committed_suspended(&self, loc: &ObjectLocation) -> Result<DeleteResult> {
		let adapter = self.router.choose_adapter(loc.project_id);
		adapter.with_tx(TransactionOptions::tagged("delete_suspended"), |tx| {
			let deleted = tx
				.precommit_delete_unversioned_with_non_pending(loc, ObjectLockDeleteOptions::default())?
				.deleted;
			let constraint = precommit::constraint(tx, loc, false, false)?;
			let marker_version = Version(constraint.highest_version.0 + 1);
			let marker = tx.insert_delete_marker(
				loc,
				marker_version,
				StreamId::random_delete_marker(),
				ObjectStatus::DeleteMarkerUnversioned,
			)?;
			Ok(DeleteResult {
				deleted,
				delete_marker: Some(marker),
			})
		})
	}

	/// `IterateZombieObjects` + `DeleteInactiveObjectsAndSegments` (spec
	/// §4.5): sweeps `Pending` rows whose zombie deadline has passed.
	pub async fn sweep_zombie_objects(&self, cancel: CancellationToken) -> Result<usize> {
		let adapter = self.router.choose_adapter(default_project_id());
		let mut total = 0;
		loop {
			if cancel.is_cancelled() {
				return Err(Error::Canceled);
			}
			let rows = adapter.iterate_zombie_objects(Utc::now(), self.config.batch_size)?;
			if rows.is_empty() {
				break;
			}
			debug!(count = rows.len(), "sweeping zombie pending objects");
			total += adapter.delete_inactive_objects_and_segments(&rows)?;
		}
		Ok(total)
	}

	/// `IterateExpiredObjects` + `DeleteObjectsAndSegmentsNoVerify` (spec
	/// §4.5): sweeps rows whose `ExpiresAt` has passed, in batches bounded
	/// by `Config::delete_concurrency` in-flight batches at once.
	pub async fn sweep_expired_objects(&self, cancel: CancellationToken) -> Result<usize> {
		let adapter = self.router.choose_adapter(default_project_id());
		let semaphore = Arc::new(Semaphore::new(self.config.delete_concurrency.max(1)));
		let mut total = 0;
		loop {
			if cancel.is_cancelled() {
				return Err(Error::Canceled);
			}
			let rows = adapter.iterate_expired_objects(Utc::now(), self.config.batch_size)?;
			if rows.is_empty() {
				break;
			}
			let permit = semaphore
				.clone()
				.acquire_owned()
				.await
				.map_err(|_| Error::internal("delete semaphore closed"))?;
			debug!(count = rows.len(), "sweeping expired objects");
			let deleted = adapter.delete_objects_and_segments_no_verify(&rows)?;
			drop(permit);
			total += deleted;
		}
		Ok(total)
	}

	/// `UncoordinatedDeleteAllBucketObjects` (spec §4.5): wipes every row in
	/// a bucket in best-effort batches, for bucket deletion. Not
	/// coordinated with in-flight writers — callers must ensure the bucket
	/// is otherwise quiesced; use [`Core::delete_all_bucket_objects`] when
	/// that guarantee cannot be made.
	pub fn delete_all_bucket_objects_uncoordinated(
		&self,
		project_id: metabase_util::data::ProjectId,
		bucket_name: &metabase_util::data::BucketName,
	) -> Result<usize> {
		let adapter = self.router.choose_adapter(project_id);
		let mut total = 0;
		loop {
			let n = adapter.delete_bucket_objects_batch(project_id, bucket_name, self.config.batch_size)?;
			if n == 0 {
				break;
			}
			total += n;
		}
		Ok(total)
	}

	/// `DeleteAllBucketObjects` (spec §4.5): the coordinated variant —
	/// deletes each row through the same per-version, retention-checked,
	/// transactional path a single `DeleteObjectExactVersion` call takes,
	/// batched by `Config::batch_size`. Slower than the uncoordinated wipe
	/// but safe to run against a bucket with retained objects or in-flight
	/// writers: a row still under object lock is skipped rather than
	/// forced, and returns the count of rows actually removed.
	pub fn delete_all_bucket_objects(
		&self,
		project_id: metabase_util::data::ProjectId,
		bucket_name: &metabase_util::data::BucketName,
	) -> Result<usize> {
		let adapter = self.router.choose_adapter(project_id);
		let rows: Vec<_> = adapter
			.scan_bucket_objects(project_id, bucket_name)?
			.into_iter()
			.filter(|row| !row.status.is_pending())
			.collect();
		let mut total = 0;
		for batch in rows.chunks(self.config.batch_size.max(1)) {
			for row in batch {
				let loc = row.location();
				let result = adapter.with_tx(TransactionOptions::tagged("delete_all_bucket_objects"), |tx| {
					if row.retention.blocks_delete(Utc::now(), false) {
						return Err(Error::ObjectLock("retention period has not elapsed".into()));
					}
					tx.delete_object_exact_version(&loc, row.version)
				});
				match result {
					Ok(_) => total += 1,
					Err(Error::ObjectLock(_)) => {
						debug!(key = ?loc.object_key, "bucket wipe skipped retained object");
					}
					Err(e) => return Err(e),
				}
			}
		}
		Ok(total)
	}
}

fn default_project_id() -> metabase_util::data::ProjectId {
	metabase_util::data::ProjectId([0; 16])
}

#[cfg(test)]
mod test {
	use super::*;
	use metabase_db::{EncryptionParameters, MemoryAdapter, Retention, SegmentData, SegmentRow};
	use metabase_util::data::{BucketName, ObjectKey, ProjectId, SegmentPosition};
	use std::sync::Arc as StdArc;

	fn core() -> Core {
		Core::new(
			StdArc::new(metabase_db::SingleAdapterRouter(StdArc::new(MemoryAdapter::new()))),
			metabase_util::config::Config::default(),
		)
	}

	fn loc(key: &str) -> ObjectLocation {
		ObjectLocation::new(ProjectId([0; 16]), BucketName(b"bucket".to_vec()), ObjectKey(key.as_bytes().to_vec()))
	}

	fn segment(stream_id: StreamId) -> SegmentRow {
		SegmentRow {
			stream_id,
			position: SegmentPosition::new(0, 0),
			created_at: Utc::now(),
			repaired_at: None,
			expires_at: None,
			root_piece_id: vec![1],
			encrypted_key_nonce: vec![2],
			encrypted_key: vec![3],
			encrypted_size: 16,
			plain_offset: 0,
			plain_size: 1,
			encrypted_etag: None,
			redundancy: metabase_db::RedundancyScheme {
				required_shares: 1,
				repair_shares: 0,
				optimal_shares: 1,
				total_shares: 1,
				piece_size: 1024,
			},
			placement: 0,
			data: SegmentData::Inline(vec![0]),
		}
	}

	#[test]
	fn versioned_delete_inserts_marker_without_removing_rows() {
		let core = core();
		let loc = loc("k");
		let req = crate::types::BeginObjectRequest {
			location: loc.clone(),
			version: Version::NEXT,
			encryption: EncryptionParameters::default(),
			retention: Retention::none(),
			expires_at: None,
		};
		let pending = core.begin_object_next_version(req).unwrap();
		core.commit_object(
			crate::types::CommitObjectRequest {
				location: loc.clone(),
				pending_version: pending.version,
				stream_id: pending.stream_id,
				versioned: true,
				encrypted_user_data: Default::default(),
			},
			vec![segment(pending.stream_id)],
		)
		.unwrap();

		let result = core.delete_object_last_committed_versioned(&loc).unwrap();
		let marker = result.delete_marker.unwrap();
		assert!(marker.stream_id.is_delete_marker());
		assert_eq!(marker.status, ObjectStatus::DeleteMarkerVersioned);

		let adapter = core.router.choose_adapter(loc.project_id);
		assert_eq!(adapter.scan_bucket_objects(loc.project_id, &loc.bucket_name).unwrap().len(), 2);
	}

	#[test]
	fn coordinated_bucket_wipe_skips_retained_rows() {
		let core = core();
		let bucket = BucketName(b"bucket".to_vec());
		let free = ObjectLocation::new(ProjectId([0; 16]), bucket.clone(), ObjectKey(b"free".to_vec()));
		let locked = ObjectLocation::new(ProjectId([0; 16]), bucket.clone(), ObjectKey(b"locked".to_vec()));

		let adapter = core.router.choose_adapter(free.project_id);
		for (loc, retention) in [(&free, Retention::none()), (&locked, Retention {
			mode: metabase_db::RetentionMode::Compliance,
			retain_until: Some(Utc::now() + chrono::Duration::hours(1)),
			legal_hold: false,
		})] {
			let req = crate::types::BeginObjectRequest {
				location: loc.clone(),
				version: Version::NEXT,
				encryption: EncryptionParameters::default(),
				retention,
				expires_at: None,
			};
			let pending = core.begin_object_next_version(req).unwrap();
			core.commit_object(
				crate::types::CommitObjectRequest {
					location: loc.clone(),
					pending_version: pending.version,
					stream_id: pending.stream_id,
					versioned: false,
					encrypted_user_data: Default::default(),
				},
				vec![segment(pending.stream_id)],
			)
			.unwrap();
		}

		let deleted = core.delete_all_bucket_objects(free.project_id, &bucket).unwrap();
		assert_eq!(deleted, 1);
		let remaining = adapter.scan_bucket_objects(free.project_id, &bucket).unwrap();
		assert_eq!(remaining.len(), 1);
		assert_eq!(remaining[0].object_key, locked.object_key);
	}
}
