//! Object lifecycle (spec §4.4): begin, commit, copy, move, metadata and
//! retention/legal-hold updates. Grounded in `object_table.rs`'s
//! `ObjectVersionState::{Uploading, Complete, Aborted}` state machine
//! (Pending → Committed*/DeleteMarker* here) and `api/s3/copy.rs`'s
//! `handle_copy` for the copy/move request shape.

use chrono::Utc;

use metabase_db::{
	AdapterExt, ExcludeFromPending, ObjectLockDeleteOptions, ObjectRow, ObjectStatus,
	PrecommitQuery, SegmentRow, TransactionOptions,
};
use metabase_util::data::{SegmentPosition, StreamId, Version};
use metabase_util::error::{Error, Result};

use crate::precommit;
use crate::types::{
	BeginObjectRequest, CommitObjectRequest, CommitObjectResult, CopyObjectRequest,
	MoveObjectRequest,
};
use crate::validate;
use crate::Core;

impl Core {
	/// `BeginObjectNextVersion` (spec §4.4): assigns the next version
	/// (`HighestVersion+1` or a `TimestampVersion`, per `Config`), inserts
	/// a `Pending` row with a default +24h zombie deadline.
	pub fn begin_object_next_version(&self, req: BeginObjectRequest) -> Result<ObjectRow> {
		validate::validate_location(&req.location)?;
		validate::require_next_version(req.version)?;
		req.retention.verify()?;
		validate::validate_expiry_lock_exclusion(req.expires_at.map(|_| ()), &req.retention)?;

		let row = self.blank_pending_row(&req, Version::NEXT);
		let adapter = self.router.choose_adapter(req.location.project_id);
		if self.config.timestamp_versioning {
			adapter.begin_object_next_timestamp_version(row)
		} else {
			adapter.begin_object_next_version(row)
		}
	}

	/// `BeginObjectExactVersion` (spec §4.4): rejects `NextVersion`; fails
	/// `ObjectAlreadyExists` if a row already exists at that version.
	pub fn begin_object_exact_version(&self, req: BeginObjectRequest) -> Result<ObjectRow> {
		validate::validate_location(&req.location)?;
		validate::require_exact_version(req.version)?;
		req.retention.verify()?;
		validate::validate_expiry_lock_exclusion(req.expires_at.map(|_| ()), &req.retention)?;

		let row = self.blank_pending_row(&req, req.version);
		let adapter = self.router.choose_adapter(req.location.project_id);
		adapter.begin_object_exact_version(row)
	}

	fn blank_pending_row(&self, req: &BeginObjectRequest, version: Version) -> ObjectRow {
		ObjectRow {
			project_id: req.location.project_id,
			bucket_name: req.location.bucket_name.clone(),
			object_key: req.location.object_key.clone(),
			version,
			status: ObjectStatus::Pending,
			stream_id: StreamId::random(),
			created_at: Utc::now(),
			expires_at: req.expires_at,
			zombie_deletion_deadline: Some(metabase_util::time::hours_from_now(
				self.config.zombie_deletion_deadline_secs / 3600,
			)),
			encryption: req.encryption,
			encrypted_user_data: Default::default(),
			segment_count: 0,
			total_plain_size: 0,
			total_encrypted_size: 0,
			fixed_segment_size: 0,
			retention: req.retention,
		}
	}

	/// `CommitObject`/`CommitObjectWithSegments` (spec §4.4): runs
	/// `PrecommitQuery`, deletes the unversioned predecessor if applicable,
	/// stitches segment totals into the object row, and commits.
	/// Idempotent under a retried `(StreamID, Version)` (P5).
	pub fn commit_object(&self, req: CommitObjectRequest, segments: Vec<SegmentRow>) -> Result<CommitObjectResult> {
		validate::validate_location(&req.location)?;
		validate::require_exact_version(req.pending_version)?;
		validate::validate_segments(&segments, true)?;

		let adapter = self.router.choose_adapter(req.location.project_id);
		adapter.with_tx(TransactionOptions::tagged("commit_object"), |tx| {
			let info = precommit::query(
				tx,
				&PrecommitQuery {
					location: req.location.clone(),
					version: req.pending_version,
					stream_id: req.stream_id,
					pending: true,
					unversioned: !req.versioned,
					highest_visible: false,
					exclude_from_pending: ExcludeFromPending::default(),
				},
			)?;
			let pending = info.pending.ok_or_else(|| {
				Error::PendingObjectMissing("object with specified version and pending status is missing".into())
			})?;

			let deleted_predecessor = if !req.versioned {
				precommit::delete_unversioned_with_non_pending(
					tx,
					&req.location,
					ObjectLockDeleteOptions::default(),
				)?
				.deleted
			} else {
				None
			};

			let fixed_segment_size = fixed_segment_size(&segments)?;
			let total_plain_size: i64 = segments.iter().map(|s| s.plain_size as i64).sum();
			let total_encrypted_size: i64 = segments.iter().map(|s| s.encrypted_size as i64).sum();

			let status = if req.versioned {
				ObjectStatus::CommittedVersioned
			} else {
				ObjectStatus::CommittedUnversioned
			};

			let updated = ObjectRow {
				project_id: req.location.project_id,
				bucket_name: req.location.bucket_name.clone(),
				object_key: req.location.object_key.clone(),
				version: req.pending_version,
				status,
				stream_id: req.stream_id,
				created_at: pending.created_at,
				expires_at: pending.expires_at,
				zombie_deletion_deadline: None,
				encryption: pending.encryption,
				encrypted_user_data: req.encrypted_user_data.clone(),
				segment_count: segments.len() as i32,
				total_plain_size,
				total_encrypted_size,
				fixed_segment_size,
				retention: pending.retention,
			};

			let object = tx.commit_object(&req.location, req.pending_version, updated)?;
			Ok(CommitObjectResult { object, deleted_predecessor })
		})
	}

	/// `FinishCopyObject` (spec §4.4): writes a new object row + new
	/// segment rows under a new StreamID, rekeyed per-segment by the
	/// caller. Rejects copying from a delete marker.
	pub fn finish_copy_object(&self, req: CopyObjectRequest, source_segments: Vec<SegmentRow>) -> Result<ObjectRow> {
		validate::validate_location(&req.source)?;
		validate::validate_location(&req.dest)?;
		validate::require_exact_version(req.dest_version)?;
		req.retention.verify()?;
		validate::validate_expiry_lock_exclusion(req.expires_at.map(|_| ()), &req.retention)?;
		validate::reject_retention_on_unversioned_destination(!req.versioned, &req.retention)?;

		let adapter = self.router.choose_adapter(req.source.project_id);
		let source = adapter
			.get_object_exact_version(&req.source, req.source_version)?
			.ok_or_else(|| Error::ObjectNotFound("source object not found".into()))?;
		if source.status.is_delete_marker() {
			return Err(Error::MethodNotAllowed("cannot copy a delete marker".into()));
		}

		let new_stream_id = StreamId::random();
		let rekeyed: std::collections::HashMap<SegmentPosition, &crate::types::RekeyedSegment> =
			req.rekeyed_segments.iter().map(|r| (r.position, r)).collect();
		let mut dest_segments = Vec::with_capacity(source_segments.len());
		for seg in &source_segments {
			let key = rekeyed
				.get(&seg.position)
				.ok_or_else(|| Error::invalid_request("missing rekeyed segment at position"))?;
			let mut dest_seg = seg.clone();
			dest_seg.stream_id = new_stream_id;
			dest_seg.encrypted_key = key.encrypted_key.clone();
			dest_seg.encrypted_key_nonce = key.encrypted_key_nonce.clone();
			dest_segments.push(dest_seg);
		}
		validate::validate_segments(&dest_segments, true)?;

		let status = if req.versioned {
			ObjectStatus::CommittedVersioned
		} else {
			ObjectStatus::CommittedUnversioned
		};
		let dest_adapter = self.router.choose_adapter(req.dest.project_id);
		dest_adapter.with_tx(TransactionOptions::tagged("copy_object"), |tx| {
			if !req.versioned {
				precommit::delete_unversioned_with_non_pending(
					tx,
					&req.dest,
					ObjectLockDeleteOptions::default(),
				)?;
			}
			let dest_row = ObjectRow {
				project_id: req.dest.project_id,
				bucket_name: req.dest.bucket_name.clone(),
				object_key: req.dest.object_key.clone(),
				version: req.dest_version,
				status,
				stream_id: new_stream_id,
				created_at: Utc::now(),
				expires_at: req.expires_at,
				zombie_deletion_deadline: None,
				encryption: source.encryption,
				encrypted_user_data: req.encrypted_user_data.clone(),
				segment_count: dest_segments.len() as i32,
				total_plain_size: source.total_plain_size,
				total_encrypted_size: dest_segments.iter().map(|s| s.encrypted_size as i64).sum(),
				fixed_segment_size: source.fixed_segment_size,
				retention: req.retention,
			};
			tx.copy_object(dest_row, dest_segments.clone())
		})
	}

	/// `MoveObject` (spec §4.4): reuses the source's StreamID/segments;
	/// writes the destination row, removes the source row only.
	pub fn move_object(&self, req: MoveObjectRequest) -> Result<ObjectRow> {
		validate::validate_location(&req.source)?;
		validate::validate_location(&req.dest)?;
		validate::require_exact_version(req.dest_version)?;

		let adapter = self.router.choose_adapter(req.source.project_id);
		let source = adapter
			.get_object_exact_version(&req.source, req.source_version)?
			.ok_or_else(|| Error::ObjectNotFound("source object not found".into()))?;

		let mut dest_row = source.clone();
		dest_row.project_id = req.dest.project_id;
		dest_row.bucket_name = req.dest.bucket_name.clone();
		dest_row.object_key = req.dest.object_key.clone();
		dest_row.version = req.dest_version;

		adapter.with_tx(TransactionOptions::tagged("move_object"), |tx| {
			tx.move_object(dest_row.clone(), &req.source, req.source_version)
		})
	}

	/// `UpdateObjectLastCommittedMetadata` (spec §4.4): replaces the
	/// encrypted user-data fields on the highest committed version only,
	/// never a delete marker.
	pub fn update_object_last_committed_metadata(
		&self,
		loc: &metabase_util::data::ObjectLocation,
		encrypted_user_data: metabase_db::EncryptedUserData,
	) -> Result<ObjectRow> {
		let adapter = self.router.choose_adapter(loc.project_id);
		let mut row = adapter
			.get_object_last_committed(loc)?
			.ok_or_else(|| Error::ObjectNotFound("no committed object at this key".into()))?;
		if row.status.is_delete_marker() {
			return Err(Error::MethodNotAllowed(
				"cannot update metadata on a delete marker".into(),
			));
		}
		row.encrypted_user_data = encrypted_user_data;
		let version = row.version;
		adapter.with_tx(TransactionOptions::tagged("update_metadata"), |tx| {
			tx.commit_object(loc, version, row.clone())
		})
	}

	/// Sets retention/legal-hold on an exact version, truncating
	/// `retain_until` to microseconds and verifying it lies in the future
	/// (spec §4.4).
	pub fn set_retention(
		&self,
		loc: &metabase_util::data::ObjectLocation,
		version: Version,
		mut retention: metabase_db::Retention,
	) -> Result<()> {
		retention.verify()?;
		if let Some(until) = retention.retain_until {
			retention.retain_until = Some(metabase_util::time::truncate_to_micros(until));
			if retention.retain_until.unwrap() <= Utc::now() {
				return Err(Error::invalid_request("retain_until must be in the future"));
			}
		}
		let adapter = self.router.choose_adapter(loc.project_id);
		adapter.set_retention(loc, version, retention)
	}

	pub fn get_retention(
		&self,
		loc: &metabase_util::data::ObjectLocation,
		version: Version,
	) -> Result<Option<metabase_db::Retention>> {
		let adapter = self.router.choose_adapter(loc.project_id);
		adapter.get_retention(loc, version)
	}

	/// Sets legal hold. Unlike retention, legal hold carries no bypass
	/// flag anywhere in the API: it can only be lifted by setting it back
	/// to `false` (spec §4.4, §7).
	pub fn set_legal_hold(&self, loc: &metabase_util::data::ObjectLocation, version: Version, legal_hold: bool) -> Result<()> {
		let adapter = self.router.choose_adapter(loc.project_id);
		adapter.set_legal_hold(loc, version, legal_hold)
	}
}

/// Derives `fixed_segment_size` from the sequence of `(plain_offset,
/// plain_size)`: every non-final segment must share one plain size (spec
/// §4.4 step c).
fn fixed_segment_size(segments: &[SegmentRow]) -> Result<i32> {
	if segments.is_empty() {
		return Ok(0);
	}
	let mut sorted: Vec<&SegmentRow> = segments.iter().collect();
	sorted.sort_by_key(|s| s.position);
	let fixed = sorted[0].plain_size;
	for seg in &sorted[..sorted.len() - 1] {
		if seg.plain_size != fixed {
			return Err(Error::invalid_request(
				"non-final segments must share one fixed plain size",
			));
		}
	}
	Ok(fixed)
}

#[cfg(test)]
mod test {
	use super::*;
	use metabase_db::{EncryptionParameters, MemoryAdapter, Retention, SegmentData};
	use metabase_util::data::{BucketName, ObjectKey, ObjectLocation, ProjectId};
	use std::sync::Arc;

	fn core() -> Core {
		Core::new(
			Arc::new(metabase_db::SingleAdapterRouter(Arc::new(MemoryAdapter::new()))),
			metabase_util::config::Config::default(),
		)
	}

	fn loc(key: &str) -> ObjectLocation {
		ObjectLocation::new(ProjectId([1; 16]), BucketName(b"bucket".to_vec()), ObjectKey(key.as_bytes().to_vec()))
	}

	fn segment(stream_id: StreamId, part: u32, plain_size: i32) -> SegmentRow {
		SegmentRow {
			stream_id,
			position: SegmentPosition::new(part, 0),
			created_at: Utc::now(),
			repaired_at: None,
			expires_at: None,
			root_piece_id: vec![1, 2, 3],
			encrypted_key_nonce: vec![4, 5, 6],
			encrypted_key: vec![7, 8, 9],
			encrypted_size: plain_size + 16,
			plain_offset: 0,
			plain_size,
			encrypted_etag: None,
			redundancy: metabase_db::RedundancyScheme {
				required_shares: 1,
				repair_shares: 0,
				optimal_shares: 1,
				total_shares: 1,
				piece_size: 1024,
			},
			placement: 0,
			data: SegmentData::Inline(vec![0; plain_size as usize]),
		}
	}

	#[test]
	fn begin_next_version_happy_path() {
		let core = core();
		let loc = loc("k");
		let req = BeginObjectRequest {
			location: loc.clone(),
			version: Version::NEXT,
			encryption: EncryptionParameters::default(),
			retention: Retention::none(),
			expires_at: None,
		};
		let first = core.begin_object_next_version(req.clone()).unwrap();
		let second = core.begin_object_next_version(req).unwrap();
		assert_eq!(first.version, Version(1));
		assert_eq!(second.version, Version(2));
		assert!(first.zombie_deletion_deadline.is_some());
	}

	#[test]
	fn commit_object_unversioned_overwrite_removes_predecessor() {
		let core = core();
		let loc = loc("k");

		let req = BeginObjectRequest {
			location: loc.clone(),
			version: Version::NEXT,
			encryption: EncryptionParameters::default(),
			retention: Retention::none(),
			expires_at: None,
		};
		let pending_one = core.begin_object_next_version(req.clone()).unwrap();
		let commit_one = core
			.commit_object(
				CommitObjectRequest {
					location: loc.clone(),
					pending_version: pending_one.version,
					stream_id: pending_one.stream_id,
					versioned: false,
					encrypted_user_data: Default::default(),
				},
				vec![segment(pending_one.stream_id, 0, 100)],
			)
			.unwrap();
		assert_eq!(commit_one.object.status, ObjectStatus::CommittedUnversioned);

		let pending_two = core.begin_object_next_version(req).unwrap();
		let commit_two = core
			.commit_object(
				CommitObjectRequest {
					location: loc.clone(),
					pending_version: pending_two.version,
					stream_id: pending_two.stream_id,
					versioned: false,
					encrypted_user_data: Default::default(),
				},
				vec![segment(pending_two.stream_id, 0, 200)],
			)
			.unwrap();

		assert!(commit_two.deleted_predecessor.is_some());
		let adapter = core.router.choose_adapter(loc.project_id);
		assert_eq!(adapter.scan_bucket_objects(loc.project_id, &loc.bucket_name).unwrap().len(), 1);
	}
}
