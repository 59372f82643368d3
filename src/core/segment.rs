//! Segment store (spec §4.2 component 4): begin/commit remote and inline
//! segments, scan by stream, update pieces, delete by stream. Thin
//! validation-then-forward layer over the non-transactional `Adapter`
//! segment methods, grounded in `garage_block::manager.rs`'s
//! write-then-update-manifest flow (a block is written, then its entry in
//! the owning manifest is updated — here, a segment's pieces are written
//! via the alias codec, then its row is committed).

use metabase_alias::AliasPieces;
use metabase_db::SegmentRow;
use metabase_util::data::{ObjectLocation, ProjectId, SegmentPosition, StreamId};
use metabase_util::error::{Error, Result};

use crate::validate;
use crate::Core;

impl Core {
	/// `CommitPendingObjectSegment` (spec §4.2): writes a segment row
	/// belonging to an in-progress `Pending` upload. Rejects a segment
	/// whose parent pending row is absent (spec §7 "segment commit against
	/// an absent pending parent").
	pub fn commit_pending_object_segment(
		&self,
		loc: &ObjectLocation,
		pending_version: metabase_util::data::Version,
		segment: SegmentRow,
	) -> Result<()> {
		validate::validate_segments(std::slice::from_ref(&segment), false)?;
		let adapter = self.router.choose_adapter(loc.project_id);
		if !adapter.pending_object_exists(loc, pending_version, segment.stream_id)? {
			return Err(Error::PendingObjectMissing(format!(
				"no pending row at version {} for stream {:?}",
				pending_version.0, segment.stream_id
			)));
		}
		adapter.commit_pending_object_segment(segment)
	}

	/// `CommitInlineSegment` (spec §4.2): writes a segment whose plaintext
	/// is small enough to be stored inline rather than as remote pieces;
	/// same pending-parent check as the remote path.
	pub fn commit_inline_segment(
		&self,
		loc: &ObjectLocation,
		pending_version: metabase_util::data::Version,
		segment: SegmentRow,
	) -> Result<()> {
		validate::validate_segments(std::slice::from_ref(&segment), false)?;
		let adapter = self.router.choose_adapter(loc.project_id);
		if !adapter.pending_object_exists(loc, pending_version, segment.stream_id)? {
			return Err(Error::PendingObjectMissing(format!(
				"no pending row at version {} for stream {:?}",
				pending_version.0, segment.stream_id
			)));
		}
		adapter.commit_inline_segment(segment)
	}

	pub fn get_segment_by_position(
		&self,
		project_id: ProjectId,
		stream_id: StreamId,
		position: SegmentPosition,
	) -> Result<Option<SegmentRow>> {
		let adapter = self.router.choose_adapter(project_id);
		adapter.get_segment_by_position(stream_id, position)
	}

	/// Switches a segment from inline storage to remote pieces once the
	/// repair/placement pipeline has written it out (spec §3: "switching
	/// between them atomically clears the other").
	pub fn update_segment_pieces(
		&self,
		project_id: ProjectId,
		stream_id: StreamId,
		position: SegmentPosition,
		pieces: AliasPieces,
	) -> Result<()> {
		let adapter = self.router.choose_adapter(project_id);
		adapter.update_segment_pieces(stream_id, position, pieces)
	}

	pub fn delete_segments_by_stream(&self, project_id: ProjectId, stream_id: StreamId) -> Result<usize> {
		let adapter = self.router.choose_adapter(project_id);
		adapter.delete_segments_by_stream(stream_id)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use chrono::Utc;
	use metabase_db::{EncryptionParameters, MemoryAdapter, RedundancyScheme, Retention, SegmentData};
	use metabase_util::data::{BucketName, ObjectKey, Version};
	use std::sync::Arc;

	fn core() -> Core {
		Core::new(
			Arc::new(metabase_db::SingleAdapterRouter(Arc::new(MemoryAdapter::new()))),
			metabase_util::config::Config::default(),
		)
	}

	fn loc(key: &str) -> ObjectLocation {
		ObjectLocation::new(ProjectId([2; 16]), BucketName(b"bucket".to_vec()), ObjectKey(key.as_bytes().to_vec()))
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
			redundancy: RedundancyScheme {
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
	fn commit_segment_rejects_missing_pending_parent() {
		let core = core();
		let loc = loc("k");
		let result = core.commit_pending_object_segment(&loc, Version(1), segment(StreamId::random()));
		assert!(matches!(result, Err(Error::PendingObjectMissing(_))));
	}

	#[test]
	fn commit_segment_succeeds_against_pending_parent() {
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
		core.commit_pending_object_segment(&loc, pending.version, segment(pending.stream_id))
			.unwrap();
		let fetched = core
			.get_segment_by_position(loc.project_id, pending.stream_id, SegmentPosition::new(0, 0))
			.unwrap();
		assert!(fetched.is_some());
	}
}
