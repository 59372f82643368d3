//! Request/response DTOs for the lifecycle, deletion and listing engines.
//! Kept separate from `metabase_db::types`'s row shapes, the way
//! `garage_model::s3::object_table`'s `ObjectVersion*` types sit above the
//! raw `garage_db` row encoding.

use chrono::{DateTime, Utc};

use metabase_db::{EncryptedUserData, EncryptionParameters, ObjectRow, Retention, SegmentRow};
use metabase_util::data::{ObjectLocation, StreamId, Version};

/// Input to `BeginObjectNextVersion`/`BeginObjectExactVersion` (spec §4.4).
#[derive(Clone, Debug)]
pub struct BeginObjectRequest {
	pub location: ObjectLocation,
	pub version: Version,
	pub encryption: EncryptionParameters,
	pub retention: Retention,
	pub expires_at: Option<DateTime<Utc>>,
}

/// A caller-provided segment for commit, prior to being stitched into the
/// object row's totals (spec §4.4 step c).
#[derive(Clone, Debug)]
pub struct PendingSegment {
	pub row: SegmentRow,
}

/// Input to `CommitObject`/`CommitObjectWithSegments` (spec §4.4).
#[derive(Clone, Debug)]
pub struct CommitObjectRequest {
	pub location: ObjectLocation,
	pub pending_version: Version,
	pub stream_id: StreamId,
	/// Bucket versioning is active; selects `CommittedVersioned` vs.
	/// `CommittedUnversioned` and whether the precommit predecessor-delete
	/// runs.
	pub versioned: bool,
	pub encrypted_user_data: EncryptedUserData,
}

/// Result of a successful commit.
#[derive(Clone, Debug)]
pub struct CommitObjectResult {
	pub object: ObjectRow,
	/// Predecessor removed by the unversioned precommit delete, if any.
	pub deleted_predecessor: Option<ObjectRow>,
}

/// Input to `FinishCopyObject` (spec §4.4): the destination location plus
/// per-segment re-encrypted keys, matched by position to the source's
/// segments.
#[derive(Clone, Debug)]
pub struct CopyObjectRequest {
	pub source: ObjectLocation,
	pub source_version: Version,
	pub dest: ObjectLocation,
	pub dest_version: Version,
	pub versioned: bool,
	pub rekeyed_segments: Vec<RekeyedSegment>,
	pub encrypted_user_data: EncryptedUserData,
	pub retention: Retention,
	pub expires_at: Option<DateTime<Utc>>,
}

/// One segment's re-encrypted key material, supplied by the caller after
/// `BeginCopyObject` hands back the source's redundancy/placement (spec
/// §4.4: "caller-supplied list of new (encryptedKey, encryptedKeyNonce) per
/// segment position").
#[derive(Clone, Debug)]
pub struct RekeyedSegment {
	pub position: metabase_util::data::SegmentPosition,
	pub encrypted_key: Vec<u8>,
	pub encrypted_key_nonce: Vec<u8>,
}

/// Input to `MoveObject`: same StreamID/segments as source, written under a
/// new location/version (spec §4.4 Move).
#[derive(Clone, Debug)]
pub struct MoveObjectRequest {
	pub source: ObjectLocation,
	pub source_version: Version,
	pub dest: ObjectLocation,
	pub dest_version: Version,
}
