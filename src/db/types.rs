//! Row shapes for the storage contract (spec §3 DATA MODEL, §6 EXTERNAL
//! INTERFACES). These are the types that cross the Adapter boundary; they
//! carry no behavior beyond small accessors.

use chrono::{DateTime, Utc};

use metabase_alias::AliasPieces;
use metabase_util::data::{ObjectKey, ProjectId, SegmentPosition, StreamId, Version};
use metabase_util::data::BucketName;

/// `objects.status` (spec §3), stable small-int values. `Prefix` is
/// virtual: it is synthesized by the listing engine and never persisted.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(i16)]
pub enum ObjectStatus {
	Pending = 1,
	CommittedUnversioned = 2,
	CommittedVersioned = 3,
	DeleteMarkerUnversioned = 4,
	DeleteMarkerVersioned = 5,
	Prefix = 100,
}

impl ObjectStatus {
	pub fn is_unversioned(&self) -> bool {
		matches!(
			self,
			ObjectStatus::CommittedUnversioned | ObjectStatus::DeleteMarkerUnversioned
		)
	}

	pub fn is_delete_marker(&self) -> bool {
		matches!(
			self,
			ObjectStatus::DeleteMarkerUnversioned | ObjectStatus::DeleteMarkerVersioned
		)
	}

	pub fn is_visible(&self) -> bool {
		matches!(
			self,
			ObjectStatus::CommittedUnversioned
				| ObjectStatus::CommittedVersioned
				| ObjectStatus::DeleteMarkerUnversioned
				| ObjectStatus::DeleteMarkerVersioned
		)
	}

	pub fn is_committed(&self) -> bool {
		matches!(
			self,
			ObjectStatus::CommittedUnversioned | ObjectStatus::CommittedVersioned
		)
	}

	pub fn is_pending(&self) -> bool {
		matches!(self, ObjectStatus::Pending)
	}
}

/// Retention mode (spec §3, §4.4, §7).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum RetentionMode {
	#[default]
	None,
	Compliance,
	Governance,
}

/// `retention.mode != None <=> retain_until != null` (spec §3 invariant).
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Retention {
	pub mode: RetentionMode,
	pub retain_until: Option<DateTime<Utc>>,
	pub legal_hold: bool,
}

impl Retention {
	pub fn none() -> Self {
		Retention::default()
	}

	pub fn is_locked(&self) -> bool {
		self.legal_hold || self.mode != RetentionMode::None
	}

	/// Validates the mode/retain_until co-constraint (spec §3, §7).
	pub fn verify(&self) -> metabase_util::error::Result<()> {
		use metabase_util::error::Error;
		match (self.mode, self.retain_until) {
			(RetentionMode::None, None) => Ok(()),
			(RetentionMode::None, Some(_)) => Err(Error::invalid_request(
				"retain_until set without a retention mode",
			)),
			(_, None) => Err(Error::invalid_request(
				"retention mode set without retain_until",
			)),
			(_, Some(_)) => Ok(()),
		}
	}

	/// True if an active (non-expired) retention period blocks deletion,
	/// ignoring legal hold. Governance can be bypassed by the caller;
	/// Compliance never can (spec §4.4, §4.5).
	pub fn blocks_delete(&self, now: DateTime<Utc>, bypass_governance: bool) -> bool {
		match (self.mode, self.retain_until) {
			(RetentionMode::None, _) => false,
			(RetentionMode::Governance, Some(until)) => !bypass_governance && until > now,
			(RetentionMode::Compliance, Some(until)) => until > now,
			(_, None) => false,
		}
	}
}

/// Cipher suite + block size, as carried on the object row (spec §3
/// "encryption params").
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct EncryptionParameters {
	pub cipher_suite: u8,
	pub block_size: i32,
}

/// Encrypted user-controlled metadata (spec §3).
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct EncryptedUserData {
	pub encrypted_metadata_nonce: Option<Vec<u8>>,
	pub encrypted_metadata: Option<Vec<u8>>,
	pub encrypted_metadata_encrypted_key: Option<Vec<u8>>,
	pub encrypted_etag: Option<Vec<u8>>,
}

impl EncryptedUserData {
	/// Clears the fields redacted when `IncludeCustomMetadata`-family
	/// flags are false (spec §4.6 rule 7).
	pub fn redacted(&self) -> Self {
		EncryptedUserData::default()
	}

	pub fn etag_only(&self) -> Self {
		EncryptedUserData {
			encrypted_etag: self.encrypted_etag.clone(),
			..Default::default()
		}
	}

	/// `IncludeETagOrCustomMetadata` (spec §4.6 rule 7): etag when present,
	/// full custom metadata otherwise — not a redaction, a fallback.
	pub fn etag_or_custom_metadata(&self) -> Self {
		if self.encrypted_etag.is_some() {
			self.etag_only()
		} else {
			self.clone()
		}
	}
}

/// `(required, repair, optimal, total)` share counts plus piece size,
/// compressed into one 64-bit word on the wire (spec §3, §9).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct RedundancyScheme {
	pub required_shares: u8,
	pub repair_shares: u8,
	pub optimal_shares: u8,
	pub total_shares: u8,
	pub piece_size: u32,
}

impl RedundancyScheme {
	pub fn to_u64(&self) -> u64 {
		(self.required_shares as u64)
			| (self.repair_shares as u64) << 8
			| (self.optimal_shares as u64) << 16
			| (self.total_shares as u64) << 24
			| (self.piece_size as u64) << 32
	}

	pub fn from_u64(word: u64) -> Self {
		RedundancyScheme {
			required_shares: (word & 0xFF) as u8,
			repair_shares: ((word >> 8) & 0xFF) as u8,
			optimal_shares: ((word >> 16) & 0xFF) as u8,
			total_shares: ((word >> 24) & 0xFF) as u8,
			piece_size: (word >> 32) as u32,
		}
	}

	pub fn verify(&self) -> metabase_util::error::Result<()> {
		use metabase_util::error::Error;
		if self.required_shares == 0 || self.optimal_shares == 0 || self.total_shares == 0 {
			return Err(Error::invalid_request("zero redundancy"));
		}
		Ok(())
	}
}

/// `objects` row (PK `(project_id, bucket_name, object_key, version)`).
#[derive(Clone, Debug)]
pub struct ObjectRow {
	pub project_id: ProjectId,
	pub bucket_name: BucketName,
	pub object_key: ObjectKey,
	pub version: Version,

	pub status: ObjectStatus,
	pub stream_id: StreamId,
	pub created_at: DateTime<Utc>,
	pub expires_at: Option<DateTime<Utc>>,
	pub zombie_deletion_deadline: Option<DateTime<Utc>>,

	pub encryption: EncryptionParameters,
	pub encrypted_user_data: EncryptedUserData,

	pub segment_count: i32,
	pub total_plain_size: i64,
	pub total_encrypted_size: i64,
	pub fixed_segment_size: i32,

	pub retention: Retention,
}

impl ObjectRow {
	pub fn location(&self) -> metabase_util::data::ObjectLocation {
		metabase_util::data::ObjectLocation::new(
			self.project_id,
			self.bucket_name.clone(),
			self.object_key.clone(),
		)
	}
}

/// Where a segment's pieces live: inline in the row, or as a compressed
/// remote piece vector. Never both (spec §3); switching between them
/// atomically clears the other.
#[derive(Clone, Debug)]
pub enum SegmentData {
	Inline(Vec<u8>),
	Remote(AliasPieces),
}

/// `segments` row (PK `(stream_id, position)`).
#[derive(Clone, Debug)]
pub struct SegmentRow {
	pub stream_id: StreamId,
	pub position: SegmentPosition,

	pub created_at: DateTime<Utc>,
	pub repaired_at: Option<DateTime<Utc>>,
	pub expires_at: Option<DateTime<Utc>>,

	pub root_piece_id: Vec<u8>,
	pub encrypted_key_nonce: Vec<u8>,
	pub encrypted_key: Vec<u8>,
	pub encrypted_size: i32,
	pub plain_offset: i64,
	pub plain_size: i32,
	pub encrypted_etag: Option<Vec<u8>>,
	pub redundancy: RedundancyScheme,
	pub placement: i32,

	pub data: SegmentData,
}

impl SegmentRow {
	pub fn pieces(&self) -> Option<&AliasPieces> {
		match &self.data {
			SegmentData::Remote(p) => Some(p),
			SegmentData::Inline(_) => None,
		}
	}

	/// Validates the fields the commit path must check (spec §7):
	/// missing root piece id / encrypted key / nonce, non-positive
	/// encrypted size, negative plain offset, zero redundancy.
	pub fn verify(&self, validate_plain_size: bool) -> metabase_util::error::Result<()> {
		use metabase_util::error::Error;
		if self.root_piece_id.is_empty() {
			return Err(Error::invalid_request("missing root piece id"));
		}
		if self.encrypted_key.is_empty() {
			return Err(Error::invalid_request("missing encrypted key"));
		}
		if self.encrypted_key_nonce.is_empty() {
			return Err(Error::invalid_request("missing encrypted key nonce"));
		}
		if self.encrypted_size <= 0 {
			return Err(Error::invalid_request("non-positive encrypted size"));
		}
		if validate_plain_size && self.plain_size <= 0 {
			return Err(Error::invalid_request("non-positive plain size"));
		}
		if self.plain_offset < 0 {
			return Err(Error::invalid_request("negative plain offset"));
		}
		self.redundancy.verify()?;
		if let SegmentData::Remote(pieces) = &self.data {
			if pieces.0.len() < self.redundancy.optimal_shares as usize {
				return Err(Error::invalid_request(
					"piece count below redundancy optimal shares",
				));
			}
		}
		Ok(())
	}
}

/// `(Position, EncryptedSize, PlainOffset, PlainSize)` summary used by
/// `PrecommitInfo.Segments` (spec §4.3).
#[derive(Clone, Copy, Debug)]
pub struct SegmentSummary {
	pub position: SegmentPosition,
	pub encrypted_size: i32,
	pub plain_offset: i64,
	pub plain_size: i32,
}

/// Read-only projection for `ListVerifySegments` (spec §4.6): the fields
/// an external piece-repair/audit service needs, never the encrypted key
/// material or payload.
#[derive(Clone, Debug)]
pub struct SegmentVerifyInfo {
	pub position: SegmentPosition,
	pub root_piece_id: Vec<u8>,
	pub redundancy: RedundancyScheme,
	pub placement: i32,
	pub repaired_at: Option<DateTime<Utc>>,
}

impl From<&SegmentRow> for SegmentVerifyInfo {
	fn from(s: &SegmentRow) -> Self {
		SegmentVerifyInfo {
			position: s.position,
			root_piece_id: s.root_piece_id.clone(),
			redundancy: s.redundancy,
			placement: s.placement,
			repaired_at: s.repaired_at,
		}
	}
}

impl From<&SegmentRow> for SegmentSummary {
	fn from(s: &SegmentRow) -> Self {
		SegmentSummary {
			position: s.position,
			encrypted_size: s.encrypted_size,
			plain_offset: s.plain_offset,
			plain_size: s.plain_size,
		}
	}
}

pub use metabase_alias::NodeAliasEntry;
