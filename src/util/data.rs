//! Core identifier and value types shared across the metabase crates
//! (spec §3 DATA MODEL). Kept deliberately dumb: these are plain value
//! types with `verify()` helpers, not behaviour-bearing models — the
//! behaviour lives in `metabase_core`.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// 16-byte opaque project identifier (UUID-shaped, not interpreted).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub [u8; 16]);

impl fmt::Debug for ProjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ProjectId({})", hex::encode(self.0))
	}
}

/// Opaque byte string, length-bounded 1..255, compared as bytes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketName(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl BucketName {
	pub fn verify(&self) -> Result<()> {
		if self.0.is_empty() {
			return Err(Error::invalid_request("bucket name must not be empty"));
		}
		if self.0.len() > 255 {
			return Err(Error::invalid_request(
				"bucket name must not exceed 255 bytes",
			));
		}
		Ok(())
	}
}

impl fmt::Debug for BucketName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "BucketName({:?})", String::from_utf8_lossy(&self.0))
	}
}

/// Opaque byte string, ordered lexicographically by byte value. `0x00`
/// is the minimum; there is no implicit reserved suffix.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct ObjectKey(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl ObjectKey {
	pub fn verify(&self) -> Result<()> {
		if self.0.is_empty() {
			return Err(Error::invalid_request("object key must not be empty"));
		}
		Ok(())
	}

	/// Returns `true` if `self` has `prefix` as a byte prefix.
	pub fn has_prefix(&self, prefix: &[u8]) -> bool {
		self.0.starts_with(prefix)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Debug for ObjectKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ObjectKey({:?})", String::from_utf8_lossy(&self.0))
	}
}

/// 16-byte opaque stream identifier. A delete-marker StreamID has its
/// first six bytes set to `0xFF` (out-of-band invariant, spec §3).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(pub [u8; 16]);

const DELETE_MARKER_PREFIX: [u8; 6] = [0xFF; 6];

impl StreamId {
	/// Random stream id, for a regular object begin.
	pub fn random() -> Self {
		StreamId(rand::random())
	}

	/// Random stream id that satisfies the delete-marker invariant: its
	/// first six bytes are `0xFF`.
	pub fn random_delete_marker() -> Self {
		let mut bytes: [u8; 16] = rand::random();
		bytes[..6].copy_from_slice(&DELETE_MARKER_PREFIX);
		StreamId(bytes)
	}

	pub fn is_delete_marker(&self) -> bool {
		self.0[..6] == DELETE_MARKER_PREFIX
	}
}

impl fmt::Debug for StreamId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "StreamId({})", hex::encode(self.0))
	}
}

/// Signed 64-bit version. `NextVersion` (0) means "assign next"; positive
/// values are concrete versions; negative values may exist in migrated
/// data and are normalized to 0 ("highest version") when surfaced.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Version(pub i64);

impl Version {
	pub const NEXT: Version = Version(0);

	pub fn is_next(&self) -> bool {
		self.0 == 0
	}

	/// Negative versions (migration-era data) normalize to 0 when surfaced
	/// to clients as "highest version" (spec §3).
	pub fn normalized(&self) -> Version {
		if self.0 < 0 {
			Version(0)
		} else {
			*self
		}
	}
}

impl fmt::Debug for Version {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Version({})", self.0)
	}
}

/// `part<<32 | index`, encoded as a 64-bit integer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentPosition(pub u64);

impl SegmentPosition {
	pub fn new(part: u32, index: u32) -> Self {
		SegmentPosition(((part as u64) << 32) | index as u64)
	}

	pub fn part(&self) -> u32 {
		(self.0 >> 32) as u32
	}

	pub fn index(&self) -> u32 {
		(self.0 & 0xFFFF_FFFF) as u32
	}
}

impl fmt::Debug for SegmentPosition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SegmentPosition(part={}, index={})", self.part(), self.index())
	}
}

/// 32-byte opaque storage-node identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 32]);

impl fmt::Debug for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "NodeId({})", hex::encode(self.0))
	}
}

/// Signed 32-bit alias, densely allocated per NodeID, always >= 1.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeAlias(pub i32);

impl NodeAlias {
	pub fn verify(&self) -> Result<()> {
		if self.0 < 1 {
			return Err(Error::invalid_request("node alias must be >= 1"));
		}
		Ok(())
	}
}

impl fmt::Debug for NodeAlias {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "NodeAlias({})", self.0)
	}
}

/// Fully qualified object location: `(ProjectID, BucketName, ObjectKey)`,
/// the granularity at which the lifecycle/precommit invariants (P1, P2)
/// are enforced.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct ObjectLocation {
	pub project_id: ProjectId,
	pub bucket_name: BucketName,
	pub object_key: ObjectKey,
}

impl ObjectLocation {
	pub fn new(project_id: ProjectId, bucket_name: BucketName, object_key: ObjectKey) -> Self {
		Self {
			project_id,
			bucket_name,
			object_key,
		}
	}
}

/// Ordering helper for comparing `(key, version)` cursors in the listing
/// engine, where direction depends on whether the listing is ascending
/// (pending) or descending (committed) by version (spec §4.6 rule 1).
pub fn cmp_key_version(
	a_key: &ObjectKey,
	a_version: Version,
	b_key: &ObjectKey,
	b_version: Version,
	descending_version: bool,
) -> Ordering {
	match a_key.cmp(b_key) {
		Ordering::Equal => {
			if descending_version {
				b_version.cmp(&a_version)
			} else {
				a_version.cmp(&b_version)
			}
		}
		other => other,
	}
}
