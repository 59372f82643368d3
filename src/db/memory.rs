//! An in-memory reference backend, used for unit and property tests where a
//! real sled/heed/rusqlite-backed adapter would be overkill (spec §4.2: "the
//! contract must be backend-agnostic; the first adapter is free to be a
//! simple one"). Grounded on the coarse `Mutex<...Locked>` pattern
//! `garage_block::BlockManager` uses to serialize mutating operations,
//! rather than per-row locking: one `Mutex<Store>` guards the whole store
//! for the lifetime of a transaction, which is a documented simplification
//! of the real system's per-key row locks (see DESIGN.md).

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use metabase_alias::{AliasPieces, NodeAliasEntry, NodeAliasMap};
use metabase_util::data::{
	BucketName, NodeId, ObjectKey, ObjectLocation, ProjectId, SegmentPosition, StreamId, Version,
};
use metabase_util::error::{Error, Result};

use crate::adapter::{
	Adapter, AdapterExt, ObjectLockDeleteOptions, PendingInfo, PrecommitConstraintResult,
	PrecommitDeleteResult, PrecommitInfo, PrecommitQuery, TableStats, Transaction,
	TransactionOptions, TxBox, UnversionedInfo,
};
use crate::types::{ObjectRow, ObjectStatus, Retention, SegmentRow};

type ObjectKeyTuple = (ProjectId, BucketName, ObjectKey, Version);
type SegmentKeyTuple = (StreamId, SegmentPosition);

#[derive(Default)]
struct Store {
	objects: BTreeMap<ObjectKeyTuple, ObjectRow>,
	segments: BTreeMap<SegmentKeyTuple, SegmentRow>,
	aliases: NodeAliasMap,
}

impl Store {
	fn object_key(row: &ObjectRow) -> ObjectKeyTuple {
		(
			row.project_id,
			row.bucket_name.clone(),
			row.object_key.clone(),
			row.version,
		)
	}

	fn last_committed(&self, loc: &ObjectLocation) -> Option<&ObjectRow> {
		self.objects
			.range((loc.project_id, loc.bucket_name.clone(), loc.object_key.clone(), Version(i64::MIN))
				..=(loc.project_id, loc.bucket_name.clone(), loc.object_key.clone(), Version(i64::MAX)))
			.map(|(_, row)| row)
			.filter(|row| row.status.is_visible())
			.max_by_key(|row| row.version)
	}

	fn highest_version(&self, loc: &ObjectLocation) -> Version {
		self.objects
			.range((loc.project_id, loc.bucket_name.clone(), loc.object_key.clone(), Version(i64::MIN))
				..=(loc.project_id, loc.bucket_name.clone(), loc.object_key.clone(), Version(i64::MAX)))
			.map(|(_, row)| row.version)
			.max()
			.unwrap_or(Version(0))
	}

	fn segments_for_stream(&self, stream_id: StreamId) -> Vec<SegmentRow> {
		self.segments
			.range((stream_id, SegmentPosition(0))..=(stream_id, SegmentPosition(u64::MAX)))
			.map(|(_, s)| s.clone())
			.collect()
	}

	fn delete_segments_for_stream(&mut self, stream_id: StreamId) -> usize {
		let keys: Vec<_> = self
			.segments
			.range((stream_id, SegmentPosition(0))..=(stream_id, SegmentPosition(u64::MAX)))
			.map(|(k, _)| *k)
			.collect();
		let n = keys.len();
		for k in keys {
			self.segments.remove(&k);
		}
		n
	}
}

/// In-memory `Adapter`/`Transaction` backend. One `Mutex<Store>`, entered
/// for the duration of each `with_tx` call.
pub struct MemoryAdapter {
	store: Mutex<Store>,
}

impl Default for MemoryAdapter {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryAdapter {
	pub fn new() -> Self {
		MemoryAdapter {
			store: Mutex::new(Store::default()),
		}
	}
}

/// Borrows the locked `Store` for the lifetime of one `with_tx` call; all
/// `Transaction` methods operate directly on it.
struct MemoryTransaction<'a> {
	store: &'a mut Store,
}

impl Adapter for MemoryAdapter {
	fn name(&self) -> &str {
		"memory"
	}

	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}

	fn ping(&self) -> Result<()> {
		Ok(())
	}

	fn begin_object_next_version(&self, mut row: ObjectRow) -> Result<ObjectRow> {
		let mut store = self.store.lock().unwrap();
		let next = store.highest_version(&row.location()).0 + 1;
		row.version = Version(next);
		store.objects.insert(Store::object_key(&row), row.clone());
		Ok(row)
	}

	fn begin_object_exact_version(&self, row: ObjectRow) -> Result<ObjectRow> {
		let mut store = self.store.lock().unwrap();
		let key = Store::object_key(&row);
		if store.objects.contains_key(&key) {
			return Err(Error::ObjectAlreadyExists(format!(
				"{:?} v{}",
				row.object_key, row.version.0
			)));
		}
		store.objects.insert(key, row.clone());
		Ok(row)
	}

	fn begin_object_next_timestamp_version(&self, mut row: ObjectRow) -> Result<ObjectRow> {
		let mut store = self.store.lock().unwrap();
		let highest = store.highest_version(&row.location()).0;
		let now = metabase_util::time::now_micros();
		row.version = Version(now.max(highest + 1));
		store.objects.insert(Store::object_key(&row), row.clone());
		Ok(row)
	}

	fn get_object_last_committed(&self, loc: &ObjectLocation) -> Result<Option<ObjectRow>> {
		Ok(self.store.lock().unwrap().last_committed(loc).cloned())
	}

	fn get_object_exact_version(
		&self,
		loc: &ObjectLocation,
		version: Version,
	) -> Result<Option<ObjectRow>> {
		let store = self.store.lock().unwrap();
		Ok(store
			.objects
			.get(&(loc.project_id, loc.bucket_name.clone(), loc.object_key.clone(), version))
			.cloned())
	}

	fn pending_object_exists(
		&self,
		loc: &ObjectLocation,
		version: Version,
		stream_id: StreamId,
	) -> Result<bool> {
		let store = self.store.lock().unwrap();
		Ok(store
			.objects
			.get(&(loc.project_id, loc.bucket_name.clone(), loc.object_key.clone(), version))
			.map(|row| row.status.is_pending() && row.stream_id == stream_id)
			.unwrap_or(false))
	}

	fn get_segment_by_position(
		&self,
		stream_id: StreamId,
		position: SegmentPosition,
	) -> Result<Option<SegmentRow>> {
		Ok(self.store.lock().unwrap().segments.get(&(stream_id, position)).cloned())
	}

	fn list_segments(&self, stream_id: StreamId) -> Result<Vec<SegmentRow>> {
		Ok(self.store.lock().unwrap().segments_for_stream(stream_id))
	}

	fn commit_pending_object_segment(&self, segment: SegmentRow) -> Result<()> {
		let mut store = self.store.lock().unwrap();
		store.segments.insert((segment.stream_id, segment.position), segment);
		Ok(())
	}

	fn commit_inline_segment(&self, segment: SegmentRow) -> Result<()> {
		self.commit_pending_object_segment(segment)
	}

	fn update_segment_pieces(
		&self,
		stream_id: StreamId,
		position: SegmentPosition,
		pieces: AliasPieces,
	) -> Result<()> {
		let mut store = self.store.lock().unwrap();
		let seg = store
			.segments
			.get_mut(&(stream_id, position))
			.ok_or_else(|| Error::ObjectNotFound("segment not found".into()))?;
		seg.data = crate::types::SegmentData::Remote(pieces);
		Ok(())
	}

	fn delete_segments_by_stream(&self, stream_id: StreamId) -> Result<usize> {
		Ok(self.store.lock().unwrap().delete_segments_for_stream(stream_id))
	}

	fn stream_piece_count(&self, stream_id: StreamId) -> Result<usize> {
		let store = self.store.lock().unwrap();
		Ok(store
			.segments_for_stream(stream_id)
			.iter()
			.filter_map(|s| s.pieces())
			.map(|p| p.0.len())
			.sum())
	}

	fn scan_bucket_objects(&self, project_id: ProjectId, bucket_name: &BucketName) -> Result<Vec<ObjectRow>> {
		let store = self.store.lock().unwrap();
		let mut rows: Vec<ObjectRow> = store
			.objects
			.range(
				(project_id, bucket_name.clone(), ObjectKey(Vec::new()), Version(i64::MIN))
					..(project_id, BucketName(bump_bucket(bucket_name)), ObjectKey(Vec::new()), Version(i64::MIN)),
			)
			.map(|(_, row)| row.clone())
			.collect();
		rows.sort_by(|a, b| {
			metabase_util::data::cmp_key_version(&a.object_key, a.version, &b.object_key, b.version, false)
		});
		Ok(rows)
	}

	fn list_bucket_stream_ids(
		&self,
		buckets: &[(ProjectId, BucketName)],
	) -> Result<Vec<(ProjectId, BucketName, StreamId)>> {
		let store = self.store.lock().unwrap();
		let mut out = Vec::new();
		for (project_id, bucket_name) in buckets {
			for row in store
				.objects
				.values()
				.filter(|row| &row.project_id == project_id && &row.bucket_name == bucket_name)
			{
				out.push((*project_id, bucket_name.clone(), row.stream_id));
			}
		}
		Ok(out)
	}

	fn iterate_loop_segments(&self) -> Result<Vec<SegmentRow>> {
		Ok(self.store.lock().unwrap().segments.values().cloned().collect())
	}

	fn list_stream_positions(&self, stream_id: StreamId) -> Result<Vec<SegmentPosition>> {
		Ok(self
			.store
			.lock()
			.unwrap()
			.segments_for_stream(stream_id)
			.iter()
			.map(|s| s.position)
			.collect())
	}

	fn list_verify_segments(&self, stream_id: StreamId) -> Result<Vec<crate::types::SegmentVerifyInfo>> {
		Ok(self
			.store
			.lock()
			.unwrap()
			.segments_for_stream(stream_id)
			.iter()
			.map(crate::types::SegmentVerifyInfo::from)
			.collect())
	}

	fn get_retention(&self, loc: &ObjectLocation, version: Version) -> Result<Option<Retention>> {
		Ok(self.get_object_exact_version(loc, version)?.map(|row| row.retention))
	}

	fn set_retention(&self, loc: &ObjectLocation, version: Version, retention: Retention) -> Result<()> {
		let mut store = self.store.lock().unwrap();
		let row = store
			.objects
			.get_mut(&(loc.project_id, loc.bucket_name.clone(), loc.object_key.clone(), version))
			.ok_or_else(|| Error::ObjectNotFound("object not found".into()))?;
		row.retention = retention;
		Ok(())
	}

	fn set_legal_hold(&self, loc: &ObjectLocation, version: Version, legal_hold: bool) -> Result<()> {
		let mut store = self.store.lock().unwrap();
		let row = store
			.objects
			.get_mut(&(loc.project_id, loc.bucket_name.clone(), loc.object_key.clone(), version))
			.ok_or_else(|| Error::ObjectNotFound("object not found".into()))?;
		row.retention.legal_hold = legal_hold;
		Ok(())
	}

	fn bucket_is_empty(&self, project_id: ProjectId, bucket_name: &BucketName) -> Result<bool> {
		Ok(self.scan_bucket_objects(project_id, bucket_name)?.is_empty())
	}

	fn table_stats(&self) -> Result<TableStats> {
		let store = self.store.lock().unwrap();
		Ok(TableStats {
			object_count: store.objects.len() as u64,
			segment_count: store.segments.len() as u64,
			node_alias_count: (store.aliases.max() + 1).max(0) as u64,
		})
	}

	fn iterate_zombie_objects(&self, inactive_deadline: DateTime<Utc>, batch_size: usize) -> Result<Vec<ObjectRow>> {
		let store = self.store.lock().unwrap();
		Ok(store
			.objects
			.values()
			.filter(|row| row.status.is_pending())
			.filter(|row| row.zombie_deletion_deadline.map(|d| d <= inactive_deadline).unwrap_or(false))
			.take(batch_size)
			.cloned()
			.collect())
	}

	fn iterate_expired_objects(&self, expired_before: DateTime<Utc>, batch_size: usize) -> Result<Vec<ObjectRow>> {
		let store = self.store.lock().unwrap();
		Ok(store
			.objects
			.values()
			.filter(|row| row.status.is_visible())
			.filter(|row| row.expires_at.map(|e| e <= expired_before).unwrap_or(false))
			.take(batch_size)
			.cloned()
			.collect())
	}

	fn delete_inactive_objects_and_segments(&self, rows: &[ObjectRow]) -> Result<usize> {
		let mut store = self.store.lock().unwrap();
		let mut n = 0;
		for row in rows {
			if store.objects.remove(&Store::object_key(row)).is_some() {
				store.delete_segments_for_stream(row.stream_id);
				n += 1;
			}
		}
		Ok(n)
	}

	fn delete_objects_and_segments_no_verify(&self, rows: &[ObjectRow]) -> Result<usize> {
		self.delete_inactive_objects_and_segments(rows)
	}

	fn delete_pending_object(&self, loc: &ObjectLocation, version: Version, stream_id: StreamId) -> Result<Option<ObjectRow>> {
		let mut store = self.store.lock().unwrap();
		let key = (loc.project_id, loc.bucket_name.clone(), loc.object_key.clone(), version);
		if let Some(row) = store.objects.get(&key) {
			if row.status.is_pending() && row.stream_id == stream_id {
				let row = store.objects.remove(&key).unwrap();
				store.delete_segments_for_stream(stream_id);
				return Ok(Some(row));
			}
		}
		Ok(None)
	}

	fn delete_object_last_committed_plain(&self, loc: &ObjectLocation) -> Result<Option<(ObjectRow, Vec<SegmentRow>)>> {
		let mut store = self.store.lock().unwrap();
		let row = match store.last_committed(loc).cloned() {
			Some(row) => row,
			None => return Ok(None),
		};
		store.objects.remove(&Store::object_key(&row));
		let segs = store.segments_for_stream(row.stream_id);
		store.delete_segments_for_stream(row.stream_id);
		Ok(Some((row, segs)))
	}

	fn delete_bucket_objects_batch(&self, project_id: ProjectId, bucket_name: &BucketName, batch_size: usize) -> Result<usize> {
		let mut store = self.store.lock().unwrap();
		let keys: Vec<_> = store
			.objects
			.keys()
			.filter(|(p, b, _, _)| *p == project_id && b == bucket_name)
			.take(batch_size)
			.cloned()
			.collect();
		let n = keys.len();
		for k in keys {
			if let Some(row) = store.objects.remove(&k) {
				store.delete_segments_for_stream(row.stream_id);
			}
		}
		Ok(n)
	}

	fn ensure_node_aliases(&self, ids: &[NodeId]) -> Result<Vec<NodeAliasEntry>> {
		let mut store = self.store.lock().unwrap();
		let mut out = Vec::with_capacity(ids.len());
		for &id in ids {
			let alias = match store.aliases.alias(&id) {
				Some(a) => a,
				None => {
					let a = store.aliases.next_alias();
					debug!("allocating node alias {:?} for {:?}", a, id);
					let fresh = NodeAliasMap::from_entries([NodeAliasEntry { node_id: id, node_alias: a }]);
					store.aliases.merge(&fresh);
					a
				}
			};
			out.push(NodeAliasEntry { node_id: id, node_alias: alias });
		}
		Ok(out)
	}

	fn list_node_aliases(&self) -> Result<Vec<NodeAliasEntry>> {
		let store = self.store.lock().unwrap();
		let mut out = Vec::new();
		for alias in 1..=(store.aliases.max().max(0)) {
			let a = metabase_util::data::NodeAlias(alias);
			if let Some(id) = store.aliases.node(a) {
				out.push(NodeAliasEntry { node_id: id, node_alias: a });
			}
		}
		Ok(out)
	}

	fn with_tx_dyn(
		&self,
		_opts: TransactionOptions,
		f: &mut dyn FnMut(&mut dyn Transaction) -> Result<TxBox>,
	) -> Result<TxBox> {
		let mut store = self.store.lock().unwrap();
		let mut tx = MemoryTransaction { store: &mut store };
		f(&mut tx)
	}
}

fn bump_bucket(name: &BucketName) -> Vec<u8> {
	let mut v = name.0.clone();
	v.push(0);
	v
}

impl<'a> Transaction for MemoryTransaction<'a> {
	fn precommit_query(&mut self, q: &PrecommitQuery) -> Result<PrecommitInfo> {
		let unversioned_count = self
			.store
			.objects
			.range((q.location.project_id, q.location.bucket_name.clone(), q.location.object_key.clone(), Version(i64::MIN))
				..=(q.location.project_id, q.location.bucket_name.clone(), q.location.object_key.clone(), Version(i64::MAX)))
			.filter(|(_, row)| row.status.is_unversioned())
			.count();
		if unversioned_count > 1 {
			error!(
				"multiple committed unversioned objects at {:?}/{:?}",
				q.location.bucket_name, q.location.object_key
			);
			return Err(Error::internal("multiple committed unversioned objects"));
		}

		let highest_version = self.store.highest_version(&q.location);
		let pending_key = (
			q.location.project_id,
			q.location.bucket_name.clone(),
			q.location.object_key.clone(),
			q.version,
		);
		let pending = if q.pending {
			let row = self
				.store
				.objects
				.get(&pending_key)
				.filter(|row| row.status.is_pending())
				.ok_or_else(|| {
					Error::ObjectNotFound("object with specified version and pending status is missing".into())
				})?;
			Some(PendingInfo {
				created_at: row.created_at,
				expires_at: row.expires_at,
				encryption: row.encryption,
				encrypted_user_data: if q.exclude_from_pending.exclude_encrypted_user_data {
					Default::default()
				} else {
					row.encrypted_user_data.clone()
				},
				retention: row.retention,
			})
		} else {
			None
		};
		let segments = if q.pending && !q.exclude_from_pending.exclude_segments {
			self.store
				.segments_for_stream(q.stream_id)
				.iter()
				.map(crate::types::SegmentSummary::from)
				.collect()
		} else {
			Vec::new()
		};
		let unversioned = if q.unversioned {
			self.store
				.last_committed(&q.location)
				.filter(|row| row.status.is_unversioned())
				.map(|row| UnversionedInfo {
					version: row.version,
					stream_id: row.stream_id,
					segment_count: row.segment_count,
					retention: row.retention,
				})
		} else {
			None
		};
		let highest_visible = if q.highest_visible {
			self.store.last_committed(&q.location).map(|row| row.status)
		} else {
			None
		};
		Ok(PrecommitInfo {
			timestamp_version: Version(metabase_util::time::now_micros()),
			highest_version,
			highest_visible,
			pending,
			segments,
			unversioned,
		})
	}

	fn precommit_delete_unversioned_with_non_pending(
		&mut self,
		loc: &ObjectLocation,
		opts: ObjectLockDeleteOptions,
	) -> Result<PrecommitDeleteResult> {
		let now = Utc::now();
		let existing = self.store.last_committed(loc).cloned();
		let highest_version = self.store.highest_version(loc);
		let highest_non_pending_version = existing.as_ref().map(|r| r.version).unwrap_or(Version(0));

		if let Some(row) = existing.as_ref() {
			if row.status.is_unversioned() && row.retention.blocks_delete(now, opts.bypass_governance) {
				debug!(
					"precommit delete of {:?} blocked by {:?} retention until {:?}",
					loc.object_key, row.retention.mode, row.retention.retain_until
				);
				return Err(Error::ObjectLock("retention period has not elapsed".into()));
			}
		}
		let deletable = existing.as_ref().filter(|row| row.status.is_unversioned());

		match deletable {
			Some(row) => {
				let row = row.clone();
				self.store.objects.remove(&Store::object_key(&row));
				let deleted_segment_count = self.store.delete_segments_for_stream(row.stream_id) as i32;
				Ok(PrecommitDeleteResult {
					deleted: Some(row),
					deleted_segment_count,
					highest_version,
					highest_non_pending_version,
				})
			}
			None => Ok(PrecommitDeleteResult {
				deleted: None,
				deleted_segment_count: 0,
				highest_version,
				highest_non_pending_version,
			}),
		}
	}

	fn precommit_constraint(
		&mut self,
		loc: &ObjectLocation,
		versioned: bool,
		disallow_delete: bool,
	) -> Result<PrecommitConstraintResult> {
		let highest_version = self.store.highest_version(loc);
		if versioned {
			return Ok(PrecommitConstraintResult {
				highest_version,
				deleted: None,
				deleted_segment_count: 0,
			});
		}

		let existing = self.store.last_committed(loc).cloned();
		match existing {
			Some(row) if row.status.is_unversioned() => {
				if disallow_delete {
					return Err(Error::PermissionDenied(
						"an unversioned object already exists at this key".into(),
					));
				}
				let now = Utc::now();
				if row.retention.blocks_delete(now, false) {
					return Err(Error::ObjectLock("retention blocks overwrite".into()));
				}
				self.store.objects.remove(&Store::object_key(&row));
				let deleted_segment_count = self.store.delete_segments_for_stream(row.stream_id) as i32;
				Ok(PrecommitConstraintResult {
					highest_version,
					deleted: Some(row),
					deleted_segment_count,
				})
			}
			_ => Ok(PrecommitConstraintResult {
				highest_version,
				deleted: None,
				deleted_segment_count: 0,
			}),
		}
	}

	fn commit_object(&mut self, loc: &ObjectLocation, pending_version: Version, updated: ObjectRow) -> Result<ObjectRow> {
		let pending_key = (
			loc.project_id,
			loc.bucket_name.clone(),
			loc.object_key.clone(),
			pending_version,
		);
		match self.store.objects.get(&pending_key) {
			Some(row) if row.status.is_committed() && row.stream_id == updated.stream_id => {
				return Ok(row.clone());
			}
			Some(row) if row.status.is_pending() => {}
			_ => return Err(Error::PendingObjectMissing(format!("no pending row at version {}", pending_version.0))),
		}
		self.store.objects.remove(&pending_key);
		self.store.objects.insert(Store::object_key(&updated), updated.clone());
		Ok(updated)
	}

	fn copy_object(&mut self, dest: ObjectRow, dest_segments: Vec<SegmentRow>) -> Result<ObjectRow> {
		for seg in dest_segments {
			self.store.segments.insert((seg.stream_id, seg.position), seg);
		}
		self.store.objects.insert(Store::object_key(&dest), dest.clone());
		Ok(dest)
	}

	fn move_object(&mut self, dest: ObjectRow, source_loc: &ObjectLocation, source_version: Version) -> Result<ObjectRow> {
		self.store.objects.remove(&(
			source_loc.project_id,
			source_loc.bucket_name.clone(),
			source_loc.object_key.clone(),
			source_version,
		));
		self.store.objects.insert(Store::object_key(&dest), dest.clone());
		Ok(dest)
	}

	fn insert_delete_marker(
		&mut self,
		loc: &ObjectLocation,
		version: Version,
		stream_id: StreamId,
		status: ObjectStatus,
	) -> Result<ObjectRow> {
		let row = ObjectRow {
			project_id: loc.project_id,
			bucket_name: loc.bucket_name.clone(),
			object_key: loc.object_key.clone(),
			version,
			status,
			stream_id,
			created_at: Utc::now(),
			expires_at: None,
			zombie_deletion_deadline: None,
			encryption: Default::default(),
			encrypted_user_data: Default::default(),
			segment_count: 0,
			total_plain_size: 0,
			total_encrypted_size: 0,
			fixed_segment_size: 0,
			retention: Retention::none(),
		};
		self.store.objects.insert(Store::object_key(&row), row.clone());
		Ok(row)
	}

	fn delete_object_exact_version(&mut self, loc: &ObjectLocation, version: Version) -> Result<Option<(ObjectRow, Vec<SegmentRow>)>> {
		let key = (loc.project_id, loc.bucket_name.clone(), loc.object_key.clone(), version);
		match self.store.objects.remove(&key) {
			Some(row) => {
				let segs = self.store.segments_for_stream(row.stream_id);
				self.store.delete_segments_for_stream(row.stream_id);
				Ok(Some((row, segs)))
			}
			None => Ok(None),
		}
	}

	fn set_object_version(&mut self, loc: &ObjectLocation, old: Version, new: Version) -> Result<()> {
		let old_key = (loc.project_id, loc.bucket_name.clone(), loc.object_key.clone(), old);
		let mut row = self
			.store
			.objects
			.remove(&old_key)
			.ok_or_else(|| Error::ObjectNotFound("object not found at old version".into()))?;
		row.version = new;
		self.store.objects.insert(Store::object_key(&row), row);
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use metabase_util::data::ProjectId;

	fn loc(key: &str) -> ObjectLocation {
		ObjectLocation::new(ProjectId([1; 16]), BucketName(b"bucket".to_vec()), ObjectKey(key.as_bytes().to_vec()))
	}

	fn blank_row(loc: &ObjectLocation, version: Version, status: ObjectStatus) -> ObjectRow {
		ObjectRow {
			project_id: loc.project_id,
			bucket_name: loc.bucket_name.clone(),
			object_key: loc.object_key.clone(),
			version,
			status,
			stream_id: StreamId::random(),
			created_at: Utc::now(),
			expires_at: None,
			zombie_deletion_deadline: None,
			encryption: Default::default(),
			encrypted_user_data: Default::default(),
			segment_count: 0,
			total_plain_size: 0,
			total_encrypted_size: 0,
			fixed_segment_size: 0,
			retention: Retention::none(),
		}
	}

	#[test]
	fn begin_next_version_assigns_monotonic_versions() {
		let adapter = MemoryAdapter::new();
		let loc = loc("a");
		let row = blank_row(&loc, Version::NEXT, ObjectStatus::Pending);
		let first = adapter.begin_object_next_version(row.clone()).unwrap();
		let second = adapter.begin_object_next_version(row).unwrap();
		assert_eq!(first.version, Version(1));
		assert_eq!(second.version, Version(2));
	}

	#[test]
	fn begin_exact_version_rejects_duplicate() {
		let adapter = MemoryAdapter::new();
		let loc = loc("a");
		let row = blank_row(&loc, Version(5), ObjectStatus::Pending);
		adapter.begin_object_exact_version(row.clone()).unwrap();
		assert!(adapter.begin_object_exact_version(row).is_err());
	}

	#[test]
	fn commit_object_moves_pending_to_committed() {
		let adapter = MemoryAdapter::new();
		let loc = loc("a");
		let pending = blank_row(&loc, Version(1), ObjectStatus::Pending);
		adapter.begin_object_exact_version(pending.clone()).unwrap();

		let mut committed = pending.clone();
		committed.status = ObjectStatus::CommittedUnversioned;

		let result = adapter
			.with_tx(TransactionOptions::tagged("commit"), |tx| {
				tx.commit_object(&loc, Version(1), committed.clone())
			})
			.unwrap();
		assert_eq!(result.status, ObjectStatus::CommittedUnversioned);
		assert_eq!(adapter.get_object_last_committed(&loc).unwrap().unwrap().status, ObjectStatus::CommittedUnversioned);
	}

	#[test]
	fn precommit_delete_unversioned_removes_predecessor() {
		let adapter = MemoryAdapter::new();
		let loc = loc("a");
		let mut existing = blank_row(&loc, Version(1), ObjectStatus::CommittedUnversioned);
		existing.retention = Retention::none();
		adapter.begin_object_exact_version(existing).unwrap();

		let result = adapter
			.with_tx(TransactionOptions::tagged("delete"), |tx| {
				tx.precommit_delete_unversioned_with_non_pending(&loc, ObjectLockDeleteOptions::default())
			})
			.unwrap();
		assert!(result.deleted.is_some());
		assert!(adapter.get_object_last_committed(&loc).unwrap().is_none());
	}

	#[test]
	fn precommit_delete_unversioned_blocked_by_compliance_retention() {
		let adapter = MemoryAdapter::new();
		let loc = loc("a");
		let mut existing = blank_row(&loc, Version(1), ObjectStatus::CommittedUnversioned);
		existing.retention = Retention {
			mode: crate::types::RetentionMode::Compliance,
			retain_until: Some(Utc::now() + chrono::Duration::hours(1)),
			legal_hold: false,
		};
		adapter.begin_object_exact_version(existing).unwrap();

		let result = adapter.with_tx(TransactionOptions::tagged("delete"), |tx| {
			tx.precommit_delete_unversioned_with_non_pending(&loc, ObjectLockDeleteOptions::default())
		});
		assert!(matches!(result, Err(Error::ObjectLock(_))));
		assert!(adapter.get_object_last_committed(&loc).unwrap().is_some());
	}

	#[test]
	fn ensure_node_aliases_is_dense_and_stable() {
		let adapter = MemoryAdapter::new();
		let a = NodeId([1; 32]);
		let b = NodeId([2; 32]);
		let first = adapter.ensure_node_aliases(&[a, b]).unwrap();
		let second = adapter.ensure_node_aliases(&[a]).unwrap();
		assert_eq!(first[0].node_alias, second[0].node_alias);
		assert_ne!(first[0].node_alias, first[1].node_alias);
		assert!(first.iter().all(|e| e.node_alias.0 >= 1));
	}

	#[test]
	fn scan_bucket_objects_is_ordered_by_key_then_version() {
		let adapter = MemoryAdapter::new();
		let project_id = ProjectId([7; 16]);
		let bucket_name = BucketName(b"bucket".to_vec());
		for (key, version) in [("b", 1), ("a", 2), ("a", 1)] {
			let loc = ObjectLocation::new(project_id, bucket_name.clone(), ObjectKey(key.as_bytes().to_vec()));
			let row = blank_row(&loc, Version(version), ObjectStatus::CommittedUnversioned);
			adapter.begin_object_exact_version(row).unwrap();
		}
		let rows = adapter.scan_bucket_objects(project_id, &bucket_name).unwrap();
		let keys: Vec<_> = rows.iter().map(|r| (String::from_utf8_lossy(r.object_key.as_bytes()).to_string(), r.version.0)).collect();
		assert_eq!(keys, vec![("a".to_string(), 1), ("a".to_string(), 2), ("b".to_string(), 1)]);
	}

	#[test]
	fn precommit_query_rejects_missing_pending_row() {
		let adapter = MemoryAdapter::new();
		let loc = loc("a");
		let result = adapter.with_tx(TransactionOptions::tagged("precommit"), |tx| {
			tx.precommit_query(&PrecommitQuery {
				location: loc.clone(),
				version: Version(1),
				stream_id: StreamId::random(),
				pending: true,
				unversioned: false,
				highest_visible: false,
				exclude_from_pending: Default::default(),
			})
		});
		assert!(matches!(result, Err(Error::ObjectNotFound(_))));
	}

	fn segment_row(stream_id: StreamId, part: u32, index: u32) -> SegmentRow {
		SegmentRow {
			stream_id,
			position: metabase_util::data::SegmentPosition::new(part, index),
			created_at: Utc::now(),
			repaired_at: None,
			expires_at: None,
			root_piece_id: vec![index as u8],
			encrypted_key_nonce: vec![0],
			encrypted_key: vec![0],
			encrypted_size: 16,
			plain_offset: 0,
			plain_size: 1,
			encrypted_etag: None,
			redundancy: crate::types::RedundancyScheme {
				required_shares: 1,
				repair_shares: 0,
				optimal_shares: 1,
				total_shares: 1,
				piece_size: 1024,
			},
			placement: 0,
			data: crate::types::SegmentData::Inline(vec![0]),
		}
	}

	#[test]
	fn list_stream_positions_is_ascending_without_full_rows() {
		let adapter = MemoryAdapter::new();
		let stream_id = StreamId::random();
		adapter.commit_pending_object_segment(segment_row(stream_id, 1, 0)).unwrap();
		adapter.commit_pending_object_segment(segment_row(stream_id, 0, 0)).unwrap();
		let positions = adapter.list_stream_positions(stream_id).unwrap();
		assert_eq!(
			positions,
			vec![
				metabase_util::data::SegmentPosition::new(0, 0),
				metabase_util::data::SegmentPosition::new(1, 0),
			]
		);
	}

	#[test]
	fn list_verify_segments_carries_no_key_material() {
		let adapter = MemoryAdapter::new();
		let stream_id = StreamId::random();
		adapter.commit_pending_object_segment(segment_row(stream_id, 0, 0)).unwrap();
		let verify = adapter.list_verify_segments(stream_id).unwrap();
		assert_eq!(verify.len(), 1);
		assert_eq!(verify[0].root_piece_id, vec![0]);
	}

	proptest::proptest! {
		#[test]
		fn scan_bucket_objects_is_always_sorted_and_scoped(
			keys in proptest::collection::vec("[ab]{1,3}", 0..20),
			other_bucket in proptest::bool::ANY,
		) {
			let adapter = MemoryAdapter::new();
			let project_id = ProjectId([3; 16]);
			let bucket_name = BucketName(b"bucket".to_vec());
			let other_name = BucketName(b"buckets".to_vec());
			for (i, key) in keys.iter().enumerate() {
				let target = if other_bucket && i % 2 == 0 { &other_name } else { &bucket_name };
				let loc = ObjectLocation::new(project_id, target.clone(), ObjectKey(key.as_bytes().to_vec()));
				let row = blank_row(&loc, Version::NEXT, ObjectStatus::CommittedUnversioned);
				adapter.begin_object_next_version(row).unwrap();
			}
			let rows = adapter.scan_bucket_objects(project_id, &bucket_name).unwrap();
			proptest::prop_assert!(rows.iter().all(|r| r.bucket_name == bucket_name));
			for w in rows.windows(2) {
				let ordered = metabase_util::data::cmp_key_version(
					&w[0].object_key, w[0].version, &w[1].object_key, w[1].version, false,
				) != std::cmp::Ordering::Greater;
				proptest::prop_assert!(ordered);
			}
		}
	}
}
