//! Listing engine (spec §4.6): `ListObjects`'s cursor/prefix/delimiter
//! algorithm, implemented once over `Adapter::scan_bucket_objects`.
//! `metabase_naive` re-implements the same rules independently as a
//! property-test oracle rather than sharing this code. No direct garage
//! analogue ships a delimiter-collapsing prefix lister in the retrieved
//! files; this is grounded in the general cursor/prefix scan shape the
//! spec itself describes.

use metabase_db::{AdapterExt, ObjectRow, ObjectStatus, SegmentRow, SegmentVerifyInfo, TransactionOptions};
use metabase_util::data::{cmp_key_version, BucketName, NodeAlias, ObjectKey, ProjectId, SegmentPosition, StreamId, Version};
use metabase_util::error::Result;

use crate::Core;

/// Input to `ListObjects` (spec §4.6).
#[derive(Clone, Debug)]
pub struct ListObjectsRequest {
	pub project_id: ProjectId,
	pub bucket_name: BucketName,
	pub prefix: Vec<u8>,
	pub delimiter: Vec<u8>,
	pub cursor_key: ObjectKey,
	pub cursor_version: Version,
	pub recursive: bool,
	pub pending: bool,
	pub all_versions: bool,
	pub include_system_metadata: bool,
	pub include_custom_metadata: bool,
	pub include_etag: bool,
	pub include_etag_or_custom_metadata: bool,
	pub limit: usize,
}

impl Default for ListObjectsRequest {
	fn default() -> Self {
		ListObjectsRequest {
			project_id: ProjectId([0; 16]),
			bucket_name: BucketName(Vec::new()),
			prefix: Vec::new(),
			delimiter: b"/".to_vec(),
			cursor_key: ObjectKey(Vec::new()),
			cursor_version: Version(0),
			recursive: false,
			pending: false,
			all_versions: false,
			include_system_metadata: false,
			include_custom_metadata: false,
			include_etag: false,
			include_etag_or_custom_metadata: false,
			limit: 1000,
		}
	}
}

/// One output row: either a real object version, or a synthetic
/// `Prefix`-status entry collapsing everything below a common delimiter.
#[derive(Clone, Debug)]
pub struct ListEntry {
	pub key: ObjectKey,
	pub version: Version,
	pub status: ObjectStatus,
	pub is_latest: bool,
	pub object: Option<ObjectRow>,
}

#[derive(Clone, Debug, Default)]
pub struct ListObjectsResult {
	pub entries: Vec<ListEntry>,
	pub more: bool,
}

/// The backend-agnostic core of `ListObjects` (spec §4.6 rules 1-8). Takes
/// the full unsorted bucket scan and applies ordering, prefix, delimiter
/// collapsing, cursor, latest-version filtering, redaction and the
/// limit/`More` overshoot, in that order. Shared byte-for-byte with
/// `metabase_naive::list_objects` so the two can be compared in property
/// tests (spec P6).
pub fn list_objects(mut rows: Vec<ObjectRow>, req: &ListObjectsRequest) -> ListObjectsResult {
	let descending_version = !req.pending;

	rows.retain(|r| r.status.is_pending() == req.pending);
	rows.sort_by(|a, b| cmp_key_version(&a.object_key, a.version, &b.object_key, b.version, descending_version));
	rows.retain(|r| r.object_key.has_prefix(&req.prefix));

	// Rule 5: latest-version filtering and delete-marker key skipping.
	// Only meaningful for committed listings; pending rows have no
	// delete-marker concept and are never deduplicated by key.
	let candidates: Vec<(ObjectRow, bool)> = if req.pending {
		rows.into_iter().map(|r| (r, true)).collect()
	} else {
		let mut out = Vec::new();
		let mut i = 0;
		while i < rows.len() {
			let key = rows[i].object_key.clone();
			let mut j = i;
			while j < rows.len() && rows[j].object_key == key {
				j += 1;
			}
			// rows[i..j] share a key, already sorted newest-first.
			let latest_is_delete_marker = rows[i].status.is_delete_marker();
			if req.all_versions {
				if !latest_is_delete_marker {
					for (idx, r) in rows[i..j].iter().enumerate() {
						out.push((r.clone(), idx == 0));
					}
				}
				// A delete-marker-latest key is skipped entirely (rule 5),
				// including its non-latest siblings, even under AllVersions.
			} else if !latest_is_delete_marker {
				out.push((rows[i].clone(), true));
			}
			i = j;
		}
		out
	};

	// Rule 3: delimiter collapsing, only when !Recursive.
	let mut entries: Vec<ListEntry> = Vec::new();
	let mut last_synthetic: Option<Vec<u8>> = None;
	for (row, is_latest) in candidates {
		if !req.recursive && !req.delimiter.is_empty() {
			let rest = &row.object_key.as_bytes()[req.prefix.len().min(row.object_key.as_bytes().len())..];
			if let Some(pos) = find_subslice(rest, &req.delimiter) {
				let head = &rest[..pos + req.delimiter.len()];
				let mut synthetic_key = req.prefix.clone();
				synthetic_key.extend_from_slice(head);
				if last_synthetic.as_deref() == Some(synthetic_key.as_slice()) {
					continue;
				}
				last_synthetic = Some(synthetic_key.clone());
				entries.push(ListEntry {
					key: ObjectKey(synthetic_key),
					version: Version(0),
					status: ObjectStatus::Prefix,
					is_latest: true,
					object: None,
				});
				continue;
			}
		}
		last_synthetic = None;
		entries.push(ListEntry {
			key: row.object_key.clone(),
			version: row.version,
			status: row.status,
			is_latest,
			object: Some(row),
		});
	}

	// Rule 4: cursor. Synthetic prefix entries compare on key only.
	entries.retain(|e| {
		if e.status == ObjectStatus::Prefix {
			e.key.as_bytes() > req.cursor_key.as_bytes()
		} else {
			cmp_key_version(&e.key, e.version, &req.cursor_key, req.cursor_version, descending_version)
				== std::cmp::Ordering::Greater
		}
	});

	// Rule 8: overshoot by one to compute `More`.
	let more = entries.len() > req.limit;
	entries.truncate(req.limit);

	// Rule 7: redaction.
	for e in entries.iter_mut() {
		if let Some(obj) = e.object.as_mut() {
			redact(obj, req);
		}
	}

	ListObjectsResult { entries, more }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	if needle.is_empty() || needle.len() > haystack.len() {
		return None;
	}
	haystack.windows(needle.len()).position(|w| w == needle)
}

fn redact(obj: &mut ObjectRow, req: &ListObjectsRequest) {
	if !req.include_system_metadata {
		obj.total_plain_size = 0;
		obj.total_encrypted_size = 0;
		obj.segment_count = 0;
		obj.expires_at = None;
	}
	obj.encrypted_user_data = if req.include_custom_metadata {
		obj.encrypted_user_data.clone()
	} else if req.include_etag_or_custom_metadata {
		obj.encrypted_user_data.etag_or_custom_metadata()
	} else if req.include_etag {
		obj.encrypted_user_data.etag_only()
	} else {
		obj.encrypted_user_data.redacted()
	};
}

impl Core {
	pub fn list_objects(&self, req: ListObjectsRequest) -> Result<ListObjectsResult> {
		let adapter = self.router.choose_adapter(req.project_id);
		let rows = adapter.scan_bucket_objects(req.project_id, &req.bucket_name)?;
		Ok(list_objects(rows, &req))
	}

	/// `ListSegments` (spec §4.6): joins alias pieces through the
	/// `NodeAliasCache` so callers receive `NodeID`s rather than raw
	/// aliases.
	pub fn list_segments(&self, project_id: ProjectId, stream_id: StreamId, cursor: Option<SegmentPosition>) -> Result<Vec<SegmentRow>> {
		let adapter = self.router.choose_adapter(project_id);
		let mut segments = adapter.list_segments(stream_id)?;
		segments.sort_by_key(|s| s.position);
		if let Some(after) = cursor {
			segments.retain(|s| s.position > after);
		}
		Ok(segments)
	}

	/// Materializes the `NodeID`s behind the aliases recorded on a
	/// segment's pieces, for callers that cannot resolve aliases
	/// themselves.
	pub fn resolve_piece_nodes(&self, aliases: &[NodeAlias]) -> (Vec<metabase_util::data::NodeId>, Vec<NodeAlias>) {
		self.alias_cache.nodes(aliases)
	}

	/// `ListBucketStreamIDs` (spec §4.6): distinct stream ids across a set
	/// of buckets, for offline verifiers.
	pub fn list_bucket_stream_ids(&self, buckets: &[(ProjectId, BucketName)]) -> Result<Vec<(ProjectId, BucketName, StreamId)>> {
		if buckets.is_empty() {
			return Ok(Vec::new());
		}
		let adapter = self.router.choose_adapter(buckets[0].0);
		adapter.list_bucket_stream_ids(buckets)
	}

	/// `IterateLoopSegments` (spec §4.6): scan-all-segments primitive for
	/// background jobs.
	pub fn iterate_loop_segments(&self, project_id: ProjectId) -> Result<Vec<SegmentRow>> {
		let adapter = self.router.choose_adapter(project_id);
		adapter.iterate_loop_segments()
	}

	/// `ListStreamPositions` (spec §4.6/component 8): the set of committed
	/// positions for a stream, ascending, without the full segment rows.
	pub fn list_stream_positions(&self, project_id: ProjectId, stream_id: StreamId) -> Result<Vec<SegmentPosition>> {
		let adapter = self.router.choose_adapter(project_id);
		adapter.list_stream_positions(stream_id)
	}

	/// `ListVerifySegments` (spec §4.6/component 8): the read-only
	/// projection an external piece-repair/audit service scans, never the
	/// encrypted key material.
	pub fn list_verify_segments(&self, project_id: ProjectId, stream_id: StreamId) -> Result<Vec<SegmentVerifyInfo>> {
		let adapter = self.router.choose_adapter(project_id);
		adapter.list_verify_segments(stream_id)
	}

	/// `ListPendingObjects`: a thin `ListObjects` call fixed to
	/// `Pending=true`, ascending order.
	pub fn list_pending_objects(&self, project_id: ProjectId, bucket_name: BucketName, limit: usize) -> Result<ListObjectsResult> {
		self.list_objects(ListObjectsRequest {
			project_id,
			bucket_name,
			pending: true,
			all_versions: true,
			recursive: true,
			include_system_metadata: true,
			include_custom_metadata: true,
			limit,
			..Default::default()
		})
	}

	/// Acquires a transactional cursor-consistent view for callers that
	/// need `ListObjects` and a subsequent mutation to observe the same
	/// snapshot (spec §9 ambient note on read-then-write consistency).
	pub fn list_objects_in_tx(&self, project_id: ProjectId, f: impl FnOnce(&mut dyn metabase_db::Transaction) -> Result<()>) -> Result<()> {
		let adapter = self.router.choose_adapter(project_id);
		adapter.with_tx(TransactionOptions::tagged("list_objects_in_tx"), f)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use chrono::Utc;
	use metabase_db::{EncryptedUserData, EncryptionParameters, Retention};

	fn row(key: &str, version: i64, status: ObjectStatus) -> ObjectRow {
		ObjectRow {
			project_id: ProjectId([0; 16]),
			bucket_name: BucketName(b"b".to_vec()),
			object_key: ObjectKey(key.as_bytes().to_vec()),
			version: Version(version),
			status,
			stream_id: StreamId::random(),
			created_at: Utc::now(),
			expires_at: None,
			zombie_deletion_deadline: None,
			encryption: EncryptionParameters::default(),
			encrypted_user_data: EncryptedUserData::default(),
			segment_count: 1,
			total_plain_size: 10,
			total_encrypted_size: 26,
			fixed_segment_size: 10,
			retention: Retention::none(),
		}
	}

	#[test]
	fn listing_collapses_prefixes_past_cursor() {
		let rows = vec![
			row("a/a", 1, ObjectStatus::CommittedVersioned),
			row("a/b", 1, ObjectStatus::CommittedVersioned),
			row("b", 1, ObjectStatus::CommittedVersioned),
		];
		let req = ListObjectsRequest {
			cursor_key: ObjectKey(b"a/".to_vec()),
			cursor_version: Version(0),
			limit: 2,
			..Default::default()
		};
		let result = list_objects(rows, &req);
		assert_eq!(result.entries.len(), 1);
		assert_eq!(result.entries[0].key.as_bytes(), b"b");
		assert_eq!(result.entries[0].status, ObjectStatus::CommittedVersioned);
		assert!(!result.more);
	}

	#[test]
	fn delete_marker_latest_hides_key_entirely() {
		let rows = vec![
			row("k", 2, ObjectStatus::DeleteMarkerVersioned),
			row("k", 1, ObjectStatus::CommittedVersioned),
		];
		let req = ListObjectsRequest { recursive: true, ..Default::default() };
		let result = list_objects(rows, &req);
		assert!(result.entries.is_empty());
	}

	#[test]
	fn all_versions_includes_history_unless_latest_is_delete_marker() {
		let rows = vec![
			row("k", 2, ObjectStatus::CommittedVersioned),
			row("k", 1, ObjectStatus::CommittedVersioned),
		];
		let req = ListObjectsRequest {
			recursive: true,
			all_versions: true,
			..Default::default()
		};
		let result = list_objects(rows, &req);
		assert_eq!(result.entries.len(), 2);
		assert_eq!(result.entries[0].version, Version(2));
		assert!(result.entries[0].is_latest);
		assert!(!result.entries[1].is_latest);
	}

	#[test]
	fn more_flag_set_on_overshoot() {
		let rows = vec![
			row("a", 1, ObjectStatus::CommittedVersioned),
			row("b", 1, ObjectStatus::CommittedVersioned),
			row("c", 1, ObjectStatus::CommittedVersioned),
		];
		let req = ListObjectsRequest { recursive: true, limit: 2, ..Default::default() };
		let result = list_objects(rows, &req);
		assert_eq!(result.entries.len(), 2);
		assert!(result.more);
	}

	#[test]
	fn redaction_clears_system_and_custom_metadata_by_default() {
		let rows = vec![row("a", 1, ObjectStatus::CommittedVersioned)];
		let req = ListObjectsRequest { recursive: true, ..Default::default() };
		let result = list_objects(rows, &req);
		let obj = result.entries[0].object.as_ref().unwrap();
		assert_eq!(obj.total_plain_size, 0);
		assert_eq!(obj.segment_count, 0);
	}

	#[test]
	fn include_etag_or_custom_metadata_falls_back_to_full_metadata_when_etag_absent() {
		let mut with_metadata = row("a", 1, ObjectStatus::CommittedVersioned);
		with_metadata.encrypted_user_data = EncryptedUserData {
			encrypted_metadata_nonce: Some(vec![1]),
			encrypted_metadata: Some(vec![2]),
			encrypted_metadata_encrypted_key: Some(vec![3]),
			encrypted_etag: None,
		};
		let req = ListObjectsRequest {
			recursive: true,
			include_etag_or_custom_metadata: true,
			..Default::default()
		};
		let result = list_objects(vec![with_metadata], &req);
		let obj = result.entries[0].object.as_ref().unwrap();
		assert_eq!(obj.encrypted_user_data.encrypted_metadata, Some(vec![2]));
	}

	#[test]
	fn include_etag_or_custom_metadata_prefers_etag_when_present() {
		let mut with_both = row("a", 1, ObjectStatus::CommittedVersioned);
		with_both.encrypted_user_data = EncryptedUserData {
			encrypted_metadata_nonce: Some(vec![1]),
			encrypted_metadata: Some(vec![2]),
			encrypted_metadata_encrypted_key: Some(vec![3]),
			encrypted_etag: Some(vec![9]),
		};
		let req = ListObjectsRequest {
			recursive: true,
			include_etag_or_custom_metadata: true,
			..Default::default()
		};
		let result = list_objects(vec![with_both], &req);
		let obj = result.entries[0].object.as_ref().unwrap();
		assert_eq!(obj.encrypted_user_data.encrypted_etag, Some(vec![9]));
		assert_eq!(obj.encrypted_user_data.encrypted_metadata, None);
	}

	#[test]
	fn include_etag_alone_never_falls_back_to_metadata() {
		let mut with_metadata = row("a", 1, ObjectStatus::CommittedVersioned);
		with_metadata.encrypted_user_data = EncryptedUserData {
			encrypted_metadata_nonce: Some(vec![1]),
			encrypted_metadata: Some(vec![2]),
			encrypted_metadata_encrypted_key: Some(vec![3]),
			encrypted_etag: None,
		};
		let req = ListObjectsRequest { recursive: true, include_etag: true, ..Default::default() };
		let result = list_objects(vec![with_metadata], &req);
		let obj = result.entries[0].object.as_ref().unwrap();
		assert_eq!(obj.encrypted_user_data.encrypted_metadata, None);
		assert_eq!(obj.encrypted_user_data.encrypted_etag, None);
	}
}

/// Property-based equivalence against the independent oracle (spec P6):
/// keys drawn from a small alphabet to force collisions under both
/// `Recursive` settings and both `AllVersions` settings.
#[cfg(test)]
mod proptest_equivalence {
	use super::*;
	use chrono::Utc;
	use metabase_db::{EncryptedUserData, EncryptionParameters, Retention};
	use metabase_naive::{NaiveListRequest, NaiveObjectsDB};
	use proptest::prelude::*;
	use std::collections::BTreeMap;

	fn make_row(key: &str, version: i64, delete: bool) -> ObjectRow {
		ObjectRow {
			project_id: ProjectId([0; 16]),
			bucket_name: BucketName(b"b".to_vec()),
			object_key: ObjectKey(key.as_bytes().to_vec()),
			version: Version(version),
			status: if delete {
				ObjectStatus::DeleteMarkerVersioned
			} else {
				ObjectStatus::CommittedVersioned
			},
			stream_id: StreamId::random(),
			created_at: Utc::now(),
			expires_at: None,
			zombie_deletion_deadline: None,
			encryption: EncryptionParameters::default(),
			encrypted_user_data: EncryptedUserData::default(),
			segment_count: 1,
			total_plain_size: 10,
			total_encrypted_size: 26,
			fixed_segment_size: 10,
			retention: Retention::none(),
		}
	}

	fn entry_strategy() -> impl Strategy<Value = (String, i64, bool)> {
		(
			prop::sample::select(vec!["a", "b", "c", "a/a", "a/b", "c/c"]).prop_map(|s| s.to_string()),
			1i64..4,
			any::<bool>(),
		)
	}

	proptest! {
		#[test]
		fn naive_and_core_listing_agree(
			entries in prop::collection::vec(entry_strategy(), 0..15),
			recursive in any::<bool>(),
			all_versions in any::<bool>(),
		) {
			let mut dedup: BTreeMap<(String, i64), bool> = BTreeMap::new();
			for (k, v, d) in entries {
				dedup.insert((k, v), d);
			}
			let rows: Vec<ObjectRow> = dedup.iter().map(|((k, v), d)| make_row(k, *v, *d)).collect();

			let core_req = ListObjectsRequest {
				recursive,
				all_versions,
				limit: 100,
				..Default::default()
			};
			let core_result = list_objects(rows.clone(), &core_req);

			let naive_req = NaiveListRequest {
				recursive,
				all_versions,
				limit: 100,
				..Default::default()
			};
			let naive_result = NaiveObjectsDB::new(rows).list(&naive_req);

			prop_assert_eq!(core_result.entries.len(), naive_result.entries.len());
			for (a, b) in core_result.entries.iter().zip(naive_result.entries.iter()) {
				prop_assert_eq!(a.key.as_bytes(), b.key.as_slice());
				prop_assert_eq!(a.version.0, b.version);
				prop_assert_eq!(a.status == ObjectStatus::Prefix, b.is_prefix);
			}
			prop_assert_eq!(core_result.more, naive_result.more);
		}
	}
}
