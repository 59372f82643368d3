//! `NaiveObjectsDB` (spec §4.6): an independent, unoptimized re-encoding of
//! `ListObjects` over a pre-sorted `Vec<ObjectRow>`, used only as a
//! property-test oracle against real `Adapter::scan_bucket_objects`-backed
//! listings. Deliberately does not share code with `metabase_core::listing`
//! — the point of an oracle is a second, independently-written
//! implementation of the same rules (spec §4.6, closing paragraph).

use metabase_db::{ObjectRow, ObjectStatus};
use metabase_util::data::{cmp_key_version, BucketName, ObjectKey, ProjectId, Version};

#[derive(Clone, Debug)]
pub struct NaiveListRequest {
	pub project_id: ProjectId,
	pub bucket_name: BucketName,
	pub prefix: Vec<u8>,
	pub delimiter: Vec<u8>,
	pub cursor_key: ObjectKey,
	pub cursor_version: Version,
	pub recursive: bool,
	pub pending: bool,
	pub all_versions: bool,
	pub limit: usize,
}

impl Default for NaiveListRequest {
	fn default() -> Self {
		NaiveListRequest {
			project_id: ProjectId([0; 16]),
			bucket_name: BucketName(Vec::new()),
			prefix: Vec::new(),
			delimiter: b"/".to_vec(),
			cursor_key: ObjectKey(Vec::new()),
			cursor_version: Version(0),
			recursive: false,
			pending: false,
			all_versions: false,
			limit: 1000,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NaiveEntry {
	pub key: Vec<u8>,
	pub version: i64,
	pub is_prefix: bool,
}

#[derive(Clone, Debug, Default)]
pub struct NaiveListResult {
	pub entries: Vec<NaiveEntry>,
	pub more: bool,
}

/// A plain, pre-sorted entry list standing in for a whole bucket's rows.
pub struct NaiveObjectsDB {
	rows: Vec<ObjectRow>,
}

impl NaiveObjectsDB {
	pub fn new(mut rows: Vec<ObjectRow>) -> Self {
		rows.sort_by(|a, b| cmp_key_version(&a.object_key, a.version, &b.object_key, b.version, false));
		NaiveObjectsDB { rows }
	}

	/// Walks the entry list key-by-key, grouping consecutive rows that
	/// share a key, applying each of the spec's rules in turn. Written
	/// straight from the prose in spec §4.6 rather than from
	/// `metabase_core::listing`'s vectorized implementation.
	pub fn list(&self, req: &NaiveListRequest) -> NaiveListResult {
		let mut groups: Vec<Vec<&ObjectRow>> = Vec::new();
		for row in &self.rows {
			if row.status.is_pending() != req.pending {
				continue;
			}
			if !row.object_key.has_prefix(&req.prefix) {
				continue;
			}
			match groups.last_mut() {
				Some(g) if g[0].object_key == row.object_key => g.push(row),
				_ => groups.push(vec![row]),
			}
		}

		// within each group, order by version per direction (pending:
		// ascending; committed: descending, i.e. newest first)
		for g in groups.iter_mut() {
			if req.pending {
				g.sort_by_key(|r| r.version);
			} else {
				g.sort_by_key(|r| std::cmp::Reverse(r.version));
			}
		}

		let mut out: Vec<NaiveEntry> = Vec::new();
		let mut last_synthetic: Option<Vec<u8>> = None;
		for g in &groups {
			let rows: Vec<&&ObjectRow> = if req.pending {
				g.iter().collect()
			} else if req.all_versions {
				if g[0].status.is_delete_marker() {
					continue;
				}
				g.iter().collect()
			} else {
				if g[0].status.is_delete_marker() {
					continue;
				}
				vec![&g[0]]
			};

			for row in rows {
				if !req.recursive && !req.delimiter.is_empty() {
					let full = row.object_key.as_bytes();
					let rest = &full[req.prefix.len().min(full.len())..];
					if let Some(pos) = rest
						.windows(req.delimiter.len().max(1))
						.position(|w| w == req.delimiter.as_slice())
					{
						let head = &rest[..pos + req.delimiter.len()];
						let mut synthetic = req.prefix.clone();
						synthetic.extend_from_slice(head);
						if last_synthetic.as_deref() == Some(synthetic.as_slice()) {
							continue;
						}
						last_synthetic = Some(synthetic.clone());
						out.push(NaiveEntry { key: synthetic, version: 0, is_prefix: true });
						continue;
					}
				}
				last_synthetic = None;
				out.push(NaiveEntry {
					key: row.object_key.as_bytes().to_vec(),
					version: row.version.0,
					is_prefix: false,
				});
			}
		}

		out.retain(|e| {
			if e.is_prefix {
				e.key.as_slice() > req.cursor_key.as_bytes()
			} else {
				let key_cmp = e.key.as_slice().cmp(req.cursor_key.as_bytes());
				match key_cmp {
					std::cmp::Ordering::Equal => {
						if req.pending {
							e.version > req.cursor_version.0
						} else {
							e.version < req.cursor_version.0
						}
					}
					std::cmp::Ordering::Greater => true,
					std::cmp::Ordering::Less => false,
				}
			}
		});

		let more = out.len() > req.limit;
		out.truncate(req.limit);
		NaiveListResult { entries: out, more }
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use chrono::Utc;
	use metabase_db::{EncryptedUserData, EncryptionParameters, Retention};
	use metabase_util::data::StreamId;

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
		let db = NaiveObjectsDB::new(vec![
			row("a/a", 1, ObjectStatus::CommittedVersioned),
			row("a/b", 1, ObjectStatus::CommittedVersioned),
			row("b", 1, ObjectStatus::CommittedVersioned),
		]);
		let req = NaiveListRequest {
			cursor_key: ObjectKey(b"a/".to_vec()),
			limit: 2,
			..Default::default()
		};
		let result = db.list(&req);
		assert_eq!(result.entries.len(), 1);
		assert_eq!(result.entries[0].key, b"b");
		assert!(!result.more);
	}

	#[test]
	fn delete_marker_latest_hides_key() {
		let db = NaiveObjectsDB::new(vec![
			row("k", 2, ObjectStatus::DeleteMarkerVersioned),
			row("k", 1, ObjectStatus::CommittedVersioned),
		]);
		let result = db.list(&NaiveListRequest { recursive: true, ..Default::default() });
		assert!(result.entries.is_empty());
	}
}
