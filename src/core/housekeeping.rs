//! Housekeeping (spec §4.9): table statistics, bucket tallies, stream
//! piece counts. Grounded in `garage_block::manager.rs`'s
//! `BlockManager::resync_queue_len` — a plain read-only counter method
//! surfaced straight off an in-memory structure, the same shape as the
//! snapshots here (spec's Non-goals exclude an external metrics exporter,
//! but the snapshot itself is part of the engine).

use metabase_db::TableStats;
use metabase_util::data::{BucketName, ProjectId, StreamId};
use metabase_util::error::Result;

use crate::Core;

impl Core {
	/// `TableStats` (spec §4.9): row counts for objects, segments and
	/// node aliases, for dashboards and capacity checks.
	pub fn table_stats(&self, project_id: ProjectId) -> Result<TableStats> {
		let adapter = self.router.choose_adapter(project_id);
		adapter.table_stats()
	}

	/// Returns whether the given bucket currently holds any rows, used by
	/// bucket-deletion preconditions.
	pub fn bucket_is_empty(&self, project_id: ProjectId, bucket_name: &BucketName) -> Result<bool> {
		let adapter = self.router.choose_adapter(project_id);
		adapter.bucket_is_empty(project_id, bucket_name)
	}

	/// Number of pieces recorded for a stream, used to cross-check against
	/// a segment's expected redundancy before reporting it healthy.
	pub fn stream_piece_count(&self, project_id: ProjectId, stream_id: StreamId) -> Result<usize> {
		let adapter = self.router.choose_adapter(project_id);
		adapter.stream_piece_count(stream_id)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use metabase_db::MemoryAdapter;
	use std::sync::Arc;

	#[test]
	fn table_stats_reflect_empty_store() {
		let core = Core::new(
			Arc::new(metabase_db::SingleAdapterRouter(Arc::new(MemoryAdapter::new()))),
			metabase_util::config::Config::default(),
		);
		let stats = core.table_stats(ProjectId([0; 16])).unwrap();
		assert_eq!(stats.object_count, 0);
		assert_eq!(stats.segment_count, 0);
	}
}
