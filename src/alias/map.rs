//! `NodeAliasMap`: bidirectional NodeID <-> NodeAlias table, with an
//! in-process, single-flight-refreshing cache on top (spec §4.1, §5).

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::Mutex as AsyncMutex;

use metabase_util::data::{NodeAlias, NodeId};

/// One row of the `node_aliases` table (spec §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeAliasEntry {
	pub node_id: NodeId,
	pub node_alias: NodeAlias,
}

/// Dense `alias -> NodeID` array plus a `NodeID -> alias` hash map.
/// Lookups are O(1) in both directions. Safe for concurrent read after
/// construction.
#[derive(Default)]
pub struct NodeAliasMap {
	by_alias: Vec<Option<NodeId>>, // index 0 unused (aliases start at 1)
	by_id: HashMap<NodeId, NodeAlias>,
}

impl NodeAliasMap {
	pub fn new() -> Self {
		NodeAliasMap {
			by_alias: vec![None],
			by_id: HashMap::new(),
		}
	}

	pub fn from_entries(entries: impl IntoIterator<Item = NodeAliasEntry>) -> Self {
		let mut map = NodeAliasMap::new();
		for e in entries {
			map.insert(e.node_id, e.node_alias);
		}
		map
	}

	fn insert(&mut self, id: NodeId, alias: NodeAlias) {
		let idx = alias.0 as usize;
		if self.by_alias.len() <= idx {
			self.by_alias.resize(idx + 1, None);
		}
		self.by_alias[idx] = Some(id);
		self.by_id.insert(id, alias);
	}

	pub fn node(&self, alias: NodeAlias) -> Option<NodeId> {
		self.by_alias.get(alias.0 as usize).copied().flatten()
	}

	pub fn alias(&self, id: &NodeId) -> Option<NodeAlias> {
		self.by_id.get(id).copied()
	}

	/// Bulk lookup. Returns the hit list (in input order, only entries
	/// that resolved) and the list of inputs that were missing.
	pub fn nodes(&self, aliases: &[NodeAlias]) -> (Vec<NodeId>, Vec<NodeAlias>) {
		let mut hits = Vec::with_capacity(aliases.len());
		let mut missing = Vec::new();
		for &a in aliases {
			match self.node(a) {
				Some(id) => hits.push(id),
				None => missing.push(a),
			}
		}
		(hits, missing)
	}

	pub fn aliases(&self, ids: &[NodeId]) -> (Vec<NodeAlias>, Vec<NodeId>) {
		let mut hits = Vec::with_capacity(ids.len());
		let mut missing = Vec::new();
		for id in ids {
			match self.alias(id) {
				Some(a) => hits.push(a),
				None => missing.push(*id),
			}
		}
		(hits, missing)
	}

	/// Largest seen alias, or -1 when empty.
	pub fn max(&self) -> i32 {
		(self.by_alias.len() as i32) - 2
	}

	/// Union-merge another map into this one. On alias collisions, the
	/// incoming (`other`) entry wins (right-biased), matching the
	/// background-refresh semantics of spec §4.1.
	pub fn merge(&mut self, other: &NodeAliasMap) {
		for (id, alias) in other.by_id.iter() {
			self.insert(*id, *alias);
		}
	}

	/// Next dense alias to allocate for a newly observed NodeID.
	pub fn next_alias(&self) -> NodeAlias {
		NodeAlias(self.max() + 1)
	}
}

/// Process-wide, thread-safe alias cache with a single-flight refresh
/// path (spec §5: "concurrent callers requesting an unknown NodeID share
/// one storage fetch").
pub struct NodeAliasCache {
	inner: RwLock<NodeAliasMap>,
	refresh_lock: AsyncMutex<()>,
}

impl Default for NodeAliasCache {
	fn default() -> Self {
		Self::new()
	}
}

impl NodeAliasCache {
	pub fn new() -> Self {
		NodeAliasCache {
			inner: RwLock::new(NodeAliasMap::new()),
			refresh_lock: AsyncMutex::new(()),
		}
	}

	pub fn node(&self, alias: NodeAlias) -> Option<NodeId> {
		self.inner.read().unwrap().node(alias)
	}

	pub fn alias(&self, id: &NodeId) -> Option<NodeAlias> {
		self.inner.read().unwrap().alias(id)
	}

	pub fn nodes(&self, aliases: &[NodeAlias]) -> (Vec<NodeId>, Vec<NodeAlias>) {
		self.inner.read().unwrap().nodes(aliases)
	}

	pub fn aliases(&self, ids: &[NodeId]) -> (Vec<NodeAlias>, Vec<NodeId>) {
		self.inner.read().unwrap().aliases(ids)
	}

	/// Runs `fetch` to repopulate the map from storage, holding the
	/// refresh lock so concurrent callers share one in-flight fetch
	/// rather than issuing redundant storage round-trips.
	pub async fn refresh_with<F, Fut>(&self, fetch: F)
	where
		F: FnOnce() -> Fut,
		Fut: std::future::Future<Output = Vec<NodeAliasEntry>>,
	{
		let _guard = self.refresh_lock.lock().await;
		let entries = fetch().await;
		let fresh = NodeAliasMap::from_entries(entries);
		self.inner.write().unwrap().merge(&fresh);
	}

	/// Registers newly observed entries directly, e.g. right after
	/// `EnsureNodeAliases` allocates them on the adapter.
	pub fn observe(&self, entries: impl IntoIterator<Item = NodeAliasEntry>) {
		let mut guard = self.inner.write().unwrap();
		for e in entries {
			guard.insert(e.node_id, e.node_alias);
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn id(b: u8) -> NodeId {
		NodeId([b; 32])
	}

	#[test]
	fn empty_map_max_is_minus_one() {
		let m = NodeAliasMap::new();
		assert_eq!(m.max(), -1);
	}

	#[test]
	fn bijective_on_observed_set() {
		let mut m = NodeAliasMap::new();
		m.insert(id(1), NodeAlias(1));
		m.insert(id(2), NodeAlias(2));
		assert_eq!(m.node(NodeAlias(1)), Some(id(1)));
		assert_eq!(m.node(NodeAlias(2)), Some(id(2)));
		assert_eq!(m.alias(&id(1)), Some(NodeAlias(1)));
		assert_eq!(m.alias(&id(2)), Some(NodeAlias(2)));
		assert_eq!(m.max(), 2);
	}

	#[test]
	fn bulk_lookup_reports_missing_in_order() {
		let mut m = NodeAliasMap::new();
		m.insert(id(1), NodeAlias(1));
		let (hits, missing) = m.nodes(&[NodeAlias(1), NodeAlias(5)]);
		assert_eq!(hits, vec![id(1)]);
		assert_eq!(missing, vec![NodeAlias(5)]);
	}

	#[test]
	fn merge_is_right_biased_on_alias_collision() {
		let mut a = NodeAliasMap::new();
		a.insert(id(1), NodeAlias(1));
		let mut b = NodeAliasMap::new();
		b.insert(id(2), NodeAlias(1));
		a.merge(&b);
		assert_eq!(a.node(NodeAlias(1)), Some(id(2)));
	}

	#[tokio::test]
	async fn cache_refresh_populates_map() {
		let cache = NodeAliasCache::new();
		cache
			.refresh_with(|| async {
				vec![NodeAliasEntry {
					node_id: id(9),
					node_alias: NodeAlias(1),
				}]
			})
			.await;
		assert_eq!(cache.alias(&id(9)), Some(NodeAlias(1)));
	}
}
