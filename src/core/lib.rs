//! Object lifecycle, precommit, deletion, listing and housekeeping engines
//! for the metabase metadata service. Backend-agnostic: every module here
//! is written against `metabase_db::{Adapter, Transaction}` and never
//! assumes a particular storage engine, mirroring how `garage_model` sits
//! above the storage layer without depending on which key/value engine
//! backs it.

#[macro_use]
extern crate tracing;

use std::sync::Arc;

use metabase_alias::NodeAliasCache;
use metabase_db::AdapterRouter;
use metabase_util::config::Config;

pub mod deletion;
pub mod housekeeping;
pub mod lifecycle;
pub mod listing;
pub mod precommit;
pub mod segment;
pub mod types;
pub mod validate;

/// Entry point wiring the storage contract, the node-alias cache and
/// configuration together. One `Core` per running service, shared behind
/// an `Arc` by every request handler, the way `garage_model::Garage` is
/// the one shared handle into the whole data model.
pub struct Core {
	pub router: Arc<dyn AdapterRouter>,
	pub alias_cache: Arc<NodeAliasCache>,
	pub config: Config,
}

impl Core {
	pub fn new(router: Arc<dyn AdapterRouter>, config: Config) -> Self {
		Core {
			router,
			alias_cache: Arc::new(NodeAliasCache::new()),
			config,
		}
	}

	/// Refreshes the alias cache from storage, sharing one in-flight fetch
	/// across concurrent callers (spec §5). The node-alias table is global,
	/// not per-project, so `ensure_node_aliases` is routed through a fixed
	/// project id; real deployments run one adapter behind
	/// `SingleAdapterRouter` and this never matters.
	pub async fn refresh_aliases(&self, ids: &[metabase_util::data::NodeId]) -> metabase_util::error::Result<()> {
		let adapter = self.router.choose_adapter(default_project_id());
		let ids = ids.to_vec();
		self.alias_cache
			.refresh_with(|| async move { adapter.ensure_node_aliases(&ids).unwrap_or_default() })
			.await;
		Ok(())
	}
}

fn default_project_id() -> metabase_util::data::ProjectId {
	metabase_util::data::ProjectId([0; 16])
}
