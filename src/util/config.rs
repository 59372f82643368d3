//! Configuration surface (spec §6), mirroring `garage_util::config::Config`:
//! a flat struct deserialized from TOML, defaults supplied by `serde`.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
	true
}

fn default_batch_size() -> usize {
	1000
}

fn default_delete_concurrency() -> usize {
	1
}

fn default_zombie_deletion_deadline_secs() -> i64 {
	24 * 3600
}

fn default_min_part_size() -> u64 {
	5 * 1024 * 1024
}

fn default_max_number_of_parts() -> u32 {
	10_000
}

/// Recognized configuration options (spec §6 Configuration table), plus
/// the adapter-level knobs (`batch_size`, `delete_concurrency`,
/// `zombie_deletion_deadline_secs`) the engine needs to be runnable.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Tag attached to all connections for observability.
	pub application_name: String,

	/// Multipart upload validation bound: minimum part size in bytes.
	#[serde(default = "default_min_part_size")]
	pub min_part_size: u64,
	/// Multipart upload validation bound: maximum number of parts.
	#[serde(default = "default_max_number_of_parts")]
	pub max_number_of_parts: u32,

	/// Feature toggle for the server-side copy path.
	#[serde(default = "default_true")]
	pub server_side_copy: bool,
	/// Disables server-side copy even if `server_side_copy` is set.
	pub server_side_copy_disabled: bool,

	/// Switches `ListObjects` between a batched and a streaming iterator.
	pub use_list_objects_iterator: bool,

	/// Cold-start behavior for the node-alias cache: full refresh vs. lazy.
	pub node_alias_cache_full_refresh: bool,

	/// Batch size used by zombie/expired sweepers and bucket wipes.
	#[serde(default = "default_batch_size")]
	pub batch_size: usize,

	/// Concurrency limit for `DeleteExpiredObjects` (spec §5, default 1).
	#[serde(default = "default_delete_concurrency")]
	pub delete_concurrency: usize,

	/// Default zombie-deletion deadline offset, in seconds (spec default +24h).
	#[serde(default = "default_zombie_deletion_deadline_secs")]
	pub zombie_deletion_deadline_secs: i64,

	/// Replaces `HighestVersion + 1` with a server-generated, monotone
	/// timestamp-based version (spec §9 "Next version via timestamps").
	pub timestamp_versioning: bool,

	/// Test-only toggles (spec §6).
	#[serde(default)]
	pub testing_unique_unversioned: bool,
	#[serde(default)]
	pub testing_timestamp_versioning: bool,
	#[serde(default)]
	pub testing_precommit_delete_mode: TestingPrecommitDeleteMode,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			application_name: "metabase".to_string(),
			min_part_size: default_min_part_size(),
			max_number_of_parts: default_max_number_of_parts(),
			server_side_copy: true,
			server_side_copy_disabled: false,
			use_list_objects_iterator: false,
			node_alias_cache_full_refresh: false,
			batch_size: default_batch_size(),
			delete_concurrency: default_delete_concurrency(),
			zombie_deletion_deadline_secs: default_zombie_deletion_deadline_secs(),
			timestamp_versioning: false,
			testing_unique_unversioned: false,
			testing_timestamp_versioning: false,
			testing_precommit_delete_mode: TestingPrecommitDeleteMode::default(),
		}
	}
}

/// Selects between the benchmarked precommit-delete algorithms (spec §4.3),
/// all of which must be behavior-equivalent; exposed only for testing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestingPrecommitDeleteMode {
	#[default]
	SingleStatement,
	SelectThenDelete,
	VersionCheckFirst,
}

impl Config {
	pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(s)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn default_config_roundtrips_through_toml() {
		let cfg = Config::default();
		let s = toml::to_string(&cfg).expect("serialize");
		let back: Config = toml::from_str(&s).expect("deserialize");
		assert_eq!(cfg.application_name, back.application_name);
		assert_eq!(cfg.batch_size, back.batch_size);
	}

	#[test]
	fn empty_toml_uses_defaults() {
		let cfg: Config = toml::from_str("").expect("defaults");
		assert_eq!(cfg.delete_concurrency, 1);
		assert_eq!(cfg.zombie_deletion_deadline_secs, 24 * 3600);
	}
}
