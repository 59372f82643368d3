//! The storage contract crate (spec §4.2, §6): `Adapter`/`Transaction`
//! traits plus the row shapes that cross that boundary, and an in-memory
//! reference backend. Mirrors `garage_db`'s role as the one crate every
//! backend-specific adapter and every caller depends on.

#[macro_use]
extern crate tracing;

pub mod adapter;
pub mod memory;
pub mod types;

pub use adapter::{
	Adapter, AdapterExt, AdapterRouter, ExcludeFromPending, ObjectLockDeleteOptions, PendingInfo,
	PrecommitConstraintResult, PrecommitDeleteResult, PrecommitInfo, PrecommitQuery,
	SingleAdapterRouter, TableStats, Transaction, TransactionOptions, TxBox, UnversionedInfo,
};
pub use memory::MemoryAdapter;
pub use types::{
	EncryptedUserData, EncryptionParameters, NodeAliasEntry, ObjectRow, ObjectStatus,
	RedundancyScheme, Retention, RetentionMode, SegmentData, SegmentRow, SegmentSummary,
	SegmentVerifyInfo,
};
