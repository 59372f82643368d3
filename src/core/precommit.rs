//! Precommit engine (spec §4.3): orchestrates `Transaction::precommit_query`
//! / `precommit_delete_unversioned_with_non_pending` / `precommit_constraint`
//! — the actual row-scanning algorithm lives on the `Transaction` trait
//! (it is one efficient statement on a real backend) — and turns their
//! results into the values `lifecycle`/`deletion` need.
//!
//! Grounded in `garage_model::s3::object_table::Crdt::merge`'s "highest
//! version wins, obsolete versions are dropped" logic, generalized from
//! CRDT merge to the locked read-then-write this spec's linearizable-per-key
//! model requires (spec §9, §4.3 ambient notes).

use metabase_db::{
	ObjectLockDeleteOptions, PrecommitConstraintResult, PrecommitDeleteResult, PrecommitInfo,
	PrecommitQuery, Transaction,
};
use metabase_util::error::Result;

/// Thin pass-through: the heavy lifting (multiple-unversioned-rows
/// detection, missing-pending-row rejection) is enforced by the adapter's
/// `Transaction::precommit_query`, since a real backend answers this with
/// one query. This wrapper exists so `lifecycle`/`deletion` never call the
/// `Transaction` trait directly, keeping the precommit contract in one place.
pub fn query(tx: &mut dyn Transaction, q: &PrecommitQuery) -> Result<PrecommitInfo> {
	tx.precommit_query(q)
}

/// Deletes the unversioned predecessor at `loc`, honoring object lock
/// (spec §4.3 steps 1-4).
pub fn delete_unversioned_with_non_pending(
	tx: &mut dyn Transaction,
	loc: &metabase_util::data::ObjectLocation,
	opts: ObjectLockDeleteOptions,
) -> Result<PrecommitDeleteResult> {
	tx.precommit_delete_unversioned_with_non_pending(loc, opts)
}

/// Enforces `Versioned`/`DisallowDelete` semantics for
/// `BeginCopyObject`/`BeginObject*` paths that don't go through the full
/// commit precommit flow (spec §4.3 `PrecommitConstraint`).
pub fn constraint(
	tx: &mut dyn Transaction,
	loc: &metabase_util::data::ObjectLocation,
	versioned: bool,
	disallow_delete: bool,
) -> Result<PrecommitConstraintResult> {
	tx.precommit_constraint(loc, versioned, disallow_delete)
}
