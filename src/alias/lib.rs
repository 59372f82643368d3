//! NodeAliasMap and the alias-pieces RLE codec (spec §4.1): a leaf crate,
//! depended on only by `metabase_util`, exactly as `garage_util` has no
//! internal dependencies of its own.

pub mod codec;
pub mod map;

pub use codec::{AliasPiece, AliasPieces};
pub use map::{NodeAliasCache, NodeAliasEntry, NodeAliasMap};
