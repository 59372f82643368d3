//! Error taxonomy shared by every metabase crate.
//!
//! Mirrors `garage_util::error::Error`: one flat enum, `err-derive` for the
//! `Display`/`std::error::Error` impls, `From` bridges at every layer
//! boundary so callers can use `?` without manual wrapping.

use err_derive::Error;

/// Stable, programmatically checkable error classes (spec §7).
#[derive(Debug, Error)]
pub enum Error {
	/// Caller-visible precondition violation (missing field, invalid retention, ...)
	#[error(display = "Invalid request: {}", _0)]
	InvalidRequest(String),

	/// Lookup miss, or "no rows deleted" where one was expected
	#[error(display = "Object not found: {}", _0)]
	ObjectNotFound(String),

	/// Duplicate begin at an exact version
	#[error(display = "Object already exists: {}", _0)]
	ObjectAlreadyExists(String),

	/// Segment commit against an absent pending parent
	#[error(display = "Pending object missing: {}", _0)]
	PendingObjectMissing(String),

	/// Retention or legal hold blocked the operation
	#[error(display = "Object lock: {}", _0)]
	ObjectLock(String),

	/// `DisallowDelete` and an unversioned object exists
	#[error(display = "Permission denied: {}", _0)]
	PermissionDenied(String),

	/// e.g. copying a delete marker
	#[error(display = "Method not allowed: {}", _0)]
	MethodNotAllowed(String),

	/// Backend-detected concurrency / constraint violation, safe to retry
	#[error(display = "Failed precondition (retriable): {}", _0)]
	FailedPrecondition(String),

	/// Object-lock + ExpiresAt conflict on copy/move
	#[error(display = "Object expiration conflict: {}", _0)]
	ObjectExpiration(String),

	/// Internal invariant violation: logged at the call site before being
	/// returned, so operators notice data corruption (e.g. two committed
	/// unversioned rows at one key).
	#[error(display = "Internal error: {}", _0)]
	Internal(String),

	/// The calling context was cancelled (§5) while a batch operation was
	/// in flight. Treated as retriable only for idempotent reads by callers.
	#[error(display = "Context canceled")]
	Canceled,

	/// Propagated storage-adapter failure that doesn't fit another class.
	#[error(display = "Storage error: {}", _0)]
	Storage(String),
}

impl Error {
	pub fn invalid_request<M: Into<String>>(msg: M) -> Self {
		Error::InvalidRequest(msg.into())
	}

	pub fn internal<M: Into<String>>(msg: M) -> Self {
		Error::Internal(msg.into())
	}

	/// True for the [`Error::FailedPrecondition`] and [`Error::Canceled`]
	/// classes, which callers may retry on idempotent read paths per §5.
	pub fn is_retriable(&self) -> bool {
		matches!(self, Error::FailedPrecondition(_) | Error::Canceled)
	}
}

pub type Result<T> = std::result::Result<T, Error>;

/// Helper akin to `garage_util::error::OkOrMessage`, used throughout the
/// codebase to turn an `Option` into an `Error::Internal` with context.
pub trait OkOrMessage<T> {
	fn ok_or_message<M: Into<String>>(self, msg: M) -> Result<T>;
}

impl<T> OkOrMessage<T> for Option<T> {
	fn ok_or_message<M: Into<String>>(self, msg: M) -> Result<T> {
		self.ok_or_else(|| Error::Internal(msg.into()))
	}
}
