//! Persistence seam for blog records.
//!
//! [`BlogStore`] is the only way the service touches persisted data. It
//! mirrors the handful of document-store primitives the handlers need (insert
//! one, find one by id, replace one by id, delete one by id, and a cursor over
//! the whole collection) so that the MongoDB backend and the in-memory backend
//! used in tests are interchangeable behind an `Arc<dyn BlogStore>`.
//!
//! ## Backends
//!
//! - [`mongo::MongoStore`] - a MongoDB collection.
//! - [`memory::MemoryStore`] - a process-local ordered map.

pub mod document;
pub mod memory;
pub mod mongo;

pub use document::{BlogDocument, parse_blog_id};

use blog_tonic_core::Error;
use futures::stream::BoxStream;
use mongodb::bson::oid::ObjectId;
use mongodb::error::ErrorKind as DriverErrorKind;

pub type StoreResult<T> = core::result::Result<T, StoreError>;

/// A one-shot, lazily evaluated sequence of records.
///
/// Dropping the stream releases the underlying cursor, whichever way the
/// consumer stops reading.
pub type RecordCursor = BoxStream<'static, StoreResult<BlogDocument>>;

/// Failures reported by a [`BlogStore`]. All of them surface to clients as
/// `INTERNAL`.
#[derive(Clone, Debug, thiserror::Error)]
pub enum StoreError {
    /// A stored document does not have the record shape.
    #[error("Error while decoding data from store: {0}")]
    Decode(String),

    /// An insert collided with an existing identifier.
    #[error("Duplicate blog id {0}")]
    DuplicateId(ObjectId),

    /// Any other driver failure (connectivity, server errors, cursor errors).
    #[error("Store error: {0}")]
    Driver(mongodb::error::Error),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            DriverErrorKind::BsonDeserialization(e) => Self::Decode(e.to_string()),
            _ => Self::Driver(err),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::internal(err.to_string())
    }
}

/// Document-store operations over a single collection of blog records.
#[tonic::async_trait]
pub trait BlogStore: Send + Sync + 'static {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Inserts a record whose id has already been assigned.
    async fn insert(&self, record: &BlogDocument) -> StoreResult<()>;

    async fn find_by_id(&self, id: ObjectId) -> StoreResult<Option<BlogDocument>>;

    /// Replaces the record stored under `record.id`. Replacing an id that no
    /// longer exists is not an error.
    async fn replace(&self, record: &BlogDocument) -> StoreResult<()>;

    /// Deletes the record stored under `id`, returning how many were removed.
    async fn delete_by_id(&self, id: ObjectId) -> StoreResult<u64>;

    /// Opens a cursor over every record, in the backend's natural order.
    async fn find_all(&self) -> StoreResult<RecordCursor>;

    /// Closes the connection. Called once, after the server stopped serving.
    async fn shutdown(&self) -> StoreResult<()>;
}
