//! MongoDB [`BlogStore`] backend.
//!
//! Each operation is a single driver call against one collection. The cursor
//! returned by `find_all` is the driver's own; dropping it kills the
//! server-side cursor.

use super::{BlogDocument, BlogStore, RecordCursor, StoreError, StoreResult};
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client, Collection,
    bson::{doc, oid::ObjectId},
};

pub struct MongoStore {
    client: Client,
    collection: Collection<BlogDocument>,
}

impl MongoStore {
    /// Connects to `uri` and binds the `database.collection` namespace.
    ///
    /// The driver connects lazily, so a `ping` is issued to fail fast when the
    /// deployment is unreachable.
    pub async fn connect(uri: &str, database: &str, collection: &str) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(database);
        db.run_command(doc! { "ping": 1 }).await?;

        tracing::info!(database, collection, "Connected to MongoDB");

        Ok(Self {
            collection: db.collection(collection),
            client,
        })
    }
}

#[tonic::async_trait]
impl BlogStore for MongoStore {
    fn name(&self) -> &'static str {
        "mongo"
    }

    async fn insert(&self, record: &BlogDocument) -> StoreResult<()> {
        self.collection.insert_one(record).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: ObjectId) -> StoreResult<Option<BlogDocument>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn replace(&self, record: &BlogDocument) -> StoreResult<()> {
        self.collection
            .replace_one(doc! { "_id": record.id }, record)
            .await?;
        Ok(())
    }

    async fn delete_by_id(&self, id: ObjectId) -> StoreResult<u64> {
        let res = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(res.deleted_count)
    }

    async fn find_all(&self) -> StoreResult<RecordCursor> {
        let cursor = self.collection.find(doc! {}).await?;
        Ok(cursor.map_err(StoreError::from).boxed())
    }

    async fn shutdown(&self) -> StoreResult<()> {
        self.client.clone().shutdown().await;
        tracing::info!("MongoDB connection closed");
        Ok(())
    }
}
