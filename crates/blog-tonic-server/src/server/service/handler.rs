//! gRPC service implementation for blog records.
//!
//! This module defines [`BlogHandler`], the concrete implementation of the
//! [`BlogService`] gRPC service defined in the protobuf specification. Each
//! unary call translates into a single store operation (Update performs a find
//! followed by a replace) and `ListBlog` streams the collection one record per
//! message.
//!
//! ## Responsibilities
//!
//! - Admit calls only while the server is serving; refuse them while draining.
//! - Parse identifiers and classify failures as invalid-argument, not-found or
//!   internal.
//! - Stream `ListBlog` results through a bounded channel fed by
//!   [`feed_records`].

use crate::server::{
    config::ServerConfig,
    lifecycle::{InflightGuard, Lifecycle},
    store::{BlogDocument, BlogStore, parse_blog_id},
    streaming::records::feed_records,
    telemetry::{
        increment_errors, increment_records_streamed, increment_requests, record_list_duration,
    },
};
use blog_tonic_core::{
    Error, Result,
    proto::{
        Blog, CreateBlogRequest, CreateBlogResponse, DeleteBlogRequest, DeleteBlogResponse,
        ListBlogRequest, ListBlogResponse, ReadBlogRequest, ReadBlogResponse, UpdateBlogRequest,
        UpdateBlogResponse, blog_service_server::BlogService,
    },
};
use core::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status};
use tracing::Instrument;

const CREATE_BLOG: &str = "CreateBlog";
const READ_BLOG: &str = "ReadBlog";
const UPDATE_BLOG: &str = "UpdateBlog";
const DELETE_BLOG: &str = "DeleteBlog";
const LIST_BLOG: &str = "ListBlog";

/// gRPC service for creating, reading, updating, deleting and listing blog
/// records.
///
/// Holds no per-record state: every call reads from or writes to the injected
/// [`BlogStore`]. Cloning is cheap and clones share the store and lifecycle.
#[derive(Clone)]
pub struct BlogHandler {
    store: Arc<dyn BlogStore>,
    lifecycle: Arc<Lifecycle>,
    stream_buffer_size: usize,
}

impl BlogHandler {
    pub fn new(
        store: Arc<dyn BlogStore>,
        lifecycle: Arc<Lifecycle>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            store,
            lifecycle,
            stream_buffer_size: config.stream_buffer_size,
        }
    }

    /// Inserts `draft` under a freshly assigned id and returns the stored
    /// record.
    pub async fn create(&self, draft: Blog) -> Result<Blog> {
        let record = BlogDocument::create(draft);
        self.store.insert(&record).await?;
        Ok(record.into())
    }

    pub async fn read(&self, blog_id: &str) -> Result<Blog> {
        let id = parse_blog_id(blog_id)?;
        self.store
            .find_by_id(id)
            .await?
            .map(Blog::from)
            .ok_or_else(|| Error::NotFound {
                id: blog_id.to_string(),
            })
    }

    /// Overwrites `author_id`, `title` and `content` of the record named by
    /// `blog.id`.
    ///
    /// The lookup and the replacement are two separate store operations;
    /// concurrent updates of the same id can lose one writer's change.
    pub async fn update(&self, blog: Blog) -> Result<Blog> {
        let id = parse_blog_id(&blog.id)?;
        let mut record = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound {
                id: blog.id.clone(),
            })?;

        record.apply(blog);
        self.store.replace(&record).await?;
        Ok(record.into())
    }

    /// Deletes the record named by `blog_id` and echoes the id back.
    pub async fn delete(&self, blog_id: String) -> Result<String> {
        let id = parse_blog_id(&blog_id)?;
        match self.store.delete_by_id(id).await? {
            0 => Err(Error::NotFound { id: blog_id }),
            _ => Ok(blog_id),
        }
    }

    /// Counts the call and registers it as in flight.
    fn admit(&self, method: &'static str) -> core::result::Result<InflightGuard, Status> {
        increment_requests(method);
        self.lifecycle
            .admit()
            .map_err(|err| Self::reject(method, err))
    }

    fn reject(method: &'static str, err: Error) -> Status {
        increment_errors(method, err.kind());
        match &err {
            Error::Internal { .. } => tracing::error!(method, "{err}"),
            _ => tracing::warn!(method, "{err}"),
        }
        err.into()
    }

    fn respond<T>(
        method: &'static str,
        result: Result<T>,
    ) -> core::result::Result<Response<T>, Status> {
        result
            .map(Response::new)
            .map_err(|err| Self::reject(method, err))
    }
}

#[tonic::async_trait]
impl BlogService for BlogHandler {
    type ListBlogStream =
        Pin<Box<dyn Stream<Item = core::result::Result<ListBlogResponse, Status>> + Send>>;

    #[tracing::instrument(skip_all)]
    async fn create_blog(
        &self,
        req: Request<CreateBlogRequest>,
    ) -> core::result::Result<Response<CreateBlogResponse>, Status> {
        let _guard = self.admit(CREATE_BLOG)?;
        tracing::info!("Create blog request");

        let draft = req.into_inner().blog.unwrap_or_default();
        let result = self.create(draft).await.map(|blog| {
            tracing::debug!(blog_id = %blog.id, "Blog created");
            CreateBlogResponse { blog: Some(blog) }
        });
        Self::respond(CREATE_BLOG, result)
    }

    #[tracing::instrument(skip_all, fields(blog_id = %req.get_ref().blog_id))]
    async fn read_blog(
        &self,
        req: Request<ReadBlogRequest>,
    ) -> core::result::Result<Response<ReadBlogResponse>, Status> {
        let _guard = self.admit(READ_BLOG)?;
        tracing::info!("Read blog request");

        let result = self
            .read(&req.get_ref().blog_id)
            .await
            .map(|blog| ReadBlogResponse { blog: Some(blog) });
        Self::respond(READ_BLOG, result)
    }

    #[tracing::instrument(
        skip_all,
        fields(blog_id = %req.get_ref().blog.as_ref().map(|b| b.id.as_str()).unwrap_or_default())
    )]
    async fn update_blog(
        &self,
        req: Request<UpdateBlogRequest>,
    ) -> core::result::Result<Response<UpdateBlogResponse>, Status> {
        let _guard = self.admit(UPDATE_BLOG)?;
        tracing::info!("Update blog request");

        let blog = req.into_inner().blog.unwrap_or_default();
        let result = self
            .update(blog)
            .await
            .map(|blog| UpdateBlogResponse { blog: Some(blog) });
        Self::respond(UPDATE_BLOG, result)
    }

    #[tracing::instrument(skip_all, fields(blog_id = %req.get_ref().blog_id))]
    async fn delete_blog(
        &self,
        req: Request<DeleteBlogRequest>,
    ) -> core::result::Result<Response<DeleteBlogResponse>, Status> {
        let _guard = self.admit(DELETE_BLOG)?;
        tracing::info!("Delete blog request");

        let result = self
            .delete(req.into_inner().blog_id)
            .await
            .map(|blog_id| DeleteBlogResponse { blog_id });
        Self::respond(DELETE_BLOG, result)
    }

    /// Streams every record in the collection.
    ///
    /// The cursor is opened before the response starts so that a failure to
    /// open it surfaces as the call's status. Reading happens on a spawned
    /// task which holds the in-flight guard until the cursor is exhausted,
    /// fails, or the client goes away.
    #[tracing::instrument(skip_all)]
    async fn list_blog(
        &self,
        _req: Request<ListBlogRequest>,
    ) -> core::result::Result<Response<Self::ListBlogStream>, Status> {
        let guard = self.admit(LIST_BLOG)?;
        tracing::info!("List blog request");

        let start = std::time::Instant::now();
        let cursor = self
            .store
            .find_all()
            .await
            .map_err(|e| Self::reject(LIST_BLOG, e.into()))?;

        let (resp_tx, resp_rx) = mpsc::channel(self.stream_buffer_size);
        let shutdown = self.lifecycle.shutdown_token();

        let fut = async move {
            let _guard = guard;
            match feed_records(cursor, resp_tx, shutdown).await {
                Ok(count) => {
                    increment_records_streamed(count);
                    tracing::debug!(count, "List stream complete");
                }
                Err(Error::RequestCancelled) => {
                    increment_errors(LIST_BLOG, Error::RequestCancelled.kind());
                    tracing::debug!("Client disconnected mid-stream");
                }
                Err(e) => {
                    increment_errors(LIST_BLOG, e.kind());
                    tracing::warn!("Error: {}", e);
                }
            }
            record_list_duration(start.elapsed().as_secs_f64() * 1000.0);
        }
        .instrument(tracing::info_span!("streaming"));

        tokio::spawn(fut);

        Ok(Response::new(Box::pin(ReceiverStream::new(resp_rx))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::store::{RecordCursor, StoreError, StoreResult, memory::MemoryStore};
    use blog_tonic_core::ErrorKind;
    use futures::{StreamExt, TryStreamExt, future::try_join_all};
    use mongodb::bson::oid::ObjectId;
    use std::collections::HashSet;
    use tonic::Code;

    const UNKNOWN_ID: &str = "5c54b08ebe020342da2b13a8";

    fn handler_with(store: Arc<dyn BlogStore>) -> (BlogHandler, Arc<Lifecycle>) {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.mark_serving();
        let handler = BlogHandler::new(
            store,
            Arc::clone(&lifecycle),
            &ServerConfig::for_memory_store(),
        );
        (handler, lifecycle)
    }

    fn handler() -> BlogHandler {
        handler_with(Arc::new(MemoryStore::new())).0
    }

    async fn create(handler: &BlogHandler, author: &str, title: &str, content: &str) -> Blog {
        handler
            .create_blog(Request::new(CreateBlogRequest {
                blog: Some(Blog::draft(author, title, content)),
            }))
            .await
            .expect("create")
            .into_inner()
            .blog
            .expect("blog in response")
    }

    async fn list(handler: &BlogHandler) -> core::result::Result<Vec<Blog>, Status> {
        handler
            .list_blog(Request::new(ListBlogRequest {}))
            .await?
            .into_inner()
            .map_ok(|msg| msg.blog.unwrap_or_default())
            .try_collect()
            .await
    }

    #[tokio::test]
    async fn create_then_read_returns_same_fields() -> anyhow::Result<()> {
        let handler = handler();
        let created = create(&handler, "jane", "My first blog", "Content of the first blog").await;
        assert!(!created.id.is_empty());

        let read = handler
            .read_blog(Request::new(ReadBlogRequest {
                blog_id: created.id.clone(),
            }))
            .await?
            .into_inner()
            .blog
            .unwrap_or_default();

        assert_eq!(read, created);
        assert_eq!(read.author_id, "jane");
        assert_eq!(read.title, "My first blog");
        assert_eq!(read.content, "Content of the first blog");
        Ok(())
    }

    #[tokio::test]
    async fn create_ignores_client_supplied_id() {
        let handler = handler();
        let created = handler
            .create(Blog::draft("a", "b", "c").with_id(UNKNOWN_ID))
            .await
            .expect("create");
        assert_ne!(created.id, UNKNOWN_ID);
    }

    #[tokio::test]
    async fn create_without_blog_stores_empty_record() -> anyhow::Result<()> {
        let handler = handler();
        let created = handler
            .create_blog(Request::new(CreateBlogRequest { blog: None }))
            .await?
            .into_inner()
            .blog
            .unwrap_or_default();

        assert!(!created.id.is_empty());
        assert!(created.title.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_id_is_invalid_argument() {
        let handler = handler();

        let read = handler
            .read_blog(Request::new(ReadBlogRequest {
                blog_id: "not-an-id".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(read.code(), Code::InvalidArgument);

        let update = handler
            .update_blog(Request::new(UpdateBlogRequest {
                blog: Some(Blog::draft("a", "b", "c").with_id("not-an-id")),
            }))
            .await
            .unwrap_err();
        assert_eq!(update.code(), Code::InvalidArgument);

        let delete = handler
            .delete_blog(Request::new(DeleteBlogRequest {
                blog_id: "not-an-id".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(delete.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let handler = handler();

        assert_eq!(
            handler.read(UNKNOWN_ID).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            handler
                .update(Blog::draft("a", "b", "c").with_id(UNKNOWN_ID))
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            handler.delete(UNKNOWN_ID.into()).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn update_overwrites_fields_and_keeps_id() -> anyhow::Result<()> {
        let handler = handler();
        let created = create(&handler, "jane", "My first blog", "Content of the first blog").await;

        let updated = handler
            .update_blog(Request::new(UpdateBlogRequest {
                blog: Some(
                    Blog::draft("abc", "My first blog (edited)", "Content (edited)")
                        .with_id(created.id.clone()),
                ),
            }))
            .await?
            .into_inner()
            .blog
            .unwrap_or_default();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.author_id, "abc");
        assert_eq!(updated.title, "My first blog (edited)");
        assert_eq!(updated.content, "Content (edited)");

        assert_eq!(handler.read(&created.id).await?, updated);
        Ok(())
    }

    #[tokio::test]
    async fn delete_returns_id_and_removes_record() -> anyhow::Result<()> {
        let handler = handler();
        let created = create(&handler, "a", "b", "c").await;

        let deleted = handler
            .delete_blog(Request::new(DeleteBlogRequest {
                blog_id: created.id.clone(),
            }))
            .await?
            .into_inner();
        assert_eq!(deleted.blog_id, created.id);

        let err = handler
            .read_blog(Request::new(ReadBlogRequest {
                blog_id: created.id.clone(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);

        let again = handler.delete(created.id).await.unwrap_err();
        assert_eq!(again.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn list_returns_each_record_once() -> anyhow::Result<()> {
        let handler = handler();
        let mut created = Vec::new();
        for i in 0..5 {
            created.push(create(&handler, "author", &format!("post {i}"), "content").await);
        }

        let listed = list(&handler).await?;
        assert_eq!(listed.len(), created.len());
        for blog in &created {
            assert_eq!(listed.iter().filter(|b| *b == blog).count(), 1);
        }
        Ok(())
    }

    #[tokio::test]
    async fn list_on_empty_collection_yields_nothing() -> anyhow::Result<()> {
        assert!(list(&handler()).await?.is_empty());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_never_collide() -> anyhow::Result<()> {
        let handler = handler();
        let tasks = (0..64).map(|i| {
            let handler = handler.clone();
            tokio::spawn(async move {
                handler
                    .create(Blog::draft("author", format!("post {i}"), "c"))
                    .await
            })
        });

        let mut ids = HashSet::new();
        for result in try_join_all(tasks).await? {
            assert!(ids.insert(result?.id));
        }
        assert_eq!(ids.len(), 64);
        assert_eq!(list(&handler).await?.len(), 64);
        Ok(())
    }

    #[tokio::test]
    async fn draining_refuses_calls() {
        let (handler, lifecycle) = handler_with(Arc::new(MemoryStore::new()));
        lifecycle.begin_drain();

        let err = handler
            .read_blog(Request::new(ReadBlogRequest {
                blog_id: UNKNOWN_ID.into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);

        let err = handler
            .list_blog(Request::new(ListBlogRequest {}))
            .await
            .err()
            .expect("list refused");
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(lifecycle.inflight(), 0);
    }

    /// A store whose writes always fail. Lookups serve the seeded records and
    /// the cursor fails after yielding them, unless `unreachable` is set, in
    /// which case lookups and opening the cursor fail too.
    struct BrokenStore {
        seeded: Vec<BlogDocument>,
        unreachable: bool,
    }

    impl BrokenStore {
        fn seeded(seeded: Vec<BlogDocument>) -> Self {
            Self {
                seeded,
                unreachable: false,
            }
        }

        fn unreachable() -> Self {
            Self {
                seeded: Vec::new(),
                unreachable: true,
            }
        }

        fn failure() -> StoreError {
            let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset");
            StoreError::Driver(io.into())
        }
    }

    #[tonic::async_trait]
    impl BlogStore for BrokenStore {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn insert(&self, _record: &BlogDocument) -> StoreResult<()> {
            Err(Self::failure())
        }

        async fn find_by_id(&self, id: ObjectId) -> StoreResult<Option<BlogDocument>> {
            if self.unreachable {
                return Err(Self::failure());
            }
            Ok(self.seeded.iter().find(|d| d.id == id).cloned())
        }

        async fn replace(&self, _record: &BlogDocument) -> StoreResult<()> {
            Err(Self::failure())
        }

        async fn delete_by_id(&self, _id: ObjectId) -> StoreResult<u64> {
            Err(Self::failure())
        }

        async fn find_all(&self) -> StoreResult<RecordCursor> {
            if self.unreachable {
                return Err(Self::failure());
            }
            let items = self
                .seeded
                .iter()
                .cloned()
                .map(Ok)
                .chain(core::iter::once(Err(StoreError::Decode("missing field `title`".into()))));
            Ok(futures::stream::iter(items.collect::<Vec<_>>()).boxed())
        }

        async fn shutdown(&self) -> StoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn store_failures_are_internal() {
        let existing = BlogDocument::create(Blog::draft("a", "b", "c"));
        let existing_id = existing.id.to_hex();
        let (handler, _) = handler_with(Arc::new(BrokenStore::seeded(vec![existing])));

        let create = handler.create(Blog::draft("a", "b", "c")).await.unwrap_err();
        assert_eq!(create.kind(), ErrorKind::Internal);

        let update = handler
            .update(Blog::draft("x", "y", "z").with_id(existing_id.clone()))
            .await
            .unwrap_err();
        assert_eq!(update.kind(), ErrorKind::Internal);

        let delete = handler.delete(existing_id).await.unwrap_err();
        assert_eq!(delete.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn failed_lookups_are_internal() {
        let (handler, lifecycle) = handler_with(Arc::new(BrokenStore::unreachable()));

        let status = handler
            .read_blog(Request::new(ReadBlogRequest {
                blog_id: UNKNOWN_ID.to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Internal);

        let status = handler
            .update_blog(Request::new(UpdateBlogRequest {
                blog: Some(Blog::draft("x", "y", "z").with_id(UNKNOWN_ID)),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Internal);

        let status = handler
            .list_blog(Request::new(ListBlogRequest {}))
            .await
            .err()
            .expect("list refused");
        assert_eq!(status.code(), Code::Internal);

        assert_eq!(lifecycle.inflight(), 0);
    }

    #[tokio::test]
    async fn list_failure_mid_stream_keeps_earlier_records() {
        let seeded: Vec<_> = (0..3)
            .map(|i| BlogDocument::create(Blog::draft("a", format!("post {i}"), "c")))
            .collect();
        let (handler, lifecycle) = handler_with(Arc::new(BrokenStore::seeded(seeded.clone())));

        let items: Vec<_> = handler
            .list_blog(Request::new(ListBlogRequest {}))
            .await
            .expect("stream opened")
            .into_inner()
            .collect()
            .await;

        assert_eq!(items.len(), seeded.len() + 1);
        for (item, doc) in items.iter().zip(&seeded) {
            let blog = item.as_ref().expect("record").blog.clone().unwrap_or_default();
            assert_eq!(blog.id, doc.id.to_hex());
        }
        let last = items.last().and_then(|item| item.as_ref().err()).expect("final status");
        assert_eq!(last.code(), Code::Internal);

        // The producer task releases its guard once the stream is finished.
        tokio::time::timeout(core::time::Duration::from_secs(1), async {
            while lifecycle.inflight() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("in-flight guard released");
    }
}
