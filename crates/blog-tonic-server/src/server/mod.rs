//! Blog gRPC server internals.
//!
//! - [`config`] - CLI/env configuration.
//! - [`lifecycle`] - serving phases and in-flight call tracking.
//! - [`service`] - the `BlogService` implementation.
//! - [`store`] - persistence backends.
//! - [`streaming`] - `ListBlog` producer.
//! - [`telemetry`] - logging, tracing and metrics setup.

pub mod config;
pub mod lifecycle;
pub mod service;
pub mod store;
pub mod streaming;
pub mod telemetry;


use blog_tonic_core::proto::blog_service_server::BlogServiceServer;
use config::{ServerConfig, StoreBackend};
use service::handler::BlogHandler;
use std::sync::Arc;
use store::{BlogStore, memory::MemoryStore, mongo::MongoStore};
use tonic::codec::CompressionEncoding;

/// Opens the store selected by `config`.
pub async fn connect_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn BlogStore>> {
    let store: Arc<dyn BlogStore> = match config.store {
        StoreBackend::Mongo => {
            tracing::info!("Connecting to MongoDB");
            Arc::new(
                MongoStore::connect(&config.mongo_uri, &config.database, &config.collection)
                    .await?,
            )
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; records are lost on exit");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}

/// Wraps the handler in the generated server with every supported compression
/// encoding enabled.
pub fn build_blog_service(handler: BlogHandler) -> BlogServiceServer<BlogHandler> {
    BlogServiceServer::new(handler)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}
