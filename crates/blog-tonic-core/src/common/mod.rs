pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};

/// gRPC service and message definitions generated from `proto/blog.proto`.
///
/// ## Service
///
/// - `BlogService` - unary `CreateBlog`, `ReadBlog`, `UpdateBlog`,
///   `DeleteBlog` and server-streaming `ListBlog`.
///
/// Both the server trait (`blog_service_server`) and the client
/// (`blog_service_client`) are generated.
pub mod proto {
    tonic::include_proto!("blog");

    /// Encoded file descriptor set used to serve gRPC reflection.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("blog_descriptor");
}
