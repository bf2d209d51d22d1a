//! Server-streaming support for `ListBlog`.
//!
//! - [`records`] - moves records from a store cursor into the gRPC response
//!   channel.

pub mod records;
