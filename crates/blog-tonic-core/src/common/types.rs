//! Shared constants and conveniences for the generated [`Blog`] message.
//!
//! Server and client agree on the listening address and on the textual form
//! of identifiers here, so neither side hardcodes them independently.

use crate::proto::Blog;

/// Address the server binds when none is configured.
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:50051";

/// Endpoint the demo client dials when none is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:50051";

/// Length of a hex-encoded record identifier (a 12-byte object id).
pub const BLOG_ID_HEX_LEN: usize = 24;

impl Blog {
    /// A record that has not been stored yet (empty `id`).
    pub fn draft(
        author_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            author_id: author_id.into(),
            title: title.into(),
            content: content.into(),
        }
    }

    /// Returns the same record carrying `id`.
    pub fn with_id(self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_has_no_id() {
        let blog = Blog::draft("jane", "My first blog", "Content of the first blog");
        assert!(blog.id.is_empty());
        assert_eq!(blog.author_id, "jane");

        let stored = blog.with_id("5c54b08ebe020342da2b13a8");
        assert_eq!(stored.id.len(), BLOG_ID_HEX_LEN);
        assert_eq!(stored.title, "My first blog");
    }
}
