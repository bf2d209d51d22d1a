//! Mapping between the wire [`Blog`] message and the persisted document.

use blog_tonic_core::{Error, Result, proto::Blog};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// A blog record as stored in the collection.
///
/// The identifier lives under `_id` as a native object id; the wire form is
/// its 24-character hex encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogDocument {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub author_id: String,
    pub title: String,
    pub content: String,
}

impl BlogDocument {
    /// Builds a new record from a draft, assigning a fresh identifier. Any id
    /// carried by the draft is ignored.
    pub fn create(draft: Blog) -> Self {
        Self {
            id: ObjectId::new(),
            author_id: draft.author_id,
            title: draft.title,
            content: draft.content,
        }
    }

    /// Overwrites every mutable field with the values from `blog`. The id is
    /// left untouched.
    pub fn apply(&mut self, blog: Blog) {
        self.author_id = blog.author_id;
        self.title = blog.title;
        self.content = blog.content;
    }
}

impl From<BlogDocument> for Blog {
    fn from(doc: BlogDocument) -> Self {
        Self {
            id: doc.id.to_hex(),
            author_id: doc.author_id,
            title: doc.title,
            content: doc.content,
        }
    }
}

/// Parses the hex form of a record identifier.
///
/// # Errors
///
/// Returns [`Error::InvalidId`] when `raw` is not a 24-character hex string.
pub fn parse_blog_id(raw: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw).map_err(|e| Error::InvalidId {
        id: raw.to_string(),
        reason: e.to_string(),
    })
}
