//! # Domain Models
//!
//! These structs represent the core entities of Tripboard.
//! Identifiers are store-assigned integers, increasing in creation order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Contact value that keeps a reply from bumping its thread.
pub const SAGE: &str = "sage";

/// Number of posts shown per thread on the index.
pub const PREVIEW_POSTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Thread contains a collection of Posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// The timestamp used for sorting threads by activity
    pub last_activity: DateTime<Utc>,
}

/// The fundamental unit of conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub thread_id: ThreadId,
    /// Display name, tripcode included when one was requested
    pub name: String,
    /// Free-form contact field; `sage` suppresses bumping
    pub contact: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn is_sage(&self) -> bool {
        self.contact == SAGE
    }
}

/// Fields of a post as handed to the store, before an id and timestamp exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub name: String,
    pub contact: String,
    pub text: String,
}

impl NewPost {
    pub fn new(name: impl Into<String>, contact: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contact: contact.into(),
            text: text.into(),
        }
    }

    pub fn is_sage(&self) -> bool {
        self.contact == SAGE
    }
}

/// A thread as shown on the index: itself plus its most recent posts, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPreview {
    pub thread: Thread,
    pub posts: Vec<Post>,
}

/// A thread with every post it holds, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadView {
    pub thread: Thread,
    pub posts: Vec<Post>,
}
