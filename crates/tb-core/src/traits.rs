//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{NewPost, PostId, ThreadId, ThreadPreview, ThreadView};

/// Data persistence contract for threads and posts.
///
/// Writes are serializable with respect to each other and reads never see a
/// thread without its opening post.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Creates an empty thread. Prefer `create_thread_with_opening_post`.
    async fn create_thread(&self, title: &str) -> Result<ThreadId>;

    /// Appends a reply. Bumps the thread unless the contact is `sage`.
    async fn append_post(&self, thread_id: ThreadId, post: NewPost) -> Result<PostId>;

    /// Thread and opening post as one unit; on failure neither exists.
    async fn create_thread_with_opening_post(
        &self,
        title: &str,
        post: NewPost,
    ) -> Result<(ThreadId, PostId)>;

    /// All threads by last activity, newest first, each with its preview posts.
    async fn list_threads(&self) -> Result<Vec<ThreadPreview>>;

    async fn get_thread(&self, thread_id: ThreadId) -> Result<ThreadView>;
}

/// Derives the public fingerprint shown next to a poster's name.
pub trait TripcodeGenerator: Send + Sync {
    /// `secret` includes its leading sigil (`#`). Never fails: malformed
    /// fixed-trip requests yield a placeholder.
    fn derive(&self, secret: &str) -> String;
}
