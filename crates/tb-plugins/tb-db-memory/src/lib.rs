//! # tb-db-memory
//!
//! In-memory implementation of `ThreadStore`, for tests and embedding.
//!
//! All state sits behind one `RwLock`: writers hold it exclusively, so they are
//! serialized, and readers share it, so each read sees a single snapshot.
//! Every write checks everything it can fail on before touching the state.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tb_core::clock::MonotonicClock;
use tb_core::error::{AppError, Result};
use tb_core::models::{
    NewPost, Post, PostId, Thread, ThreadId, ThreadPreview, ThreadView, PREVIEW_POSTS,
};
use tb_core::traits::ThreadStore;
use tb_core::validation::{validate_post, validate_title};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct BoardState {
    threads: BTreeMap<ThreadId, Thread>,
    /// Posts per thread, in insertion order (which is also timestamp order).
    posts: HashMap<ThreadId, Vec<Post>>,
    last_thread_id: i64,
    last_post_id: i64,
}

impl BoardState {
    fn next_thread_id(&self) -> Result<ThreadId> {
        let id = ThreadId(self.last_thread_id + 1);
        if self.threads.contains_key(&id) {
            return Err(AppError::StorageConflict(format!("thread id {id} already taken")));
        }
        Ok(id)
    }

    fn next_post_id(&self) -> PostId {
        PostId(self.last_post_id + 1)
    }

    fn insert_thread(&mut self, thread: Thread) {
        self.last_thread_id = thread.id.0;
        self.posts.entry(thread.id).or_default();
        self.threads.insert(thread.id, thread);
    }

    fn insert_post(&mut self, post: Post) {
        self.last_post_id = post.id.0;
        self.posts.entry(post.thread_id).or_default().push(post);
    }
}

#[derive(Debug, Default)]
pub struct MemoryThreadStore {
    state: RwLock<BoardState>,
    clock: MonotonicClock,
}

impl MemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn thread_count(&self) -> usize {
        self.state.read().await.threads.len()
    }

    pub async fn post_count(&self) -> usize {
        self.state.read().await.posts.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl ThreadStore for MemoryThreadStore {
    async fn create_thread(&self, title: &str) -> Result<ThreadId> {
        validate_title(title)?;

        let mut state = self.state.write().await;
        let id = state.next_thread_id()?;
        let now = self.clock.now();
        state.insert_thread(Thread {
            id,
            title: title.to_string(),
            created_at: now,
            last_activity: now,
        });
        debug!(thread_id = %id, "thread stored");
        Ok(id)
    }

    async fn append_post(&self, thread_id: ThreadId, post: NewPost) -> Result<PostId> {
        validate_post(&post)?;

        let mut state = self.state.write().await;
        if !state.threads.contains_key(&thread_id) {
            return Err(AppError::ThreadNotFound(thread_id));
        }

        let id = state.next_post_id();
        let now = self.clock.now();
        let sage = post.is_sage();
        state.insert_post(Post {
            id,
            thread_id,
            name: post.name,
            contact: post.contact,
            text: post.text,
            created_at: now,
        });
        if !sage {
            if let Some(thread) = state.threads.get_mut(&thread_id) {
                thread.last_activity = thread.last_activity.max(now);
            }
        }
        Ok(id)
    }

    async fn create_thread_with_opening_post(
        &self,
        title: &str,
        post: NewPost,
    ) -> Result<(ThreadId, PostId)> {
        validate_title(title)?;
        validate_post(&post)?;

        let mut state = self.state.write().await;
        let thread_id = state.next_thread_id()?;
        let post_id = state.next_post_id();
        let now = self.clock.now();

        state.insert_thread(Thread {
            id: thread_id,
            title: title.to_string(),
            created_at: now,
            last_activity: now,
        });
        state.insert_post(Post {
            id: post_id,
            thread_id,
            name: post.name,
            contact: post.contact,
            text: post.text,
            created_at: now,
        });
        Ok((thread_id, post_id))
    }

    async fn list_threads(&self) -> Result<Vec<ThreadPreview>> {
        let state = self.state.read().await;

        let mut threads: Vec<&Thread> = state.threads.values().collect();
        threads.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(threads
            .into_iter()
            .map(|thread| {
                let posts = state.posts.get(&thread.id).map(Vec::as_slice).unwrap_or_default();
                let start = posts.len().saturating_sub(PREVIEW_POSTS);
                ThreadPreview {
                    thread: thread.clone(),
                    posts: posts[start..].to_vec(),
                }
            })
            .collect())
    }

    async fn get_thread(&self, thread_id: ThreadId) -> Result<ThreadView> {
        let state = self.state.read().await;
        let thread = state
            .threads
            .get(&thread_id)
            .cloned()
            .ok_or(AppError::ThreadNotFound(thread_id))?;
        let posts = state.posts.get(&thread_id).cloned().unwrap_or_default();
        Ok(ThreadView { thread, posts })
    }
}
