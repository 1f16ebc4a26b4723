//! # Board Service
//!
//! Coordinates the flow between submitted form fields and the core ports.
//! The presentation layer calls these and renders the result.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::models::{NewPost, PostId, ThreadId, ThreadPreview, ThreadView};
use crate::poster::format_poster_name;
use crate::traits::{ThreadStore, TripcodeGenerator};

/// Decoded fields of the reply form. `name` may carry a trip secret.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostForm {
    pub name: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewThreadForm {
    pub title: String,
    #[serde(flatten)]
    pub post: PostForm,
}

/// Shared by every request-handling task.
#[derive(Clone)]
pub struct BoardService {
    store: Arc<dyn ThreadStore>,
    trips: Arc<dyn TripcodeGenerator>,
}

impl BoardService {
    pub fn new(store: Arc<dyn ThreadStore>, trips: Arc<dyn TripcodeGenerator>) -> Self {
        Self { store, trips }
    }

    fn to_new_post(&self, form: PostForm) -> NewPost {
        NewPost {
            name: format_poster_name(&form.name, self.trips.as_ref()),
            contact: form.contact,
            text: form.text,
        }
    }

    pub async fn start_thread(&self, form: NewThreadForm) -> Result<(ThreadId, PostId)> {
        let post = self.to_new_post(form.post);
        let result = self
            .store
            .create_thread_with_opening_post(&form.title, post)
            .await;
        match &result {
            Ok((thread_id, post_id)) => {
                info!(thread_id = %thread_id, post_id = %post_id, "thread created")
            }
            Err(err @ AppError::StorageConflict(_)) => warn!(error = %err, "thread creation rolled back"),
            Err(err) => debug!(error = %err, "thread rejected"),
        }
        result
    }

    pub async fn reply(&self, thread_id: ThreadId, form: PostForm) -> Result<PostId> {
        let post = self.to_new_post(form);
        let sage = post.is_sage();
        let result = self.store.append_post(thread_id, post).await;
        match &result {
            Ok(post_id) => info!(thread_id = %thread_id, post_id = %post_id, sage, "reply posted"),
            Err(err @ AppError::StorageConflict(_)) => warn!(thread_id = %thread_id, error = %err, "reply rolled back"),
            Err(err) => debug!(thread_id = %thread_id, error = %err, "reply rejected"),
        }
        result
    }

    pub async fn index(&self) -> Result<Vec<ThreadPreview>> {
        self.store.list_threads().await
    }

    pub async fn thread(&self, thread_id: ThreadId) -> Result<ThreadView> {
        self.store.get_thread(thread_id).await
    }

    pub fn tripcode(&self, secret: &str) -> String {
        self.trips.derive(secret)
    }
}
