//! Shared fixtures for the cross-crate tests.

use std::sync::Arc;

use tb_core::models::NewPost;
use tb_core::service::BoardService;
use tb_core::traits::ThreadStore;
use tb_db_memory::MemoryThreadStore;
use tb_db_sqlite::SqliteThreadStore;
use tb_trip_classic::ClassicTripcode;

/// Every store plugin, freshly opened and empty.
pub async fn all_stores() -> Vec<(&'static str, Arc<dyn ThreadStore>)> {
    let sqlite = SqliteThreadStore::new("sqlite::memory:")
        .await
        .expect("in-memory sqlite opens");
    vec![
        ("memory", Arc::new(MemoryThreadStore::new()) as Arc<dyn ThreadStore>),
        ("sqlite", Arc::new(sqlite) as Arc<dyn ThreadStore>),
    ]
}

pub fn board(store: Arc<dyn ThreadStore>) -> BoardService {
    BoardService::new(store, Arc::new(ClassicTripcode::new()))
}

pub fn anon(text: &str) -> NewPost {
    NewPost::new("anon", "", text)
}

pub fn sage(text: &str) -> NewPost {
    NewPost::new("anon", "sage", text)
}
