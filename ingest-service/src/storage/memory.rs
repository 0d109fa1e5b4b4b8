use super::{ReviewRepository, StorageError};
use appstore::Review;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Review store kept in process memory. First write for an id wins.
#[derive(Default)]
pub struct MemoryReviewRepository {
    reviews: Mutex<HashMap<String, Review>>,
}

impl MemoryReviewRepository {
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<Review> {
        self.lock().get(id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Review>> {
        // A poisoned map is still a consistent map; every write is a single insert.
        self.reviews
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ReviewRepository for MemoryReviewRepository {
    async fn save_raw_review(&self, review: &Review) -> Result<(), StorageError> {
        self.lock()
            .entry(review.id.clone())
            .or_insert_with(|| review.clone());
        Ok(())
    }
}
