//! Video identifier allocation
//!
//! IDs are 11 symbols from a 64-character URL-safe alphabet. A candidate is
//! rejected while it names an existing video directory, an existing catalog
//! filename, or an ID another in-flight upload has reserved.

use opentube_core::constants::{VIDEO_ID_ALPHABET, VIDEO_ID_LENGTH};
use opentube_core::AppError;
use opentube_db::MediaCatalog;
use opentube_storage::{layout, Storage};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Consecutive collisions tolerated before giving up. Over a 64^11 space this
/// only trips when the RNG is stuck.
const MAX_ATTEMPTS: usize = 64;

pub struct IdAllocator {
    rng: Mutex<Box<dyn RngCore + Send>>,
    reserved: Arc<Mutex<HashSet<String>>>,
}

/// An ID held by an in-flight upload. Dropping it releases the ID.
#[derive(Debug)]
pub struct IdReservation {
    id: String,
    reserved: Arc<Mutex<HashSet<String>>>,
}

impl IdReservation {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for IdReservation {
    fn drop(&mut self) {
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl IdAllocator {
    pub fn new(rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            rng: Mutex::new(rng),
            reserved: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Allocator backed by an OS-seeded generator.
    pub fn from_os_rng() -> Self {
        Self::new(Box::new(StdRng::from_os_rng()))
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(Box::new(StdRng::seed_from_u64(seed)))
    }

    /// Draw one candidate; every symbol is uniform over the alphabet.
    pub fn generate(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..VIDEO_ID_LENGTH)
            .map(|_| VIDEO_ID_ALPHABET[rng.random_range(0..VIDEO_ID_ALPHABET.len())] as char)
            .collect()
    }

    fn try_reserve(&self, id: &str) -> Option<IdReservation> {
        let mut reserved = self.reserved.lock().unwrap_or_else(PoisonError::into_inner);
        if !reserved.insert(id.to_string()) {
            return None;
        }
        Some(IdReservation {
            id: id.to_string(),
            reserved: self.reserved.clone(),
        })
    }

    pub fn is_reserved(&self, id: &str) -> bool {
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    /// Reserve a fresh ID unused on disk and in the catalog.
    pub async fn allocate(
        &self,
        storage: &dyn Storage,
        catalog: &dyn MediaCatalog,
    ) -> Result<IdReservation, AppError> {
        for attempt in 0..MAX_ATTEMPTS {
            let candidate = self.generate();
            let Some(reservation) = self.try_reserve(&candidate) else {
                tracing::debug!(candidate = %candidate, "ID reserved by another upload, re-rolling");
                continue;
            };

            let dir_taken = storage.exists(&layout::video_dir_key(&candidate)?).await?;
            if dir_taken || catalog.media_exists(&candidate).await? {
                tracing::debug!(candidate = %candidate, attempt, "ID already in use, re-rolling");
                continue;
            }

            return Ok(reservation);
        }

        Err(AppError::Internal(format!(
            "Could not allocate a free video ID after {} attempts",
            MAX_ATTEMPTS
        )))
    }
}
