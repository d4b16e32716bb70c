use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::feed::Feed;
use crate::stats::Counters;

use super::error::AppError;
use super::schema::Schema;

/// Shared state handed to every HTTP handler
#[derive(Clone)]
pub struct AppState {
    pub feed: Feed,
    pub schema: Arc<Schema>,
    pub counters: Arc<Counters>,
    max_subscribers: usize,
    subscriber_slots: Option<Arc<Semaphore>>,
    next_subscriber_id: Arc<AtomicU64>,
}

impl AppState {
    /// Create handler state; `max_subscribers` of 0 means unlimited
    pub fn new(feed: Feed, schema: Schema, counters: Arc<Counters>, max_subscribers: usize) -> Self {
        let subscriber_slots = if max_subscribers > 0 {
            Some(Arc::new(Semaphore::new(max_subscribers)))
        } else {
            None
        };

        Self {
            feed,
            schema: Arc::new(schema),
            counters,
            max_subscribers,
            subscriber_slots,
            next_subscriber_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Reserve a subscriber slot, held for the lifetime of the connection
    pub fn try_acquire_subscriber(&self) -> Result<Option<OwnedSemaphorePermit>, AppError> {
        let Some(slots) = &self.subscriber_slots else {
            return Ok(None);
        };

        match Arc::clone(slots).try_acquire_owned() {
            Ok(permit) => Ok(Some(permit)),
            Err(_) => {
                self.counters.subscriber_rejected();
                tracing::warn!(max = self.max_subscribers, "Subscriber limit reached, rejecting");
                Err(AppError::SubscriberLimit(self.max_subscribers))
            }
        }
    }

    pub fn next_subscriber_id(&self) -> u64 {
        self.next_subscriber_id.fetch_add(1, Ordering::Relaxed)
    }
}
