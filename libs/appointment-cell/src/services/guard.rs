// libs/appointment-cell/src/services/guard.rs
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

/// Per-dentist serialization point. Booking and rescheduling must hold the
/// dentist's lock across their conflict check and the write that follows,
/// otherwise two requests can both see a free calendar and both commit.
///
/// One registry lives in the router state and is shared by every request.
#[derive(Clone, Default)]
pub struct CalendarGuard {
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl CalendarGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for one dentist's calendar, created on first use.
    pub async fn lock_for(&self, dentist_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(dentist_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
