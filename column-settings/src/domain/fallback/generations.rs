//! Per-record save generations gating delayed reconciliation.
//!
//! Every save bumps the generation of its `(user, report)` record. A
//! background task holds the ticket it was scheduled under and checks it
//! before touching any tier, so a resync or retry never replays columns
//! older than the latest save.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::{ReportType, UserId};

type RecordKey = (Option<UserId>, ReportType);

#[derive(Clone, Default)]
pub(super) struct SaveGenerations(Arc<Mutex<HashMap<RecordKey, u64>>>);

impl SaveGenerations {
    /// Start a new save for the record and return its ticket.
    pub(super) fn begin(&self, report_type: ReportType, user: Option<&UserId>) -> SaveTicket {
        let key = (user.cloned(), report_type);
        let mut generations = self.lock();
        let generation = generations.entry(key.clone()).or_default();
        *generation += 1;
        SaveTicket {
            generations: self.clone(),
            generation: *generation,
            key,
        }
    }

    /// Ticket for the record as it stands, without starting a save.
    pub(super) fn current(&self, report_type: ReportType, user: Option<&UserId>) -> SaveTicket {
        let key = (user.cloned(), report_type);
        let generation = self.lock().get(&key).copied().unwrap_or_default();
        SaveTicket {
            generations: self.clone(),
            generation,
            key,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RecordKey, u64>> {
        // The map only holds counters; a panic mid-update leaves it usable.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Generation a background task was scheduled under.
pub(super) struct SaveTicket {
    generations: SaveGenerations,
    generation: u64,
    key: RecordKey,
}

impl SaveTicket {
    /// Whether no save for the record has started since this ticket.
    pub(super) fn is_latest(&self) -> bool {
        self.generations.lock().get(&self.key).copied().unwrap_or_default() == self.generation
    }
}
