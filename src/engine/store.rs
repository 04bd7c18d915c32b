use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedLedger = Arc<RwLock<ServiceLedger>>;

/// Where bookings live. One ledger per service, each behind its own lock:
/// writers hold the ledger's write lock across their conflict check and their
/// mutation, so admission decisions for a service are serialized.
pub trait BookingStore: Send + Sync {
    /// Ledger for a service, created empty on first use.
    fn ledger(&self, service_id: Ulid, store_id: Ulid) -> SharedLedger;

    fn get_ledger(&self, service_id: &Ulid) -> Option<SharedLedger>;

    fn service_for_booking(&self, booking_id: &Ulid) -> Option<Ulid>;

    /// Record where a booking lives. Idempotent.
    fn index_booking(&self, booking: &Booking);

    fn booking_ids_for_user(&self, user_id: &Ulid) -> Vec<Ulid>;

    fn service_ids_for_store(&self, store_id: &Ulid) -> Vec<Ulid>;

    fn service_ids(&self) -> Vec<Ulid>;
}

pub struct InMemoryStore {
    ledgers: DashMap<Ulid, SharedLedger>,
    booking_to_service: DashMap<Ulid, Ulid>,
    by_user: DashMap<Ulid, Vec<Ulid>>,
    by_store: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            ledgers: DashMap::new(),
            booking_to_service: DashMap::new(),
            by_user: DashMap::new(),
            by_store: DashMap::new(),
        }
    }

    pub fn ledger_count(&self) -> usize {
        self.ledgers.len()
    }

    pub fn booking_count(&self) -> usize {
        self.booking_to_service.len()
    }
}

impl BookingStore for InMemoryStore {
    fn ledger(&self, service_id: Ulid, store_id: Ulid) -> SharedLedger {
        if let Some(existing) = self.ledgers.get(&service_id) {
            return existing.value().clone();
        }
        let entry = self.ledgers.entry(service_id).or_insert_with(|| {
            self.by_store.entry(store_id).or_default().push(service_id);
            Arc::new(RwLock::new(ServiceLedger::new(service_id, store_id)))
        });
        entry.value().clone()
    }

    fn get_ledger(&self, service_id: &Ulid) -> Option<SharedLedger> {
        self.ledgers.get(service_id).map(|e| e.value().clone())
    }

    fn service_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_service.get(booking_id).map(|e| *e.value())
    }

    fn index_booking(&self, booking: &Booking) {
        let fresh = self
            .booking_to_service
            .insert(booking.id, booking.service_id)
            .is_none();
        if fresh {
            self.by_user.entry(booking.user_id).or_default().push(booking.id);
        }
    }

    fn booking_ids_for_user(&self, user_id: &Ulid) -> Vec<Ulid> {
        self.by_user
            .get(user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    fn service_ids_for_store(&self, store_id: &Ulid) -> Vec<Ulid> {
        self.by_store
            .get(store_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    fn service_ids(&self) -> Vec<Ulid> {
        self.ledgers.iter().map(|e| *e.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ledger_created_once_and_indexed_by_store() {
        let store = InMemoryStore::new();
        let (svc, shop) = (Ulid::new(), Ulid::new());
        let a = store.ledger(svc, shop);
        let b = store.ledger(svc, shop);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.ledger_count(), 1);
        assert_eq!(store.service_ids_for_store(&shop), vec![svc]);
        assert_eq!(a.read().await.store_id, shop);
    }

    #[tokio::test]
    async fn index_booking_is_idempotent() {
        let store = InMemoryStore::new();
        let svc = Ulid::new();
        let booking = test_booking(svc, Span::new(0, 1_000), BookingStatus::Requested);
        store.index_booking(&booking);
        store.index_booking(&booking);
        assert_eq!(store.service_for_booking(&booking.id), Some(svc));
        assert_eq!(store.booking_ids_for_user(&booking.user_id), vec![booking.id]);
        assert_eq!(store.booking_count(), 1);
    }

    #[test]
    fn unknown_lookups_are_empty() {
        let store = InMemoryStore::new();
        assert!(store.get_ledger(&Ulid::new()).is_none());
        assert!(store.service_for_booking(&Ulid::new()).is_none());
        assert!(store.booking_ids_for_user(&Ulid::new()).is_empty());
        assert!(store.service_ids().is_empty());
    }
}
