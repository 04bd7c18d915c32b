use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::Deserialize;
use ulid::Ulid;

use crate::limits::MAX_CATALOG_SERVICES;
use crate::model::Service;

/// Read-only view of store configuration and service definitions.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn service(&self, id: Ulid) -> Option<Service>;

    /// Whether the store has switched the booking feature on.
    async fn booking_enabled(&self, store_id: Ulid) -> bool;
}

pub struct InMemoryCatalog {
    services: DashMap<Ulid, Service>,
    booking_enabled: DashSet<Ulid>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct CatalogFixture {
    #[serde(default)]
    stores: Vec<StoreFixture>,
    #[serde(default)]
    services: Vec<Service>,
}

#[derive(Deserialize)]
struct StoreFixture {
    id: Ulid,
    #[serde(default)]
    booking_enabled: bool,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            booking_enabled: DashSet::new(),
        }
    }

    /// Seed from a JSON document of the form
    /// `{"stores": [{"id", "booking_enabled"}], "services": [Service]}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let fixture: CatalogFixture = serde_json::from_str(json)?;
        if fixture.services.len() > MAX_CATALOG_SERVICES {
            return Err(serde::de::Error::custom("too many services in catalog"));
        }
        let catalog = Self::new();
        for store in fixture.stores {
            catalog.set_booking_enabled(store.id, store.booking_enabled);
        }
        for service in fixture.services {
            catalog.upsert_service(service);
        }
        Ok(catalog)
    }

    pub fn upsert_service(&self, service: Service) {
        self.services.insert(service.id, service);
    }

    pub fn remove_service(&self, id: &Ulid) -> Option<Service> {
        self.services.remove(id).map(|(_, s)| s)
    }

    pub fn set_booking_enabled(&self, store_id: Ulid, enabled: bool) {
        if enabled {
            self.booking_enabled.insert(store_id);
        } else {
            self.booking_enabled.remove(&store_id);
        }
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn service(&self, id: Ulid) -> Option<Service> {
        self.services.get(&id).map(|e| e.value().clone())
    }

    async fn booking_enabled(&self, store_id: Ulid) -> bool {
        self.booking_enabled.contains(&store_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeds_from_json() {
        let store = Ulid::new();
        let service = Ulid::new();
        let json = format!(
            r#"{{
                "stores": [{{"id": "{store}", "booking_enabled": true}}],
                "services": [{{
                    "id": "{service}",
                    "store_id": "{store}",
                    "name": "Gel manicure",
                    "duration_minutes": 45,
                    "capacity": 2
                }}]
            }}"#
        );
        let catalog = InMemoryCatalog::from_json(&json).unwrap();
        assert!(catalog.booking_enabled(store).await);
        let svc = catalog.service(service).await.unwrap();
        assert_eq!(svc.name, "Gel manicure");
        assert_eq!(svc.duration_minutes, Some(45));
        assert_eq!(svc.effective_capacity(), 2);
        assert!(svc.is_active);
        assert_eq!(svc.buffer_before_minutes, None);
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        assert!(InMemoryCatalog::from_json("{\"services\": [{}]}").is_err());
    }

    #[tokio::test]
    async fn booking_flag_toggles() {
        let catalog = InMemoryCatalog::new();
        let store = Ulid::new();
        assert!(!catalog.booking_enabled(store).await);
        catalog.set_booking_enabled(store, true);
        assert!(catalog.booking_enabled(store).await);
        catalog.set_booking_enabled(store, false);
        assert!(!catalog.booking_enabled(store).await);
    }
}
