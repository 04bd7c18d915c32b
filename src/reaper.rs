use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::model::Ms;
use crate::observability;

/// One pass of the request expiry sweep. Returns how many requests were
/// rejected as stale.
pub async fn sweep_stale_requests(engine: &Engine, now: Ms, ttl: Ms) -> usize {
    let stale = engine.collect_stale_requests(now, ttl);
    let mut expired = 0;
    for booking_id in stale {
        match engine.expire_request(booking_id, ttl).await {
            Ok(_) => {
                expired += 1;
                info!("expired stale request {booking_id}");
            }
            Err(e) => {
                // Answered or rescheduled in the meantime
                tracing::debug!("expiry skip {booking_id}: {e}");
            }
        }
    }
    if expired > 0 {
        metrics::counter!(observability::REQUESTS_EXPIRED_TOTAL).increment(expired as u64);
    }
    expired
}

/// Background task that periodically rejects requests the store never
/// answered. Returns immediately when the engine has no request TTL
/// configured; the host decides whether to spawn it at all.
pub async fn run_request_expiry(engine: Arc<Engine>) {
    let Some(ttl) = engine.config().request_ttl_ms() else {
        tracing::debug!("request expiry disabled");
        return;
    };
    let every = Duration::from_secs(engine.config().sweep_interval_secs.max(1));
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let now = engine.now();
        sweep_stale_requests(&engine, now, ttl).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::clock::{Clock, ManualClock};
    use crate::config::EngineConfig;
    use crate::model::*;
    use ulid::Ulid;

    const H: Ms = 3_600_000;
    const NOW: Ms = 1_800_000_000_000;

    async fn setup() -> (Arc<Engine>, Arc<ManualClock>, Ulid, Ulid) {
        let catalog = Arc::new(InMemoryCatalog::new());
        let (store_id, service_id) = (Ulid::new(), Ulid::new());
        catalog.set_booking_enabled(store_id, true);
        catalog.upsert_service(Service {
            id: service_id,
            store_id,
            name: "Consultation".into(),
            description: String::new(),
            duration_minutes: Some(60),
            buffer_before_minutes: Some(0),
            buffer_after_minutes: Some(0),
            capacity: Some(5),
            is_active: true,
        });
        let clock = Arc::new(ManualClock::new(NOW));
        let config = EngineConfig {
            request_ttl_minutes: Some(60),
            ..Default::default()
        };
        let engine = Engine::in_memory(config, catalog)
            .unwrap()
            .with_clock(clock.clone());
        (Arc::new(engine), clock, store_id, service_id)
    }

    fn request(store_id: Ulid, service_id: Ulid, start_at: Ms) -> CreateBookingRequest {
        CreateBookingRequest {
            store_id,
            service_id,
            start_at,
            end_at: None,
            user_name: "Grace".into(),
            user_contact: "+15550100".into(),
            note: None,
        }
    }

    #[tokio::test]
    async fn sweep_rejects_only_stale_requests() {
        let (engine, clock, store_id, service_id) = setup().await;
        let user = Ulid::new();

        let old = engine
            .create_booking(request(store_id, service_id, NOW + 24 * H), user)
            .await
            .unwrap();
        let answered = engine
            .create_booking(request(store_id, service_id, NOW + 24 * H), user)
            .await
            .unwrap();
        engine
            .confirm_booking(answered.id, store_id, ConfirmBookingRequest::default())
            .await
            .unwrap();

        clock.advance(2 * H);
        let fresh = engine
            .create_booking(request(store_id, service_id, NOW + 24 * H), user)
            .await
            .unwrap();

        let ttl = engine.config().request_ttl_ms().unwrap();
        let expired = sweep_stale_requests(&engine, clock.now(), ttl).await;
        assert_eq!(expired, 1);

        let old = engine.get_booking_detail(old.id, user).await.unwrap();
        assert_eq!(old.status, BookingStatus::Rejected);
        assert_eq!(old.status_reason.as_deref(), Some("request expired"));
        let answered = engine.get_booking_detail(answered.id, user).await.unwrap();
        assert_eq!(answered.status, BookingStatus::Confirmed);
        let fresh = engine.get_booking_detail(fresh.id, user).await.unwrap();
        assert_eq!(fresh.status, BookingStatus::Requested);
    }

    #[tokio::test]
    async fn requests_whose_start_passed_are_stale() {
        let (engine, clock, store_id, service_id) = setup().await;
        let user = Ulid::new();
        let b = engine
            .create_booking(request(store_id, service_id, NOW + 30 * 60_000), user)
            .await
            .unwrap();
        clock.advance(31 * 60_000);
        let stale = engine.collect_stale_requests(clock.now(), 24 * H);
        assert_eq!(stale, vec![b.id]);
    }

    #[tokio::test]
    async fn rescheduled_booking_gets_a_fresh_ttl() {
        let (engine, clock, store_id, service_id) = setup().await;
        let user = Ulid::new();
        let start = NOW + 3 * 24 * H;
        let b = engine
            .create_booking(request(store_id, service_id, start), user)
            .await
            .unwrap();
        engine
            .confirm_booking(b.id, store_id, ConfirmBookingRequest::default())
            .await
            .unwrap();

        clock.advance(2 * 24 * H);
        let moved = engine
            .update_booking(
                b.id,
                UpdateBookingRequest {
                    start_at: Some(start + 2 * H),
                    end_at: Some(start + 3 * H),
                    note: None,
                },
                user,
            )
            .await
            .unwrap();
        assert_eq!(moved.status, BookingStatus::Requested);
        assert_eq!(moved.requested_at, clock.now());

        let ttl = engine.config().request_ttl_ms().unwrap();
        assert!(engine.collect_stale_requests(clock.now(), ttl).is_empty());
        assert_eq!(sweep_stale_requests(&engine, clock.now(), ttl).await, 0);

        clock.advance(ttl);
        assert_eq!(sweep_stale_requests(&engine, clock.now(), ttl).await, 1);
    }

    #[tokio::test]
    async fn expiry_rechecks_under_the_lock() {
        let (engine, clock, store_id, service_id) = setup().await;
        let user = Ulid::new();
        let start = NOW + 24 * H;
        let b = engine
            .create_booking(request(store_id, service_id, start), user)
            .await
            .unwrap();

        clock.advance(2 * H);
        let ttl = engine.config().request_ttl_ms().unwrap();
        assert_eq!(engine.collect_stale_requests(clock.now(), ttl), vec![b.id]);

        // Rescheduled between collection and expiry.
        engine
            .update_booking(
                b.id,
                UpdateBookingRequest {
                    start_at: Some(start + H),
                    end_at: Some(start + 2 * H),
                    note: None,
                },
                user,
            )
            .await
            .unwrap();
        let err = engine.expire_request(b.id, ttl).await.unwrap_err();
        assert!(matches!(err, crate::engine::EngineError::InvalidStateTransition { .. }));
        let b = engine.get_booking_detail(b.id, user).await.unwrap();
        assert_eq!(b.status, BookingStatus::Requested);
    }

    #[tokio::test]
    async fn disabled_without_ttl() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let engine = Arc::new(Engine::in_memory(EngineConfig::default(), catalog).unwrap());
        // Returns instead of looping forever.
        run_request_expiry(engine).await;
    }
}
