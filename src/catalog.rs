// =============================================================================
// SEAT CATALOG MODULE
// =============================================================================
// Read-only lookups of the seats that exist in a hall.
//
// Seat lists are reference data, so they may be cached in Redis. Availability
// is never cached here; it must always come from the store.
// =============================================================================

use redis::aio::ConnectionManager;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::Seat;
use crate::store::BookingStore;

pub struct SeatCatalog {
    store: Arc<dyn BookingStore>,
    cache: Option<ConnectionManager>,
    ttl: Duration,
}

impl SeatCatalog {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self {
            store,
            cache: None,
            ttl: Duration::from_secs(300),
        }
    }

    /// Cache hall seat lists in Redis for `ttl`.
    pub fn with_cache(mut self, cache: ConnectionManager, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.ttl = ttl;
        self
    }

    pub fn cache(&self) -> Option<&ConnectionManager> {
        self.cache.as_ref()
    }

    fn cache_key(hall_id: Uuid) -> String {
        format!("hall-seats:{hall_id}")
    }

    /// All seats of a hall, ordered by row then column.
    ///
    /// Cache failures are logged and fall through to the store.
    pub async fn seats_for_hall(&self, hall_id: Uuid) -> AppResult<Vec<Seat>> {
        let key = Self::cache_key(hall_id);

        if let Some(cache) = &self.cache {
            let start = Instant::now();
            let cached: Result<Option<String>, _> = redis::cmd("GET")
                .arg(&key)
                .query_async(&mut cache.clone())
                .await;
            metrics::record_cache_operation("get", start.elapsed().as_secs_f64());

            match cached {
                Ok(Some(json)) => match serde_json::from_str::<Vec<Seat>>(&json) {
                    Ok(seats) => return Ok(seats),
                    Err(e) => tracing::warn!(hall_id = %hall_id, error = %e, "Corrupt seat cache entry"),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!(hall_id = %hall_id, error = %e, "Seat cache read failed"),
            }
        }

        let seats = self.store.hall_seats(hall_id).await?;

        if let Some(cache) = &self.cache {
            if !seats.is_empty() {
                let start = Instant::now();
                let json = serde_json::to_string(&seats)
                    .map_err(|e| AppError::Internal(e.to_string()))?;
                let stored: Result<(), _> = redis::cmd("SETEX")
                    .arg(&key)
                    .arg(self.ttl.as_secs())
                    .arg(json)
                    .query_async(&mut cache.clone())
                    .await;
                metrics::record_cache_operation("setex", start.elapsed().as_secs_f64());
                if let Err(e) = stored {
                    tracing::warn!(hall_id = %hall_id, error = %e, "Seat cache write failed");
                }
            }
        }

        Ok(seats)
    }

    /// Resolve requested seat ids against a hall.
    ///
    /// Returns the seats sorted by id (the canonical lock order).
    ///
    /// # Errors
    /// `InvalidSeatForHall` naming every id that is not a seat of the hall.
    pub async fn resolve(&self, hall_id: Uuid, seat_ids: &[Uuid]) -> AppResult<Vec<Seat>> {
        let wanted: HashSet<Uuid> = seat_ids.iter().copied().collect();
        let by_id: HashMap<Uuid, Seat> = self
            .seats_for_hall(hall_id)
            .await?
            .into_iter()
            .filter(|s| wanted.contains(&s.id))
            .map(|s| (s.id, s))
            .collect();

        let mut unknown: Vec<Uuid> = wanted
            .iter()
            .filter(|id| !by_id.contains_key(id))
            .copied()
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            return Err(AppError::InvalidSeatForHall { seat_ids: unknown });
        }

        let mut seats: Vec<Seat> = by_id.into_values().collect();
        seats.sort_by_key(|s| s.id);
        Ok(seats)
    }
}
