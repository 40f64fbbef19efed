use std::collections::BTreeSet;

use chrono::NaiveDate;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::free_windows;
use super::conflict::find_overlap;
use super::lifecycle::{check_owner, detail};
use super::{Engine, EngineError, WalCommand};

fn matches_space(space: &Space, filter: &SpaceFilter) -> bool {
    filter.id.is_none_or(|id| space.id == id)
        && filter.kind.as_deref().is_none_or(|k| space.kind.eq_ignore_ascii_case(k))
        && filter.min_capacity.is_none_or(|c| space.capacity >= c)
        && filter.active.is_none_or(|a| space.active == a)
}

fn in_timeframe(b: &Booking, timeframe: Timeframe, now: chrono::NaiveDateTime) -> bool {
    match timeframe {
        Timeframe::Upcoming => !b.is_cancelled() && b.start_at() > now,
        Timeframe::Active => !b.is_cancelled() && b.start_at() <= now && now <= b.end_at(),
        Timeframe::Past => b.is_cancelled() || b.has_ended(now),
    }
}

impl Engine {
    // ── Space catalog reads ───────────────────────────────────

    pub async fn get_space(&self, id: Ulid) -> Result<Space, EngineError> {
        let ss = self.space_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = ss.read().await;
        Ok(guard.space.clone())
    }

    /// The space, if it exists and accepts bookings.
    pub async fn find_active_space(&self, id: Ulid) -> Option<Space> {
        let ss = self.space_state(&id)?;
        let guard = ss.read().await;
        guard.space.active.then(|| guard.space.clone())
    }

    pub async fn list_spaces(&self, filter: &SpaceFilter) -> Vec<Space> {
        let states: Vec<_> = self.spaces.iter().map(|e| e.value().clone()).collect();
        let mut spaces = Vec::new();
        for ss in states {
            let guard = ss.read().await;
            if matches_space(&guard.space, filter) {
                spaces.push(guard.space.clone());
            }
        }
        spaces.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        spaces
    }

    /// Distinct types across active spaces, sorted.
    pub async fn space_types(&self) -> Vec<String> {
        let states: Vec<_> = self.spaces.iter().map(|e| e.value().clone()).collect();
        let mut kinds = BTreeSet::new();
        for ss in states {
            let guard = ss.read().await;
            if guard.space.active {
                kinds.insert(guard.space.kind.clone());
            }
        }
        kinds.into_iter().collect()
    }

    // ── Overlap and availability ──────────────────────────────

    /// Whether a non-cancelled booking on `space_id` overlaps `slot` on
    /// `date`. An unknown space has nothing to overlap with.
    pub async fn has_overlap(
        &self,
        space_id: Ulid,
        date: NaiveDate,
        slot: Slot,
        exclude: Option<Ulid>,
    ) -> bool {
        let Some(ss) = self.space_state(&space_id) else {
            return false;
        };
        let guard = ss.read().await;
        find_overlap(&guard, date, &slot, exclude).is_some()
    }

    /// `Ok(None)` if the slot is free, `Ok(Some(id))` naming the booking in
    /// the way otherwise.
    pub async fn check_availability(
        &self,
        space_id: Ulid,
        date: NaiveDate,
        slot: Slot,
    ) -> Result<Option<Ulid>, EngineError> {
        let ss = self
            .space_state(&space_id)
            .ok_or(EngineError::NotFound(space_id))?;
        let guard = ss.read().await;
        Ok(find_overlap(&guard, date, &slot, None))
    }

    /// Bookable windows on `date` no shorter than `min_minutes` (the minimum
    /// booking length when not given).
    pub async fn availability(
        &self,
        space_id: Ulid,
        date: NaiveDate,
        min_minutes: Option<i64>,
    ) -> Result<Vec<Slot>, EngineError> {
        let min_minutes = min_minutes.unwrap_or(MIN_BOOKING_MINUTES);
        if min_minutes < 1 {
            return Err(EngineError::Validation("min_duration must be positive".into()));
        }
        let ss = self
            .space_state(&space_id)
            .ok_or(EngineError::NotFound(space_id))?;
        let guard = ss.read().await;
        Ok(free_windows(&guard, date, min_minutes))
    }

    // ── Booking reads ─────────────────────────────────────────

    pub async fn get_owned_booking(
        &self,
        id: Ulid,
        owner: &str,
    ) -> Result<BookingDetail, EngineError> {
        let space_id = self.space_of_booking(&id).ok_or(EngineError::NotFound(id))?;
        let ss = self.space_state(&space_id).ok_or(EngineError::NotFound(id))?;
        let guard = ss.read().await;
        let booking = guard.booking(id).cloned().ok_or(EngineError::NotFound(id))?;
        check_owner(&booking, owner)?;
        Ok(detail(booking, &guard.space, self.clock.now()))
    }

    /// All of `owner`'s bookings matching `filter`, newest first.
    pub async fn list_user_bookings(
        &self,
        owner: &str,
        filter: &BookingFilter,
    ) -> Vec<BookingDetail> {
        let now = self.clock.now();
        let states: Vec<_> = self.spaces.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for ss in states {
            let guard = ss.read().await;
            let bookings = match (filter.from, filter.to) {
                (Some(from), Some(to)) => guard.between(from, to),
                (Some(from), None) => guard.between(from, NaiveDate::MAX),
                (None, Some(to)) => guard.between(NaiveDate::MIN, to),
                (None, None) => &guard.bookings[..],
            };
            for b in bookings.iter().filter(|b| b.owner == owner) {
                if filter
                    .status
                    .is_some_and(|s| b.effective_status(now) != s)
                {
                    continue;
                }
                if filter.timeframe.is_some_and(|t| !in_timeframe(b, t, now)) {
                    continue;
                }
                out.push(detail(b.clone(), &guard.space, now));
            }
        }
        out.sort_by(|a, b| {
            (b.booking.date, b.booking.slot.start).cmp(&(a.booking.date, a.booking.slot.start))
        });
        out
    }

    /// Non-cancelled bookings on a space between two dates inclusive, in
    /// calendar order.
    pub async fn space_bookings(
        &self,
        space_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BookingDetail>, EngineError> {
        if from > to {
            return Err(EngineError::Validation("date range is reversed".into()));
        }
        if (to - from).num_days() > MAX_QUERY_RANGE_DAYS {
            return Err(EngineError::LimitExceeded("date range too wide"));
        }
        let ss = self
            .space_state(&space_id)
            .ok_or(EngineError::NotFound(space_id))?;
        let guard = ss.read().await;
        let now = self.clock.now();
        Ok(guard
            .between(from, to)
            .iter()
            .filter(|b| !b.is_cancelled())
            .map(|b| detail(b.clone(), &guard.space, now))
            .collect())
    }

    // ── WAL maintenance ───────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate the current
    /// state. Holds the catalog gate and a read lock on every space until the
    /// new file is in place, so no space can be created or written behind
    /// the snapshot.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.catalog_gate.write().await;
        let mut ids: Vec<Ulid> = self.spaces.iter().map(|e| *e.key()).collect();
        ids.sort();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(ss) = self.space_state(&id) {
                let guard = ss.read_owned().await;
                // Deleted while we waited.
                if self.spaces.contains_key(&id) {
                    guards.push(guard);
                }
            }
        }

        let mut events = Vec::new();
        for guard in &guards {
            events.push(Event::SpaceCreated {
                space: guard.space.clone(),
            });
            events.extend(guard.bookings.iter().map(|b| Event::BookingCreated {
                booking: b.clone(),
            }));
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::debug!("WAL compacted to {count} events across {} spaces", guards.len());
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
