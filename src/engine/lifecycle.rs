use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{
    check_capacity, check_no_conflict, validate_attendees, validate_duration, validate_owner,
    validate_text,
};
use super::{Engine, EngineError};

/// A booking's fields after overlaying a partial update onto its current
/// values. Every rule on the update path reads from this, never from the
/// raw changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct EffectiveBooking {
    pub space_id: Ulid,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub attendees: u32,
    pub purpose: Option<String>,
    pub notes: Option<String>,
}

impl EffectiveBooking {
    pub fn resolve(current: &Booking, changes: &BookingChanges) -> Self {
        Self {
            space_id: changes.space_id.unwrap_or(current.space_id),
            date: changes.date.unwrap_or(current.date),
            start: changes.start.unwrap_or(current.slot.start),
            end: changes.end.unwrap_or(current.slot.end),
            attendees: changes.attendees.unwrap_or(current.attendees),
            purpose: changes.purpose.clone().unwrap_or_else(|| current.purpose.clone()),
            notes: changes.notes.clone().unwrap_or_else(|| current.notes.clone()),
        }
    }

    pub fn start_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start)
    }
}

pub(super) fn detail(booking: Booking, space: &Space, now: NaiveDateTime) -> BookingDetail {
    BookingDetail {
        effective_status: booking.effective_status(now),
        space: space.clone(),
        booking,
    }
}

pub(super) fn check_owner(booking: &Booking, owner: &str) -> Result<(), EngineError> {
    if booking.owner != owner {
        return Err(EngineError::Forbidden(booking.id));
    }
    Ok(())
}

fn validate_changes(changes: &BookingChanges) -> Result<(), EngineError> {
    if let (Some(start), Some(end)) = (changes.start, changes.end)
        && end <= start {
            return Err(EngineError::Validation(
                "end_time must be after start_time".into(),
            ));
        }
    if let Some(attendees) = changes.attendees {
        validate_attendees(attendees)?;
    }
    if let Some(purpose) = &changes.purpose {
        validate_text(purpose.as_deref(), MAX_PURPOSE_LEN, "purpose")?;
    }
    if let Some(notes) = &changes.notes {
        validate_text(notes.as_deref(), MAX_NOTES_LEN, "notes")?;
    }
    Ok(())
}

impl Engine {
    /// Create a booking for `owner`. The space's write lock is held from
    /// the overlap check until the booking is durable, so two concurrent
    /// requests for the same slot cannot both succeed.
    pub async fn create_booking(
        &self,
        owner: &str,
        req: NewBooking,
    ) -> Result<BookingDetail, EngineError> {
        let result = self.try_create_booking(owner, req).await;
        self.observe("create_booking", &result);
        result
    }

    async fn try_create_booking(
        &self,
        owner: &str,
        req: NewBooking,
    ) -> Result<BookingDetail, EngineError> {
        validate_owner(owner)?;
        let slot = Slot::try_new(req.start, req.end).ok_or_else(|| {
            EngineError::Validation("end_time must be after start_time".into())
        })?;
        let attendees = req.attendees.unwrap_or(1);
        validate_attendees(attendees)?;
        validate_text(req.purpose.as_deref(), MAX_PURPOSE_LEN, "purpose")?;
        validate_text(req.notes.as_deref(), MAX_NOTES_LEN, "notes")?;

        let now = self.clock.now();
        if req.date.and_time(slot.start) < now {
            return Err(EngineError::Validation("cannot book in the past".into()));
        }

        let ss = self
            .space_state(&req.space_id)
            .ok_or(EngineError::SpaceUnavailable(req.space_id))?;
        let mut guard = ss.write().await;
        if !guard.space.active || !self.spaces.contains_key(&req.space_id) {
            return Err(EngineError::SpaceUnavailable(req.space_id));
        }
        validate_duration(&slot)?;
        check_capacity(&guard.space, attendees)?;
        if self.booking_to_space.contains_key(&req.id) {
            return Err(EngineError::AlreadyExists(req.id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_SPACE {
            return Err(EngineError::LimitExceeded("too many bookings on space"));
        }

        check_no_conflict(&guard, req.date, &slot, None)?;

        let booking = Booking {
            id: req.id,
            owner: owner.to_string(),
            space_id: req.space_id,
            date: req.date,
            slot,
            attendees,
            purpose: req.purpose,
            notes: req.notes,
            status: self.workflow.initial_status(),
            created_at: now,
            updated_at: now,
        };
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(
            "booking {} created by {owner} on space {} for {} {}-{}",
            booking.id, booking.space_id, booking.date, slot.start, slot.end
        );
        Ok(detail(booking, &guard.space, now))
    }

    /// Reschedule or edit a booking owned by `owner`.
    pub async fn update_booking(
        &self,
        id: Ulid,
        owner: &str,
        changes: BookingChanges,
    ) -> Result<BookingDetail, EngineError> {
        let result = self.try_update_booking(id, owner, changes).await;
        self.observe("update_booking", &result);
        result
    }

    async fn try_update_booking(
        &self,
        id: Ulid,
        owner: &str,
        changes: BookingChanges,
    ) -> Result<BookingDetail, EngineError> {
        let mut locked = self.lock_booking(id, changes.space_id).await?;
        let now = self.clock.now();
        let current = locked
            .home
            .booking(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;

        check_owner(&current, owner)?;
        if current.has_ended(now) {
            return Err(EngineError::BookingPast(id));
        }
        if current.is_cancelled() {
            return Err(EngineError::BookingCancelled(id));
        }
        validate_changes(&changes)?;

        let eff = EffectiveBooking::resolve(&current, &changes);
        if eff.start_at() < now {
            return Err(EngineError::Validation(
                "cannot move booking into the past".into(),
            ));
        }
        let slot = Slot::try_new(eff.start, eff.end).ok_or_else(|| {
            EngineError::Validation("end_time must be after start_time".into())
        })?;
        if changes.touches_times() {
            validate_duration(&slot)?;
        }

        let moving = eff.space_id != current.space_id;
        let target = if moving {
            match locked.other.as_deref() {
                Some(ss) if ss.space.active && self.spaces.contains_key(&ss.space.id) => ss,
                _ => return Err(EngineError::SpaceUnavailable(eff.space_id)),
            }
        } else {
            &*locked.home
        };
        if moving || changes.attendees.is_some() {
            check_capacity(&target.space, eff.attendees)?;
        }
        if moving && target.bookings.len() >= MAX_BOOKINGS_PER_SPACE {
            return Err(EngineError::LimitExceeded("too many bookings on space"));
        }
        check_no_conflict(target, eff.date, &slot, Some(id))?;

        let updated = Booking {
            space_id: eff.space_id,
            date: eff.date,
            slot,
            attendees: eff.attendees,
            purpose: eff.purpose,
            notes: eff.notes,
            updated_at: now,
            ..current
        };

        let space = if moving {
            let Some(to) = locked.other.as_mut() else {
                return Err(EngineError::SpaceUnavailable(eff.space_id));
            };
            self.persist_and_apply_move(&mut locked.home, to, updated.clone())
                .await?;
            to.space.clone()
        } else {
            let event = Event::BookingUpdated {
                booking: updated.clone(),
                previous_space_id: current.space_id,
            };
            self.persist_and_apply(&mut locked.home, &event).await?;
            locked.home.space.clone()
        };
        info!(
            "booking {id} updated by {owner}: space {} {} {}-{}",
            updated.space_id, updated.date, updated.slot.start, updated.slot.end
        );
        Ok(detail(updated, &space, now))
    }

    /// Soft-cancel a booking. Every other field is kept.
    pub async fn cancel_booking(
        &self,
        id: Ulid,
        owner: &str,
    ) -> Result<BookingDetail, EngineError> {
        let result = self.try_cancel_booking(id, owner).await;
        self.observe("cancel_booking", &result);
        result
    }

    async fn try_cancel_booking(
        &self,
        id: Ulid,
        owner: &str,
    ) -> Result<BookingDetail, EngineError> {
        let mut locked = self.lock_booking(id, None).await?;
        let now = self.clock.now();
        let current = locked
            .home
            .booking(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;

        check_owner(&current, owner)?;
        if current.is_cancelled() {
            return Err(EngineError::AlreadyCancelled(id));
        }
        if current.has_ended(now) {
            return Err(EngineError::BookingPast(id));
        }

        let event = Event::BookingCancelled {
            id,
            space_id: current.space_id,
            at: now,
        };
        self.persist_and_apply(&mut locked.home, &event).await?;
        info!("booking {id} cancelled by {owner}");

        let booking = locked
            .home
            .booking(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        Ok(detail(booking, &locked.home.space, now))
    }

    /// Permanently remove a booking, whatever its status or time.
    pub async fn delete_booking(&self, id: Ulid, owner: &str) -> Result<(), EngineError> {
        let result = self.try_delete_booking(id, owner).await;
        self.observe("delete_booking", &result);
        result
    }

    async fn try_delete_booking(&self, id: Ulid, owner: &str) -> Result<(), EngineError> {
        let mut locked = self.lock_booking(id, None).await?;
        let current = locked
            .home
            .booking(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        check_owner(&current, owner)?;

        let event = Event::BookingDeleted {
            id,
            space_id: current.space_id,
        };
        self.persist_and_apply(&mut locked.home, &event).await?;
        info!("booking {id} deleted by {owner}");
        Ok(())
    }

    /// Approve a pending booking. Administrators only; the caller checks.
    pub async fn confirm_booking(&self, id: Ulid) -> Result<BookingDetail, EngineError> {
        let result = self.try_confirm_booking(id).await;
        self.observe("confirm_booking", &result);
        result
    }

    async fn try_confirm_booking(&self, id: Ulid) -> Result<BookingDetail, EngineError> {
        let mut locked = self.lock_booking(id, None).await?;
        let now = self.clock.now();
        let current = locked
            .home
            .booking(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;

        match current.status {
            BookingStatus::Pending => {}
            BookingStatus::Cancelled => return Err(EngineError::BookingCancelled(id)),
            other => {
                return Err(EngineError::Validation(format!(
                    "only pending bookings can be confirmed, booking is {}",
                    other.as_str()
                )));
            }
        }
        if current.has_ended(now) {
            return Err(EngineError::BookingPast(id));
        }

        let event = Event::BookingConfirmed {
            id,
            space_id: current.space_id,
            at: now,
        };
        self.persist_and_apply(&mut locked.home, &event).await?;
        info!("booking {id} confirmed");

        let booking = locked
            .home
            .booking(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        Ok(detail(booking, &locked.home.space, now))
    }
}
