use chrono::{NaiveDate, TimeDelta};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// First non-cancelled booking on `date` whose slot overlaps `proposed`,
/// ignoring `exclude`.
pub fn find_overlap(
    state: &SpaceState,
    date: NaiveDate,
    proposed: &Slot,
    exclude: Option<Ulid>,
) -> Option<Ulid> {
    state
        .on_date(date)
        .iter()
        .filter(|b| !b.is_cancelled())
        .filter(|b| Some(b.id) != exclude)
        .find(|b| b.slot.overlaps(proposed))
        .map(|b| b.id)
}

pub(crate) fn check_no_conflict(
    state: &SpaceState,
    date: NaiveDate,
    proposed: &Slot,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_overlap(state, date, proposed, exclude) {
        Some(existing) => Err(EngineError::SchedulingConflict(existing)),
        None => Ok(()),
    }
}

/// Bounds are checked on the exact length, so stray seconds cannot slip a
/// slot past either limit. Reported minutes are rounded away from the limit.
pub(crate) fn validate_duration(slot: &Slot) -> Result<(), EngineError> {
    let length = slot.end - slot.start;
    if length > TimeDelta::minutes(MAX_BOOKING_MINUTES) {
        let minutes = (length.num_seconds() + 59) / 60;
        return Err(EngineError::DurationExceeded(minutes));
    }
    if length < TimeDelta::minutes(MIN_BOOKING_MINUTES) {
        return Err(EngineError::DurationTooShort(length.num_minutes()));
    }
    Ok(())
}

pub(crate) fn check_capacity(space: &Space, attendees: u32) -> Result<(), EngineError> {
    if attendees > space.capacity {
        return Err(EngineError::CapacityExceeded {
            capacity: space.capacity,
            attendees,
        });
    }
    Ok(())
}

pub(crate) fn validate_attendees(attendees: u32) -> Result<(), EngineError> {
    if attendees == 0 {
        return Err(EngineError::Validation("attendees must be at least 1".into()));
    }
    Ok(())
}

pub(crate) fn validate_text(
    value: Option<&str>,
    max: usize,
    field: &'static str,
) -> Result<(), EngineError> {
    if let Some(v) = value
        && v.chars().count() > max {
            return Err(EngineError::Validation(format!(
                "{field} must be at most {max} characters"
            )));
        }
    Ok(())
}

pub(crate) fn validate_owner(owner: &str) -> Result<(), EngineError> {
    if owner.is_empty() {
        return Err(EngineError::Validation("missing user".into()));
    }
    if owner.len() > MAX_OWNER_LEN {
        return Err(EngineError::LimitExceeded("user name too long"));
    }
    Ok(())
}
