use chrono::{NaiveDate, NaiveTime, TimeDelta};

use crate::model::*;

// ── Free windows ──────────────────────────────────────────────────

/// Padding around each booking when carving free windows. Boundaries are
/// inclusive, so a new booking may start one minute after another ends.
const BOUNDARY_GAP: TimeDelta = TimeDelta::minutes(1);

/// Last bookable minute of a day without opening hours.
fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN)
}

/// Free windows on `date` of at least `min_minutes`, inside the space's
/// opening hours (or the whole day when it has none). Every returned window
/// can be booked as-is without a conflict.
pub fn free_windows(state: &SpaceState, date: NaiveDate, min_minutes: i64) -> Vec<Slot> {
    let window = match &state.space.hours {
        Some(hours) => match hours.for_date(date) {
            Some(w) => w,
            None => return Vec::new(),
        },
        None => Slot::new(NaiveTime::MIN, end_of_day()),
    };

    let busy: Vec<Slot> = state
        .on_date(date)
        .iter()
        .filter(|b| !b.is_cancelled())
        .map(|b| pad(&b.slot))
        .collect();
    let mut busy = merge_overlapping(&busy);
    busy.sort_by_key(|s| s.start);

    subtract_slots(&[window], &busy)
        .into_iter()
        .filter(|s| s.duration_minutes() >= min_minutes)
        .collect()
}

/// Widen a slot by the boundary gap on both sides, clamped to the day.
fn pad(slot: &Slot) -> Slot {
    let (start, wrapped) = slot.start.overflowing_sub_signed(BOUNDARY_GAP);
    let start = if wrapped != 0 { NaiveTime::MIN } else { start };
    let (end, wrapped) = slot.end.overflowing_add_signed(BOUNDARY_GAP);
    let end = if wrapped != 0 { end_of_day().max(slot.end) } else { end };
    Slot::new(start, end)
}

/// Merge sorted overlapping/adjacent slots into disjoint slots.
pub fn merge_overlapping(sorted: &[Slot]) -> Vec<Slot> {
    let mut merged: Vec<Slot> = Vec::new();
    for &slot in sorted {
        if let Some(last) = merged.last_mut()
            && slot.start <= last.end {
                last.end = last.end.max(slot.end);
                continue;
            }
        merged.push(slot);
    }
    merged
}

/// Remove `to_remove` (sorted, disjoint) from `base` (sorted, disjoint).
pub fn subtract_slots(base: &[Slot], to_remove: &[Slot]) -> Vec<Slot> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Slot::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Slot::new(current_start, current_end));
        }
    }

    result
}
