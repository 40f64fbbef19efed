use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Time-of-day interval on a booking date.
///
/// Both ends count when checking conflicts: `[09:00, 10:00]` and
/// `[10:00, 11:00]` overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Slot {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "Slot start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn try_new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Inclusive-boundary overlap, with `self` as the existing booking and
    /// `proposed` as the candidate. The result is symmetric.
    pub fn overlaps(&self, proposed: &Slot) -> bool {
        let within = |t: NaiveTime| proposed.start <= t && t <= proposed.end;
        within(self.start)
            || within(self.end)
            || (self.start <= proposed.start && self.end >= proposed.end)
    }
}

/// Stored booking status. `Completed` is accepted on replay but never
/// written by the engine; elapsed bookings are projected at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" | "canceled" => Some(BookingStatus::Cancelled),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }
}

/// Opening window per weekday, Monday first. A missing day means closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyHours {
    pub days: [Option<Slot>; 7],
}

impl WeeklyHours {
    pub fn set(&mut self, day: Weekday, window: Slot) {
        self.days[day.num_days_from_monday() as usize] = Some(window);
    }

    pub fn get(&self, day: Weekday) -> Option<Slot> {
        self.days[day.num_days_from_monday() as usize]
    }

    pub fn for_date(&self, date: NaiveDate) -> Option<Slot> {
        self.get(date.weekday())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: Ulid,
    pub name: String,
    pub description: String,
    /// Free-form category tag, e.g. `meeting-room`.
    pub kind: String,
    pub capacity: u32,
    pub photos: Vec<String>,
    pub hours: Option<WeeklyHours>,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub owner: String,
    pub space_id: Ulid,
    pub date: NaiveDate,
    pub slot: Slot,
    pub attendees: u32,
    pub purpose: Option<String>,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn start_at(&self) -> NaiveDateTime {
        self.date.and_time(self.slot.start)
    }

    pub fn end_at(&self) -> NaiveDateTime {
        self.date.and_time(self.slot.end)
    }

    pub fn duration_minutes(&self) -> i64 {
        self.slot.duration_minutes()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == BookingStatus::Cancelled
    }

    pub fn has_ended(&self, now: NaiveDateTime) -> bool {
        self.end_at() < now
    }

    /// Status as seen at `now`: cancelled stays cancelled, anything that has
    /// ended reads as completed, otherwise the stored status.
    pub fn effective_status(&self, now: NaiveDateTime) -> BookingStatus {
        if self.is_cancelled() {
            BookingStatus::Cancelled
        } else if self.has_ended(now) {
            BookingStatus::Completed
        } else {
            self.status
        }
    }
}

/// A space together with all of its bookings.
#[derive(Debug, Clone)]
pub struct SpaceState {
    pub space: Space,
    /// Sorted by `(date, slot.start)`.
    pub bookings: Vec<Booking>,
}

impl SpaceState {
    pub fn new(space: Space) -> Self {
        Self {
            space,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by date, then start time.
    pub fn insert_booking(&mut self, booking: Booking) {
        let key = (booking.date, booking.slot.start);
        let pos = self
            .bookings
            .partition_point(|b| (b.date, b.slot.start) <= key);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Bookings on `date`, all statuses, in start order.
    pub fn on_date(&self, date: NaiveDate) -> &[Booking] {
        let lo = self.bookings.partition_point(|b| b.date < date);
        let hi = self.bookings.partition_point(|b| b.date <= date);
        &self.bookings[lo..hi]
    }

    /// Bookings with `from <= date <= to`, all statuses.
    pub fn between(&self, from: NaiveDate, to: NaiveDate) -> &[Booking] {
        let lo = self.bookings.partition_point(|b| b.date < from);
        let hi = self.bookings.partition_point(|b| b.date <= to).max(lo);
        &self.bookings[lo..hi]
    }
}

/// Flat event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SpaceCreated {
        space: Space,
    },
    SpaceUpdated {
        space: Space,
    },
    SpaceDeleted {
        id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    /// Full new state. `previous_space_id` differs from `booking.space_id`
    /// when the booking moved.
    BookingUpdated {
        booking: Booking,
        previous_space_id: Ulid,
    },
    BookingCancelled {
        id: Ulid,
        space_id: Ulid,
        at: NaiveDateTime,
    },
    BookingConfirmed {
        id: Ulid,
        space_id: Ulid,
        at: NaiveDateTime,
    },
    BookingDeleted {
        id: Ulid,
        space_id: Ulid,
    },
}

// ── Operation inputs ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSpace {
    pub id: Ulid,
    pub name: String,
    pub description: String,
    pub kind: String,
    pub capacity: u32,
    pub photos: Vec<String>,
    pub hours: Option<WeeklyHours>,
    pub active: bool,
}

/// Partial space update. `hours: Some(None)` clears the opening hours.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub kind: Option<String>,
    pub capacity: Option<u32>,
    pub photos: Option<Vec<String>>,
    pub hours: Option<Option<WeeklyHours>>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub id: Ulid,
    pub space_id: Ulid,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub attendees: Option<u32>,
    pub purpose: Option<String>,
    pub notes: Option<String>,
}

/// Partial booking update. `notes: Some(None)` clears the notes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingChanges {
    pub space_id: Option<Ulid>,
    pub date: Option<NaiveDate>,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
    pub attendees: Option<u32>,
    pub purpose: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

impl BookingChanges {
    pub fn touches_times(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    /// Not yet started, not cancelled.
    Upcoming,
    /// In progress right now, not cancelled.
    Active,
    /// Cancelled or already ended.
    Past,
}

impl Timeframe {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "upcoming" => Some(Timeframe::Upcoming),
            "active" => Some(Timeframe::Active),
            "past" => Some(Timeframe::Past),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    /// Matches the effective status.
    pub status: Option<BookingStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub timeframe: Option<Timeframe>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceFilter {
    pub id: Option<Ulid>,
    pub kind: Option<String>,
    pub min_capacity: Option<u32>,
    pub active: Option<bool>,
}

// ── Query result types ───────────────────────────────────────────

/// A booking with its space resolved and its status projected at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDetail {
    pub booking: Booking,
    pub space: Space,
    pub effective_status: BookingStatus,
}
