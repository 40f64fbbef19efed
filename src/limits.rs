//! Hard limits. Booking policy bounds live here too.

/// Shortest bookable interval, in minutes.
pub const MIN_BOOKING_MINUTES: i64 = 30;
/// Longest bookable interval, in minutes (8 hours).
pub const MAX_BOOKING_MINUTES: i64 = 480;

pub const MAX_SPACES_PER_TENANT: usize = 10_000;
pub const MAX_BOOKINGS_PER_SPACE: usize = 100_000;
pub const MAX_TENANTS: usize = 1_000;
pub const MAX_TENANT_NAME_LEN: usize = 256;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_KIND_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 10_000;
pub const MAX_PURPOSE_LEN: usize = 500;
pub const MAX_NOTES_LEN: usize = 2_000;
pub const MAX_PHOTOS: usize = 32;
pub const MAX_OWNER_LEN: usize = 128;

/// Widest date range a calendar query may cover, in days.
pub const MAX_QUERY_RANGE_DAYS: i64 = 366;

/// Largest single WAL record. A longer length prefix means corruption.
pub const MAX_WAL_ENTRY_BYTES: usize = 1 << 20;
