use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed or missing input; the client must fix the request shape.
    Validation(String),
    SpaceUnavailable(Ulid),
    DurationTooShort(i64),
    DurationExceeded(i64),
    /// Overlaps the booking with this id.
    SchedulingConflict(Ulid),
    CapacityExceeded {
        capacity: u32,
        attendees: u32,
    },
    BookingPast(Ulid),
    BookingCancelled(Ulid),
    AlreadyCancelled(Ulid),
    NotFound(Ulid),
    Forbidden(Ulid),
    SpaceHasBookings(Ulid),
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Short, stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::SpaceUnavailable(_) => "space_unavailable",
            EngineError::DurationTooShort(_) => "duration_too_short",
            EngineError::DurationExceeded(_) => "duration_exceeded",
            EngineError::SchedulingConflict(_) => "scheduling_conflict",
            EngineError::CapacityExceeded { .. } => "capacity_exceeded",
            EngineError::BookingPast(_) => "booking_past",
            EngineError::BookingCancelled(_) => "booking_cancelled",
            EngineError::AlreadyCancelled(_) => "already_cancelled",
            EngineError::NotFound(_) => "not_found",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::SpaceHasBookings(_) => "space_has_bookings",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "storage",
        }
    }

    /// Only storage failures are faults; everything else is a rejection the
    /// client can correct.
    pub fn is_systemic(&self) -> bool {
        matches!(self, EngineError::WalError(_))
    }

    /// Status code an HTTP front end should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::Validation(_) => 422,
            EngineError::SchedulingConflict(_) | EngineError::AlreadyExists(_) => 409,
            EngineError::NotFound(_) => 404,
            EngineError::Forbidden(_) => 403,
            EngineError::WalError(_) => 500,
            EngineError::SpaceUnavailable(_)
            | EngineError::DurationTooShort(_)
            | EngineError::DurationExceeded(_)
            | EngineError::CapacityExceeded { .. }
            | EngineError::BookingPast(_)
            | EngineError::BookingCancelled(_)
            | EngineError::AlreadyCancelled(_)
            | EngineError::SpaceHasBookings(_)
            | EngineError::LimitExceeded(_) => 400,
        }
    }

    /// SQLSTATE reported over the wire protocol.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "22023",
            EngineError::SpaceUnavailable(_)
            | EngineError::BookingPast(_)
            | EngineError::BookingCancelled(_)
            | EngineError::AlreadyCancelled(_) => "55000",
            EngineError::DurationTooShort(_) | EngineError::DurationExceeded(_) => "22008",
            EngineError::SchedulingConflict(_) => "23P01",
            EngineError::CapacityExceeded { .. } => "53400",
            EngineError::NotFound(_) => "02000",
            EngineError::Forbidden(_) => "42501",
            EngineError::SpaceHasBookings(_) => "2BP01",
            EngineError::AlreadyExists(_) => "23505",
            EngineError::LimitExceeded(_) => "54000",
            EngineError::WalError(_) => "58030",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation error: {msg}"),
            EngineError::SpaceUnavailable(id) => write!(f, "space unavailable: {id}"),
            EngineError::DurationTooShort(min) => {
                write!(f, "booking too short: {min} minutes (minimum {})", crate::limits::MIN_BOOKING_MINUTES)
            }
            EngineError::DurationExceeded(min) => {
                write!(f, "booking too long: {min} minutes (maximum {})", crate::limits::MAX_BOOKING_MINUTES)
            }
            EngineError::SchedulingConflict(id) => {
                write!(f, "scheduling conflict with booking: {id}")
            }
            EngineError::CapacityExceeded { capacity, attendees } => {
                write!(f, "space holds {capacity} people, {attendees} requested")
            }
            EngineError::BookingPast(id) => write!(f, "booking has already ended: {id}"),
            EngineError::BookingCancelled(id) => {
                write!(f, "cannot modify cancelled booking: {id}")
            }
            EngineError::AlreadyCancelled(id) => write!(f, "booking already cancelled: {id}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Forbidden(id) => write!(f, "not permitted on: {id}"),
            EngineError::SpaceHasBookings(id) => {
                write!(f, "cannot delete space {id}: has upcoming bookings")
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
