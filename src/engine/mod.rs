mod availability;
mod catalog;
mod conflict;
mod error;
mod lifecycle;
mod queries;

pub use availability::{free_windows, merge_overlapping, subtract_slots};
pub use conflict::find_overlap;
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::wal::Wal;

pub type SharedSpaceState = Arc<RwLock<SpaceState>>;

/// Status a freshly created booking starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookingWorkflow {
    /// Bookings are confirmed on creation.
    #[default]
    Direct,
    /// Bookings start pending until an administrator confirms them.
    Approval,
}

impl BookingWorkflow {
    pub fn initial_status(&self) -> BookingStatus {
        match self {
            BookingWorkflow::Direct => BookingStatus::Confirmed,
            BookingWorkflow::Approval => BookingStatus::Pending,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "direct" => Some(BookingWorkflow::Direct),
            "approval" => Some(BookingWorkflow::Approval),
            _ => None,
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit:
/// block for the first append, drain whatever else is queued, then flush
/// and fsync once for the whole batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    // Non-append commands must observe everything queued before them.
                    deferred = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, mut batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for batch of {}: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so a partial batch is not carried
    // into the next one.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

pub struct Engine {
    pub(super) spaces: DashMap<Ulid, SharedSpaceState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: booking id → space id
    pub(super) booking_to_space: DashMap<Ulid, Ulid>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) workflow: BookingWorkflow,
    /// Shared by space creation, exclusive for compaction: a compacted
    /// WAL always covers every space whose creation was acknowledged.
    pub(super) catalog_gate: RwLock<()>,
}

/// Apply an event to a single space. The caller holds its write lock.
/// Moves between spaces go through `apply_move`.
fn apply_to_space(ss: &mut SpaceState, event: &Event, booking_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::SpaceUpdated { space } => {
            ss.space = space.clone();
        }
        Event::BookingCreated { booking } => {
            booking_map.insert(booking.id, booking.space_id);
            ss.insert_booking(booking.clone());
        }
        Event::BookingUpdated { booking, .. } => {
            ss.remove_booking(booking.id);
            booking_map.insert(booking.id, booking.space_id);
            ss.insert_booking(booking.clone());
        }
        Event::BookingCancelled { id, at, .. } => {
            set_status(ss, *id, BookingStatus::Cancelled, *at);
        }
        Event::BookingConfirmed { id, at, .. } => {
            set_status(ss, *id, BookingStatus::Confirmed, *at);
        }
        Event::BookingDeleted { id, .. } => {
            ss.remove_booking(*id);
            booking_map.remove(id);
        }
        // SpaceCreated/Deleted are handled at the DashMap level, not here
        Event::SpaceCreated { .. } | Event::SpaceDeleted { .. } => {}
    }
}

fn set_status(ss: &mut SpaceState, id: Ulid, status: BookingStatus, at: chrono::NaiveDateTime) {
    if let Some(b) = ss.bookings.iter_mut().find(|b| b.id == id) {
        b.status = status;
        b.updated_at = at;
    }
}

/// Move a booking between two locked spaces.
fn apply_move(
    from: &mut SpaceState,
    to: &mut SpaceState,
    booking: &Booking,
    booking_map: &DashMap<Ulid, Ulid>,
) {
    from.remove_booking(booking.id);
    to.insert_booking(booking.clone());
    booking_map.insert(booking.id, booking.space_id);
}

/// Write guards over the space holding a booking and, optionally, a second
/// space it may move to.
pub(super) struct LockedBooking {
    pub home: OwnedRwLockWriteGuard<SpaceState>,
    pub other: Option<OwnedRwLockWriteGuard<SpaceState>>,
}

/// How often `lock_booking` re-resolves a booking that moved while waiting.
const LOCK_ATTEMPTS: usize = 3;

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        clock: Arc<dyn Clock>,
        workflow: BookingWorkflow,
    ) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            spaces: DashMap::new(),
            wal_tx,
            booking_to_space: DashMap::new(),
            clock,
            workflow,
            catalog_gate: RwLock::new(()),
        };

        // We're the sole owner of these Arcs during replay, so try_write
        // always succeeds. Never block here: this may run inside an async
        // context (lazy tenant creation).
        for event in &events {
            engine.replay_event(event);
        }
        tracing::debug!(
            "replayed {} events: {} spaces, {} bookings",
            events.len(),
            engine.spaces.len(),
            engine.booking_to_space.len()
        );

        Ok(engine)
    }

    fn replay_event(&self, event: &Event) {
        match event {
            Event::SpaceCreated { space } => {
                let ss = SpaceState::new(space.clone());
                self.spaces.insert(space.id, Arc::new(RwLock::new(ss)));
            }
            Event::SpaceDeleted { id } => {
                if let Some((_, ss)) = self.spaces.remove(id)
                    && let Ok(guard) = ss.try_read() {
                        for b in &guard.bookings {
                            self.booking_to_space.remove(&b.id);
                        }
                    }
            }
            Event::BookingUpdated {
                booking,
                previous_space_id,
            } if *previous_space_id != booking.space_id => {
                let (Some(from), Some(to)) = (
                    self.space_state(previous_space_id),
                    self.space_state(&booking.space_id),
                ) else {
                    return;
                };
                if let (Ok(mut from), Ok(mut to)) = (from.try_write(), to.try_write()) {
                    apply_move(&mut from, &mut to, booking, &self.booking_to_space);
                }
            }
            other => {
                if let Some(space_id) = event_space_id(other)
                    && let Some(ss) = self.space_state(&space_id)
                    && let Ok(mut guard) = ss.try_write() {
                        apply_to_space(&mut guard, other, &self.booking_to_space);
                    }
            }
        }
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) fn space_state(&self, id: &Ulid) -> Option<SharedSpaceState> {
        self.spaces.get(id).map(|e| e.value().clone())
    }

    pub fn space_of_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_space.get(booking_id).map(|e| *e.value())
    }

    pub fn now(&self) -> chrono::NaiveDateTime {
        self.clock.now()
    }

    /// WAL-append + apply in one call, under the caller's write lock.
    pub(super) async fn persist_and_apply(
        &self,
        ss: &mut SpaceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_space(ss, event, &self.booking_to_space);
        Ok(())
    }

    pub(super) async fn persist_and_apply_move(
        &self,
        from: &mut SpaceState,
        to: &mut SpaceState,
        booking: Booking,
    ) -> Result<(), EngineError> {
        let event = Event::BookingUpdated {
            booking: booking.clone(),
            previous_space_id: from.space.id,
        };
        self.wal_append(&event).await?;
        apply_move(from, to, &booking, &self.booking_to_space);
        Ok(())
    }

    /// Lock the space holding `booking_id` for writing, plus `other` if it
    /// names a different existing space. Two spaces are locked in id order.
    pub(super) async fn lock_booking(
        &self,
        booking_id: Ulid,
        other: Option<Ulid>,
    ) -> Result<LockedBooking, EngineError> {
        for _ in 0..LOCK_ATTEMPTS {
            let home_id = self
                .space_of_booking(&booking_id)
                .ok_or(EngineError::NotFound(booking_id))?;
            let home_ss = self
                .space_state(&home_id)
                .ok_or(EngineError::NotFound(booking_id))?;
            let other_ss = other
                .filter(|o| *o != home_id)
                .and_then(|o| self.space_state(&o).map(|ss| (o, ss)));

            let (home, other) = match other_ss {
                Some((oid, oss)) if oid < home_id => {
                    let o = oss.write_owned().await;
                    let h = home_ss.write_owned().await;
                    (h, Some(o))
                }
                Some((_, oss)) => {
                    let h = home_ss.write_owned().await;
                    let o = oss.write_owned().await;
                    (h, Some(o))
                }
                None => (home_ss.write_owned().await, None),
            };

            // The booking may have moved or vanished while we waited, or
            // its space may have been deleted.
            if home.booking(booking_id).is_some() && self.spaces.contains_key(&home_id) {
                return Ok(LockedBooking { home, other });
            }
        }
        Err(EngineError::NotFound(booking_id))
    }

    /// Log and count the outcome of a mutating operation.
    pub(super) fn observe<T>(&self, op: &'static str, result: &Result<T, EngineError>) {
        let Err(e) = result else { return };
        if e.is_systemic() {
            tracing::error!("{op} failed: {e}");
        } else {
            tracing::debug!("{op} rejected: {e}");
        }
        metrics::counter!(
            crate::observability::REJECTIONS_TOTAL,
            "op" => op,
            "kind" => e.kind()
        )
        .increment(1);
    }
}

/// Space an event applies to (for non-Create/Delete space events).
fn event_space_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::SpaceUpdated { space } => Some(space.id),
        Event::BookingCreated { booking } | Event::BookingUpdated { booking, .. } => {
            Some(booking.space_id)
        }
        Event::BookingCancelled { space_id, .. }
        | Event::BookingConfirmed { space_id, .. }
        | Event::BookingDeleted { space_id, .. } => Some(*space_id),
        Event::SpaceCreated { .. } | Event::SpaceDeleted { .. } => None,
    }
}
