use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::limits::MAX_WAL_ENTRY_BYTES;
use crate::model::Event;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_WAL_ENTRY_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("event of {} bytes exceeds WAL entry limit", payload.len()),
        ));
    }
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Reads `buf.len()` bytes; `Ok(false)` on a clean or torn end of file.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only write-ahead log of space and booking events, one per tenant.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A torn last entry (crash mid-write) is discarded via length-prefix + CRC check.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the WAL file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append and fsync a single event. The engine batches through
    /// `append_buffered` + `flush_sync` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer an event without flushing. Nothing is durable until
    /// `flush_sync()` returns.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the compacted event set to a sibling temp file and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Rename the temp file over the WAL and reopen it for appending.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replay the WAL from disk, returning all valid events in order.
    /// Replay stops at the first torn or corrupt entry.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_WAL_ENTRY_BYTES {
                tracing::warn!(
                    "{}: entry {} claims {len} bytes, discarding tail",
                    path.display(),
                    events.len()
                );
                break;
            }

            let mut payload = vec![0u8; len];
            let mut crc_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut payload)? || !read_or_eof(&mut reader, &mut crc_buf)? {
                tracing::warn!("{}: torn entry after {} events", path.display(), events.len());
                break;
            }

            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!("{}: CRC mismatch after {} events", path.display(), events.len());
                break;
            }

            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!("{}: undecodable entry: {e}", path.display());
                    break;
                }
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Booking, BookingStatus, Slot, Space};
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use ulid::Ulid;

    /// Fresh path under the temp dir; any file left by an earlier run is removed.
    fn fresh_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("spacebook_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn space_created(id: Ulid) -> Event {
        Event::SpaceCreated {
            space: Space {
                id,
                name: "Boardroom".into(),
                description: "Top floor".into(),
                kind: "meeting_room".into(),
                capacity: 12,
                photos: vec!["https://img.example/board.jpg".into()],
                hours: None,
                active: true,
                created_at: ts(),
                updated_at: ts(),
            },
        }
    }

    fn booking_created(space_id: Ulid, hour: u32) -> Event {
        Event::BookingCreated {
            booking: Booking {
                id: Ulid::new(),
                owner: "alice".into(),
                space_id,
                date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
                slot: Slot::new(
                    NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
                    NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
                ),
                attendees: 4,
                purpose: Some("standup".into()),
                notes: None,
                status: BookingStatus::Confirmed,
                created_at: ts(),
                updated_at: ts(),
            },
        }
    }

    #[test]
    fn append_and_replay() {
        let path = fresh_path("append_and_replay.wal");

        let sid = Ulid::new();
        let events = vec![space_created(sid), booking_created(sid, 9)];

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }

        assert_eq!(Wal::replay(&path).unwrap(), events);
    }

    #[test]
    fn replay_drops_torn_tail() {
        let path = fresh_path("truncation.wal");

        let event = space_created(Ulid::new());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![event]);
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = fresh_path("nonexistent.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_stops_at_bad_crc() {
        let path = fresh_path("corrupt_crc.wal");

        let event = Event::SpaceDeleted { id: Ulid::new() };
        {
            let payload = bincode::serialize(&event).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEADBEEFu32.to_le_bytes()).unwrap();
        }

        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_rejects_absurd_length() {
        let path = fresh_path("absurd_len.wal");
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(&u32::MAX.to_le_bytes()).unwrap();
        }
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn compact_shrinks_churned_log() {
        let path = fresh_path("compact_reduce.wal");

        let sid = Ulid::new();
        let created = space_created(sid);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&created).unwrap();
            for hour in 8..18 {
                let event = booking_created(sid, hour);
                let Event::BookingCreated { booking } = &event else { unreachable!() };
                let id = booking.id;
                wal.append(&event).unwrap();
                wal.append(&Event::BookingDeleted { id, space_id: sid }).unwrap();
            }
        }
        let before = fs::metadata(&path).unwrap().len();

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.compact(std::slice::from_ref(&created)).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
        }

        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL should be smaller: {after} < {before}");
        assert_eq!(Wal::replay(&path).unwrap(), vec![created]);
    }

    #[test]
    fn append_after_compact() {
        let path = fresh_path("compact_append.wal");

        let sid = Ulid::new();
        let created = space_created(sid);
        let cancel = Event::BookingCancelled {
            id: Ulid::new(),
            space_id: sid,
            at: ts(),
        };

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&created).unwrap();
            wal.compact(std::slice::from_ref(&created)).unwrap();
            wal.append(&cancel).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![created, cancel]);
    }

    #[test]
    fn buffered_appends_are_counted() {
        let path = fresh_path("buffered_flush.wal");

        let sid = Ulid::new();
        let events: Vec<Event> = (9..14).map(|h| booking_created(sid, h)).collect();
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 5);
            wal.flush_sync().unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), events);
    }
}
