//! Subscriber queue
//!
//! Undelivered events stay in memory up to `event_queue_max_size`. Past that
//! bound, and for as long as anything is left on disk, new events go to the
//! queue file so that delivery order always matches push order.
//!
//! ```text
//!   push() ──► pending (memory) ──┐
//!        └──► queue file (disk) ──┴──► read() ──► unacked ──► ack(n)
//! ```
//!
//! Closing a queue that still has records on disk saves the read position of
//! the queue file in `<name>.offset`, so a reopened queue resumes after the
//! records already delivered.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufWriter, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use parking_lot::{Condvar, Mutex};

use super::config::MuxerConfig;
use crate::error::{Error, Result};
use crate::event::{self, Event, EventType, FilterSet, ReadOutcome, RECORD_HEADER_SIZE};
use crate::file::{OpenMode, Splitter};

/// Point-in-time view of a queue, used for statistics
#[derive(Debug, Clone, PartialEq)]
pub struct MuxerStatistics {
    pub name: String,
    pub queued_events: u64,
    pub unacknowledged_events: u64,
    pub queue_file_enabled: bool,
    pub read_filters: FilterSet,
    pub write_filters: FilterSet,
    pub queue_file_path: PathBuf,
    pub memory_file_path: PathBuf,
}

struct QueueState {
    /// Delivered, waiting for ack
    unacked: VecDeque<Event>,
    /// Undelivered, in memory
    pending: VecDeque<Event>,
    /// Overflow storage, open while `on_disk > 0`
    queue_file: Option<Splitter>,
    /// Undelivered records in the queue file
    on_disk: u64,
    read_filters: FilterSet,
    write_filters: FilterSet,
    closed: bool,
}

/// Per-subscriber event queue
pub struct Muxer {
    name: String,
    config: MuxerConfig,
    queue_file_path: PathBuf,
    memory_file_path: PathBuf,
    offset_file_path: PathBuf,
    state: Mutex<QueueState>,
    readable: Condvar,
}

impl Muxer {
    /// Open the queue `name`, recovering events left by a previous run
    ///
    /// Events of the memory file come first, then the records of the queue
    /// file.
    pub fn new(name: impl Into<String>, config: MuxerConfig) -> Result<Self> {
        let name = name.into();
        fs::create_dir_all(&config.queue_dir).map_err(|source| Error::FileOpen {
            path: config.queue_dir.clone(),
            source,
        })?;

        let queue_file_path = config.queue_dir.join(format!("{}.queue", name));
        let memory_file_path = config.queue_dir.join(format!("{}.memory", name));
        let offset_file_path = config.queue_dir.join(format!("{}.offset", name));

        let muxer = Self {
            name,
            config,
            queue_file_path,
            memory_file_path,
            offset_file_path,
            state: Mutex::new(QueueState {
                unacked: VecDeque::new(),
                pending: VecDeque::new(),
                queue_file: None,
                on_disk: 0,
                read_filters: FilterSet::all(),
                write_filters: FilterSet::all(),
                closed: false,
            }),
            readable: Condvar::new(),
        };
        muxer.recover()?;

        tracing::info!(
            muxer = %muxer.name,
            pending = muxer.pending_count(),
            persistent = muxer.config.persistent,
            "Muxer opened"
        );
        Ok(muxer)
    }

    fn recover(&self) -> Result<()> {
        let mut st = self.state.lock();
        let mut salvaged = Vec::new();
        let offset = load_read_offset(&self.offset_file_path)?;

        match Splitter::open(&self.queue_file_path, OpenMode::Read, self.config.max_file_size, false) {
            Ok(stale) => {
                stale.seek(SeekFrom::Start(offset))?;
                let (count, intact) = count_records(&stale);
                if intact && count > 0 {
                    drop(stale);
                    let file = self.open_queue_file()?;
                    file.seek(SeekFrom::Start(offset))?;
                    st.queue_file = Some(file);
                    st.on_disk = count;
                    tracing::debug!(
                        muxer = %self.name,
                        records = count,
                        offset = offset,
                        "Queue file resumed"
                    );
                } else {
                    if !intact {
                        tracing::warn!(
                            muxer = %self.name,
                            path = %self.queue_file_path.display(),
                            records = count,
                            "Queue file ends with a truncated record, rewriting it"
                        );
                        let reader = Splitter::open(
                            &self.queue_file_path,
                            OpenMode::Read,
                            self.config.max_file_size,
                            false,
                        )?;
                        reader.seek(SeekFrom::Start(offset))?;
                        for _ in 0..count {
                            if let Some(event) = read_record(&reader)? {
                                salvaged.push(event);
                            }
                        }
                    }
                    stale.remove_all_files()?;
                    remove_if_exists(&self.offset_file_path)?;
                }
            }
            Err(Error::FileOpen { ref source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                remove_if_exists(&self.offset_file_path)?;
            }
            Err(e) => return Err(e),
        }

        let memory = load_memory_file(&self.memory_file_path)?;
        if !memory.is_empty() {
            tracing::info!(
                muxer = %self.name,
                events = memory.len(),
                "Retained events reloaded from memory file"
            );
        }

        if st.on_disk > 0 {
            // Older than anything on disk, so they bypass the memory bound
            st.pending.extend(memory);
        } else {
            for event in memory {
                self.enqueue(&mut st, event)?;
            }
        }
        for event in salvaged {
            self.enqueue(&mut st, event)?;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &MuxerConfig {
        &self.config
    }

    pub fn queue_file_path(&self) -> &Path {
        &self.queue_file_path
    }

    pub fn memory_file_path(&self) -> &Path {
        &self.memory_file_path
    }

    /// Append an event
    ///
    /// Write filters are not applied here; the engine checks
    /// [`accepts`](Self::accepts) before pushing.
    ///
    /// # Errors
    ///
    /// `Error::Shutdown` once the queue is closed, `Error::PayloadTooLarge`
    /// for a payload over `MAX_PAYLOAD_SIZE`, `Error::Io` if the queue file
    /// cannot be written. A failed write leaves the queue file unchanged.
    pub fn push(&self, event: Event) -> Result<()> {
        if !event::codec::fits(event.size()) {
            return Err(Error::PayloadTooLarge { size: event.size() });
        }

        let mut st = self.state.lock();
        if st.closed {
            return Err(Error::shutdown(format!("muxer '{}' is closed", self.name)));
        }
        self.enqueue(&mut st, event)?;
        drop(st);

        self.readable.notify_all();
        Ok(())
    }

    fn enqueue(&self, st: &mut QueueState, event: Event) -> Result<()> {
        if st.on_disk == 0 && st.pending.len() < self.config.event_queue_max_size {
            st.pending.push_back(event);
            return Ok(());
        }

        if st.queue_file.is_none() {
            st.queue_file = Some(self.open_queue_file()?);
            tracing::debug!(
                muxer = %self.name,
                path = %self.queue_file_path.display(),
                "Queue file enabled"
            );
        }

        let mut buf = BytesMut::with_capacity(RECORD_HEADER_SIZE + event.size());
        event::encode(&event, &mut buf);
        if let Some(file) = st.queue_file.as_ref() {
            file.write(&buf)?;
        }
        st.on_disk += 1;
        Ok(())
    }

    fn open_queue_file(&self) -> Result<Splitter> {
        Splitter::open(
            &self.queue_file_path,
            OpenMode::ReadWrite,
            self.config.max_file_size,
            false,
        )
    }

    /// Next undelivered event, from memory first and then from disk
    fn next_event(&self, st: &mut QueueState) -> Result<Option<Event>> {
        if let Some(event) = st.pending.pop_front() {
            return Ok(Some(event));
        }
        if st.on_disk == 0 {
            return Ok(None);
        }

        let event = match st.queue_file.as_ref() {
            Some(file) => read_record(file)?,
            None => None,
        };
        let Some(event) = event else {
            let missing = st.on_disk;
            st.on_disk = 0;
            self.drop_queue_file(st)?;
            return Err(Error::Corrupted {
                path: self.queue_file_path.clone(),
                reason: format!("{} queued records missing", missing),
            });
        };

        st.on_disk -= 1;
        if st.on_disk == 0 {
            self.drop_queue_file(st)?;
        }
        Ok(Some(event))
    }

    fn drop_queue_file(&self, st: &mut QueueState) -> Result<()> {
        if let Some(file) = st.queue_file.take() {
            file.remove_all_files()?;
            remove_if_exists(&self.offset_file_path)?;
            tracing::debug!(muxer = %self.name, "Queue file drained");
        }
        Ok(())
    }

    /// Deliver the next event accepted by the read filters
    ///
    /// A zero `timeout` never blocks. Events rejected by the read filters are
    /// dropped without counting as unacknowledged.
    pub fn read(&self, timeout: Duration) -> Result<ReadOutcome> {
        let deadline = Instant::now().checked_add(timeout);
        let mut st = self.state.lock();

        loop {
            while let Some(event) = self.next_event(&mut st)? {
                if st.read_filters.accepts(event.type_id()) {
                    st.unacked.push_back(event.clone());
                    return Ok(ReadOutcome::Event(event));
                }
                tracing::trace!(
                    muxer = %self.name,
                    type_id = event.type_id(),
                    "Event discarded by read filters"
                );
            }

            if st.closed {
                return Ok(ReadOutcome::Closed);
            }

            match deadline {
                Some(deadline) if Instant::now() >= deadline => return Ok(ReadOutcome::TimedOut),
                Some(deadline) => {
                    self.readable.wait_until(&mut st, deadline);
                }
                None => self.readable.wait(&mut st),
            }
        }
    }

    /// Release up to `count` delivered events, returning how many were released
    pub fn ack(&self, count: usize) -> usize {
        let mut st = self.state.lock();
        let n = count.min(st.unacked.len());
        st.unacked.drain(..n);
        n
    }

    pub fn set_read_filters(&self, filters: FilterSet) {
        tracing::debug!(muxer = %self.name, filters = %filters, "Read filters set");
        self.state.lock().read_filters = filters;
    }

    pub fn set_write_filters(&self, filters: FilterSet) {
        tracing::debug!(muxer = %self.name, filters = %filters, "Write filters set");
        self.state.lock().write_filters = filters;
    }

    pub fn read_filters(&self) -> FilterSet {
        self.state.lock().read_filters.clone()
    }

    pub fn write_filters(&self) -> FilterSet {
        self.state.lock().write_filters.clone()
    }

    /// Whether the write filters accept this event type
    pub fn accepts(&self, type_id: EventType) -> bool {
        self.state.lock().write_filters.accepts(type_id)
    }

    /// Undelivered events, in memory and on disk
    pub fn pending_count(&self) -> u64 {
        let st = self.state.lock();
        st.pending.len() as u64 + st.on_disk
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.state.lock().unacked.len()
    }

    /// Whether events are currently spilled to the queue file
    pub fn is_overflowing(&self) -> bool {
        self.state.lock().queue_file.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Delete the queue file and the memory file, dropping on-disk events
    pub fn remove_persisted_files(&self) -> Result<()> {
        let mut st = self.state.lock();

        if st.on_disk > 0 {
            tracing::warn!(
                muxer = %self.name,
                events = st.on_disk,
                "Dropping events of the queue file"
            );
        }
        st.on_disk = 0;

        match st.queue_file.take() {
            Some(file) => file.remove_all_files()?,
            None => match Splitter::open(
                &self.queue_file_path,
                OpenMode::Read,
                self.config.max_file_size,
                false,
            ) {
                Ok(stale) => stale.remove_all_files()?,
                Err(Error::FileOpen { ref source, .. })
                    if source.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            },
        }

        remove_if_exists(&self.memory_file_path)?;
        remove_if_exists(&self.offset_file_path)?;

        tracing::debug!(muxer = %self.name, "Persisted files removed");
        Ok(())
    }

    /// Stop accepting events
    ///
    /// A persistent queue saves its unacked, pending and on-disk events to the
    /// memory file and empties itself. Otherwise the queue file keeps its
    /// undelivered records and the read position is saved next to it;
    /// remaining events can still be read until `Closed` is returned.
    pub fn close(&self) -> Result<()> {
        let mut st = self.state.lock();
        if st.closed {
            return Ok(());
        }
        st.closed = true;

        let result = if self.config.persistent {
            self.dump(&mut st)
        } else {
            self.save_read_offset(&st)
        };
        drop(st);

        self.readable.notify_all();
        tracing::info!(muxer = %self.name, "Muxer closed");
        result
    }

    fn save_read_offset(&self, st: &QueueState) -> Result<()> {
        let Some(file) = st.queue_file.as_ref() else {
            return remove_if_exists(&self.offset_file_path);
        };
        file.flush()?;

        let offset = file.read_position();
        fs::write(&self.offset_file_path, offset.to_string()).map_err(|source| {
            Error::FileOpen {
                path: self.offset_file_path.clone(),
                source,
            }
        })?;
        tracing::debug!(
            muxer = %self.name,
            offset = offset,
            records = st.on_disk,
            "Queue file read position saved"
        );
        Ok(())
    }

    fn dump(&self, st: &mut QueueState) -> Result<()> {
        if st.unacked.is_empty() && st.pending.is_empty() && st.on_disk == 0 {
            return Ok(());
        }

        let file = File::create(&self.memory_file_path).map_err(|source| Error::FileOpen {
            path: self.memory_file_path.clone(),
            source,
        })?;
        let mut out = BufWriter::new(file);
        let mut buf = BytesMut::new();
        let mut events = 0u64;

        let in_memory: Vec<Event> = st.unacked.drain(..).chain(st.pending.drain(..)).collect();
        for event in &in_memory {
            event::encode(event, &mut buf);
            events += 1;
        }
        out.write_all(&buf)?;

        while let Some(event) = self.next_event(st)? {
            buf.clear();
            event::encode(&event, &mut buf);
            out.write_all(&buf)?;
            events += 1;
        }
        out.flush()?;

        tracing::info!(
            muxer = %self.name,
            events = events,
            path = %self.memory_file_path.display(),
            "Retained events saved to memory file"
        );
        Ok(())
    }

    pub fn statistics(&self) -> MuxerStatistics {
        let st = self.state.lock();
        MuxerStatistics {
            name: self.name.clone(),
            queued_events: st.pending.len() as u64 + st.on_disk,
            unacknowledged_events: st.unacked.len() as u64,
            queue_file_enabled: st.queue_file.is_some(),
            read_filters: st.read_filters.clone(),
            write_filters: st.write_filters.clone(),
            queue_file_path: self.queue_file_path.clone(),
            memory_file_path: self.memory_file_path.clone(),
        }
    }
}

impl Drop for Muxer {
    fn drop(&mut self) {
        // Reads after close may have moved the queue file position
        let result = self.close().and_then(|()| {
            if self.config.persistent {
                Ok(())
            } else {
                self.save_read_offset(&self.state.lock())
            }
        });
        if let Err(e) = result {
            tracing::warn!(muxer = %self.name, error = %e, "Failed to close muxer");
        }
    }
}

impl std::fmt::Debug for Muxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Muxer")
            .field("name", &self.name)
            .field("queue_file_path", &self.queue_file_path)
            .finish()
    }
}

/// Read one record; `None` at the end of the written data
fn read_record(file: &Splitter) -> Result<Option<Event>> {
    let mut header = [0u8; RECORD_HEADER_SIZE];
    let n = file.read(&mut header)?;
    if n == 0 {
        return Ok(None);
    }
    let truncated = || Error::Corrupted {
        path: file.base_path().to_path_buf(),
        reason: "truncated record".into(),
    };
    if n < RECORD_HEADER_SIZE {
        return Err(truncated());
    }

    let (type_id, len) = event::decode_header(&header).ok_or_else(truncated)?;
    // A header claiming more than was written is a torn record
    if len as u64 > file.available() {
        return Err(truncated());
    }
    let mut payload = vec![0u8; len];
    if file.read(&mut payload)? < len {
        return Err(truncated());
    }
    Ok(Some(Event::new(type_id, payload)))
}

/// Count complete records; the flag is false if a truncated one ends the data
fn count_records(file: &Splitter) -> (u64, bool) {
    let mut count = 0;
    loop {
        match read_record(file) {
            Ok(Some(_)) => count += 1,
            Ok(None) => return (count, true),
            Err(_) => return (count, false),
        }
    }
}

/// Saved read position of the queue file, 0 when there is none
fn load_read_offset(path: &Path) -> Result<u64> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(path = %path.display(), "Unreadable queue offset, starting over");
            0
        })),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(source) => Err(Error::FileOpen {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Load and delete the memory file
fn load_memory_file(path: &Path) -> Result<Vec<Event>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(Error::FileOpen {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut buf = BytesMut::from(&data[..]);
    let mut events = Vec::new();
    while let Some(event) = event::decode(&mut buf) {
        events.push(event);
    }
    if !buf.is_empty() {
        tracing::warn!(
            path = %path.display(),
            bytes = buf.len(),
            "Memory file ends with a truncated record"
        );
    }

    fs::remove_file(path)?;
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::make_type;
    use std::sync::Arc;
    use std::thread;

    const SERVICE_STATUS: EventType = make_type(1, 24);
    const HOST_STATUS: EventType = make_type(1, 14);

    fn event(i: usize) -> Event {
        Event::new(SERVICE_STATUS, format!("event-{}", i))
    }

    fn config(dir: &Path) -> MuxerConfig {
        MuxerConfig::with_queue_dir(dir)
    }

    fn read_now(muxer: &Muxer) -> Option<Event> {
        muxer.read(Duration::ZERO).unwrap().into_event()
    }

    #[test]
    fn test_order_through_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Muxer::new("central-rrd", config(dir.path()).event_queue_max_size(3)).unwrap();

        for i in 0..10 {
            muxer.push(event(i)).unwrap();
        }
        assert!(muxer.is_overflowing());
        assert!(muxer.queue_file_path().exists());
        assert_eq!(muxer.pending_count(), 10);

        for i in 0..10 {
            assert_eq!(read_now(&muxer), Some(event(i)));
        }
        assert!(muxer.read(Duration::ZERO).unwrap().is_timed_out());
        assert_eq!(muxer.pending_count(), 0);
        assert_eq!(muxer.unacknowledged_count(), 10);

        // The drained queue file is gone
        assert!(!muxer.is_overflowing());
        assert!(!muxer.queue_file_path().exists());
    }

    #[test]
    fn test_interleaved_push_and_read_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Muxer::new("sql", config(dir.path()).event_queue_max_size(2)).unwrap();

        let mut next_read = 0;
        for i in 0..20 {
            muxer.push(event(i)).unwrap();
            if i % 3 == 0 {
                assert_eq!(read_now(&muxer), Some(event(next_read)));
                next_read += 1;
            }
        }
        while let Some(e) = read_now(&muxer) {
            assert_eq!(e, event(next_read));
            next_read += 1;
        }
        assert_eq!(next_read, 20);
    }

    #[test]
    fn test_ack_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Muxer::new("ack", config(dir.path())).unwrap();

        for i in 0..3 {
            muxer.push(event(i)).unwrap();
        }
        read_now(&muxer).unwrap();
        read_now(&muxer).unwrap();
        assert_eq!(muxer.unacknowledged_count(), 2);

        assert_eq!(muxer.ack(5), 2);
        assert_eq!(muxer.ack(1), 0);
        assert_eq!(muxer.unacknowledged_count(), 0);
        assert_eq!(muxer.pending_count(), 1);
    }

    #[test]
    fn test_read_filters_discard() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Muxer::new("filtered", config(dir.path())).unwrap();
        muxer.set_read_filters(FilterSet::from([SERVICE_STATUS]));

        muxer.push(Event::new(HOST_STATUS, "host")).unwrap();
        muxer.push(Event::new(SERVICE_STATUS, "service")).unwrap();

        let e = read_now(&muxer).unwrap();
        assert_eq!(e.type_id(), SERVICE_STATUS);
        assert_eq!(muxer.unacknowledged_count(), 1);
        assert!(muxer.read(Duration::ZERO).unwrap().is_timed_out());
    }

    #[test]
    fn test_write_filters() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Muxer::new("write-filtered", config(dir.path())).unwrap();
        assert!(muxer.accepts(HOST_STATUS));

        muxer.set_write_filters(FilterSet::from([SERVICE_STATUS]));
        assert!(muxer.accepts(SERVICE_STATUS));
        assert!(!muxer.accepts(HOST_STATUS));
        assert_eq!(muxer.statistics().write_filters.len(), 1);
    }

    #[test]
    fn test_read_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Muxer::new("idle", config(dir.path())).unwrap();

        let start = Instant::now();
        assert!(muxer.read(Duration::from_millis(30)).unwrap().is_timed_out());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_blocking_read_wakes_on_push() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Arc::new(Muxer::new("wake", config(dir.path())).unwrap());

        let producer = {
            let muxer = muxer.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                muxer.push(event(7)).unwrap();
            })
        };

        let outcome = muxer.read(Duration::from_secs(5)).unwrap();
        assert_eq!(outcome, ReadOutcome::Event(event(7)));
        producer.join().unwrap();
    }

    #[test]
    fn test_close_then_drain() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Muxer::new("closing", config(dir.path())).unwrap();

        muxer.push(event(0)).unwrap();
        muxer.close().unwrap();
        assert!(muxer.is_closed());
        assert!(muxer.push(event(1)).unwrap_err().is_shutdown());

        assert_eq!(read_now(&muxer), Some(event(0)));
        assert!(muxer.read(Duration::from_secs(1)).unwrap().is_closed());
    }

    #[test]
    fn test_persistent_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path()).event_queue_max_size(2).persistent(true);

        let muxer = Muxer::new("retention", cfg.clone()).unwrap();
        for i in 0..5 {
            muxer.push(event(i)).unwrap();
        }
        // Delivered but not acked: saved as well
        assert_eq!(read_now(&muxer), Some(event(0)));
        muxer.close().unwrap();

        assert!(muxer.memory_file_path().exists());
        assert!(!muxer.queue_file_path().exists());
        assert!(muxer.read(Duration::ZERO).unwrap().is_closed());
        drop(muxer);

        let muxer = Muxer::new("retention", cfg).unwrap();
        assert!(!muxer.memory_file_path().exists());
        assert_eq!(muxer.pending_count(), 5);
        for i in 0..5 {
            assert_eq!(read_now(&muxer), Some(event(i)));
        }
    }

    #[test]
    fn test_queue_file_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path()).event_queue_max_size(1).max_file_size(16);

        let muxer = Muxer::new("recovered", cfg.clone()).unwrap();
        for i in 0..4 {
            muxer.push(event(i)).unwrap();
        }
        drop(muxer);

        // Only the in-memory event is lost without persistence
        let muxer = Muxer::new("recovered", cfg).unwrap();
        assert_eq!(muxer.pending_count(), 3);
        assert!(muxer.is_overflowing());
        for i in 1..4 {
            assert_eq!(read_now(&muxer), Some(event(i)));
        }
    }

    #[test]
    fn test_truncated_queue_file_is_salvaged() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path()).event_queue_max_size(1);

        let muxer = Muxer::new("torn", cfg.clone()).unwrap();
        for i in 0..3 {
            muxer.push(event(i)).unwrap();
        }
        let path = muxer.queue_file_path().to_path_buf();
        drop(muxer);

        // Half a record at the end, as left by a crash mid-write
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[1, 0, 0, 0, 200]).unwrap();
        drop(file);

        let muxer = Muxer::new("torn", cfg).unwrap();
        assert_eq!(muxer.pending_count(), 2);
        assert_eq!(read_now(&muxer), Some(event(1)));
        assert_eq!(read_now(&muxer), Some(event(2)));
        assert!(muxer.read(Duration::ZERO).unwrap().is_timed_out());
    }

    #[test]
    fn test_acked_events_stay_delivered_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path()).event_queue_max_size(1).max_file_size(16);
        let offset_file = dir.path().join("resumed.offset");

        let muxer = Muxer::new("resumed", cfg.clone()).unwrap();
        for i in 0..4 {
            muxer.push(event(i)).unwrap();
        }
        for i in 0..3 {
            assert_eq!(read_now(&muxer), Some(event(i)));
        }
        assert_eq!(muxer.ack(3), 3);
        drop(muxer);
        assert!(offset_file.exists());

        let muxer = Muxer::new("resumed", cfg).unwrap();
        assert_eq!(muxer.pending_count(), 1);
        assert_eq!(read_now(&muxer), Some(event(3)));
        assert!(muxer.read(Duration::ZERO).unwrap().is_timed_out());
        assert!(!offset_file.exists());
        assert!(!muxer.queue_file_path().exists());
    }

    #[test]
    fn test_reads_after_close_are_not_replayed() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path()).event_queue_max_size(1).max_file_size(16);

        let muxer = Muxer::new("draining", cfg.clone()).unwrap();
        for i in 0..4 {
            muxer.push(event(i)).unwrap();
        }
        muxer.close().unwrap();
        assert_eq!(read_now(&muxer), Some(event(0)));
        assert_eq!(read_now(&muxer), Some(event(1)));
        drop(muxer);

        let muxer = Muxer::new("draining", cfg).unwrap();
        assert_eq!(muxer.pending_count(), 2);
        assert_eq!(read_now(&muxer), Some(event(2)));
        assert_eq!(read_now(&muxer), Some(event(3)));
    }

    #[test]
    fn test_failed_overflow_write_keeps_records_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path()).event_queue_max_size(1).max_file_size(16);
        let muxer = Muxer::new("q", cfg).unwrap();

        muxer.push(Event::new(SERVICE_STATUS, "e0")).unwrap();
        muxer.push(Event::new(SERVICE_STATUS, "abcd")).unwrap();

        // The record needs a second file, which cannot be created
        let blocker = dir.path().join("q.queue.1");
        fs::create_dir(&blocker).unwrap();
        assert!(muxer.push(Event::new(SERVICE_STATUS, "abcdefgh")).is_err());
        assert_eq!(muxer.pending_count(), 2);
        fs::remove_dir(&blocker).unwrap();

        muxer.push(Event::new(SERVICE_STATUS, "e3")).unwrap();
        assert_eq!(read_now(&muxer), Some(Event::new(SERVICE_STATUS, "e0")));
        assert_eq!(read_now(&muxer), Some(Event::new(SERVICE_STATUS, "abcd")));
        assert_eq!(read_now(&muxer), Some(Event::new(SERVICE_STATUS, "e3")));
        assert!(muxer.read(Duration::ZERO).unwrap().is_timed_out());
    }

    #[test]
    fn test_oversized_record_header_is_salvaged() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path()).event_queue_max_size(1);

        let muxer = Muxer::new("bogus", cfg.clone()).unwrap();
        for i in 0..3 {
            muxer.push(event(i)).unwrap();
        }
        let path = muxer.queue_file_path().to_path_buf();
        drop(muxer);

        // Length field far beyond the bytes on disk
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&SERVICE_STATUS.to_le_bytes()).unwrap();
        file.write_all(&u32::MAX.to_le_bytes()).unwrap();
        file.write_all(b"abc").unwrap();
        drop(file);

        let muxer = Muxer::new("bogus", cfg).unwrap();
        assert_eq!(muxer.pending_count(), 2);
        assert_eq!(read_now(&muxer), Some(event(1)));
        assert_eq!(read_now(&muxer), Some(event(2)));
    }

    #[test]
    fn test_remove_persisted_files() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Muxer::new("cleanup", config(dir.path()).event_queue_max_size(1)).unwrap();

        for i in 0..3 {
            muxer.push(event(i)).unwrap();
        }
        assert!(muxer.queue_file_path().exists());

        muxer.remove_persisted_files().unwrap();
        assert!(!muxer.queue_file_path().exists());
        assert!(!muxer.is_overflowing());
        assert_eq!(muxer.pending_count(), 1);
        assert_eq!(read_now(&muxer), Some(event(0)));
    }
}
