//! Per-stream-kind frame reassembly
//!
//! Each frame id moves through `Collecting -> Complete` or
//! `Collecting -> Expired`; both end states remove the entry. A completed id
//! is remembered for one expiry window so late duplicates are ignored. Any
//! other frame id seen again after removal starts a fresh assembly.

use bytes::{Bytes, BytesMut};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::constants::FRAME_EXPIRY_MS;
use crate::protocol::{parse_header, StreamKind, HEADER_SIZE};
use crate::reassembly::clock::{SharedClock, SystemClock};
use crate::reassembly::queue::ReadyQueue;

/// In-progress state for one frame id
#[derive(Debug)]
pub struct FrameAssembly {
    /// Expected fragment count
    total: u16,
    /// Fragment payloads keyed by index; first copy wins
    chunks: BTreeMap<u16, Bytes>,
    /// When the first fragment arrived
    first_seen_at: Instant,
}

impl FrameAssembly {
    fn new(total: u16, first_seen_at: Instant) -> Self {
        Self {
            total,
            chunks: BTreeMap::new(),
            first_seen_at,
        }
    }

    pub fn total(&self) -> u16 {
        self.total
    }

    pub fn received(&self) -> usize {
        self.chunks.len()
    }

    pub fn first_seen_at(&self) -> Instant {
        self.first_seen_at
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.len() == self.total as usize
    }

    /// Concatenate chunks in ascending index order
    fn assemble(self) -> Bytes {
        let len = self.chunks.values().map(Bytes::len).sum();
        let mut frame = BytesMut::with_capacity(len);
        for chunk in self.chunks.into_values() {
            frame.extend_from_slice(&chunk);
        }
        frame.freeze()
    }
}

/// Reassembly counters
#[derive(Debug, Default)]
struct Counters {
    fragments_accepted: AtomicU64,
    fragments_dropped: AtomicU64,
    duplicates_ignored: AtomicU64,
    frames_completed: AtomicU64,
    frames_expired: AtomicU64,
}

/// Snapshot of reassembly statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub fragments_accepted: u64,
    pub fragments_dropped: u64,
    pub duplicates_ignored: u64,
    pub frames_completed: u64,
    pub frames_expired: u64,
    pub pending_frames: usize,
}

/// Pending assemblies plus recently completed frame ids
#[derive(Debug, Default)]
struct FrameTable {
    pending: HashMap<i32, FrameAssembly>,
    /// Completion time of frames already emitted
    completed: HashMap<i32, Instant>,
}

/// Rebuilds frames of one stream kind
pub struct ReassemblyEngine {
    kind: StreamKind,
    table: Mutex<FrameTable>,
    ready_tx: Sender<Bytes>,
    clock: SharedClock,
    expiry: Duration,
    counters: Counters,
}

impl ReassemblyEngine {
    /// Create an engine for `kind` with the default 2 second expiry
    pub fn new(kind: StreamKind) -> (Self, ReadyQueue) {
        Self::with_clock(
            kind,
            Duration::from_millis(FRAME_EXPIRY_MS),
            Arc::new(SystemClock),
        )
    }

    /// Create an engine with an explicit expiry horizon and time source
    pub fn with_clock(kind: StreamKind, expiry: Duration, clock: SharedClock) -> (Self, ReadyQueue) {
        let (ready_tx, queue) = ReadyQueue::channel();
        let engine = Self {
            kind,
            table: Mutex::new(FrameTable::default()),
            ready_tx,
            clock,
            expiry,
            counters: Counters::default(),
        };
        (engine, queue)
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Feed one raw datagram.
    ///
    /// Malformed or foreign datagrams are dropped silently. Stale partial
    /// frames are evicted first; completed frames go to the ready queue.
    pub fn accept_fragment(&self, datagram: &[u8]) {
        let header = match parse_header(datagram) {
            Ok(header) => header,
            Err(e) => {
                tracing::trace!("{} engine dropped datagram: {}", self.kind, e);
                self.counters.fragments_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        if header.stream_kind != self.kind {
            tracing::trace!(
                "{} engine ignored fragment for stream {}",
                self.kind,
                header.stream_kind
            );
            self.counters.fragments_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if !header.is_consistent() {
            tracing::debug!(
                "{} frame {}: index {} outside count {}",
                self.kind,
                header.frame_id,
                header.packet_index,
                header.packet_count
            );
            self.counters.fragments_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let payload = Bytes::copy_from_slice(&datagram[HEADER_SIZE..]);
        let now = self.clock.now();

        let completed = {
            let mut table = self.table.lock();
            let table = &mut *table;
            self.sweep(table, now);

            if table.completed.contains_key(&header.frame_id) {
                self.counters.duplicates_ignored.fetch_add(1, Ordering::Relaxed);
                None
            } else {
                self.insert_fragment(
                    table,
                    header.frame_id,
                    header.packet_index,
                    header.packet_count,
                    payload,
                    now,
                )
            }
        };

        if let Some(frame) = completed {
            self.counters.frames_completed.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                "{} frame {} complete ({} bytes)",
                self.kind,
                header.frame_id,
                frame.len()
            );
            // The queue is unbounded; this only fails once the consumer is gone
            if self.ready_tx.send(frame).is_err() {
                tracing::trace!("{} ready queue has no consumer", self.kind);
            }
        }
    }

    /// Store one fragment; returns the assembled frame once it is complete
    fn insert_fragment(
        &self,
        table: &mut FrameTable,
        frame_id: i32,
        packet_index: u16,
        packet_count: u16,
        payload: Bytes,
        now: Instant,
    ) -> Option<Bytes> {
        let assembly = table
            .pending
            .entry(frame_id)
            .or_insert_with(|| FrameAssembly::new(packet_count, now));

        if assembly.total != packet_count {
            tracing::debug!(
                "{} frame {}: count {} disagrees with {}",
                self.kind,
                frame_id,
                packet_count,
                assembly.total
            );
            self.counters.fragments_dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        if assembly.chunks.contains_key(&packet_index) {
            self.counters.duplicates_ignored.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        assembly.chunks.insert(packet_index, payload);
        self.counters.fragments_accepted.fetch_add(1, Ordering::Relaxed);

        if !assembly.is_complete() {
            return None;
        }
        table.completed.insert(frame_id, now);
        table.pending.remove(&frame_id).map(FrameAssembly::assemble)
    }

    /// Remove every partial frame older than the expiry horizon
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut table = self.table.lock();
        self.sweep(&mut table, now)
    }

    fn sweep(&self, table: &mut FrameTable, now: Instant) -> usize {
        table
            .completed
            .retain(|_, completed_at| now.saturating_duration_since(*completed_at) <= self.expiry);

        let before = table.pending.len();
        table.pending.retain(|frame_id, assembly| {
            let keep = now.saturating_duration_since(assembly.first_seen_at) <= self.expiry;
            if !keep {
                tracing::debug!(
                    "{} frame {} expired with {}/{} fragments",
                    self.kind,
                    frame_id,
                    assembly.received(),
                    assembly.total
                );
            }
            keep
        });
        let expired = before - table.pending.len();
        if expired > 0 {
            self.counters.frames_expired.fetch_add(expired as u64, Ordering::Relaxed);
        }
        expired
    }

    /// Whether an assembly for `frame_id` is in progress
    pub fn is_pending(&self, frame_id: i32) -> bool {
        self.table.lock().pending.contains_key(&frame_id)
    }

    pub fn pending_frames(&self) -> usize {
        self.table.lock().pending.len()
    }

    /// Get statistics
    pub fn stats(&self) -> ReassemblyStats {
        ReassemblyStats {
            fragments_accepted: self.counters.fragments_accepted.load(Ordering::Relaxed),
            fragments_dropped: self.counters.fragments_dropped.load(Ordering::Relaxed),
            duplicates_ignored: self.counters.duplicates_ignored.load(Ordering::Relaxed),
            frames_completed: self.counters.frames_completed.load(Ordering::Relaxed),
            frames_expired: self.counters.frames_expired.load(Ordering::Relaxed),
            pending_frames: self.pending_frames(),
        }
    }
}
