//! Image stream consumer
//!
//! There is no reordering for video: whichever frame completed most recently
//! is the one shown. Older frames still queued are skipped without decoding.

use std::sync::Arc;

use crate::codec::image::{ImageCodec, RawImage};
use crate::reassembly::ReadyQueue;

/// Keeps the most recent decodable image of a stream
pub struct ImageFeed {
    queue: ReadyQueue,
    codec: Arc<dyn ImageCodec>,
    latest: Option<RawImage>,
    frames_shown: u64,
    frames_skipped: u64,
    decode_failures: u64,
}

impl ImageFeed {
    pub fn new(queue: ReadyQueue, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            queue,
            codec,
            latest: None,
            frames_shown: 0,
            frames_skipped: 0,
            decode_failures: 0,
        }
    }

    /// Drain the queue and decode the newest frame.
    ///
    /// Returns true when the displayed image changed. A frame that fails to
    /// decode leaves the previous image in place.
    pub fn poll(&mut self) -> bool {
        let mut newest = None;
        for frame in self.queue.drain() {
            if newest.replace(frame).is_some() {
                self.frames_skipped += 1;
            }
        }

        let Some(frame) = newest else {
            return false;
        };

        match self.codec.decode(&frame) {
            Ok(image) => {
                self.latest = Some(image);
                self.frames_shown += 1;
                true
            }
            Err(e) => {
                tracing::debug!("Dropping undecodable image frame ({} bytes): {}", frame.len(), e);
                self.decode_failures += 1;
                false
            }
        }
    }

    pub fn latest(&self) -> Option<&RawImage> {
        self.latest.as_ref()
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }
}
