//! Stream-id pool and pending-request table.
//!
//! One slot per stream id (0..=127). A slot holds the completion channel of
//! the in-flight request occupying that id; `None` means the id is free.
//! Allocation always picks the lowest free id. A single mutex guards the
//! table; only `send` and the reader loop touch it.

use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::error::{MeridianError, Result};
use crate::protocol::Frame;

/// Size of the per-connection stream-id pool.
pub const STREAM_POOL_SIZE: usize = 128;

/// Pending-request table indexed by stream id.
#[derive(Debug)]
pub(crate) struct StreamTable {
    slots: Mutex<Vec<Option<oneshot::Sender<Frame>>>>,
}

impl StreamTable {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new((0..STREAM_POOL_SIZE).map(|_| None).collect()),
        }
    }

    /// Claim the lowest free stream id for a request.
    ///
    /// Fails with `ResourceExhausted` when every id is occupied; callers are
    /// rejected rather than queued.
    pub fn allocate(&self, tx: oneshot::Sender<Frame>) -> Result<u8> {
        let mut slots = self.slots.lock().unwrap();
        for (id, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(tx);
                return Ok(id as u8);
            }
        }
        Err(MeridianError::ResourceExhausted)
    }

    /// Take the completion channel for a stream id, freeing the id.
    ///
    /// Returns `None` when the id is not in flight (an orphan frame).
    pub fn complete(&self, stream: u8) -> Option<oneshot::Sender<Frame>> {
        self.slots.lock().unwrap().get_mut(stream as usize)?.take()
    }

    /// Drop every pending completion channel, failing all outstanding
    /// requests (their receivers observe a closed channel).
    pub fn fail_all(&self) {
        let mut slots = self.slots.lock().unwrap();
        for slot in slots.iter_mut() {
            slot.take();
        }
    }

    /// Number of ids currently occupied by in-flight requests.
    pub fn in_flight(&self) -> usize {
        self.slots
            .lock()
            .unwrap()
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Header, Opcode};
    use bytes::Bytes;

    fn channel() -> (oneshot::Sender<Frame>, oneshot::Receiver<Frame>) {
        oneshot::channel()
    }

    #[test]
    fn test_allocate_lowest_free_id() {
        let table = StreamTable::new();
        let (tx0, _rx0) = channel();
        let (tx1, _rx1) = channel();
        assert_eq!(table.allocate(tx0).unwrap(), 0);
        assert_eq!(table.allocate(tx1).unwrap(), 1);

        // Freeing id 0 makes it the next allocation again.
        let _ = table.complete(0);
        let (tx2, _rx2) = channel();
        assert_eq!(table.allocate(tx2).unwrap(), 0);
        assert_eq!(table.in_flight(), 2);
    }

    #[test]
    fn test_exhaustion_rejected() {
        let table = StreamTable::new();
        let mut receivers = Vec::new();
        for id in 0..STREAM_POOL_SIZE {
            let (tx, rx) = channel();
            assert_eq!(table.allocate(tx).unwrap(), id as u8);
            receivers.push(rx);
        }
        let (tx, _rx) = channel();
        assert!(matches!(
            table.allocate(tx),
            Err(MeridianError::ResourceExhausted)
        ));
    }

    #[test]
    fn test_complete_unknown_stream_is_none() {
        let table = StreamTable::new();
        assert!(table.complete(42).is_none());
    }

    #[tokio::test]
    async fn test_complete_delivers_frame() {
        let table = StreamTable::new();
        let (tx, rx) = channel();
        let id = table.allocate(tx).unwrap();

        let frame = Frame::new(Header::response(Opcode::Result, id, 0, 0), Bytes::new());
        table.complete(id).unwrap().send(frame).ok();

        let delivered = rx.await.unwrap();
        assert_eq!(delivered.stream(), id);
        assert_eq!(table.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_fail_all_wakes_receivers() {
        let table = StreamTable::new();
        let (tx, rx) = channel();
        table.allocate(tx).unwrap();

        table.fail_all();
        assert!(rx.await.is_err());
        assert_eq!(table.in_flight(), 0);
    }
}
