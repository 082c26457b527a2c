//! Cull output queue: single producer on the culling thread, single
//! consumer on the main thread.
//!
//! The producer pushes work items in discovery order and seals the run
//! with an explicit finished sentinel; `finish` consumes the producer, so
//! nothing can be pushed after it. The consumer can poll without blocking
//! or drain with a bounded blocking wait that ends at the sentinel. A
//! disconnect without the sentinel means the producer died mid-run and the
//! whole run must be discarded.

use std::sync::mpsc;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::hierarchy::NodeId;
use crate::math::Aabb;

use super::pass::SortToken;

/// Handle to an externally owned renderable object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub u64);

/// Per-object culling flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObjectFlags(pub u16);

impl ObjectFlags {
    pub const NONE: ObjectFlags = ObjectFlags(0);
    /// Statically hidden; skipped before any visibility test.
    pub const HIDDEN: ObjectFlags = ObjectFlags(1 << 0);
    /// Skip the coverage-buffer test for this object.
    pub const SKIP_OCCLUSION: ObjectFlags = ObjectFlags(1 << 1);
    /// Marks geometry worth rasterizing into the coverage buffer.
    pub const GOOD_OCCLUDER: ObjectFlags = ObjectFlags(1 << 2);

    pub fn contains(self, other: ObjectFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: ObjectFlags) -> ObjectFlags {
        ObjectFlags(self.0 | other.0)
    }
}

/// One visible work item produced by a culling run.
///
/// Each kind carries exactly the payload its consumer needs; adding a kind
/// extends this enum and every match over it, so payload drift between
/// producer and consumer cannot reach runtime.
#[derive(Clone, Debug)]
pub enum CullItem {
    TerrainSector {
        sector: NodeId,
        distance: f32,
        token: SortToken,
    },
    Vegetation {
        object: ObjectHandle,
        bounds: Aabb,
        distance: f32,
        flags: ObjectFlags,
        token: SortToken,
    },
    DecalRoad {
        object: ObjectHandle,
        bounds: Aabb,
        distance: f32,
        token: SortToken,
    },
    Renderable {
        object: ObjectHandle,
        bounds: Aabb,
        distance: f32,
        flags: ObjectFlags,
        token: SortToken,
    },
}

impl CullItem {
    pub fn distance(&self) -> f32 {
        match self {
            CullItem::TerrainSector { distance, .. }
            | CullItem::Vegetation { distance, .. }
            | CullItem::DecalRoad { distance, .. }
            | CullItem::Renderable { distance, .. } => *distance,
        }
    }

    pub fn token(&self) -> SortToken {
        match self {
            CullItem::TerrainSector { token, .. }
            | CullItem::Vegetation { token, .. }
            | CullItem::DecalRoad { token, .. }
            | CullItem::Renderable { token, .. } => *token,
        }
    }
}

enum Message {
    Item(CullItem),
    Finished,
}

/// Result of a non-blocking queue poll
#[derive(Debug)]
pub enum Poll {
    Item(CullItem),
    /// Nothing available yet; the producer is still running.
    Pending,
    /// The sentinel was observed; no further items will arrive.
    Finished,
}

/// Producing side, owned by the culling thread for one run
pub struct CullProducer {
    tx: mpsc::Sender<Message>,
}

impl CullProducer {
    pub fn push(&self, item: CullItem) {
        // A vanished consumer just discards the run's output.
        if self.tx.send(Message::Item(item)).is_err() {
            log::trace!("cull consumer gone, dropping item");
        }
    }

    /// Seal the run. Consumes the producer, making post-sentinel pushes
    /// unrepresentable.
    pub fn finish(self) {
        let _ = self.tx.send(Message::Finished);
    }
}

/// Consuming side, owned by the main thread for one run
pub struct CullConsumer {
    rx: mpsc::Receiver<Message>,
    finished: bool,
}

impl CullConsumer {
    /// Non-blocking poll
    pub fn try_pop(&mut self) -> Result<Poll> {
        if self.finished {
            return Ok(Poll::Finished);
        }
        match self.rx.try_recv() {
            Ok(Message::Item(item)) => Ok(Poll::Item(item)),
            Ok(Message::Finished) => {
                self.finished = true;
                Ok(Poll::Finished)
            }
            Err(mpsc::TryRecvError::Empty) => Ok(Poll::Pending),
            Err(mpsc::TryRecvError::Disconnected) => Err(Error::DroppedFrame(
                "cull producer disconnected before finishing".into(),
            )),
        }
    }

    /// Blocking pop, bounded by the producer's sentinel. Ok(None) once the
    /// run is finished.
    pub fn next_blocking(&mut self) -> Result<Option<CullItem>> {
        if self.finished {
            return Ok(None);
        }
        match self.rx.recv() {
            Ok(Message::Item(item)) => Ok(Some(item)),
            Ok(Message::Finished) => {
                self.finished = true;
                Ok(None)
            }
            Err(mpsc::RecvError) => Err(Error::DroppedFrame(
                "cull producer disconnected before finishing".into(),
            )),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Create the queue for one culling run
pub fn cull_channel() -> (CullProducer, CullConsumer) {
    let (tx, rx) = mpsc::channel();
    (
        CullProducer { tx },
        CullConsumer {
            rx,
            finished: false,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;

    fn item(token: u32) -> CullItem {
        CullItem::Renderable {
            object: ObjectHandle(42),
            bounds: Aabb::new(Vec3::ZERO, Vec3::ONE),
            distance: 5.0,
            flags: ObjectFlags::NONE,
            token: SortToken(token),
        }
    }

    #[test]
    fn test_items_arrive_in_push_order() {
        let (tx, mut rx) = cull_channel();
        tx.push(item(0));
        tx.push(item(1));
        tx.finish();

        let mut tokens = Vec::new();
        while let Some(i) = rx.next_blocking().unwrap() {
            tokens.push(i.token().0);
        }
        assert_eq!(tokens, vec![0, 1]);
        assert!(rx.is_finished());
    }

    #[test]
    fn test_drain_terminates_after_sentinel() {
        let (tx, mut rx) = cull_channel();
        tx.push(item(0));
        tx.finish();

        assert!(rx.next_blocking().unwrap().is_some());
        assert!(rx.next_blocking().unwrap().is_none());
        // Repeated polls stay terminated instead of blocking.
        assert!(rx.next_blocking().unwrap().is_none());
        assert!(matches!(rx.try_pop().unwrap(), Poll::Finished));
    }

    #[test]
    fn test_empty_run_drains_cleanly() {
        let (tx, mut rx) = cull_channel();
        tx.finish();
        assert!(rx.next_blocking().unwrap().is_none());
    }

    #[test]
    fn test_try_pop_reports_pending() {
        let (tx, mut rx) = cull_channel();
        assert!(matches!(rx.try_pop().unwrap(), Poll::Pending));
        tx.push(item(7));
        assert!(matches!(rx.try_pop().unwrap(), Poll::Item(_)));
        assert!(matches!(rx.try_pop().unwrap(), Poll::Pending));
        tx.finish();
        assert!(matches!(rx.try_pop().unwrap(), Poll::Finished));
    }

    #[test]
    fn test_dropped_producer_is_an_error() {
        let (tx, mut rx) = cull_channel();
        tx.push(item(0));
        drop(tx);

        // Buffered item still arrives, then the missing sentinel surfaces.
        assert!(rx.next_blocking().unwrap().is_some());
        assert!(matches!(
            rx.next_blocking(),
            Err(Error::DroppedFrame(_))
        ));
    }

    #[test]
    fn test_cross_thread_delivery() {
        let (tx, mut rx) = cull_channel();
        let producer = std::thread::spawn(move || {
            for i in 0..100 {
                tx.push(item(i));
            }
            tx.finish();
        });

        let mut count = 0;
        while let Some(_) = rx.next_blocking().unwrap() {
            count += 1;
        }
        producer.join().unwrap();
        assert_eq!(count, 100);
    }

    #[test]
    fn test_object_flags() {
        let flags = ObjectFlags::SKIP_OCCLUSION.with(ObjectFlags::GOOD_OCCLUDER);
        assert!(flags.contains(ObjectFlags::SKIP_OCCLUSION));
        assert!(flags.contains(ObjectFlags::GOOD_OCCLUDER));
        assert!(!flags.contains(ObjectFlags::HIDDEN));
    }
}
