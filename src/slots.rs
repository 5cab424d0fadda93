use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::Sender;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::store::{CommandStore, QueueItem};

/// Upper bound of the admission ladder; also the size of the slot pool.
pub const MAX_SLOTS: usize = 10;

/// Target concurrency for a given queue depth. Non-decreasing, bounded
/// to [3, 10]: a short queue trickles out slowly, a flooded one ramps up.
pub fn target_slots(depth: usize) -> usize {
    match depth {
        0..=5 => 3,
        6..=10 => 4,
        11..=20 => 6,
        21..=50 => 8,
        _ => 10,
    }
}

#[derive(Clone, Copy, Default)]
struct Slot {
    /// Unix ms the slot frees up at; None while free.
    occupied_until_ms: Option<u64>,
}

/// Meters how fast queued items are promoted into flight. Each tick
/// frees expired slots, then fills free slots up to the current target
/// by popping the store queue and pushing the items into the promoted
/// buffer the client poll endpoint reads.
///
/// An occupied slot is never revoked: if the target shrinks while more
/// slots are occupied, the excess drains naturally when their hold
/// expires.
pub struct SlotManager {
    slots: [Slot; MAX_SLOTS],
    hold_ms: u64,
}

impl SlotManager {
    pub fn new(hold_secs: u64) -> Self {
        Self {
            slots: [Slot::default(); MAX_SLOTS],
            hold_ms: hold_secs * 1000,
        }
    }

    pub fn occupied_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.occupied_until_ms.is_some())
            .count()
    }

    /// One scheduling pass. Returns how many items were promoted.
    pub fn tick(
        &mut self,
        store: &CommandStore,
        promoted: &Sender<QueueItem>,
        now_ms: u64,
    ) -> usize {
        for slot in self.slots.iter_mut() {
            if matches!(slot.occupied_until_ms, Some(until) if now_ms >= until) {
                slot.occupied_until_ms = None;
            }
        }

        let target = target_slots(store.queue_depth());
        let mut occupied = self.occupied_count();
        let mut promoted_count = 0;

        for slot in self.slots.iter_mut() {
            if occupied >= target {
                break;
            }
            if slot.occupied_until_ms.is_some() {
                continue;
            }
            let Some(item) = store.poll_next() else {
                break;
            };
            slot.occupied_until_ms = Some(now_ms + self.hold_ms);
            occupied += 1;
            promoted_count += 1;
            if promoted.send(item).is_err() {
                // Receiver gone; the server is shutting down.
                break;
            }
        }
        promoted_count
    }
}

/// Runs the scheduling tick on a fixed interval for the lifetime of the
/// process.
pub fn spawn_dispatcher(
    store: Arc<CommandStore>,
    slots: Arc<Mutex<SlotManager>>,
    promoted: Sender<QueueItem>,
    tick_interval_secs: u64,
) {
    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(tick_interval_secs));
        loop {
            tick.tick().await;
            let promoted_count = match slots.lock() {
                Ok(mut slots) => slots.tick(&store, &promoted, crate::time::now_ms()),
                Err(e) => {
                    warn!("slot manager lock poisoned: {e}");
                    return;
                }
            };
            if promoted_count > 0 {
                debug!(
                    promoted_count,
                    depth = store.queue_depth(),
                    "promoted queued commands"
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CommandStatus, NewCommand};

    fn fill_queue(store: &CommandStore, n: usize) {
        for i in 0..n {
            store.enqueue(NewCommand {
                prompt: format!("p{i}"),
                execution_script: format!("s{i}"),
                inverse_script: String::new(),
                source: "twitch".to_string(),
                author: "viewer".to_string(),
                user_id: None,
                image_context: None,
                initial_status: CommandStatus::Queued,
                add_to_queue: true,
            });
        }
    }

    #[test]
    fn target_is_bounded_and_non_decreasing() {
        let mut last = 0;
        for depth in 0..200 {
            let t = target_slots(depth);
            assert!((3..=10).contains(&t), "target out of range at depth {depth}");
            assert!(t >= last, "target shrank at depth {depth}");
            last = t;
        }
        assert_eq!(target_slots(5), 3);
        assert_eq!(target_slots(6), 4);
        assert_eq!(target_slots(12), 6);
        assert_eq!(target_slots(21), 8);
        assert_eq!(target_slots(51), 10);
    }

    #[test]
    fn tick_promotes_up_to_target() {
        let store = CommandStore::new(100);
        fill_queue(&store, 12);
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut slots = SlotManager::new(10);

        // Depth 12 maps to a target of 6.
        assert_eq!(slots.tick(&store, &tx, 0), 6);
        assert_eq!(slots.occupied_count(), 6);
        assert_eq!(rx.try_iter().count(), 6);
        assert_eq!(store.queue_depth(), 6);

        // Same tick instant again: all slots for this target are taken.
        assert_eq!(slots.tick(&store, &tx, 1), 0);
    }

    #[test]
    fn promotion_preserves_fifo_order() {
        let store = CommandStore::new(100);
        fill_queue(&store, 3);
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut slots = SlotManager::new(10);
        slots.tick(&store, &tx, 0);
        let ids: Vec<u64> = rx.try_iter().map(|i| i.command_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn occupied_slots_free_after_hold_expires() {
        let store = CommandStore::new(100);
        fill_queue(&store, 2);
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut slots = SlotManager::new(10);

        assert_eq!(slots.tick(&store, &tx, 0), 2);
        assert_eq!(slots.occupied_count(), 2);

        // Before the hold expires nothing frees, with or without work.
        slots.tick(&store, &tx, 9_999);
        assert_eq!(slots.occupied_count(), 2);

        fill_queue(&store, 1);
        assert_eq!(slots.tick(&store, &tx, 10_000), 1);
        assert_eq!(slots.occupied_count(), 1);
    }

    #[test]
    fn shrinking_target_never_revokes_occupied_slots() {
        let store = CommandStore::new(100);
        fill_queue(&store, 12);
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut slots = SlotManager::new(10);

        // Ramp up to 6 at depth 12, then drain the queue to depth 0.
        slots.tick(&store, &tx, 0);
        while store.poll_next().is_some() {}

        // Target is now 3, but the 6 occupied slots stay until expiry.
        slots.tick(&store, &tx, 1);
        assert_eq!(slots.occupied_count(), 6);

        slots.tick(&store, &tx, 10_001);
        assert_eq!(slots.occupied_count(), 0);
    }

    #[test]
    fn empty_queue_promotes_nothing() {
        let store = CommandStore::new(100);
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut slots = SlotManager::new(10);
        assert_eq!(slots.tick(&store, &tx, 0), 0);
        assert!(rx.try_recv().is_err());
    }
}
