use super::*;

use crossbeam_channel::{Receiver, Sender};

use crate::store::QueueItem;

/// Shared handles behind every endpoint. The dispatcher tick owns the
/// sending half of the promoted-item channel; the client poll endpoint
/// reads the receiving half.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CommandStore>,
    pub tracker: Arc<ConsumptionTracker>,
    pub slots: Arc<Mutex<SlotManager>>,
    pub promoted: Receiver<QueueItem>,
    pub config: Arc<BrainConfig>,
}

impl AppState {
    /// Builds the full engine state for a config. The returned sender
    /// feeds the promoted-item buffer and belongs to the dispatcher.
    pub fn new(config: BrainConfig) -> (Self, Sender<QueueItem>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let state = Self {
            store: Arc::new(CommandStore::new(config.max_history)),
            tracker: Arc::new(ConsumptionTracker::new(
                config.consumption_threshold_secs,
                config.rerun_delay_secs,
                config.snapshot_path.clone(),
            )),
            slots: Arc::new(Mutex::new(SlotManager::new(config.slot_hold_secs))),
            promoted: rx,
            config: Arc::new(config),
        };
        (state, tx)
    }
}
