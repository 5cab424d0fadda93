use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::CommandStore;
use crate::time::now_ms;

/// One currently-dispatched-and-not-yet-consumed command.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ExecutingEntry {
    pub command_id: u64,
    pub script: String,
    pub started_at_ms: u64,
}

/// A script cut short by a discontinuity, waiting to be resubmitted
/// once the client has stabilized.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PendingRerun {
    pub command_id: u64,
    pub script: String,
    pub delay_secs: u64,
}

#[derive(Serialize, Deserialize, Default)]
struct ExecutingSnapshot {
    executing: Vec<ExecutingEntry>,
}

struct TrackerInner {
    executing: HashMap<u64, ExecutingEntry>,
    reruns: VecDeque<PendingRerun>,
    current_map: Option<String>,
}

/// Decides whether a dispatched script ran long enough to count as
/// delivered, or was cut short by a level change / unclean shutdown and
/// needs a rerun.
///
/// The executing map is mirrored to a JSON file on every mutation so a
/// brain restart does not forget work believed in flight; writes are
/// best effort and never fail the caller.
pub struct ConsumptionTracker {
    inner: Mutex<TrackerInner>,
    threshold_ms: u64,
    rerun_delay_secs: u64,
    snapshot_path: Option<PathBuf>,
}

impl ConsumptionTracker {
    pub fn new(threshold_secs: u64, rerun_delay_secs: u64, snapshot_path: Option<PathBuf>) -> Self {
        let executing = snapshot_path
            .as_deref()
            .map(|path| match load_snapshot(path) {
                Ok(entries) => {
                    if !entries.is_empty() {
                        info!(
                            count = entries.len(),
                            "rehydrated in-flight commands from snapshot"
                        );
                    }
                    entries
                }
                Err(e) => {
                    warn!("failed to load executing snapshot: {e:#}");
                    Vec::new()
                }
            })
            .unwrap_or_default();
        Self {
            inner: Mutex::new(TrackerInner {
                executing: executing.into_iter().map(|e| (e.command_id, e)).collect(),
                reruns: VecDeque::new(),
                current_map: None,
            }),
            threshold_ms: threshold_secs * 1000,
            rerun_delay_secs,
            snapshot_path,
        }
    }

    pub fn start_execution(&self, store: &CommandStore, command_id: u64, script: String) {
        self.start_execution_at(store, command_id, script, now_ms());
    }

    pub fn start_execution_at(
        &self,
        store: &CommandStore,
        command_id: u64,
        script: String,
        started_at_ms: u64,
    ) {
        store.mark_executing(command_id, started_at_ms);
        let snapshot = {
            let mut inner = self.inner.lock().unwrap();
            inner.executing.insert(
                command_id,
                ExecutingEntry {
                    command_id,
                    script,
                    started_at_ms,
                },
            );
            inner.executing.values().cloned().collect()
        };
        self.persist(snapshot);
    }

    /// True once the command has run past the consumption threshold; the
    /// entry is removed so later discontinuities leave it alone. False
    /// and no mutation for unknown or not-yet-ripe ids.
    pub fn check_consumption(&self, store: &CommandStore, command_id: u64) -> bool {
        self.check_consumption_at(store, command_id, now_ms())
    }

    pub fn check_consumption_at(&self, store: &CommandStore, command_id: u64, now_ms: u64) -> bool {
        let snapshot = {
            let mut inner = self.inner.lock().unwrap();
            let Some(entry) = inner.executing.get(&command_id) else {
                return false;
            };
            if now_ms.saturating_sub(entry.started_at_ms) < self.threshold_ms {
                return false;
            }
            inner.executing.remove(&command_id);
            inner.executing.values().cloned().collect()
        };
        store.mark_consumed(command_id);
        self.persist(snapshot);
        true
    }

    /// Drops the executing entry without consumption, used when the
    /// client reports a script as failed so it is never rerun.
    pub fn abandon(&self, command_id: u64) {
        let snapshot = {
            let mut inner = self.inner.lock().unwrap();
            if inner.executing.remove(&command_id).is_none() {
                return;
            }
            inner.executing.values().cloned().collect()
        };
        self.persist(snapshot);
    }

    /// The client hit a level/scene transition: every in-flight script
    /// under the threshold was cut short. Those get an interruption mark
    /// and a pending rerun; the rest already ran long enough and are
    /// dropped as consumed.
    pub fn handle_level_change(
        &self,
        store: &CommandStore,
        new_map_id: &str,
        is_save_load: bool,
    ) -> Vec<PendingRerun> {
        let reruns = self.drain_interrupted_at(store, now_ms());
        self.inner.lock().unwrap().current_map = Some(new_map_id.to_string());
        info!(
            map_id = new_map_id,
            is_save_load,
            interrupted = reruns.len(),
            "level change reconciled"
        );
        reruns
    }

    /// Retroactive variant: the client reconnected after an unclean stop
    /// and tells us when it actually went down. Elapsed time is measured
    /// against that timestamp, not now.
    pub fn handle_shutdown_timestamp(&self, store: &CommandStore, shutdown_ms: u64) {
        let reruns = self.drain_interrupted_at(store, shutdown_ms);
        if !reruns.is_empty() {
            info!(interrupted = reruns.len(), "shutdown reconciled");
        }
    }

    fn drain_interrupted_at(&self, store: &CommandStore, cutoff_ms: u64) -> Vec<PendingRerun> {
        let (reruns, consumed) = {
            let mut inner = self.inner.lock().unwrap();
            let mut interrupted = Vec::new();
            let mut consumed = Vec::new();
            for (_, entry) in std::mem::take(&mut inner.executing) {
                if cutoff_ms.saturating_sub(entry.started_at_ms) < self.threshold_ms {
                    interrupted.push(entry);
                } else {
                    consumed.push(entry.command_id);
                }
            }
            // Drain order follows dispatch order for predictable reruns.
            interrupted.sort_by_key(|e| e.command_id);
            let reruns: Vec<PendingRerun> = interrupted
                .into_iter()
                .map(|e| PendingRerun {
                    command_id: e.command_id,
                    script: e.script,
                    delay_secs: self.rerun_delay_secs,
                })
                .collect();
            inner.reruns.extend(reruns.iter().cloned());
            (reruns, consumed)
        };
        for id in consumed {
            store.mark_consumed(id);
        }
        for rerun in &reruns {
            store.record_interruption(rerun.command_id);
        }
        self.persist(Vec::new());
        reruns
    }

    /// Drains the rerun queue. Consecutive calls with no interruption in
    /// between return an empty list.
    pub fn take_pending_reruns(&self) -> Vec<PendingRerun> {
        self.inner.lock().unwrap().reruns.drain(..).collect()
    }

    pub fn is_executing(&self, command_id: u64) -> bool {
        self.inner.lock().unwrap().executing.contains_key(&command_id)
    }

    pub fn executing_count(&self) -> usize {
        self.inner.lock().unwrap().executing.len()
    }

    pub fn pending_rerun_count(&self) -> usize {
        self.inner.lock().unwrap().reruns.len()
    }

    pub fn current_map(&self) -> Option<String> {
        self.inner.lock().unwrap().current_map.clone()
    }

    fn persist(&self, executing: Vec<ExecutingEntry>) {
        let Some(path) = self.snapshot_path.as_deref() else {
            return;
        };
        if let Err(e) = write_snapshot(path, executing) {
            warn!("failed to mirror executing snapshot: {e:#}");
        }
    }
}

fn load_snapshot(path: &std::path::Path) -> anyhow::Result<Vec<ExecutingEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let body =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let snapshot: ExecutingSnapshot =
        serde_json::from_str(&body).with_context(|| format!("parsing {}", path.display()))?;
    Ok(snapshot.executing)
}

fn write_snapshot(path: &std::path::Path, executing: Vec<ExecutingEntry>) -> anyhow::Result<()> {
    let body = serde_json::to_string(&ExecutingSnapshot { executing })?;
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
