use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::time::now_ms;

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Queued,
    PendingModeration,
    Executing,
    Executed,
    Failed,
    Denied,
    Undone,
}

impl CommandStatus {
    /// Terminal states are safe to evict from history first.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommandStatus::Executed
                | CommandStatus::Failed
                | CommandStatus::Denied
                | CommandStatus::Undone
        )
    }
}

/// One history record per submitted command. The id is assigned at
/// enqueue time, never reused, and survives repeat/undo/rerun cycles
/// (those re-enqueue the same id instead of creating a new record).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CommandRecord {
    pub id: u64,
    pub created_at_ms: u64,
    pub execution_started_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    pub prompt: String,
    pub execution_script: String,
    pub inverse_script: String,
    pub source: String,
    pub author: String,
    pub user_id: Option<String>,
    pub image_context: Option<String>,
    pub status: CommandStatus,
    pub interrupt_count: u32,
    pub is_consumed: bool,
    pub error_message: Option<String>,
}

/// (command id, script) pair waiting in the dispatch queue. Kept apart
/// from CommandRecord so one id can sit in the queue more than once.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct QueueItem {
    pub command_id: u64,
    pub script: String,
}

pub struct NewCommand {
    pub prompt: String,
    pub execution_script: String,
    pub inverse_script: String,
    pub source: String,
    pub author: String,
    pub user_id: Option<String>,
    pub image_context: Option<String>,
    pub initial_status: CommandStatus,
    pub add_to_queue: bool,
}

struct StoreInner {
    next_id: u64,
    history: VecDeque<CommandRecord>,
    queue: VecDeque<QueueItem>,
}

/// Authoritative record of every submitted command plus the live FIFO
/// dispatch queue. One lock guards both so a reader never sees a queue
/// pop without the matching history update.
pub struct CommandStore {
    inner: Mutex<StoreInner>,
    max_history: usize,
}

impl CommandStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                next_id: 1,
                history: VecDeque::new(),
                queue: VecDeque::new(),
            }),
            max_history: max_history.max(1),
        }
    }

    /// Assigns the next id, appends a history record, and (unless the
    /// submission is held for moderation) appends the execution script
    /// to the dispatch queue.
    pub fn enqueue(&self, cmd: NewCommand) -> CommandRecord {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        let record = CommandRecord {
            id,
            created_at_ms: now_ms(),
            execution_started_at_ms: None,
            completed_at_ms: None,
            prompt: cmd.prompt,
            execution_script: cmd.execution_script,
            inverse_script: cmd.inverse_script,
            source: cmd.source,
            author: cmd.author,
            user_id: cmd.user_id,
            image_context: cmd.image_context,
            status: cmd.initial_status,
            interrupt_count: 0,
            is_consumed: false,
            error_message: None,
        };
        if cmd.add_to_queue {
            inner.queue.push_back(QueueItem {
                command_id: id,
                script: record.execution_script.clone(),
            });
        }
        inner.history.push_back(record.clone());
        Self::trim_history(&mut inner, self.max_history);
        record
    }

    /// Pops the queue head. Non-blocking; None when the queue is empty.
    pub fn poll_next(&self) -> Option<QueueItem> {
        self.inner.lock().unwrap().queue.pop_front()
    }

    /// Appends to the queue tail without touching history. Used for
    /// repeat, undo dispatch, and rerun hand-off. False if the id has
    /// no history record.
    pub fn requeue(&self, command_id: u64, script: String) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.history.iter().any(|r| r.id == command_id) {
            return false;
        }
        inner.queue.push_back(QueueItem { command_id, script });
        true
    }

    /// Marks a promoted command as executing and stamps the start time.
    pub fn mark_executing(&self, command_id: u64, started_at_ms: u64) -> bool {
        self.with_record(command_id, |r| {
            r.status = CommandStatus::Executing;
            r.execution_started_at_ms = Some(started_at_ms);
        })
    }

    /// Executing -> Executed|Failed with a completion stamp. The error
    /// message is stored verbatim for later inspection.
    pub fn report_result(
        &self,
        command_id: u64,
        success: bool,
        error_message: Option<String>,
    ) -> bool {
        self.with_record(command_id, |r| {
            r.status = if success {
                CommandStatus::Executed
            } else {
                CommandStatus::Failed
            };
            r.completed_at_ms = Some(now_ms());
            r.error_message = error_message;
        })
    }

    /// General status mutator, used for the moderation transitions.
    pub fn update_status(&self, command_id: u64, status: CommandStatus) -> bool {
        self.with_record(command_id, |r| r.status = status)
    }

    pub fn record_interruption(&self, command_id: u64) -> bool {
        self.with_record(command_id, |r| r.interrupt_count += 1)
    }

    pub fn mark_consumed(&self, command_id: u64) -> bool {
        self.with_record(command_id, |r| r.is_consumed = true)
    }

    pub fn get_history(&self) -> Vec<CommandRecord> {
        self.inner.lock().unwrap().history.iter().cloned().collect()
    }

    pub fn get_command(&self, command_id: u64) -> Option<CommandRecord> {
        self.inner
            .lock()
            .unwrap()
            .history
            .iter()
            .find(|r| r.id == command_id)
            .cloned()
    }

    pub fn get_recent(&self, limit: usize) -> Vec<CommandRecord> {
        let inner = self.inner.lock().unwrap();
        inner.history.iter().rev().take(limit).cloned().collect()
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().unwrap().history.len()
    }

    fn with_record(&self, command_id: u64, f: impl FnOnce(&mut CommandRecord)) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.history.iter_mut().find(|r| r.id == command_id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    // Oldest terminal record goes first; only when every record is still
    // live does the oldest record overall get dropped, so the history
    // cap holds unconditionally.
    fn trim_history(inner: &mut StoreInner, max_history: usize) {
        while inner.history.len() > max_history {
            let victim = inner
                .history
                .iter()
                .position(|r| r.status.is_terminal())
                .unwrap_or(0);
            inner.history.remove(victim);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_command(prompt: &str, script: &str) -> NewCommand {
        NewCommand {
            prompt: prompt.to_string(),
            execution_script: script.to_string(),
            inverse_script: format!("undo {script}"),
            source: "twitch".to_string(),
            author: "viewer".to_string(),
            user_id: None,
            image_context: None,
            initial_status: CommandStatus::Queued,
            add_to_queue: true,
        }
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let store = CommandStore::new(100);
        let a = store.enqueue(new_command("p1", "a"));
        let b = store.enqueue(new_command("p2", "b"));
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        store.poll_next();
        store.poll_next();
        let c = store.enqueue(new_command("p3", "c"));
        assert_eq!(c.id, 3);
    }

    #[test]
    fn queue_is_fifo() {
        let store = CommandStore::new(100);
        let ids: Vec<u64> = (0..5)
            .map(|i| store.enqueue(new_command("p", &format!("s{i}"))).id)
            .collect();
        let polled: Vec<u64> = (0..5)
            .map(|_| store.poll_next().expect("queued item").command_id)
            .collect();
        assert_eq!(ids, polled);
        assert!(store.poll_next().is_none());
    }

    #[test]
    fn moderation_hold_skips_queue() {
        let store = CommandStore::new(100);
        let record = store.enqueue(NewCommand {
            initial_status: CommandStatus::PendingModeration,
            add_to_queue: false,
            ..new_command("p", "s")
        });
        assert_eq!(store.queue_depth(), 0);
        assert_eq!(record.status, CommandStatus::PendingModeration);

        assert!(store.update_status(record.id, CommandStatus::Queued));
        assert!(store.requeue(record.id, record.execution_script.clone()));
        assert_eq!(store.queue_depth(), 1);
        assert_eq!(store.poll_next().unwrap().command_id, record.id);
    }

    #[test]
    fn requeue_unknown_id_fails_without_queueing() {
        let store = CommandStore::new(100);
        assert!(!store.requeue(42, "s".to_string()));
        assert_eq!(store.queue_depth(), 0);
    }

    #[test]
    fn requeue_does_not_grow_history() {
        let store = CommandStore::new(100);
        let record = store.enqueue(new_command("p", "s"));
        store.requeue(record.id, record.inverse_script.clone());
        store.requeue(record.id, record.execution_script.clone());
        assert_eq!(store.history_len(), 1);
        assert_eq!(store.queue_depth(), 3);
    }

    #[test]
    fn report_result_stamps_completion() {
        let store = CommandStore::new(100);
        let record = store.enqueue(new_command("p", "s"));
        store.poll_next();
        assert!(store.mark_executing(record.id, 123));

        assert!(store.report_result(record.id, false, Some("script blew up".to_string())));
        let after = store.get_command(record.id).unwrap();
        assert_eq!(after.status, CommandStatus::Failed);
        assert_eq!(after.error_message.as_deref(), Some("script blew up"));
        assert_eq!(after.execution_started_at_ms, Some(123));
        assert!(after.completed_at_ms.is_some());

        assert!(!store.report_result(999, true, None));
    }

    #[test]
    fn history_bound_holds_and_prefers_terminal_eviction() {
        let store = CommandStore::new(3);
        let first = store.enqueue(new_command("live", "a"));
        for i in 0..5 {
            let r = store.enqueue(new_command("done", &format!("s{i}")));
            store.report_result(r.id, true, None);
        }
        assert_eq!(store.history_len(), 3);
        // The still-queued first record outlived the finished ones.
        assert!(store.get_command(first.id).is_some());
    }

    #[test]
    fn history_bound_holds_even_when_everything_is_live() {
        let store = CommandStore::new(2);
        for i in 0..4 {
            store.enqueue(new_command("p", &format!("s{i}")));
        }
        assert_eq!(store.history_len(), 2);
    }

    #[test]
    fn interrupt_count_only_increases() {
        let store = CommandStore::new(10);
        let record = store.enqueue(new_command("p", "s"));
        store.record_interruption(record.id);
        store.record_interruption(record.id);
        assert_eq!(store.get_command(record.id).unwrap().interrupt_count, 2);
    }

    #[test]
    fn recent_returns_newest_first() {
        let store = CommandStore::new(10);
        for i in 0..4 {
            store.enqueue(new_command(&format!("p{i}"), "s"));
        }
        let recent = store.get_recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, 4);
        assert_eq!(recent[1].id, 3);
    }
}
