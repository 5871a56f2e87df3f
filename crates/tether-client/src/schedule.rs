//! Scheduled sends
//!
//! The table only records what should be sent and how often. Whether a
//! task's timer runs is decided by the client: a timer exists exactly while
//! the task is enabled and the connection is open.

use std::fmt;
use std::time::Duration;
use tether_core::{Payload, MIN_TASK_INTERVAL_MS};
use uuid::Uuid;

use crate::error::{ClientError, Result};

/// Handle to a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0.simple())
    }
}

/// A message sent on a fixed interval while connected
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub message: Payload,
    pub interval: Duration,
    pub enabled: bool,
}

pub(crate) fn validate_interval(interval: Duration) -> Result<()> {
    if interval < Duration::from_millis(MIN_TASK_INTERVAL_MS) {
        return Err(ClientError::InvalidTask(format!(
            "interval {}ms is below the {}ms minimum",
            interval.as_millis(),
            MIN_TASK_INTERVAL_MS
        )));
    }
    Ok(())
}

pub(crate) fn validate_message(message: &Payload) -> Result<()> {
    if message.is_empty() {
        return Err(ClientError::InvalidTask("message is empty".to_string()));
    }
    Ok(())
}

/// Insertion-ordered task table
#[derive(Debug, Default)]
pub(crate) struct TaskTable {
    tasks: Vec<ScheduledTask>,
}

impl TaskTable {
    pub fn insert(&mut self, message: Payload, interval: Duration) -> Result<TaskId> {
        validate_message(&message)?;
        validate_interval(interval)?;

        let task = ScheduledTask {
            id: TaskId::new(),
            message,
            interval,
            enabled: true,
        };
        let id = task.id;
        self.tasks.push(task);
        Ok(id)
    }

    pub fn get(&self, id: TaskId) -> Option<&ScheduledTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Result<&mut ScheduledTask> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ClientError::TaskNotFound(id.to_string()))
    }

    pub fn remove(&mut self, id: TaskId) -> Option<ScheduledTask> {
        let index = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(index))
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.tasks.iter().filter(|t| t.enabled)
    }

    pub fn snapshot(&self) -> Vec<ScheduledTask> {
        self.tasks.clone()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_rejects_short_interval() {
        let mut table = TaskTable::default();
        let result = table.insert(json!({"type": "ping"}).into(), Duration::from_millis(999));
        assert!(matches!(result, Err(ClientError::InvalidTask(_))));
        assert!(table.snapshot().is_empty());
    }

    #[test]
    fn test_insert_rejects_empty_message() {
        let mut table = TaskTable::default();
        for message in [Payload::from(""), Payload::Json(serde_json::Value::Null)] {
            let result = table.insert(message, Duration::from_secs(1));
            assert!(matches!(result, Err(ClientError::InvalidTask(_))));
        }
        assert!(table.snapshot().is_empty());
    }

    #[test]
    fn test_insert_enabled_in_order() {
        let mut table = TaskTable::default();
        let a = table.insert("a".into(), Duration::from_secs(1)).unwrap();
        let b = table.insert("b".into(), Duration::from_secs(2)).unwrap();

        let ids: Vec<_> = table.enabled().map(|t| t.id).collect();
        assert_eq!(ids, vec![a, b]);

        table.get_mut(a).unwrap().enabled = false;
        let ids: Vec<_> = table.enabled().map(|t| t.id).collect();
        assert_eq!(ids, vec![b]);
    }

    #[test]
    fn test_unknown_task() {
        let mut table = TaskTable::default();
        assert!(matches!(
            table.get_mut(TaskId::new()),
            Err(ClientError::TaskNotFound(_))
        ));
        assert!(table.remove(TaskId::new()).is_none());
    }
}
