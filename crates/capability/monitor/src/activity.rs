//! 每租户的有界活动记录（最新在前）。

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    CommandSent,
    ScenarioExecuted,
    AckConfirmed,
    AckTimeout,
    ControlObserved,
    StatusChanged,
    DeviceRegistered,
    DeviceUpdated,
    DeviceRemoved,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::CommandSent => "command_sent",
            ActivityKind::ScenarioExecuted => "scenario_executed",
            ActivityKind::AckConfirmed => "ack_confirmed",
            ActivityKind::AckTimeout => "ack_timeout",
            ActivityKind::ControlObserved => "control_observed",
            ActivityKind::StatusChanged => "status_changed",
            ActivityKind::DeviceRegistered => "device_registered",
            ActivityKind::DeviceUpdated => "device_updated",
            ActivityKind::DeviceRemoved => "device_removed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    pub id: String,
    pub kind: ActivityKind,
    pub device_id: Option<String>,
    pub message: String,
    pub timestamp: i64,
}

impl ActivityEntry {
    pub fn new(
        kind: ActivityKind,
        device_id: Option<&str>,
        message: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            device_id: device_id.map(str::to_string),
            message: message.into(),
            timestamp,
        }
    }
}

#[derive(Debug)]
pub struct ActivityLog {
    capacity: usize,
    entries: VecDeque<ActivityEntry>,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, entry: ActivityEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    pub fn recent(&self, limit: usize) -> Vec<ActivityEntry> {
        self.entries.iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_newest_within_capacity() {
        let mut log = ActivityLog::new(2);
        for ts in 1..=3 {
            log.push(ActivityEntry::new(
                ActivityKind::CommandSent,
                Some("pole-1"),
                format!("entry {ts}"),
                ts,
            ));
        }
        assert_eq!(log.len(), 2);
        let recent = log.recent(10);
        assert_eq!(recent[0].timestamp, 3);
        assert_eq!(recent[1].timestamp, 2);
    }

    #[test]
    fn recent_honours_limit() {
        let mut log = ActivityLog::new(10);
        log.push(ActivityEntry::new(ActivityKind::DeviceRegistered, None, "a", 1));
        log.push(ActivityEntry::new(ActivityKind::DeviceRemoved, None, "b", 2));
        assert_eq!(log.recent(1).len(), 1);
        assert_eq!(log.recent(1)[0].kind, ActivityKind::DeviceRemoved);
    }
}
