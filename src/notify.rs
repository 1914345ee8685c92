use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::Change;

const CHANNEL_CAPACITY: usize = 256;

/// Per-gate broadcast of committed changes, for dashboards that want to
/// refresh instead of polling.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<Change>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a gate. Creates the channel if needed.
    pub fn subscribe(&self, gate: &str) -> broadcast::Receiver<Change> {
        self.channels
            .entry(gate.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening. Lagging receivers lose the oldest changes.
    pub fn send(&self, gate: &str, change: Change) {
        if let Some(sender) = self.channels.get(gate) {
            let _ = sender.send(change);
        }
    }
}
