//! Periodic stats line, printed only when it changes.
//!
//! Wakes every 200ms and prints a one-line summary of live connection
//! count and total commands processed, skipping the print if nothing
//! changed since last time (see DESIGN.md for why these two fields were
//! chosen).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

const REPORT_INTERVAL: Duration = Duration::from_millis(200);

/// Shared, lock-free counters updated by every connection task.
#[derive(Default)]
pub struct Stats {
    connections: AtomicUsize,
    commands: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> (usize, u64) {
        (
            self.connections.load(Ordering::Relaxed),
            self.commands.load(Ordering::Relaxed),
        )
    }
}

/// Run forever, printing a line every [`REPORT_INTERVAL`] whenever the
/// snapshot differs from the last one printed. Intended to be spawned
/// as its own task alongside the accept loop.
pub async fn run(stats: std::sync::Arc<Stats>) {
    let pid = std::process::id();
    let mut interval = tokio::time::interval(REPORT_INTERVAL);
    let mut last = None;

    loop {
        interval.tick().await;
        let current = stats.snapshot();
        if last != Some(current) {
            let (connections, commands) = current;
            println!("pid={pid} connections={connections} commands={commands}");
            last = Some(current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_tracks_connections_and_commands() {
        let stats = Stats::new();
        assert_eq!(stats.snapshot(), (0, 0));
        stats.connection_opened();
        stats.connection_opened();
        stats.command_processed();
        assert_eq!(stats.snapshot(), (2, 1));
        stats.connection_closed();
        assert_eq!(stats.snapshot(), (1, 1));
    }
}
