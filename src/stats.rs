//! Per-app usage counters with periodic snapshots.
//!
//! Stats are advisory. Every mark is a cheap atomic bump and nothing in the
//! protocol path waits on this module.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::apps::App;
use crate::config::{Config, StatsKind};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentStats {
    pub connections: i64,
    pub peak_connections: i64,
    pub websocket_messages: i64,
    pub api_messages: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Unix millis when the snapshot was taken.
    pub time: i64,
    #[serde(flatten)]
    pub stats: CurrentStats,
}

pub trait Stats: Send + Sync {
    fn mark_new_connection(&self, app: &App);
    fn mark_disconnection(&self, app: &App);
    fn mark_ws_message(&self, app: &App);
    fn mark_api_message(&self, app: &App);
    fn current(&self, app_id: &str) -> CurrentStats;
    fn snapshots(&self, app_id: &str, start: i64, end: i64) -> Vec<Snapshot>;
    /// Roll the message counters for every tracked app into a timestamped
    /// snapshot. Runs on the configured interval.
    fn take_snapshots(&self);
}

pub fn build(config: &Config) -> Arc<dyn Stats> {
    match config.stats_driver {
        StatsKind::Local => Arc::new(LocalStats::new(config.stats_enabled)),
    }
}

#[derive(Default)]
struct Counters {
    connections: AtomicI64,
    peak_connections: AtomicI64,
    ws_messages: AtomicI64,
    api_messages: AtomicI64,
}

/// In-process driver. Counters live in a `DashMap` keyed by app id and
/// snapshots accumulate in memory for the life of the process.
pub struct LocalStats {
    enabled: bool,
    counters: DashMap<String, Counters>,
    snapshots: DashMap<String, Mutex<Vec<Snapshot>>>,
}

impl LocalStats {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            counters: DashMap::new(),
            snapshots: DashMap::new(),
        }
    }

    fn tracks(&self, app: &App) -> bool {
        self.enabled && app.enable_stats
    }

    fn with_counters<R>(&self, app_id: &str, f: impl FnOnce(&Counters) -> R) -> R {
        let entry = self.counters.entry(app_id.to_owned()).or_default();
        f(entry.value())
    }
}

impl Stats for LocalStats {
    fn mark_new_connection(&self, app: &App) {
        if !self.tracks(app) {
            return;
        }
        self.with_counters(&app.id, |c| {
            let now = c.connections.fetch_add(1, Ordering::Relaxed) + 1;
            c.peak_connections.fetch_max(now, Ordering::Relaxed);
        });
    }

    fn mark_disconnection(&self, app: &App) {
        if !self.tracks(app) {
            return;
        }
        self.with_counters(&app.id, |c| {
            c.connections.fetch_sub(1, Ordering::Relaxed);
        });
    }

    fn mark_ws_message(&self, app: &App) {
        if !self.tracks(app) {
            return;
        }
        self.with_counters(&app.id, |c| {
            c.ws_messages.fetch_add(1, Ordering::Relaxed);
        });
    }

    fn mark_api_message(&self, app: &App) {
        if !self.tracks(app) {
            return;
        }
        self.with_counters(&app.id, |c| {
            c.api_messages.fetch_add(1, Ordering::Relaxed);
        });
    }

    fn current(&self, app_id: &str) -> CurrentStats {
        match self.counters.get(app_id) {
            Some(c) => CurrentStats {
                connections: c.connections.load(Ordering::Relaxed),
                peak_connections: c.peak_connections.load(Ordering::Relaxed),
                websocket_messages: c.ws_messages.load(Ordering::Relaxed),
                api_messages: c.api_messages.load(Ordering::Relaxed),
            },
            None => CurrentStats {
                connections: 0,
                peak_connections: 0,
                websocket_messages: 0,
                api_messages: 0,
            },
        }
    }

    fn snapshots(&self, app_id: &str, start: i64, end: i64) -> Vec<Snapshot> {
        match self.snapshots.get(app_id) {
            Some(points) => points
                .lock()
                .iter()
                .filter(|p| p.time >= start && p.time <= end)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    fn take_snapshots(&self) {
        let time = chrono::Utc::now().timestamp_millis();
        for entry in self.counters.iter() {
            let stats = CurrentStats {
                connections: entry.connections.load(Ordering::Relaxed),
                peak_connections: entry.peak_connections.load(Ordering::Relaxed),
                // Message counters are per interval; drain them.
                websocket_messages: entry.ws_messages.swap(0, Ordering::Relaxed),
                api_messages: entry.api_messages.swap(0, Ordering::Relaxed),
            };
            self.snapshots
                .entry(entry.key().clone())
                .or_insert_with(|| Mutex::new(Vec::new()))
                .lock()
                .push(Snapshot { time, stats });
        }
    }
}
