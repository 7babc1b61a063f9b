//! Server configuration, loaded once from environment variables.

use std::str::FromStr;

/// Which app registry backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRegistryKind {
    Memory,
    Http,
}

impl FromStr for AppRegistryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown app registry driver `{other}`")),
        }
    }
}

/// Which rate limiter backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimiterKind {
    Memory,
}

impl FromStr for RateLimiterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown rate limiter driver `{other}`")),
        }
    }
}

/// Which presence storage backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStorageKind {
    /// Members are attached to the owning session. Single-process only.
    Socket,
}

impl FromStr for PresenceStorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "socket" => Ok(Self::Socket),
            other => Err(format!("unknown presence storage driver `{other}`")),
        }
    }
}

/// Which stats backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsKind {
    Local,
}

impl FromStr for StatsKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            other => Err(format!("unknown stats driver `{other}`")),
        }
    }
}

/// Limits applied to channel names at subscribe time.
#[derive(Debug, Clone)]
pub struct ChannelLimits {
    pub max_name_length: usize,
}

/// Limits applied to events, both client-sent and API-broadcast.
#[derive(Debug, Clone)]
pub struct EventLimits {
    pub max_channels_at_once: usize,
    pub max_name_length: usize,
    pub max_payload_kb: f64,
}

/// Limits applied to presence channel members.
#[derive(Debug, Clone)]
pub struct PresenceLimits {
    pub max_members_per_channel: usize,
    pub max_member_size_kb: f64,
}

/// Riptide configuration. Built once at startup and shared immutably.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    pub app_registry_driver: AppRegistryKind,
    pub rate_limiter_driver: RateLimiterKind,
    pub presence_storage_driver: PresenceStorageKind,
    pub stats_driver: StatsKind,
    /// JSON array of apps for the memory registry driver.
    pub apps_json: Option<String>,
    /// Base URL of the remote app registry (http driver).
    pub app_registry_url: Option<String>,
    /// Bearer token sent to the remote app registry (http driver).
    pub app_registry_token: Option<String>,
    pub channel_limits: ChannelLimits,
    pub event_limits: EventLimits,
    pub presence_limits: PresenceLimits,
    /// Whether the stats collector records anything at all.
    pub stats_enabled: bool,
    /// Interval between stats snapshots, in seconds.
    pub stats_snapshot_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message on a missing or malformed value;
    /// an unknown driver name is a startup-time fatal error, never a silent
    /// fallback.
    pub fn from_env() -> Self {
        Self {
            port: parsed_var("PORT", 6001),
            app_registry_driver: driver_var("APP_REGISTRY_DRIVER", "memory"),
            rate_limiter_driver: driver_var("RATE_LIMITER_DRIVER", "memory"),
            presence_storage_driver: driver_var("PRESENCE_STORAGE_DRIVER", "socket"),
            stats_driver: driver_var("STATS_DRIVER", "local"),
            apps_json: optional_var("APPS_JSON"),
            app_registry_url: optional_var("APP_REGISTRY_URL"),
            app_registry_token: optional_var("APP_REGISTRY_TOKEN"),
            channel_limits: ChannelLimits {
                max_name_length: parsed_var("CHANNEL_MAX_NAME_LENGTH", 100),
            },
            event_limits: EventLimits {
                max_channels_at_once: parsed_var("EVENT_MAX_CHANNELS_AT_ONCE", 100),
                max_name_length: parsed_var("EVENT_MAX_NAME_LENGTH", 200),
                max_payload_kb: parsed_var("EVENT_MAX_PAYLOAD_KB", 100.0),
            },
            presence_limits: PresenceLimits {
                max_members_per_channel: parsed_var("PRESENCE_MAX_MEMBERS_PER_CHANNEL", 100),
                max_member_size_kb: parsed_var("PRESENCE_MAX_MEMBER_SIZE_KB", 2.0),
            },
            stats_enabled: parsed_var("STATS_ENABLED", true),
            stats_snapshot_interval_secs: parsed_var("STATS_SNAPSHOT_INTERVAL_SECS", 3600),
        }
    }
}

impl Default for Config {
    /// Defaults suitable for development and tests.
    fn default() -> Self {
        Self {
            port: 6001,
            app_registry_driver: AppRegistryKind::Memory,
            rate_limiter_driver: RateLimiterKind::Memory,
            presence_storage_driver: PresenceStorageKind::Socket,
            stats_driver: StatsKind::Local,
            apps_json: None,
            app_registry_url: None,
            app_registry_token: None,
            channel_limits: ChannelLimits {
                max_name_length: 100,
            },
            event_limits: EventLimits {
                max_channels_at_once: 100,
                max_name_length: 200,
                max_payload_kb: 100.0,
            },
            presence_limits: PresenceLimits {
                max_members_per_channel: 100,
                max_member_size_kb: 2.0,
            },
            stats_enabled: true,
            stats_snapshot_interval_secs: 3600,
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} has an invalid value: {raw}")),
        Err(_) => default,
    }
}

fn driver_var<T>(name: &str, default: &str) -> T
where
    T: FromStr<Err = String>,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .unwrap_or_else(|e| panic!("{name} is invalid: {e}"))
}
