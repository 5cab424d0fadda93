use std::path::PathBuf;

/// Runtime configuration for the brain server.
///
/// Values come from an optional JSON config file (`chaos.json`, or the
/// path in `CHAOS_BRAIN_CONFIG`), with env vars taking precedence over
/// the file and built-in defaults filling the rest.
#[derive(Clone, Debug)]
pub struct BrainConfig {
    pub bind_addr: String,
    /// Dispatcher tick interval.
    pub tick_interval_secs: u64,
    /// How long a slot stays occupied once an item is promoted into it.
    pub slot_hold_secs: u64,
    /// How long a dispatched script must run before it counts as delivered.
    pub consumption_threshold_secs: u64,
    /// Delay before an interrupted script is put back on the queue.
    pub rerun_delay_secs: u64,
    /// Command history cap; oldest finished records are evicted past this.
    pub max_history: usize,
    /// Where the in-flight snapshot is mirrored. None disables persistence.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            tick_interval_secs: 1,
            slot_hold_secs: 10,
            consumption_threshold_secs: 10,
            rerun_delay_secs: 5,
            max_history: 500,
            snapshot_path: Some(PathBuf::from("executing_snapshot.json")),
        }
    }
}

#[derive(serde::Deserialize, Default)]
struct ConfigFile {
    bind_addr: Option<String>,
    tick_interval_secs: Option<u64>,
    slot_hold_secs: Option<u64>,
    consumption_threshold_secs: Option<u64>,
    rerun_delay_secs: Option<u64>,
    max_history: Option<usize>,
    snapshot_path: Option<String>,
}

fn load_config_file() -> ConfigFile {
    let path = std::env::var("CHAOS_BRAIN_CONFIG")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "chaos.json".to_string());
    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<ConfigFile>(&contents) {
            Ok(cfg) => {
                tracing::info!("loaded config from {path}");
                cfg
            }
            Err(e) => {
                tracing::warn!("failed to parse {path}: {e}");
                ConfigFile::default()
            }
        },
        Err(_) => ConfigFile::default(),
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl BrainConfig {
    pub fn load() -> Self {
        let file = load_config_file();
        let defaults = Self::default();
        let snapshot_path = match std::env::var("CHAOS_SNAPSHOT_PATH") {
            Ok(v) if v.trim().is_empty() || v.trim() == "off" => None,
            Ok(v) => Some(PathBuf::from(v)),
            Err(_) => file
                .snapshot_path
                .map(PathBuf::from)
                .or(defaults.snapshot_path),
        };
        Self {
            bind_addr: std::env::var("CHAOS_BIND_ADDR")
                .ok()
                .filter(|s| !s.is_empty())
                .or(file.bind_addr)
                .unwrap_or(defaults.bind_addr),
            tick_interval_secs: env_u64("CHAOS_TICK_INTERVAL_SECS")
                .or(file.tick_interval_secs)
                .unwrap_or(defaults.tick_interval_secs)
                .max(1),
            slot_hold_secs: env_u64("CHAOS_SLOT_HOLD_SECS")
                .or(file.slot_hold_secs)
                .unwrap_or(defaults.slot_hold_secs)
                .max(1),
            consumption_threshold_secs: env_u64("CHAOS_CONSUMPTION_THRESHOLD_SECS")
                .or(file.consumption_threshold_secs)
                .unwrap_or(defaults.consumption_threshold_secs)
                .max(1),
            rerun_delay_secs: env_u64("CHAOS_RERUN_DELAY_SECS")
                .or(file.rerun_delay_secs)
                .unwrap_or(defaults.rerun_delay_secs),
            max_history: env_u64("CHAOS_MAX_HISTORY")
                .map(|v| v as usize)
                .or(file.max_history)
                .unwrap_or(defaults.max_history)
                .max(1),
            snapshot_path,
        }
    }
}
