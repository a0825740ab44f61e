use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Process-level configuration resolved from argv and the environment.
#[derive(Debug)]
pub struct AppConfig {
    pub root: PathBuf,
    pub config_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        if args.len() < 2 {
            return Err("usage: shard <data-root> [shard.yml]".to_string());
        }
        let root = Path::new(&args[1]).to_path_buf();
        let config_path = if args.len() > 2 {
            Some(Path::new(&args[2]).to_path_buf())
        } else {
            std::env::var("SHARD_CONFIG").ok().and_then(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Path::new(trimmed).to_path_buf())
                }
            })
        };
        Ok(Self { root, config_path })
    }
}

/// Shard tuning knobs, loaded from a YAML document. Every field has a stock
/// default so a partial file (or none at all) is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    /// Simulation tick length in milliseconds.
    pub tick_ms: u64,
    /// Visibility radius in tiles for observer queries.
    pub update_range: i32,
    /// Combat ends after this long without an aggressive refresh.
    pub combat_idle_timeout_ms: u64,
    /// How long the criminal flag sticks.
    pub criminal_duration_ms: u64,
    /// Aggression ledger entries expire after this window.
    pub aggression_expire_ms: u64,
    /// Damage ledger entries expire after this window.
    pub damage_entry_expire_ms: u64,
    /// Sliding window for the anti-speed-hack step counter.
    pub fastwalk_window_ms: u64,
    /// Steps allowed inside the window before the fastwalk policy is asked.
    pub fastwalk_max_steps: usize,
    /// Delta batches at or above this size fan out across worker threads.
    pub delta_parallel_threshold: usize,
    /// Base swing cadence; dexterity shortens it.
    pub swing_delay_ms: u64,
    /// Capacity of the persistence record cache.
    pub record_cache_capacity: usize,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            update_range: 18,
            combat_idle_timeout_ms: 60_000,
            criminal_duration_ms: 120_000,
            aggression_expire_ms: 120_000,
            damage_entry_expire_ms: 120_000,
            fastwalk_window_ms: 1_600,
            fastwalk_max_steps: 5,
            delta_parallel_threshold: 64,
            swing_delay_ms: 2_500,
            record_cache_capacity: 256,
        }
    }
}

impl ShardConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let data = std::fs::read_to_string(path)
            .map_err(|err| format!("config read failed for {}: {}", path.display(), err))?;
        serde_yaml::from_str(&data)
            .map_err(|err| format!("config parse failed for {}: {}", path.display(), err))
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self, String> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
