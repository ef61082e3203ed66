use std::{
    env, fs, io,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use bevy::prelude::*;
use crossbeam_channel::{unbounded, Receiver};
use expedition_runtime::{DifficultyId, DEFAULT_DIFFICULTY};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use thiserror::Error;

use crate::components::ExpeditionData;

pub const BUILTIN_EXPEDITION_CONFIG: &str = include_str!("data/expedition_config.json");

const CONFIG_TARGET: &str = "salvage::config";

/// Upper bound for every configured duration: one week.
pub const MAX_DURATION_SECS: f32 = 7.0 * 24.0 * 3600.0;

/// A named difficulty level. `value` orders tiers from mildest to harshest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DifficultyTier {
    pub id: DifficultyId,
    pub value: i32,
    #[serde(default)]
    pub duration_secs: Option<f32>,
}

impl DifficultyTier {
    pub fn new(id: impl Into<String>, value: i32) -> Self {
        Self {
            id: DifficultyId::new(id),
            value,
            duration_secs: None,
        }
    }

    pub fn fallback() -> Self {
        Self::new(DEFAULT_DIFFICULTY, 0)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExpeditionConfig {
    cooldown_secs: f32,
    failed_cooldown_secs: f32,
    travel_time_secs: f32,
    proximity_check: bool,
    mission_limit: usize,
    early_finish_secs: f32,
    protected_faction: String,
    default_mission_secs: f32,
    difficulty_tiers: Vec<DifficultyTier>,
    job_budget_micros: u64,
    tick_millis: u64,
    reparent_retry_millis: u64,
    reparent_max_attempts: u32,
    rng_seed: u64,
    exports_dir: PathBuf,
    command_bind: SocketAddr,
    console_stream_bind: SocketAddr,
}

impl Default for ExpeditionConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 780.0,
            failed_cooldown_secs: 1200.0,
            travel_time_secs: 50.0,
            proximity_check: true,
            mission_limit: 6,
            early_finish_secs: 20.0,
            protected_faction: "NanoTrasen".to_string(),
            default_mission_secs: 900.0,
            difficulty_tiers: vec![
                DifficultyTier::new("NFModerate", 0),
                DifficultyTier::new("NFHazardous", 1),
                DifficultyTier::new("NFExtreme", 2),
            ],
            job_budget_micros: 2_000,
            tick_millis: 100,
            reparent_retry_millis: 100,
            reparent_max_attempts: 10,
            rng_seed: 0x05A3_32EE,
            exports_dir: PathBuf::from("exports"),
            command_bind: SocketAddr::from(([127, 0, 0, 1], 41_100)),
            console_stream_bind: SocketAddr::from(([127, 0, 0, 1], 41_101)),
        }
    }
}

impl ExpeditionConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_EXPEDITION_CONFIG)
                .expect("builtin expedition config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, ExpeditionConfigError> {
        let config: ExpeditionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ExpeditionConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ExpeditionConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json_str(&contents)
    }

    fn validate(&self) -> Result<(), ExpeditionConfigError> {
        if self.tick_millis == 0 {
            return Err(ExpeditionConfigError::Invalid {
                field: "tick_millis",
                reason: "tick length must be positive".to_string(),
            });
        }
        if self.mission_limit == 0 {
            return Err(ExpeditionConfigError::Invalid {
                field: "mission_limit",
                reason: "at least one mission must be offered".to_string(),
            });
        }
        for (field, secs) in [
            ("cooldown_secs", self.cooldown_secs),
            ("failed_cooldown_secs", self.failed_cooldown_secs),
            ("travel_time_secs", self.travel_time_secs),
            ("early_finish_secs", self.early_finish_secs),
            ("default_mission_secs", self.default_mission_secs),
        ] {
            check_duration(field, secs)?;
        }
        for tier in &self.difficulty_tiers {
            if let Some(secs) = tier.duration_secs {
                check_duration("difficulty_tiers.duration_secs", secs)?;
            }
        }
        Ok(())
    }

    /// Lockout applied after a completed expedition, and the base offer interval.
    pub fn cooldown(&self) -> Duration {
        secs(self.cooldown_secs)
    }

    /// Lockout applied after an expedition that ended without completing.
    pub fn failed_cooldown(&self) -> Duration {
        secs(self.failed_cooldown_secs)
    }

    pub fn travel_time(&self) -> Duration {
        secs(self.travel_time_secs)
    }

    pub fn proximity_check(&self) -> bool {
        self.proximity_check
    }

    pub fn mission_limit(&self) -> usize {
        self.mission_limit
    }

    pub fn early_finish_window(&self) -> Duration {
        secs(self.early_finish_secs)
    }

    pub fn protected_faction(&self) -> &str {
        &self.protected_faction
    }

    pub fn difficulty_tiers(&self) -> &[DifficultyTier] {
        &self.difficulty_tiers
    }

    /// Tier used for missions synthesized outside the catalog.
    pub fn default_tier(&self) -> DifficultyTier {
        self.difficulty_tiers
            .iter()
            .min_by_key(|tier| tier.value)
            .cloned()
            .unwrap_or_else(DifficultyTier::fallback)
    }

    /// Mission length for a tier, falling back to `default_mission_secs`.
    pub fn mission_duration(&self, difficulty: &DifficultyId) -> Duration {
        self.difficulty_tiers
            .iter()
            .find(|tier| &tier.id == difficulty)
            .and_then(|tier| tier.duration_secs)
            .filter(|value| value.is_finite() && *value >= 0.0)
            .map(secs)
            .unwrap_or_else(|| secs(self.default_mission_secs))
    }

    pub fn job_budget(&self) -> Duration {
        Duration::from_micros(self.job_budget_micros)
    }

    pub fn tick_length(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    pub fn reparent_retry_interval(&self) -> Duration {
        Duration::from_millis(self.reparent_retry_millis)
    }

    pub fn reparent_max_attempts(&self) -> u32 {
        self.reparent_max_attempts
    }

    pub fn rng_seed(&self) -> u64 {
        self.rng_seed
    }

    pub fn exports_dir(&self) -> &Path {
        &self.exports_dir
    }

    pub fn command_bind(&self) -> SocketAddr {
        self.command_bind
    }

    pub fn console_stream_bind(&self) -> SocketAddr {
        self.console_stream_bind
    }
}

fn check_duration(field: &'static str, secs: f32) -> Result<(), ExpeditionConfigError> {
    if !secs.is_finite() || !(0.0..=MAX_DURATION_SECS).contains(&secs) {
        return Err(ExpeditionConfigError::Invalid {
            field,
            reason: format!(
                "expected a duration between 0 and {MAX_DURATION_SECS}s, got {secs}"
            ),
        });
    }
    Ok(())
}

fn secs(value: f32) -> Duration {
    Duration::try_from_secs_f32(value.clamp(0.0, MAX_DURATION_SECS))
        .unwrap_or(Duration::from_secs(MAX_DURATION_SECS as u64))
}

#[derive(Debug, Error)]
pub enum ExpeditionConfigError {
    #[error("failed to parse expedition config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read expedition config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid expedition config field {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("failed to watch expedition config: {0}")]
    Watch(#[from] notify::Error),
}

#[derive(Resource, Debug, Clone)]
pub struct ExpeditionConfigHandle(pub Arc<ExpeditionConfig>);

impl ExpeditionConfigHandle {
    pub fn new(config: Arc<ExpeditionConfig>) -> Self {
        Self(config)
    }

    pub fn get(&self) -> Arc<ExpeditionConfig> {
        Arc::clone(&self.0)
    }

    pub fn config(&self) -> &ExpeditionConfig {
        &self.0
    }

    pub fn replace(&mut self, config: Arc<ExpeditionConfig>) {
        self.0 = config;
    }
}

#[derive(Resource, Debug, Clone)]
pub struct ExpeditionConfigMetadata {
    path: Option<PathBuf>,
}

impl ExpeditionConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn set_path(&mut self, path: Option<PathBuf>) {
        self.path = path;
    }
}

pub fn load_expedition_config_from_env() -> (Arc<ExpeditionConfig>, ExpeditionConfigMetadata) {
    let override_path = env::var("EXPEDITION_CONFIG_PATH").ok().map(PathBuf::from);
    let default_path =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/expedition_config.json");
    let path = override_path.unwrap_or(default_path);

    match ExpeditionConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: CONFIG_TARGET,
                path = %path.display(),
                "expedition_config.loaded=file"
            );
            return (Arc::new(config), ExpeditionConfigMetadata::new(Some(path)));
        }
        Err(err) => {
            tracing::warn!(
                target: CONFIG_TARGET,
                path = %path.display(),
                error = %err,
                "expedition_config.load_failed"
            );
        }
    }

    let config = ExpeditionConfig::builtin();
    tracing::info!(target: CONFIG_TARGET, "expedition_config.loaded=builtin");
    (config, ExpeditionConfigMetadata::new(None))
}

/// Watches the config file on disk and feeds change notifications to
/// [`reload_expedition_config`].
#[derive(Resource)]
pub struct ExpeditionConfigWatcher {
    _watcher: Mutex<RecommendedWatcher>,
    events: Receiver<notify::Result<notify::Event>>,
    path: PathBuf,
}

impl ExpeditionConfigWatcher {
    pub fn spawn(path: &Path) -> Result<Self, ExpeditionConfigError> {
        let (sender, events) = unbounded();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let _ = sender.send(event);
        })?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(Self {
            _watcher: Mutex::new(watcher),
            events,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn drain_changes(&self) -> bool {
        let mut changed = false;
        for event in self.events.try_iter() {
            match event {
                Ok(event) => {
                    changed |= matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
                }
                Err(err) => {
                    tracing::warn!(
                        target: CONFIG_TARGET,
                        error = %err,
                        "expedition_config.watch_error"
                    );
                }
            }
        }
        changed
    }
}

/// Shifts a pending offer by the change in success cooldown so stations
/// already waiting are neither punished nor rewarded twice.
pub fn apply_cooldown_change(
    previous: &ExpeditionConfig,
    next: &ExpeditionConfig,
    data: &mut ExpeditionData,
) {
    let old = previous.cooldown();
    let new = next.cooldown();
    if new >= old {
        data.next_offer += new - old;
    } else {
        data.next_offer = data.next_offer.saturating_sub(old - new);
    }
}

pub fn reload_expedition_config(
    watcher: Option<Res<ExpeditionConfigWatcher>>,
    mut handle: ResMut<ExpeditionConfigHandle>,
    mut stations: Query<&mut ExpeditionData>,
) {
    let Some(watcher) = watcher else {
        return;
    };
    if !watcher.drain_changes() {
        return;
    }

    match ExpeditionConfig::from_file(watcher.path()) {
        Ok(next) => {
            let previous = handle.get();
            for mut data in stations.iter_mut() {
                apply_cooldown_change(&previous, &next, &mut data);
            }
            tracing::info!(
                target: CONFIG_TARGET,
                path = %watcher.path().display(),
                cooldown_secs = next.cooldown().as_secs_f32(),
                failed_cooldown_secs = next.failed_cooldown().as_secs_f32(),
                mission_limit = next.mission_limit(),
                "expedition_config.reloaded"
            );
            handle.replace(Arc::new(next));
        }
        Err(err) => {
            tracing::warn!(
                target: CONFIG_TARGET,
                path = %watcher.path().display(),
                error = %err,
                "expedition_config.reload_failed=keeping_previous"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_matches_defaults() {
        let config = ExpeditionConfig::builtin();
        assert_eq!(config.mission_limit(), 6);
        assert_eq!(config.cooldown(), Duration::from_secs(780));
        assert_eq!(config.early_finish_window(), Duration::from_secs(20));
        assert_eq!(config.difficulty_tiers().len(), 3);
        assert_eq!(config.protected_faction(), "NanoTrasen");
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config = ExpeditionConfig::from_json_str(r#"{ "travel_time_secs": 2.5 }"#)
            .expect("partial config parses");
        assert_eq!(config.travel_time(), Duration::from_secs_f32(2.5));
        assert_eq!(config.mission_limit(), 6);
        assert!(config.proximity_check());
    }

    #[test]
    fn zero_tick_length_is_rejected() {
        let err = ExpeditionConfig::from_json_str(r#"{ "tick_millis": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ExpeditionConfigError::Invalid {
                field: "tick_millis",
                ..
            }
        ));
    }

    #[test]
    fn negative_cooldown_is_rejected() {
        let err = ExpeditionConfig::from_json_str(r#"{ "cooldown_secs": -1.0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ExpeditionConfigError::Invalid {
                field: "cooldown_secs",
                ..
            }
        ));
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let err = ExpeditionConfig::from_json_str(r#"{ "cooldown_secs": 1e30 }"#).unwrap_err();
        assert!(matches!(
            err,
            ExpeditionConfigError::Invalid {
                field: "cooldown_secs",
                ..
            }
        ));

        let err = ExpeditionConfig::from_json_str(
            r#"{ "difficulty_tiers": [{ "id": "Eternal", "value": 0, "duration_secs": 1e30 }] }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ExpeditionConfigError::Invalid {
                field: "difficulty_tiers.duration_secs",
                ..
            }
        ));

        let week = ExpeditionConfig::from_json_str(r#"{ "cooldown_secs": 604800.0 }"#).unwrap();
        assert_eq!(week.cooldown(), Duration::from_secs(604_800));

        // The hot-reload path re-reads through from_file and keeps the old
        // config on error.
        let path = std::env::temp_dir().join(format!(
            "expedition-config-oversized-{}.json",
            std::process::id()
        ));
        fs::write(&path, r#"{ "failed_cooldown_secs": 1e30 }"#).unwrap();
        let reloaded = ExpeditionConfig::from_file(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(
            reloaded,
            Err(ExpeditionConfigError::Invalid {
                field: "failed_cooldown_secs",
                ..
            })
        ));
    }

    #[test]
    fn default_tier_is_mildest_or_fallback() {
        let config = ExpeditionConfig::from_json_str(
            r#"{ "difficulty_tiers": [
                { "id": "Hard", "value": 4 },
                { "id": "Soft", "value": 1 }
            ] }"#,
        )
        .unwrap();
        assert_eq!(config.default_tier().id.as_str(), "Soft");

        let empty = ExpeditionConfig::from_json_str(r#"{ "difficulty_tiers": [] }"#).unwrap();
        assert_eq!(empty.default_tier().id.as_str(), DEFAULT_DIFFICULTY);
    }

    #[test]
    fn mission_duration_falls_back_for_unknown_tiers() {
        let config = ExpeditionConfig::builtin();
        assert_eq!(
            config.mission_duration(&DifficultyId::from("NFExtreme")),
            Duration::from_secs(1260)
        );
        assert_eq!(
            config.mission_duration(&DifficultyId::from("Unlisted")),
            Duration::from_secs(900)
        );
    }

    #[test]
    fn cooldown_change_shifts_pending_offers() {
        let previous = ExpeditionConfig::from_json_str(r#"{ "cooldown_secs": 100.0 }"#).unwrap();
        let longer = ExpeditionConfig::from_json_str(r#"{ "cooldown_secs": 160.0 }"#).unwrap();
        let shorter = ExpeditionConfig::from_json_str(r#"{ "cooldown_secs": 10.0 }"#).unwrap();

        let mut data = ExpeditionData {
            next_offer: Duration::from_secs(50),
            ..ExpeditionData::default()
        };
        apply_cooldown_change(&previous, &longer, &mut data);
        assert_eq!(data.next_offer, Duration::from_secs(110));

        apply_cooldown_change(&previous, &shorter, &mut data);
        assert_eq!(data.next_offer, Duration::from_secs(20));

        apply_cooldown_change(&longer, &shorter, &mut data);
        assert_eq!(data.next_offer, Duration::ZERO);
    }
}
