//! Save-data, leaderboard, and settings documents plus the storage
//! capability. Documents are plain JSON; loads tolerate missing or corrupt
//! files by falling back to defaults so a bad disk never blocks play.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum PersistenceError {
    Io(String),
    Encode(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(m) => write!(f, "io error: {m}"),
            Self::Encode(m) => write!(f, "encode error: {m}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

/// Purchased upgrade levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Upgrades {
    pub speed: u32,
    pub jump: u32,
    pub hp: u32,
    pub slam: u32,
}

/// Persistent player progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveData {
    /// Spendable currency. Older saves called this field `coins`.
    #[serde(alias = "coins")]
    pub credits: f64,
    pub upgrades: Upgrades,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeKind {
    Speed,
    Jump,
    Hp,
    Slam,
}

/// Shop catalog entry.
pub struct UpgradeInfo {
    pub name: &'static str,
    pub base_cost: f64,
    pub cost_mult: f64,
    pub max_level: u32,
    pub desc: &'static str,
}

pub fn upgrade_info(kind: UpgradeKind) -> UpgradeInfo {
    match kind {
        UpgradeKind::Speed => UpgradeInfo {
            name: "Agility",
            base_cost: 50.0,
            cost_mult: 1.5,
            max_level: 10,
            desc: "+5% Move Speed",
        },
        UpgradeKind::Jump => UpgradeInfo {
            name: "Rocket Boots",
            base_cost: 60.0,
            cost_mult: 1.6,
            max_level: 10,
            desc: "+3% Jump Height",
        },
        UpgradeKind::Hp => UpgradeInfo {
            name: "Iron Heart",
            base_cost: 200.0,
            cost_mult: 2.0,
            max_level: 5,
            desc: "+1 Max HP",
        },
        UpgradeKind::Slam => UpgradeInfo {
            name: "Graviton",
            base_cost: 80.0,
            cost_mult: 1.4,
            max_level: 10,
            desc: "-8% Slam/Dash Cooldown",
        },
    }
}

/// Price of the next level, or None once maxed out.
pub fn upgrade_cost(kind: UpgradeKind, current_level: u32) -> Option<u64> {
    let info = upgrade_info(kind);
    if current_level >= info.max_level {
        return None;
    }
    Some((info.base_cost * info.cost_mult.powi(current_level as i32)) as u64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub name: String,
    pub score: i64,
    /// Unix timestamp in seconds.
    pub time: f64,
}

/// Top-10 lists per game mode, score-descending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Leaderboard {
    pub single: Vec<ScoreEntry>,
    pub coop: Vec<ScoreEntry>,
    pub versus: Vec<ScoreEntry>,
}

/// Entries a mode's list may hold.
pub const LEADERBOARD_CAP: usize = 10;

impl Leaderboard {
    pub fn entries(&self, mode: crate::modes::GameMode) -> &Vec<ScoreEntry> {
        match mode {
            crate::modes::GameMode::Single => &self.single,
            crate::modes::GameMode::Coop => &self.coop,
            crate::modes::GameMode::Versus => &self.versus,
        }
    }

    fn entries_mut(&mut self, mode: crate::modes::GameMode) -> &mut Vec<ScoreEntry> {
        match mode {
            crate::modes::GameMode::Single => &mut self.single,
            crate::modes::GameMode::Coop => &mut self.coop,
            crate::modes::GameMode::Versus => &mut self.versus,
        }
    }

    /// Insert a result, keeping the list sorted score-descending and capped.
    pub fn add_score(&mut self, mode: crate::modes::GameMode, name: &str, score: i64) {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let list = self.entries_mut(mode);
        list.push(ScoreEntry {
            name: name.to_string(),
            score,
            time,
        });
        list.sort_by(|a, b| b.score.cmp(&a.score));
        list.truncate(LEADERBOARD_CAP);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenMode {
    Window,
    Fullscreen,
    Borderless,
}

/// Audio levels, screen mode, and the rebindable action -> key-name map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub master_volume: f32,
    pub music_volume: f32,
    pub sfx_volume: f32,
    pub screen_mode: ScreenMode,
    pub keybinds: HashMap<String, String>,
}

pub fn default_keybinds() -> HashMap<String, String> {
    [
        ("p1_left", "a"),
        ("p1_right", "d"),
        ("p1_jump", "w"),
        ("p1_slam", "s"),
        ("p2_left", "j"),
        ("p2_right", "l"),
        ("p2_jump", "i"),
        ("p2_slam", "k"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            master_volume: 0.6,
            music_volume: 0.5,
            sfx_volume: 0.8,
            screen_mode: ScreenMode::Window,
            keybinds: default_keybinds(),
        }
    }
}

impl Settings {
    /// Merge saved bindings over the defaults, ignoring unknown actions so
    /// stale files from removed features load cleanly.
    pub fn merge_keybinds(&mut self, saved: HashMap<String, String>) {
        let defaults = default_keybinds();
        for (action, key) in saved {
            if defaults.contains_key(&action) {
                self.keybinds.insert(action, key);
            }
        }
    }
}

/// Storage capability used by the session. One implementation writes JSON
/// to disk; tests use the in-memory store from `test_helpers`.
pub trait Persistence {
    fn load_save(&self) -> SaveData;
    fn save_save(&self, data: &SaveData) -> Result<(), PersistenceError>;
    fn load_leaderboard(&self) -> Leaderboard;
    fn save_leaderboard(&self, lb: &Leaderboard) -> Result<(), PersistenceError>;
    fn load_settings(&self) -> Settings;
    fn save_settings(&self, settings: &Settings) -> Result<(), PersistenceError>;
}

/// JSON-file persistence rooted at a data directory.
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn read_or_default<T: Default + for<'de> Deserialize<'de>>(&self, file: &str) -> T {
        let path = self.path(file);
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!("Corrupt {}: {e}, using defaults", path.display());
                    T::default()
                },
            },
            Err(_) => T::default(),
        }
    }

    fn write(&self, file: &str, doc: &impl Serialize) -> Result<(), PersistenceError> {
        ensure_dir(&self.dir)?;
        let json = serde_json::to_string_pretty(doc)
            .map_err(|e| PersistenceError::Encode(e.to_string()))?;
        std::fs::write(self.path(file), json).map_err(|e| PersistenceError::Io(e.to_string()))
    }
}

fn ensure_dir(dir: &Path) -> Result<(), PersistenceError> {
    std::fs::create_dir_all(dir).map_err(|e| PersistenceError::Io(e.to_string()))
}

const SAVE_FILE: &str = "save_data.json";
const LEADERBOARD_FILE: &str = "leaderboard.json";
const SETTINGS_FILE: &str = "settings.json";

impl Persistence for JsonStore {
    fn load_save(&self) -> SaveData {
        self.read_or_default(SAVE_FILE)
    }

    fn save_save(&self, data: &SaveData) -> Result<(), PersistenceError> {
        self.write(SAVE_FILE, data)
    }

    fn load_leaderboard(&self) -> Leaderboard {
        self.read_or_default(LEADERBOARD_FILE)
    }

    fn save_leaderboard(&self, lb: &Leaderboard) -> Result<(), PersistenceError> {
        self.write(LEADERBOARD_FILE, lb)
    }

    fn load_settings(&self) -> Settings {
        // Keybinds merge over defaults instead of replacing them wholesale.
        let raw: Settings = self.read_or_default(SETTINGS_FILE);
        let mut settings = Settings {
            keybinds: default_keybinds(),
            ..raw.clone()
        };
        settings.merge_keybinds(raw.keybinds);
        settings
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), PersistenceError> {
        self.write(SETTINGS_FILE, settings)
    }
}
