use serde::{Deserialize, Serialize};

/// Virtual playfield width in pixels.
pub const VIRTUAL_W: f32 = 640.0;
/// Virtual playfield height in pixels.
pub const VIRTUAL_H: f32 = 480.0;
/// Tile size in pixels.
pub const TILE_SIZE: f32 = 20.0;
/// Ground platform top for the opening stretch.
pub const GROUND_LEVEL: f32 = VIRTUAL_H - 2.0 * TILE_SIZE;

/// Gravity acceleration (px/s^2, downward).
pub const BASE_GRAVITY: f32 = 1400.0;
/// Jump initial velocity (negative = up).
pub const BASE_JUMP_VEL: f32 = -550.0;
/// Horizontal run speed.
pub const BASE_PLAYER_SPEED: f32 = 220.0;
/// Fall-speed cap while pressed against a wall.
pub const WALL_SLIDE_SPEED: f32 = 50.0;
/// Horizontal kick away from the wall on a wall jump.
pub const WALL_JUMP_X: f32 = 250.0;
/// Vertical kick on a wall jump.
pub const WALL_JUMP_Y: f32 = -450.0;
/// Camera lead distance ahead of the followed player.
pub const SCROLL_OFFSET_X: f32 = 200.0;

/// Downward velocity set for the duration of a slam dive.
pub const BASE_SLAM_SPEED: f32 = 900.0;
pub const BASE_SLAM_COOLDOWN: f32 = 1.0;
/// Slam impact radius at zero fall distance.
pub const SLAM_BASE_RADIUS: f32 = 40.0;
/// Extra impact radius per pixel of fall distance since the slam started.
pub const SLAM_RADIUS_PER_HEIGHT: f32 = 0.25;

pub const BASE_DASH_SPEED: f32 = 800.0;
pub const BASE_DASH_DURATION: f32 = 0.20;
pub const BASE_DASH_COOLDOWN: f32 = 1.2;

/// Distance at which stage 1 tuning ends.
pub const STAGE_1_END: f32 = 4000.0;
/// Distance at which stage 2 tuning ends; stage 3 is endless.
pub const STAGE_2_END: f32 = 9000.0;
/// X position past which the boss portal section is generated.
pub const PORTAL_SPAWN_DISTANCE: f32 = 10_000.0;

pub const BOSS_HP: i32 = 5;
pub const ATTACK_DURATION_MIN: f32 = 15.0;
pub const ATTACK_DURATION_MAX: f32 = 20.0;
pub const TIRED_DURATION: f32 = 4.0;
/// Altitude the boss patrols at while attacking.
pub const BOSS_FLIGHT_HEIGHT: f32 = 20.0;
/// Altitude the boss descends to while tired.
pub const BOSS_TIRED_HEIGHT: f32 = 300.0;
/// Attack cadence divisor once the boss is at 1 HP.
pub const ENRAGE_ATTACK_SPEED_MULTIPLIER: f32 = 1.25;
/// Contact-damage grace while the boss flies back up from TIRED.
pub const BOSS_RECOVERY_DURATION: f32 = 2.0;
/// Maximum successful hits per TIRED phase.
pub const BOSS_DAMAGE_CAP: u32 = 2;

pub const BOSS_ROOM_WIDTH: f32 = VIRTUAL_W;
pub const BOSS_ROOM_HEIGHT: f32 = VIRTUAL_H;

/// Number of credit orbs spawned when the boss falls.
pub const VICTORY_CREDITS: u32 = 5;

/// Grace period after leaving the ground during which a jump still fires.
pub const COYOTE_TIME: f32 = 0.12;
/// How long a jump press is remembered before landing.
pub const JUMP_BUFFER: f32 = 0.12;

/// Configurable movement tuning, loadable from TOML. Defaults mirror the
/// constants above so a missing file changes nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsTuning {
    pub gravity: f32,
    pub jump_velocity: f32,
    pub player_speed: f32,
    pub wall_slide_speed: f32,
    pub wall_jump_x: f32,
    pub wall_jump_y: f32,
    pub slam_speed: f32,
    pub slam_cooldown: f32,
    pub dash_speed: f32,
    pub dash_duration: f32,
    pub dash_cooldown: f32,
}

impl Default for PhysicsTuning {
    fn default() -> Self {
        Self {
            gravity: BASE_GRAVITY,
            jump_velocity: BASE_JUMP_VEL,
            player_speed: BASE_PLAYER_SPEED,
            wall_slide_speed: WALL_SLIDE_SPEED,
            wall_jump_x: WALL_JUMP_X,
            wall_jump_y: WALL_JUMP_Y,
            slam_speed: BASE_SLAM_SPEED,
            slam_cooldown: BASE_SLAM_COOLDOWN,
            dash_speed: BASE_DASH_SPEED,
            dash_duration: BASE_DASH_DURATION,
            dash_cooldown: BASE_DASH_COOLDOWN,
        }
    }
}

/// Top-level tuning document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub physics: PhysicsTuning,
}

impl TuningConfig {
    /// Load tuning from a TOML file. Falls back to defaults if the file is
    /// missing or unparseable.
    pub fn load() -> Self {
        let path = std::env::var("SLIMED_TUNING_CONFIG")
            .unwrap_or_else(|_| "config/tuning.toml".to_string());
        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<TuningConfig>(&content) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!("Failed to parse {path}: {e}, using defaults");
                    TuningConfig::default()
                },
            },
            Err(_) => TuningConfig::default(),
        }
    }
}
