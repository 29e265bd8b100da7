//! Animation tables.
//!
//! Entities track a discrete action plus a frame index, and both travel over
//! the wire, so the simulation needs to know clip lengths without touching
//! pixel data. Each entity gets an enum-indexed frame-count table; the
//! windowed client fills one in from its loaded sheets, and the `Default`
//! impls provide placeholder counts and collider sizes so gameplay still
//! functions when a sheet fails to load.

use serde::{Deserialize, Serialize};

/// Player animation action. The lowercase names are wire-stable: they are
/// sent verbatim in the snapshot's animation segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerAction {
    Idle,
    Move,
    Jump,
    Fall,
    Land,
    Slam,
    Hit,
    Die,
}

impl PlayerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Move => "move",
            Self::Jump => "jump",
            Self::Fall => "fall",
            Self::Land => "land",
            Self::Slam => "slam",
            Self::Hit => "hit",
            Self::Die => "die",
        }
    }

    /// Unknown names fall back to Idle rather than failing; a peer running
    /// a newer build must not desync us.
    pub fn parse(s: &str) -> Self {
        match s {
            "move" => Self::Move,
            "jump" => Self::Jump,
            "fall" => Self::Fall,
            "land" => Self::Land,
            "slam" => Self::Slam,
            "hit" => Self::Hit,
            "die" => Self::Die,
            _ => Self::Idle,
        }
    }
}

/// Cosmetic idle sub-state: occasional one-shot alternate clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleVariant {
    Main,
    Alt1,
    Alt2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnemyAction {
    Walk,
    Hurt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BossAction {
    Idle,
    Cast,
    Attack,
    Hit,
    Death,
}

impl BossAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Cast => "cast",
            Self::Attack => "attack1",
            Self::Hit => "hit",
            Self::Death => "death",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "cast" => Self::Cast,
            "attack1" => Self::Attack,
            "hit" => Self::Hit,
            "death" => Self::Death,
            _ => Self::Idle,
        }
    }
}

/// Frame counts and collider size for the player sheets.
///
/// The jump sheet covers the whole airborne arc: frames 0-4 are takeoff,
/// 5-10 are the falling loop, and frame 9 doubles as the landing pose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerAnimSet {
    pub idle_main: usize,
    pub idle_alt1: usize,
    pub idle_alt2: usize,
    pub run: usize,
    pub jump: usize,
    /// Dedicated slam clip; 0 means "reuse the jump sheet".
    pub slam: usize,
    pub hit: usize,
    pub die: usize,
    pub width: f32,
    pub height: f32,
}

impl Default for PlayerAnimSet {
    fn default() -> Self {
        Self {
            idle_main: 4,
            idle_alt1: 4,
            idle_alt2: 4,
            run: 6,
            jump: 11,
            slam: 0,
            hit: 3,
            die: 8,
            width: 20.0,
            height: 20.0,
        }
    }
}

impl PlayerAnimSet {
    pub fn frames(&self, action: PlayerAction, idle: IdleVariant) -> usize {
        match action {
            PlayerAction::Idle => match idle {
                IdleVariant::Main => self.idle_main,
                IdleVariant::Alt1 => self.idle_alt1,
                IdleVariant::Alt2 => self.idle_alt2,
            },
            PlayerAction::Move => self.run,
            PlayerAction::Jump | PlayerAction::Fall | PlayerAction::Land => self.jump,
            PlayerAction::Slam => {
                if self.slam > 0 {
                    self.slam
                } else {
                    self.jump
                }
            },
            PlayerAction::Hit => self.hit,
            PlayerAction::Die => self.die,
        }
    }

    /// Last frame of the takeoff portion of the jump sheet.
    pub fn jump_takeoff_max(&self) -> usize {
        if self.jump == 0 { 0 } else { 4.min(self.jump - 1) }
    }

    /// First frame of the falling loop within the jump sheet.
    pub fn fall_start_idx(&self) -> usize {
        if self.jump == 0 { 0 } else { 5.min(self.jump - 1) }
    }

    /// Last frame of the falling loop within the jump sheet.
    pub fn fall_end_idx(&self) -> usize {
        if self.jump == 0 { 0 } else { 10.min(self.jump - 1) }
    }
}

/// Frame counts and collider size for enemy sheets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnemyAnimSet {
    pub walk: usize,
    pub hurt: usize,
    pub width: f32,
    pub height: f32,
}

impl Default for EnemyAnimSet {
    fn default() -> Self {
        Self {
            walk: 4,
            hurt: 2,
            width: 32.0,
            height: 32.0,
        }
    }
}

impl EnemyAnimSet {
    pub fn frames(&self, action: EnemyAction) -> usize {
        match action {
            EnemyAction::Walk => self.walk,
            EnemyAction::Hurt => self.hurt,
        }
    }
}

/// Frame counts and collider size for the boss sheets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BossAnimSet {
    pub idle: usize,
    pub cast: usize,
    pub attack: usize,
    pub hit: usize,
    pub death: usize,
    pub width: f32,
    pub height: f32,
}

impl Default for BossAnimSet {
    fn default() -> Self {
        Self {
            idle: 8,
            cast: 6,
            attack: 6,
            hit: 4,
            death: 10,
            width: 100.0,
            height: 150.0,
        }
    }
}

impl BossAnimSet {
    pub fn frames(&self, action: BossAction) -> usize {
        match action {
            BossAction::Idle => self.idle,
            BossAction::Cast => self.cast,
            BossAction::Attack => self.attack,
            BossAction::Hit => self.hit,
            BossAction::Death => self.death,
        }
    }
}
