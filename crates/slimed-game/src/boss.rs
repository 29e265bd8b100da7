//! The boss encounter: a flying caster that alternates between an
//! ATTACKING phase (patrolling high, firing arrow volleys and igniting
//! platforms) and a TIRED phase (grounded low, the only time it can be
//! hurt). The fight is simulated wherever the session is authoritative;
//! a client mirrors hp/position/action and replays attack visuals locally.

use rand::Rng;
use rand::seq::index::sample;

use slimed_core::anim::{BossAction, BossAnimSet};
use slimed_core::config::{
    ATTACK_DURATION_MAX, ATTACK_DURATION_MIN, BOSS_DAMAGE_CAP, BOSS_FLIGHT_HEIGHT, BOSS_HP,
    BOSS_RECOVERY_DURATION, BOSS_TIRED_HEIGHT, ENRAGE_ATTACK_SPEED_MULTIPLIER, TIRED_DURATION,
};
use slimed_core::geom::Rect;
use slimed_core::render::{Color, Renderer};

const PATROL_SPEED: f32 = 100.0;
/// Proportional vertical ease toward the per-phase altitude.
const VERTICAL_EASE: f32 = 2.0;
const PROJECTILE_SPEED: f32 = 200.0;
const PROJECTILE_SIZE: f32 = 8.0;
const PROJECTILE_LIFE: f32 = 5.0;
/// Projectiles expire this far outside the room.
const OUT_OF_ROOM_MARGIN: f32 = 50.0;
const ARROW_JITTER: f32 = 0.3;
const ARROW_COOLDOWN: f32 = 3.0;
const FIRE_COOLDOWN: f32 = 4.0;
const FIRE_WARNING: f32 = 1.0;
const FIRE_BURN: f32 = 2.0;
const HIT_INVUL: f32 = 0.5;
const ANIM_SPEED: f32 = 0.1;
const DEATH_ANIM_SPEED: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BossPhase {
    Attacking,
    Tired,
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub life: f32,
}

impl Projectile {
    pub fn rect(&self) -> Rect {
        Rect::new(
            self.x - PROJECTILE_SIZE / 2.0,
            self.y - PROJECTILE_SIZE / 2.0,
            PROJECTILE_SIZE,
            PROJECTILE_SIZE,
        )
    }
}

/// Delayed-ignition platform hazard: harmless during the warning window,
/// damaging once active.
#[derive(Debug, Clone)]
pub struct PlatformFire {
    pub platform: Rect,
    pub warning_timer: f32,
    pub burn_timer: f32,
    pub active: bool,
}

pub struct Boss {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    room_w: f32,
    room_h: f32,
    platforms: Vec<Rect>,

    pub hp: i32,
    pub max_hp: i32,
    pub alive: bool,
    /// Stays true through the death animation; the sprite disappears only
    /// once that finishes.
    pub visible: bool,

    pub phase: BossPhase,
    phase_timer: f32,
    /// No contact damage while flying back up after TIRED.
    pub recovery_timer: f32,
    damage_this_phase: u32,
    pub invul_timer: f32,

    pub action: BossAction,
    pub frame: u32,
    pub facing_right: bool,
    anim_timer: f32,

    attack_timer: f32,
    pub projectiles: Vec<Projectile>,
    pub fires: Vec<PlatformFire>,

    vx: f32,
    target_y: f32,
    anim: BossAnimSet,
}

impl Boss {
    pub fn new(room_w: f32, room_h: f32, platforms: Vec<Rect>, anim: BossAnimSet) -> Self {
        let mut rng = rand::rng();
        Self {
            x: room_w / 2.0 - anim.width / 2.0,
            y: BOSS_FLIGHT_HEIGHT,
            w: anim.width,
            h: anim.height,
            room_w,
            room_h,
            platforms,
            hp: BOSS_HP,
            max_hp: BOSS_HP,
            alive: true,
            visible: true,
            phase: BossPhase::Attacking,
            phase_timer: rng.random_range(ATTACK_DURATION_MIN..=ATTACK_DURATION_MAX),
            recovery_timer: 0.0,
            damage_this_phase: 0,
            invul_timer: 0.0,
            action: BossAction::Idle,
            frame: 0,
            facing_right: true,
            anim_timer: 0.0,
            attack_timer: 0.0,
            projectiles: Vec::new(),
            fires: Vec::new(),
            vx: PATROL_SPEED,
            target_y: BOSS_FLIGHT_HEIGHT,
            anim,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }

    /// Damage is accepted only while TIRED, visible, out of the hit-invul
    /// pulse, and under the per-phase cap. Returns true if this hit killed
    /// the boss.
    pub fn take_damage(&mut self, amount: i32) -> bool {
        if self.invul_timer > 0.0 || self.phase != BossPhase::Tired || !self.visible {
            return false;
        }
        if self.damage_this_phase >= BOSS_DAMAGE_CAP {
            return false;
        }

        self.hp = (self.hp - amount).max(0);
        self.damage_this_phase += 1;
        self.invul_timer = HIT_INVUL;
        self.action = BossAction::Hit;
        self.frame = 0;
        self.anim_timer = 0.0;

        if self.hp == 0 {
            self.alive = false;
            self.action = BossAction::Death;
            self.frame = 0;
            self.anim_timer = 0.0;
            return true;
        }
        false
    }

    /// Whether boss-body contact hurts players right now.
    pub fn contact_damage_active(&self) -> bool {
        self.alive && self.phase == BossPhase::Attacking && self.recovery_timer <= 0.0
    }

    /// Remove and report one projectile overlapping `target`.
    pub fn consume_projectile_hit(&mut self, target: Rect) -> bool {
        if let Some(i) = self
            .projectiles
            .iter()
            .position(|p| p.rect().intersects(&target))
        {
            self.projectiles.swap_remove(i);
            true
        } else {
            false
        }
    }

    /// A player standing on (or brushing) a burning platform.
    pub fn check_platform_fire_damage(&self, player_rect: Rect) -> bool {
        let probe = player_rect.inflate(0.0, 4.0);
        self.fires
            .iter()
            .any(|f| f.active && probe.intersects(&f.platform))
    }

    pub fn reset_projectiles(&mut self) {
        self.projectiles.clear();
        self.fires.clear();
    }

    /// Authoritative per-frame step. `target_x`/`target_y` aim the attacks
    /// at the nearest living player.
    pub fn update(&mut self, dt: f32, target_x: f32, target_y: f32) {
        if self.recovery_timer > 0.0 {
            self.recovery_timer -= dt;
        }

        if !self.alive {
            if self.visible {
                self.anim_timer += dt;
                if self.anim_timer > DEATH_ANIM_SPEED {
                    self.frame += 1;
                    self.anim_timer = 0.0;
                    if self.frame as usize >= self.anim.frames(BossAction::Death) {
                        self.visible = false;
                    }
                }
            }
            // Attacks already in flight keep moving and expiring.
            self.age_attacks(dt);
            return;
        }

        self.invul_timer = (self.invul_timer - dt).max(0.0);
        self.phase_timer -= dt;

        match self.phase {
            BossPhase::Attacking => {
                if self.phase_timer <= 0.0 {
                    self.phase = BossPhase::Tired;
                    self.damage_this_phase = 0;
                    self.phase_timer = TIRED_DURATION;
                    self.target_y = BOSS_TIRED_HEIGHT;
                    self.action = BossAction::Idle;
                    self.frame = 0;
                } else {
                    self.update_attacking(dt, target_x, target_y);
                }
            },
            BossPhase::Tired => {
                if self.phase_timer <= 0.0 {
                    self.phase = BossPhase::Attacking;
                    self.recovery_timer = BOSS_RECOVERY_DURATION;
                    self.phase_timer = self.next_attack_duration();
                    self.target_y = BOSS_FLIGHT_HEIGHT;
                    self.attack_timer = 0.5;
                }
            },
        }

        self.update_movement(dt);
        self.age_attacks(dt);
        self.update_animation(dt);
    }

    /// Mirror-side step: animation and attack visuals only, no AI.
    pub fn update_visuals_only(&mut self, dt: f32) {
        self.age_attacks(dt);
        self.update_animation(dt);
        self.invul_timer -= dt;
    }

    fn next_attack_duration(&self) -> f32 {
        let mut duration =
            rand::rng().random_range(ATTACK_DURATION_MIN..=ATTACK_DURATION_MAX);
        if self.hp == 1 {
            // Enraged: shorter breathers, faster attacks.
            duration /= ENRAGE_ATTACK_SPEED_MULTIPLIER;
        }
        duration
    }

    fn update_attacking(&mut self, dt: f32, target_x: f32, target_y: f32) {
        self.attack_timer -= dt;
        if self.attack_timer > 0.0 {
            return;
        }
        let mut cooldown = if rand::rng().random::<bool>() {
            self.start_arrow_volley(target_x, target_y);
            ARROW_COOLDOWN
        } else {
            self.start_platform_fire();
            FIRE_COOLDOWN
        };
        if self.hp == 1 {
            cooldown /= ENRAGE_ATTACK_SPEED_MULTIPLIER;
        }
        self.attack_timer = cooldown;
    }

    /// Spread of 3-5 projectiles aimed at the target with angular jitter.
    /// Public so a client mirror can replay the volley when the mirrored
    /// action flips to Cast.
    pub fn start_arrow_volley(&mut self, target_x: f32, target_y: f32) {
        self.action = BossAction::Cast;
        self.frame = 0;
        self.anim_timer = 0.0;
        let mut rng = rand::rng();
        let cx = self.x + self.w / 2.0;
        let cy = self.y + self.h / 2.0;
        let count = rng.random_range(3..=5);
        for _ in 0..count {
            let angle = (target_y - cy).atan2(target_x - cx)
                + rng.random_range(-ARROW_JITTER..ARROW_JITTER);
            self.projectiles.push(Projectile {
                x: cx,
                y: cy,
                vx: angle.cos() * PROJECTILE_SPEED,
                vy: angle.sin() * PROJECTILE_SPEED,
                life: PROJECTILE_LIFE,
            });
        }
    }

    /// Ignite 1-2 random platforms after a warning window.
    pub fn start_platform_fire(&mut self) {
        self.action = BossAction::Attack;
        self.frame = 0;
        self.anim_timer = 0.0;
        if self.platforms.is_empty() {
            return;
        }
        let mut rng = rand::rng();
        let count = rng.random_range(1..=2usize).min(self.platforms.len());
        for i in sample(&mut rng, self.platforms.len(), count) {
            self.fires.push(PlatformFire {
                platform: self.platforms[i],
                warning_timer: FIRE_WARNING,
                burn_timer: FIRE_BURN,
                active: false,
            });
        }
    }

    fn update_movement(&mut self, dt: f32) {
        self.x += self.vx * dt;
        if self.x <= 0.0 {
            self.x = 0.0;
            self.vx = self.vx.abs();
            self.facing_right = true;
        } else if self.x + self.w >= self.room_w {
            self.x = self.room_w - self.w;
            self.vx = -self.vx.abs();
            self.facing_right = false;
        }

        let y_diff = self.target_y - self.y;
        if y_diff.abs() > 2.0 {
            self.y += y_diff * VERTICAL_EASE * dt;
        } else {
            self.y = self.target_y;
        }
    }

    fn age_attacks(&mut self, dt: f32) {
        let (room_w, room_h) = (self.room_w, self.room_h);
        for p in &mut self.projectiles {
            p.x += p.vx * dt;
            p.y += p.vy * dt;
            p.life -= dt;
        }
        self.projectiles.retain(|p| {
            p.life > 0.0
                && p.x > -OUT_OF_ROOM_MARGIN
                && p.x < room_w + OUT_OF_ROOM_MARGIN
                && p.y > -OUT_OF_ROOM_MARGIN
                && p.y < room_h + OUT_OF_ROOM_MARGIN
        });

        for f in &mut self.fires {
            if f.active {
                f.burn_timer -= dt;
            } else {
                f.warning_timer -= dt;
                if f.warning_timer <= 0.0 {
                    f.active = true;
                }
            }
        }
        self.fires.retain(|f| !f.active || f.burn_timer > 0.0);
    }

    fn update_animation(&mut self, dt: f32) {
        // Let a fresh hit or the windup of an attack play out before
        // recovering to idle.
        let hit_playing = self.action == BossAction::Hit && self.invul_timer > 0.1;
        let windup_playing = matches!(self.action, BossAction::Cast | BossAction::Attack)
            && self.frame < 5;
        if !hit_playing && !windup_playing && self.invul_timer <= 0.0
            && self.action == BossAction::Hit
        {
            self.action = BossAction::Idle;
        }

        self.anim_timer += dt;
        if self.anim_timer > ANIM_SPEED {
            self.frame += 1;
            let frames = self.anim.frames(self.action).max(1);
            if self.frame as usize >= frames {
                match self.action {
                    BossAction::Hit | BossAction::Cast | BossAction::Attack => {
                        self.action = BossAction::Idle;
                        self.frame = 0;
                    },
                    _ => self.frame = 0,
                }
            }
            self.anim_timer = 0.0;
        }
    }

    pub fn draw(&self, renderer: &mut dyn Renderer) {
        // Projectiles and fires persist past the boss itself.
        for p in &self.projectiles {
            renderer.draw_circle(p.x, p.y, PROJECTILE_SIZE, Color(200, 100, 255), true);
            renderer.draw_circle(p.x, p.y, PROJECTILE_SIZE / 2.0, Color(255, 200, 255), true);
        }
        for f in &self.fires {
            if f.active {
                renderer.draw_rect(
                    Rect::new(f.platform.x, f.platform.y - 15.0, f.platform.w, 15.0),
                    Color(255, 100, 0),
                    true,
                );
            } else {
                renderer.draw_rect(
                    Rect::new(f.platform.x, f.platform.y - 6.0, f.platform.w, 4.0),
                    Color(255, 0, 0),
                    true,
                );
            }
        }
        if self.visible {
            renderer.draw_frame(
                "boss",
                self.action.as_str(),
                self.frame as usize,
                self.x,
                self.y,
                !self.facing_right,
            );
        }
    }
}
