//! Player movement, abilities, damage, and animation state.
//!
//! Exactly one side of a session simulates each player; the other side
//! drives a visual replica from snapshots, which is why so much of this
//! state (action, frame, ability flags, invulnerability) is public and
//! wire-visible.

use rand::Rng;

use slimed_core::anim::{IdleVariant, PlayerAction, PlayerAnimSet};
use slimed_core::config::{
    BASE_DASH_COOLDOWN, BASE_DASH_DURATION, BASE_DASH_SPEED, BASE_GRAVITY, BASE_JUMP_VEL,
    BASE_PLAYER_SPEED, BASE_SLAM_COOLDOWN, BASE_SLAM_SPEED, COYOTE_TIME, JUMP_BUFFER,
    TILE_SIZE, WALL_JUMP_X, WALL_JUMP_Y, WALL_SLIDE_SPEED,
};
use slimed_core::effects::EffectsSystem;
use slimed_core::geom::{Rect, lerp};
use slimed_core::persistence::Upgrades;
use slimed_core::render::{COL_ACCENT_1, COL_ACCENT_2, Renderer};

use crate::TileMap;
use crate::input::FrameInput;

const AIR_CONTROL: f32 = 0.9;
const KNOCKBACK_TIME: f32 = 0.3;
const KNOCKBACK_FORCE: f32 = 300.0;
/// Post-hit invulnerability, with the visual flicker.
const HURT_INVUL: f32 = 1.2;
const DEATH_TIME: f32 = 2.0;
/// How long the landing pose is held.
const LAND_FREEZE_TIME: f32 = 0.1;
/// Upward pop applied with knockback.
const HIT_POP_VY: f32 = -350.0;
/// Upward pop when the death animation starts.
const DEATH_POP_VY: f32 = -300.0;

/// Character special ability, chosen at character select. One per player,
/// fixed for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ability {
    Slam,
    Dash,
}

pub struct Player {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub vx: f32,
    pub vy: f32,
    pub on_ground: bool,
    pub on_wall: bool,
    pub wall_dir: i8,
    pub facing_right: bool,

    pub alive: bool,
    pub is_dying: bool,
    pub death_timer: f32,
    pub hp: i32,
    pub max_hp: i32,
    pub invul_timer: f32,
    /// Hit invulnerability flickers; the post-slam grace window does not.
    pub flash_on_invul: bool,
    pub knockback_timer: f32,

    pub ability: Ability,
    pub slam_active: bool,
    pub slam_cooldown: f32,
    pub pending_slam_impact: bool,
    pub slam_impact_power: f32,
    slam_start_y: f32,
    pub dash_active: bool,
    pub dash_cooldown: f32,
    dash_timer: f32,

    /// Platform-fire re-damage cadence, owned here because it is per-player.
    pub fire_retrigger: f32,

    pub last_safe_x: f32,
    pub last_safe_y: f32,
    pub landing_timer: f32,

    speed_val: f32,
    jump_val: f32,
    slam_cd_val: f32,
    dash_cd_val: f32,

    coyote_timer: f32,
    jump_buffer_timer: f32,
    jump_was_pressed: bool,

    pub action: PlayerAction,
    pub frame: u32,
    pub idle_variant: IdleVariant,
    anim_timer: f32,
    idle_loop_counter: u32,
    idle_alt_trigger: u32,
    anim: PlayerAnimSet,
}

impl Player {
    pub fn new(
        x: f32,
        y: f32,
        upgrades: Option<&Upgrades>,
        ability: Ability,
        anim: PlayerAnimSet,
    ) -> Self {
        let stats = upgrades.copied().unwrap_or_default();
        let max_hp = 3 + stats.hp as i32;
        let cd_mult = 1.0 - 0.08 * stats.slam as f32;
        let mut rng = rand::rng();
        Self {
            x,
            y,
            w: anim.width,
            h: anim.height,
            vx: 0.0,
            vy: 0.0,
            on_ground: false,
            on_wall: false,
            wall_dir: 0,
            facing_right: true,
            alive: true,
            is_dying: false,
            death_timer: 0.0,
            hp: max_hp,
            max_hp,
            invul_timer: 0.0,
            flash_on_invul: false,
            knockback_timer: 0.0,
            ability,
            slam_active: false,
            slam_cooldown: 0.0,
            pending_slam_impact: false,
            slam_impact_power: 0.0,
            slam_start_y: 0.0,
            dash_active: false,
            dash_cooldown: 0.0,
            dash_timer: 0.0,
            fire_retrigger: 0.0,
            last_safe_x: x,
            last_safe_y: y,
            landing_timer: 0.0,
            speed_val: BASE_PLAYER_SPEED * (1.0 + 0.05 * stats.speed as f32),
            jump_val: BASE_JUMP_VEL * (1.0 + 0.03 * stats.jump as f32),
            slam_cd_val: (BASE_SLAM_COOLDOWN * cd_mult).max(0.1),
            dash_cd_val: (BASE_DASH_COOLDOWN * cd_mult).max(0.1),
            coyote_timer: 0.0,
            jump_buffer_timer: 0.0,
            jump_was_pressed: false,
            action: PlayerAction::Idle,
            frame: 0,
            idle_variant: IdleVariant::Main,
            anim_timer: 0.0,
            idle_loop_counter: 0,
            idle_alt_trigger: rng.random_range(7..=12),
            anim,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }

    /// Cooldown shown over the player's head: (remaining, full).
    pub fn ability_cooldown(&self) -> (f32, f32) {
        match self.ability {
            Ability::Slam => (self.slam_cooldown, self.slam_cd_val),
            Ability::Dash => (self.dash_cooldown, self.dash_cd_val),
        }
    }

    pub fn update(
        &mut self,
        dt: f32,
        tiles: &dyn TileMap,
        input: FrameInput,
        fx: &mut EffectsSystem,
    ) {
        if !self.alive {
            return;
        }

        if self.is_dying {
            self.death_timer -= dt;
            if self.death_timer <= 0.0 {
                self.alive = false;
                return;
            }
            if self.on_ground {
                self.vx = 0.0;
            }
        }

        if self.knockback_timer > 0.0 {
            self.knockback_timer -= dt;
            if self.on_ground {
                self.vx = lerp(self.vx, 0.0, dt * 5.0);
            }
        }

        // Dying or knocked-back players don't listen to input.
        let input = if self.is_dying || self.knockback_timer > 0.0 {
            FrameInput::none()
        } else {
            input
        };

        if self.on_ground && self.knockback_timer <= 0.0 && !self.is_dying {
            self.last_safe_x = self.x;
            self.last_safe_y = self.y;
        }

        if self.invul_timer > 0.0 {
            self.invul_timer -= dt;
        }
        if self.slam_cooldown > 0.0 {
            self.slam_cooldown = (self.slam_cooldown - dt).max(0.0);
        }
        if self.dash_cooldown > 0.0 {
            self.dash_cooldown = (self.dash_cooldown - dt).max(0.0);
        }

        let was_on_ground = self.on_ground;
        self.pending_slam_impact = false;

        if self.on_ground {
            self.coyote_timer = COYOTE_TIME;
        } else {
            self.coyote_timer = (self.coyote_timer - dt).max(0.0);
        }

        // Edge-triggered buffer: only a fresh press arms it.
        if input.jump && !self.jump_was_pressed {
            self.jump_buffer_timer = JUMP_BUFFER;
        } else {
            self.jump_buffer_timer = (self.jump_buffer_timer - dt).max(0.0);
        }
        self.jump_was_pressed = input.jump;

        let mut desired_vx = 0.0;
        if !self.dash_active {
            if input.left {
                desired_vx -= self.speed_val;
                self.facing_right = false;
            }
            if input.right {
                desired_vx += self.speed_val;
                self.facing_right = true;
            }
        }

        if self.on_ground {
            if self.knockback_timer <= 0.0 && !self.dash_active {
                self.vx = if self.is_dying { 0.0 } else { desired_vx };
            }
        } else if self.knockback_timer <= 0.0 && !self.dash_active {
            self.vx += (desired_vx - self.vx) * AIR_CONTROL * dt * 10.0;
        }

        let can_use_ability = !self.is_dying && self.knockback_timer <= 0.0;
        match self.ability {
            Ability::Slam => {
                let can_slam = !self.on_ground && !self.slam_active && self.slam_cooldown <= 0.0;
                if input.ability && can_use_ability && can_slam {
                    self.slam_active = true;
                    self.slam_start_y = self.y;
                    self.vy = BASE_SLAM_SPEED;
                    fx.spawn_dust(self.x + self.w / 2.0, self.y, 5, COL_ACCENT_1);
                }
            },
            Ability::Dash => {
                let can_dash = !self.dash_active && self.dash_cooldown <= 0.0;
                if input.ability && can_use_ability && can_dash {
                    self.dash_active = true;
                    self.dash_timer = BASE_DASH_DURATION;
                    self.dash_cooldown = self.dash_cd_val;
                    let mut dir = if self.facing_right { 1.0 } else { -1.0 };
                    if input.left {
                        dir = -1.0;
                    }
                    if input.right {
                        dir = 1.0;
                    }
                    self.facing_right = dir > 0.0;
                    self.vx = dir * BASE_DASH_SPEED;
                    self.vy = 0.0;
                    fx.spawn_dust(
                        self.x + self.w / 2.0,
                        self.y + self.h / 2.0,
                        8,
                        COL_ACCENT_2,
                    );
                }
            },
        }

        if self.dash_active {
            self.dash_timer -= dt;
            self.vy = 0.0;
            self.vx = if self.facing_right {
                BASE_DASH_SPEED
            } else {
                -BASE_DASH_SPEED
            };
            if self.dash_timer <= 0.0 {
                self.dash_active = false;
                self.vx *= 0.5;
            }
        } else {
            if self.slam_active {
                // The dive holds a constant speed; gravity is suspended.
                self.vy = BASE_SLAM_SPEED;
            } else {
                self.vy += BASE_GRAVITY * dt;
            }

            // Wall slide caps fall speed while pressed against a wall.
            if self.on_wall
                && !self.on_ground
                && self.vy > WALL_SLIDE_SPEED
                && !self.slam_active
                && !self.is_dying
                && self.knockback_timer <= 0.0
            {
                self.vy = WALL_SLIDE_SPEED;
                if rand::rng().random::<f32>() < 0.2 {
                    let offset_x = if self.wall_dir == 1 { 0.0 } else { self.w };
                    fx.spawn_dust(self.x + offset_x, self.y + self.h, 1, COL_ACCENT_1);
                }
            }

            // Variable jump height: releasing early cuts the rise short.
            if !input.jump && self.vy < 0.0 && !self.slam_active && self.knockback_timer <= 0.0 {
                self.vy += BASE_GRAVITY * dt * 0.6;
            }

            let may_jump = !self.slam_active && !self.is_dying && self.knockback_timer <= 0.0;
            if may_jump && self.jump_buffer_timer > 0.0 && self.coyote_timer > 0.0 {
                self.vy = self.jump_val;
                self.on_ground = false;
                self.coyote_timer = 0.0;
                self.jump_buffer_timer = 0.0;
                fx.spawn_dust(self.x + self.w / 2.0, self.y + self.h, 8, COL_ACCENT_1);
            }

            if may_jump && self.jump_buffer_timer > 0.0 && self.on_wall && !self.on_ground {
                self.vy = WALL_JUMP_Y;
                self.vx = -(self.wall_dir as f32) * WALL_JUMP_X;
                self.jump_buffer_timer = 0.0;
                self.on_wall = false;
                let offset_x = if self.wall_dir == 1 { 0.0 } else { self.w };
                fx.spawn_dust(self.x + offset_x, self.y + self.h / 2.0, 6, COL_ACCENT_1);
            }
        }

        self.resolve_collisions(dt, tiles);

        let just_landed = self.on_ground && !was_on_ground;
        if just_landed {
            self.landing_timer = LAND_FREEZE_TIME;
        } else if self.landing_timer > 0.0 {
            self.landing_timer = (self.landing_timer - dt).max(0.0);
        }

        if self.slam_active && just_landed {
            self.slam_active = false;
            self.slam_cooldown = self.slam_cd_val;
            self.pending_slam_impact = true;
            self.slam_impact_power = (self.y - self.slam_start_y).max(0.0);
            fx.spawn_slam_impact(
                self.x + self.w / 2.0,
                self.y + self.h,
                self.slam_impact_power,
            );
        }

        self.advance_animation(dt);
    }

    /// Vertical sweep first, then horizontal, then a 2 px feet probe for
    /// contacts the sweeps miss through rounding.
    fn resolve_collisions(&mut self, dt: f32, tiles: &dyn TileMap) {
        let nx = self.x + self.vx * dt;
        let ny = self.y + self.vy * dt;
        self.on_ground = false;

        self.y = ny;
        let mut r = Rect::new(nx, self.y, self.w, self.h);
        for t in tiles.collision_tiles(r) {
            if r.intersects(&t) {
                if self.vy > 0.0 {
                    self.y = t.y - self.h;
                    self.vy = 0.0;
                    self.on_ground = true;
                } else if self.vy < 0.0 {
                    self.y = t.bottom();
                    self.vy = 0.0;
                }
                r.y = self.y;
            }
        }

        self.x = nx;
        r.x = self.x;
        self.on_wall = false;
        for t in tiles.collision_tiles(r) {
            if r.intersects(&t) {
                if self.vx > 0.0 {
                    self.x = t.x - self.w;
                    if !self.on_ground {
                        self.on_wall = true;
                        self.wall_dir = 1;
                    }
                } else if self.vx < 0.0 {
                    self.x = t.right();
                    if !self.on_ground {
                        self.on_wall = true;
                        self.wall_dir = -1;
                    }
                }
                r.x = self.x;
            }
        }

        if !self.on_ground && self.vy >= 0.0 {
            let feet = Rect::new(self.x, self.y + self.h, self.w, 2.0);
            for t in tiles.collision_tiles(feet) {
                if feet.intersects(&t) {
                    self.y = t.y - self.h;
                    self.vy = 0.0;
                    self.on_ground = true;
                    break;
                }
            }
        }
    }

    fn advance_animation(&mut self, dt: f32) {
        self.anim_timer += dt;

        let prev = self.action;
        let mut next = prev;
        if self.is_dying {
            next = PlayerAction::Die;
        } else if self.slam_active || self.dash_active {
            next = PlayerAction::Slam;
        } else if self.knockback_timer > 0.0 {
            next = PlayerAction::Hit;
        } else if self.landing_timer > 0.0 {
            next = PlayerAction::Land;
        } else if !self.on_ground {
            if self.vy < 0.0 {
                next = PlayerAction::Jump;
            } else if self.vy > 0.0 {
                next = PlayerAction::Fall;
            }
        } else if self.vx.abs() > 1.0 {
            next = PlayerAction::Move;
        } else {
            next = PlayerAction::Idle;
        }

        let fall_start = self.anim.fall_start_idx();
        let fall_end = self.anim.fall_end_idx();

        if next != prev {
            let prev_frame = self.frame as usize;
            self.anim_timer = 0.0;
            if prev == PlayerAction::Fall && next == PlayerAction::Land {
                self.frame = 9;
            } else if prev == PlayerAction::Jump && next == PlayerAction::Fall {
                // Carry the airborne arc over instead of restarting it.
                let world = prev_frame.clamp(fall_start, fall_end);
                self.frame = (world - fall_start) as u32;
            } else {
                self.frame = 0;
            }
            self.action = next;
            if next != PlayerAction::Idle {
                self.idle_variant = IdleVariant::Main;
            }
        }

        match self.action {
            PlayerAction::Land => {
                self.frame = 9.min(
                    self.anim
                        .frames(PlayerAction::Land, self.idle_variant)
                        .saturating_sub(1) as u32,
                );
            },
            PlayerAction::Slam => {
                let frames = self.anim.frames(PlayerAction::Slam, self.idle_variant);
                if frames > 0 && self.anim_timer > 0.06 {
                    if (self.frame as usize) < frames - 1 {
                        self.frame += 1;
                    }
                    self.anim_timer = 0.0;
                }
            },
            PlayerAction::Fall => {
                // The falling loop stops on raw sheet frame 8.
                let fall_len = (fall_end - fall_start + 1).max(1);
                let stop = (8usize.saturating_sub(fall_start)).min(fall_len - 1);
                if self.anim_timer > 0.09 {
                    if (self.frame as usize) < stop {
                        self.frame += 1;
                    }
                    self.anim_timer = 0.0;
                }
            },
            PlayerAction::Jump => {
                if self.anim_timer > 0.09 {
                    let max = self.anim.jump_takeoff_max() as u32;
                    self.frame = (self.frame + 1).min(max);
                    self.anim_timer = 0.0;
                }
            },
            PlayerAction::Idle => {
                let frames = self.anim.frames(PlayerAction::Idle, self.idle_variant);
                if frames > 0 && self.anim_timer > 0.2 {
                    self.frame = (self.frame + 1) % frames as u32;
                    self.anim_timer = 0.0;
                    if self.frame == 0 {
                        self.step_idle_variant();
                    }
                }
            },
            PlayerAction::Move | PlayerAction::Hit | PlayerAction::Die => {
                let frames = self.anim.frames(self.action, self.idle_variant);
                let speed = if self.action == PlayerAction::Die { 0.15 } else { 0.1 };
                if frames > 0 && self.anim_timer > speed {
                    if self.action == PlayerAction::Die && self.frame as usize >= frames - 1 {
                        self.frame = frames as u32 - 1;
                    } else {
                        self.frame = (self.frame + 1) % frames as u32;
                    }
                    self.anim_timer = 0.0;
                }
            },
        }
    }

    /// Loop bookkeeping at the end of each idle cycle: after enough main
    /// loops, play one random alternate clip, then come back.
    fn step_idle_variant(&mut self) {
        match self.idle_variant {
            IdleVariant::Main => {
                self.idle_loop_counter += 1;
                if self.idle_loop_counter >= self.idle_alt_trigger {
                    let mut rng = rand::rng();
                    self.idle_variant = if rng.random::<bool>() {
                        IdleVariant::Alt1
                    } else {
                        IdleVariant::Alt2
                    };
                    self.idle_loop_counter = 0;
                    self.idle_alt_trigger = rng.random_range(7..=12);
                }
            },
            IdleVariant::Alt1 | IdleVariant::Alt2 => {
                self.idle_variant = IdleVariant::Main;
            },
        }
    }

    /// No effect while invulnerable, mid-slam, mid-dash, or already dying.
    pub fn take_damage(&mut self, amount: i32, source_x: Option<f32>) {
        if self.invul_timer > 0.0
            || self.slam_active
            || self.dash_active
            || self.is_dying
            || !self.alive
        {
            return;
        }

        self.hp -= amount;
        self.invul_timer = HURT_INVUL;
        self.flash_on_invul = true;
        self.knockback_timer = KNOCKBACK_TIME;
        self.action = PlayerAction::Hit;
        self.frame = 0;
        self.vy = HIT_POP_VY;
        self.on_ground = false;

        let dir = match source_x {
            Some(sx) => {
                if self.x + self.w / 2.0 < sx {
                    -1.0
                } else {
                    1.0
                }
            },
            None => {
                if self.facing_right {
                    -1.0
                } else {
                    1.0
                }
            },
        };
        self.vx = dir * KNOCKBACK_FORCE;

        if self.hp <= 0 {
            self.hp = 0;
            self.is_dying = true;
            self.death_timer = DEATH_TIME;
            self.vy = DEATH_POP_VY;
            self.vx = 0.0;
            self.slam_active = false;
        }
    }

    /// Heal one HP from a health orb. Returns false at full health.
    pub fn heal(&mut self) -> bool {
        if self.hp < self.max_hp {
            self.hp += 1;
            true
        } else {
            false
        }
    }

    /// Put the player back on the last grounded spot after a fall-out.
    pub fn respawn_at_last_safe(&mut self) {
        self.x = self.last_safe_x;
        self.y = self.last_safe_y - TILE_SIZE;
        self.vx = 0.0;
        self.vy = 0.0;
        self.slam_active = false;
        self.dash_active = false;
    }

    pub fn draw(&self, renderer: &mut dyn Renderer, sheet: &str, cam_x: f32, cam_y: f32) {
        if !self.alive {
            return;
        }
        // Hit flicker; the post-slam grace window doesn't blink.
        if self.invul_timer > 0.0
            && self.flash_on_invul
            && (self.invul_timer * 15.0) as i32 % 2 != 0
        {
            return;
        }
        let action = match (self.action, self.idle_variant) {
            (PlayerAction::Idle, IdleVariant::Alt1) => "idle_alt1",
            (PlayerAction::Idle, IdleVariant::Alt2) => "idle_alt2",
            (PlayerAction::Idle, IdleVariant::Main) => "idle_main",
            (other, _) => other.as_str(),
        };
        renderer.draw_frame(
            sheet,
            action,
            self.frame as usize,
            self.x - cam_x,
            self.y - cam_y,
            !self.facing_right,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    struct Floor;

    impl TileMap for Floor {
        fn collision_tiles(&self, _probe: Rect) -> Vec<Rect> {
            vec![Rect::new(-5000.0, 300.0, 10_000.0, 20.0)]
        }
    }

    struct Empty;

    impl TileMap for Empty {
        fn collision_tiles(&self, _probe: Rect) -> Vec<Rect> {
            Vec::new()
        }
    }

    /// Floor plus a wall to the right of the spawn.
    struct Walled;

    impl TileMap for Walled {
        fn collision_tiles(&self, _probe: Rect) -> Vec<Rect> {
            vec![
                Rect::new(-5000.0, 300.0, 10_000.0, 20.0),
                Rect::new(200.0, -500.0, 20.0, 800.0),
            ]
        }
    }

    fn slam_player() -> Player {
        Player::new(100.0, 100.0, None, Ability::Slam, PlayerAnimSet::default())
    }

    fn settle(p: &mut Player, tiles: &dyn TileMap) {
        let mut fx = EffectsSystem::new();
        for _ in 0..120 {
            p.update(DT, tiles, FrameInput::none(), &mut fx);
        }
        assert!(p.on_ground, "player should settle on the floor");
    }

    #[test]
    fn coyote_jump_fires_full_strength() {
        let mut p = slam_player();
        let mut fx = EffectsSystem::new();
        settle(&mut p, &Floor);

        // Walk off into thin air: one frame over Empty drops ground contact
        // but leaves the coyote window open.
        p.update(DT, &Empty, FrameInput::none(), &mut fx);
        assert!(!p.on_ground);

        p.update(
            DT,
            &Empty,
            FrameInput {
                jump: true,
                ..Default::default()
            },
            &mut fx,
        );
        assert_eq!(p.vy, BASE_JUMP_VEL, "coyote jump uses the full jump velocity");
        assert!(!p.on_ground);
    }

    #[test]
    fn coyote_window_expires() {
        let mut p = slam_player();
        let mut fx = EffectsSystem::new();
        settle(&mut p, &Floor);

        for _ in 0..15 {
            p.update(DT, &Empty, FrameInput::none(), &mut fx);
        }
        p.update(
            DT,
            &Empty,
            FrameInput {
                jump: true,
                ..Default::default()
            },
            &mut fx,
        );
        assert!(p.vy > 0.0, "too late: the press must not fire a jump");
    }

    #[test]
    fn buffered_jump_fires_on_landing() {
        let mut p = slam_player();
        let mut fx = EffectsSystem::new();
        p.y = 262.0;
        p.vy = 300.0;

        // Press once while still falling, then release.
        p.update(
            DT,
            &Floor,
            FrameInput {
                jump: true,
                ..Default::default()
            },
            &mut fx,
        );
        let mut jumped = false;
        for _ in 0..6 {
            p.update(DT, &Floor, FrameInput::none(), &mut fx);
            if p.vy == BASE_JUMP_VEL {
                jumped = true;
                break;
            }
        }
        assert!(jumped, "buffered press should fire on ground contact");
    }

    #[test]
    fn early_release_cuts_jump_short() {
        let held_peak = {
            let mut p = slam_player();
            let mut fx = EffectsSystem::new();
            settle(&mut p, &Floor);
            let hold = FrameInput {
                jump: true,
                ..Default::default()
            };
            let mut peak = p.y;
            for _ in 0..60 {
                p.update(DT, &Floor, hold, &mut fx);
                peak = peak.min(p.y);
            }
            peak
        };
        let released_peak = {
            let mut p = slam_player();
            let mut fx = EffectsSystem::new();
            settle(&mut p, &Floor);
            p.update(
                DT,
                &Floor,
                FrameInput {
                    jump: true,
                    ..Default::default()
                },
                &mut fx,
            );
            let mut peak = p.y;
            for _ in 0..60 {
                p.update(DT, &Floor, FrameInput::none(), &mut fx);
                peak = peak.min(p.y);
            }
            peak
        };
        assert!(
            released_peak > held_peak + 5.0,
            "releasing early must rise less (held {held_peak}, released {released_peak})"
        );
    }

    #[test]
    fn wall_slide_caps_fall_speed_and_wall_jump_kicks_away() {
        let mut p = slam_player();
        let mut fx = EffectsSystem::new();
        p.x = 150.0;
        p.y = 0.0;
        let push = FrameInput {
            right: true,
            ..Default::default()
        };
        for _ in 0..40 {
            p.update(DT, &Walled, push, &mut fx);
        }
        assert!(p.on_wall);
        assert_eq!(p.wall_dir, 1);
        assert!(p.vy <= WALL_SLIDE_SPEED + 0.01, "fall speed clamped on the wall");

        p.update(
            DT,
            &Walled,
            FrameInput {
                right: true,
                jump: true,
                ..Default::default()
            },
            &mut fx,
        );
        assert_eq!(p.vy, WALL_JUMP_Y);
        assert!(p.vx < 0.0, "kicked away from the wall");
    }

    #[test]
    fn slam_requires_airborne_and_cooldown() {
        let mut p = slam_player();
        let mut fx = EffectsSystem::new();
        settle(&mut p, &Floor);

        let press = FrameInput {
            ability: true,
            ..Default::default()
        };
        p.update(DT, &Floor, press, &mut fx);
        assert!(!p.slam_active, "slam is airborne-only");

        p.y = 100.0;
        p.on_ground = false;
        p.update(DT, &Empty, press, &mut fx);
        assert!(p.slam_active);
        assert_eq!(p.vy, BASE_SLAM_SPEED);

        // Ride it down to the impact.
        for _ in 0..120 {
            p.update(DT, &Floor, FrameInput::none(), &mut fx);
            if p.on_ground {
                break;
            }
        }
        assert!(!p.slam_active);
        assert!(p.slam_cooldown > 0.0);

        // Off the ground again, still cooling down: no second slam.
        p.y = 100.0;
        p.on_ground = false;
        p.update(DT, &Empty, press, &mut fx);
        assert!(!p.slam_active);
    }

    #[test]
    fn slam_impact_power_tracks_fall_distance() {
        let mut p = slam_player();
        let mut fx = EffectsSystem::new();
        p.y = 100.0;
        p.vy = 0.0;
        p.update(
            DT,
            &Empty,
            FrameInput {
                ability: true,
                ..Default::default()
            },
            &mut fx,
        );
        assert!(p.slam_active);
        let start_y = p.y;
        for _ in 0..240 {
            p.update(DT, &Floor, FrameInput::none(), &mut fx);
            if p.pending_slam_impact {
                break;
            }
        }
        assert!(p.pending_slam_impact);
        assert!((p.slam_impact_power - (p.y - start_y)).abs() < 20.0);
    }

    #[test]
    fn abilities_are_mutually_exclusive() {
        let mut p = Player::new(100.0, 100.0, None, Ability::Dash, PlayerAnimSet::default());
        let mut fx = EffectsSystem::new();
        settle(&mut p, &Floor);

        let press = FrameInput {
            ability: true,
            ..Default::default()
        };
        p.update(DT, &Floor, press, &mut fx);
        assert!(p.dash_active);
        assert!(!p.slam_active);

        for _ in 0..30 {
            p.update(DT, &Floor, press, &mut fx);
            assert!(
                !(p.slam_active && p.dash_active),
                "slam and dash can never be active together"
            );
        }
    }

    #[test]
    fn damage_is_idempotent_inside_invul_window() {
        let mut p = slam_player();
        p.take_damage(1, Some(200.0));
        assert_eq!(p.hp, p.max_hp - 1);
        assert!(p.flash_on_invul);
        p.take_damage(1, Some(200.0));
        assert_eq!(p.hp, p.max_hp - 1, "second hit inside the window is a no-op");
    }

    #[test]
    fn dash_passes_through_damage() {
        let mut p = Player::new(100.0, 100.0, None, Ability::Dash, PlayerAnimSet::default());
        p.dash_active = true;
        p.take_damage(1, None);
        assert_eq!(p.hp, p.max_hp);
    }

    #[test]
    fn knockback_direction_points_away_from_source() {
        let mut p = slam_player();
        p.take_damage(1, Some(p.x + p.w)); // source to the right
        assert!(p.vx < 0.0);
        assert_eq!(p.vy, HIT_POP_VY);

        let mut q = slam_player();
        q.take_damage(1, Some(q.x - 50.0)); // source to the left
        assert!(q.vx > 0.0);
    }

    #[test]
    fn death_takes_effect_after_the_timer() {
        let mut p = slam_player();
        let mut fx = EffectsSystem::new();
        settle(&mut p, &Floor);
        p.hp = 1;
        p.take_damage(1, None);
        assert!(p.is_dying);
        assert!(p.alive, "alive until the death timer runs out");
        assert_eq!(p.hp, 0);

        for _ in 0..((DEATH_TIME / DT) as u32 + 5) {
            p.update(DT, &Floor, FrameInput::none(), &mut fx);
        }
        assert!(!p.alive);
    }

    #[test]
    fn knockback_overrides_input() {
        let mut p = slam_player();
        let mut fx = EffectsSystem::new();
        settle(&mut p, &Floor);
        p.take_damage(1, Some(p.x - 50.0));
        let kicked_vx = p.vx;
        p.update(
            DT,
            &Floor,
            FrameInput {
                left: true,
                ..Default::default()
            },
            &mut fx,
        );
        assert!(
            p.vx >= 0.0 || p.vx > kicked_vx,
            "input must not steer against the knockback"
        );
    }

    #[test]
    fn idle_alt_clip_plays_and_returns_to_main() {
        let mut p = slam_player();
        let mut fx = EffectsSystem::new();
        settle(&mut p, &Floor);
        p.idle_alt_trigger = 7;
        p.idle_loop_counter = 0;

        let mut saw_alt = false;
        let mut back_to_main = false;
        // 7 main loops at 4 frames x 0.2 s each is ~5.6 s; give it ten.
        for _ in 0..600 {
            p.update(DT, &Floor, FrameInput::none(), &mut fx);
            match p.idle_variant {
                IdleVariant::Alt1 | IdleVariant::Alt2 => saw_alt = true,
                IdleVariant::Main => {
                    if saw_alt {
                        back_to_main = true;
                    }
                },
            }
        }
        assert!(saw_alt, "an alternate idle clip should trigger within 7 loops");
        assert!(back_to_main, "and idle returns to the main clip afterwards");
    }

    #[test]
    fn hp_never_exceeds_max() {
        let mut p = slam_player();
        assert!(!p.heal());
        p.hp = 1;
        assert!(p.heal());
        assert_eq!(p.hp, 2);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Whatever the input stream, HP stays in range, the two
            // abilities never overlap, and the position stays finite.
            #[test]
            fn random_inputs_hold_invariants(
                moves in proptest::collection::vec(0u8..16, 30..150)
            ) {
                let mut p = slam_player();
                let mut fx = EffectsSystem::new();
                for m in moves {
                    let input = FrameInput {
                        left: m & 1 != 0,
                        right: m & 2 != 0,
                        jump: m & 4 != 0,
                        ability: m & 8 != 0,
                    };
                    p.update(DT, &Floor, input, &mut fx);
                    prop_assert!(p.hp >= 0 && p.hp <= p.max_hp);
                    prop_assert!(!(p.slam_active && p.dash_active));
                    prop_assert!(p.x.is_finite() && p.y.is_finite());
                }
            }
        }
    }

    #[test]
    fn airborne_actions_track_velocity() {
        let mut p = slam_player();
        let mut fx = EffectsSystem::new();
        settle(&mut p, &Floor);
        p.update(
            DT,
            &Floor,
            FrameInput {
                jump: true,
                ..Default::default()
            },
            &mut fx,
        );
        p.update(DT, &Empty, FrameInput { jump: true, ..Default::default() }, &mut fx);
        assert_eq!(p.action, PlayerAction::Jump);
        while p.vy <= 0.0 {
            p.update(DT, &Empty, FrameInput::none(), &mut fx);
        }
        p.update(DT, &Empty, FrameInput::none(), &mut fx);
        assert_eq!(p.action, PlayerAction::Fall);
    }
}
