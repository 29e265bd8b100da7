//! Patrolling walkers. The host (or sole local simulator) owns enemy state;
//! a client only mirrors it from network deltas, so the full `update` runs
//! on the authoritative side and `update_animation` alone runs on mirrors.

use slimed_core::anim::{EnemyAction, EnemyAnimSet};
use slimed_core::config::BASE_GRAVITY;
use slimed_core::geom::Rect;
use slimed_core::render::{Color, Renderer};

use crate::TileMap;

const PATROL_SPEED: f32 = 60.0;
const HURT_INVUL: f32 = 0.2;
const ANIM_SPEED: f32 = 0.15;
/// Spikes kill any walker outright.
const SPIKE_DAMAGE: f32 = 10.0;
/// Despawn margin below the camera.
const FALL_CLEANUP: f32 = 500.0;
/// Despawn margin behind the camera.
const BEHIND_CLEANUP: f32 = 200.0;

/// How slam-class damage is computed against an entity. Set at construction
/// so the impact rule is a total function over a closed set of variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageProfile {
    /// Regular walker: a slam is lethal outright.
    Standard,
    /// Boss-class: a slam counts as a single hit.
    Boss,
}

#[derive(Debug, Clone)]
pub struct Enemy {
    /// Stable network id, assigned by the spawning (non-client) side.
    pub id: i64,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub vx: f32,
    pub vy: f32,
    pub facing_right: bool,
    pub hp: f32,
    pub max_hp: f32,
    pub alive: bool,
    pub invul_timer: f32,
    pub profile: DamageProfile,
    pub action: EnemyAction,
    pub frame: u32,
    anim_timer: f32,
    anim: EnemyAnimSet,
}

impl Enemy {
    pub fn new(id: i64, x: f32, y: f32, anim: EnemyAnimSet) -> Self {
        Self {
            id,
            x,
            y,
            w: anim.width,
            h: anim.height,
            vx: PATROL_SPEED,
            vy: 0.0,
            facing_right: true,
            hp: 1.0,
            max_hp: 1.0,
            alive: true,
            invul_timer: 0.0,
            profile: DamageProfile::Standard,
            action: EnemyAction::Walk,
            frame: 0,
            anim_timer: 0.0,
            anim,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }

    /// Damage a slam-class hit deals to this enemy.
    pub fn slam_damage(&self) -> f32 {
        match self.profile {
            DamageProfile::Standard => self.max_hp,
            DamageProfile::Boss => 1.0,
        }
    }

    /// Returns true if this hit killed the enemy. No effect during the
    /// post-hit invulnerability window.
    pub fn take_damage(&mut self, amount: f32) -> bool {
        if self.invul_timer > 0.0 {
            return false;
        }
        self.hp -= amount;
        self.invul_timer = HURT_INVUL;
        self.action = EnemyAction::Hurt;
        self.frame = 0;
        if self.hp <= 0.0 {
            self.hp = 0.0;
            self.alive = false;
            return true;
        }
        false
    }

    /// Frame/hurt-state bookkeeping. This is the whole of a client-side
    /// mirror's per-frame work.
    pub fn update_animation(&mut self, dt: f32) {
        if !self.alive {
            return;
        }
        self.anim_timer += dt;
        if self.anim_timer > ANIM_SPEED {
            self.frame = self.frame.wrapping_add(1);
            self.anim_timer = 0.0;
        }
        if self.invul_timer <= 0.0 {
            self.action = EnemyAction::Walk;
        } else {
            self.invul_timer -= dt;
        }
        let frames = self.anim.frames(self.action).max(1) as u32;
        self.frame %= frames;
    }

    /// Authoritative patrol step. Returns true if the enemy died to a spike
    /// this frame (the orchestrator spawns a credit drop for those).
    pub fn update(
        &mut self,
        dt: f32,
        tiles: &dyn TileMap,
        hazards: &[Rect],
        cam: Rect,
    ) -> bool {
        if !self.alive {
            return false;
        }

        self.update_animation(dt);
        if self.vx > 0.0 {
            self.facing_right = true;
        } else if self.vx < 0.0 {
            self.facing_right = false;
        }

        // Off-camera enemies don't simulate; far-gone ones despawn.
        if !self.rect().intersects(&cam) {
            if self.y > cam.bottom() + FALL_CLEANUP {
                self.alive = false;
            }
            if self.x < cam.x - BEHIND_CLEANUP {
                self.alive = false;
            }
            return false;
        }

        self.vy += BASE_GRAVITY * dt;

        // Ledge probe just past the leading edge, below the feet.
        let look_ahead_x = if self.vx > 0.0 {
            self.x + self.w + 5.0
        } else {
            self.x - 5.0
        };
        let feet_probe = Rect::new(look_ahead_x, self.y + self.h + 2.0, 4.0, 4.0);
        let supported = tiles
            .collision_tiles(feet_probe)
            .iter()
            .any(|t| feet_probe.intersects(t));
        if !supported {
            self.vx = -self.vx;
        }

        let ny = self.y + self.vy * dt;
        let mut r = Rect::new(self.x, ny, self.w, self.h);
        self.y = ny;
        for t in tiles.collision_tiles(r) {
            if r.intersects(&t) && self.vy > 0.0 {
                self.y = t.y - self.h;
                self.vy = 0.0;
                r.y = self.y;
            }
        }

        let nx = self.x + self.vx * dt;
        r.x = nx;
        self.x = nx;
        for t in tiles.collision_tiles(r) {
            if r.intersects(&t) {
                if self.vx > 0.0 {
                    self.x = t.x - self.w;
                } else if self.vx < 0.0 {
                    self.x = t.right();
                }
                r.x = self.x;
                self.vx = -self.vx;
            }
        }

        // Spikes hurt walkers too.
        let hitbox = self.rect();
        for hazard in hazards {
            if hitbox.intersects(hazard) && self.take_damage(SPIKE_DAMAGE) {
                return true;
            }
        }

        false
    }

    pub fn draw(&self, renderer: &mut dyn Renderer, cam_x: f32, cam_y: f32) {
        if !self.alive {
            return;
        }
        let action = match self.action {
            EnemyAction::Walk => "walk",
            EnemyAction::Hurt => "hurt",
        };
        renderer.draw_frame(
            "enemy",
            action,
            self.frame as usize,
            self.x - cam_x,
            self.y - cam_y,
            self.facing_right,
        );
        // Mini HP bar, only once damaged.
        if self.hp < self.max_hp {
            let bar = Rect::new(self.x - cam_x, self.y - cam_y - 6.0, self.w, 3.0);
            renderer.draw_rect(bar, Color(0, 0, 0), true);
            let pct = self.hp / self.max_hp;
            renderer.draw_rect(
                Rect::new(bar.x, bar.y, bar.w * pct, bar.h),
                Color(255, 0, 0),
                true,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Floor;

    impl TileMap for Floor {
        fn collision_tiles(&self, _probe: Rect) -> Vec<Rect> {
            vec![Rect::new(-1000.0, 100.0, 2000.0, 20.0)]
        }
    }

    /// A single platform with open air on both sides.
    struct Island;

    impl TileMap for Island {
        fn collision_tiles(&self, _probe: Rect) -> Vec<Rect> {
            vec![Rect::new(0.0, 100.0, 200.0, 20.0)]
        }
    }

    fn cam() -> Rect {
        Rect::new(-320.0, -240.0, 640.0, 480.0)
    }

    fn settled(tiles: &dyn TileMap) -> Enemy {
        let mut e = Enemy::new(0, 50.0, 60.0, EnemyAnimSet::default());
        for _ in 0..60 {
            e.update(1.0 / 60.0, tiles, &[], cam());
        }
        e
    }

    #[test]
    fn reverses_at_ledge() {
        let mut e = settled(&Island);
        assert!(e.vx > 0.0);
        for _ in 0..(5 * 60) {
            e.update(1.0 / 60.0, &Island, &[], cam());
            assert!(e.x > -10.0 && e.x + e.w < 210.0, "never walks off the island");
        }
    }

    #[test]
    fn reverses_on_wall_contact() {
        struct Walled;
        impl TileMap for Walled {
            fn collision_tiles(&self, _probe: Rect) -> Vec<Rect> {
                vec![
                    Rect::new(-1000.0, 100.0, 2000.0, 20.0),
                    Rect::new(120.0, 0.0, 20.0, 100.0),
                ]
            }
        }
        let mut e = settled(&Walled);
        for _ in 0..120 {
            e.update(1.0 / 60.0, &Walled, &[], cam());
        }
        assert!(e.vx < 0.0, "wall contact flips patrol direction");
        assert!(e.x + e.w <= 120.0 + 0.01);
    }

    #[test]
    fn spikes_are_lethal_to_walkers() {
        let mut e = settled(&Floor);
        let spike = Rect::new(e.x, e.y, 20.0, 20.0);
        let died = e.update(1.0 / 60.0, &Floor, &[spike], cam());
        assert!(died);
        assert!(!e.alive);
        assert_eq!(e.hp, 0.0);
    }

    #[test]
    fn damage_blocked_during_invul_window() {
        let mut e = Enemy::new(0, 0.0, 0.0, EnemyAnimSet::default());
        e.hp = 3.0;
        e.max_hp = 3.0;
        assert!(!e.take_damage(1.0));
        assert_eq!(e.hp, 2.0);
        assert_eq!(e.action, EnemyAction::Hurt);
        // Second hit inside the window is a no-op.
        assert!(!e.take_damage(1.0));
        assert_eq!(e.hp, 2.0);
    }

    #[test]
    fn despawns_far_below_camera() {
        let mut e = Enemy::new(0, 0.0, 10_000.0, EnemyAnimSet::default());
        e.update(1.0 / 60.0, &Floor, &[], cam());
        assert!(!e.alive);
    }

    #[test]
    fn slam_damage_follows_profile() {
        let mut e = Enemy::new(0, 0.0, 0.0, EnemyAnimSet::default());
        e.max_hp = 5.0;
        assert_eq!(e.slam_damage(), 5.0);
        e.profile = DamageProfile::Boss;
        assert_eq!(e.slam_damage(), 1.0);
    }
}
