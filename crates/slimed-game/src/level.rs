//! Incremental, seeded level generation.
//!
//! The generator appends one section at a time ahead of the scroll cursor.
//! Every random decision draws from one `StdRng` seeded at session start, so
//! a host and a client holding the same seed produce identical layouts. The
//! client makes every draw the host makes and skips only enemy
//! materialization (enemies reach it over the network instead); skipping a
//! draw would fork the streams and desync the terrain.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use slimed_core::anim::EnemyAnimSet;
use slimed_core::config::{
    GROUND_LEVEL, PORTAL_SPAWN_DISTANCE, STAGE_1_END, STAGE_2_END, TILE_SIZE, VIRTUAL_H,
    VIRTUAL_W,
};
use slimed_core::geom::Rect;
use slimed_core::render::{COL_ACCENT_3, Color, Renderer};

use crate::TileMap;
use crate::boss_room::Portal;
use crate::credit::Credit;
use crate::enemy::Enemy;

/// Generation lookahead past the cursor.
const GEN_AHEAD: f32 = 400.0;
/// Cleanup margin behind the cursor.
const CLEANUP_MARGIN: f32 = 200.0;
/// Opening stretch of guaranteed flat ground.
const SAFETY_PLATFORM_W: f32 = 800.0;
/// Broad-phase slack around the probe rectangle.
const BROAD_PHASE_PAD: f32 = 4.0;

/// Difficulty stage, determined by how far generation has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    One,
    Two,
    Three,
}

impl Stage {
    pub fn from_x(x: f32) -> Self {
        if x < STAGE_1_END {
            Self::One
        } else if x < STAGE_2_END {
            Self::Two
        } else {
            // Endless.
            Self::Three
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// Height delta range in tiles (negative = climb, y grows downward).
    fn delta_tiles(self) -> (i32, i32) {
        match self {
            Self::One => (-2, 2),
            Self::Two => (-4, 5),
            Self::Three => (-4, 8),
        }
    }

    fn enemy_chance(self) -> f32 {
        match self {
            Self::One => 0.3,
            Self::Two => 0.5,
            Self::Three => 0.7,
        }
    }
}

pub struct Level {
    rng: StdRng,
    pub is_client: bool,
    pub platforms: Vec<Rect>,
    pub hazards: Vec<Rect>,
    pub orbs: Vec<Rect>,
    pub health_orbs: Vec<Rect>,
    pub enemies: Vec<Enemy>,
    pub credits: Vec<Credit>,
    /// Monotonic; never reset, so ids stay unique for the session.
    pub next_enemy_id: i64,
    pub generated_right_x: f32,
    pub stage: Stage,
    pub portal: Option<Portal>,
    pub portal_spawned: bool,
    /// Where the return portal drops players after the boss room.
    pub return_safe_pos: (f32, f32),
    last_platform_y: f32,
    orb_timer: f32,
    enemy_anim: EnemyAnimSet,
}

impl Level {
    pub fn new(seed: u64, is_client: bool, enemy_anim: EnemyAnimSet) -> Self {
        let mut level = Self {
            rng: StdRng::seed_from_u64(seed),
            is_client,
            platforms: Vec::new(),
            hazards: Vec::new(),
            orbs: Vec::new(),
            health_orbs: Vec::new(),
            enemies: Vec::new(),
            credits: Vec::new(),
            next_enemy_id: 0,
            generated_right_x: 0.0,
            stage: Stage::One,
            portal: None,
            portal_spawned: false,
            return_safe_pos: (100.0, GROUND_LEVEL - 60.0),
            last_platform_y: GROUND_LEVEL,
            orb_timer: 0.0,
            enemy_anim,
        };
        level
            .platforms
            .push(Rect::new(0.0, GROUND_LEVEL, SAFETY_PLATFORM_W, TILE_SIZE));
        level.generated_right_x = SAFETY_PLATFORM_W;
        level
    }

    /// Append sections until the rightmost generated edge covers `target`.
    pub fn generate_ahead(&mut self, target_right_x: f32) {
        while self.generated_right_x < target_right_x {
            self.generate_section();
        }
    }

    fn generate_section(&mut self) {
        self.stage = Stage::from_x(self.generated_right_x);

        let portal_section =
            !self.portal_spawned && self.generated_right_x >= PORTAL_SPAWN_DISTANCE;

        let (new_y, gap, plat_w) = if portal_section {
            // Flat, wide and safe: the portal gets a clean runway.
            (self.last_platform_y, 40.0, TILE_SIZE * 20.0)
        } else {
            let (min_delta, max_delta) = self.stage.delta_tiles();
            let delta_tiles = self.rng.random_range(min_delta..=max_delta);
            let mut new_y = self.last_platform_y + delta_tiles as f32 * TILE_SIZE;

            // Keep platforms inside the playable band; violations are
            // re-seated one tile inside it.
            let min_allowed_y = TILE_SIZE * 4.0;
            let max_allowed_y = VIRTUAL_H - TILE_SIZE * 2.0;
            if new_y < min_allowed_y {
                new_y = min_allowed_y + TILE_SIZE;
            } else if new_y > max_allowed_y {
                new_y = max_allowed_y - TILE_SIZE;
            }

            // Climbs shrink the gap, drops widen it, both bounded so every
            // gap stays jumpable under the fixed physics constants.
            let base_gap = 60.0 + self.rng.random_range(0..=40) as f32;
            let height_diff = self.last_platform_y - new_y;
            let gap = if height_diff > 0.0 {
                let penalty = height_diff / TILE_SIZE * 12.0;
                (base_gap - penalty).max(40.0)
            } else {
                let bonus = -height_diff / TILE_SIZE * 8.0;
                (base_gap + bonus).min(150.0)
            };

            let plat_w = TILE_SIZE * self.rng.random_range(4..=12) as f32;
            (new_y, gap, plat_w)
        };

        let new_x = self.generated_right_x + gap;
        self.platforms.push(Rect::new(new_x, new_y, plat_w, TILE_SIZE));
        self.generated_right_x = new_x + plat_w;
        self.last_platform_y = new_y;

        if portal_section {
            let portal_x = new_x + plat_w / 2.0 - 30.0;
            self.portal = Some(Portal::new(portal_x, new_y - 100.0));
            self.portal_spawned = true;
            self.return_safe_pos = (portal_x + 100.0, new_y);
            return;
        }

        // Spawn rolls. Each draw happens on both roles; the client only
        // skips materializing the enemy itself.
        if self.rng.random::<f32>() < self.stage.enemy_chance() && plat_w > TILE_SIZE * 6.0 {
            let ex = new_x + plat_w / 2.0 - self.enemy_anim.width / 2.0;
            let ey = new_y - self.enemy_anim.height;
            if !self.is_client {
                let enemy = Enemy::new(self.next_enemy_id, ex, ey, self.enemy_anim.clone());
                self.next_enemy_id += 1;
                self.enemies.push(enemy);
            }
        }

        if self.rng.random::<f32>() < 0.25
            && self.stage > Stage::One
            && plat_w > TILE_SIZE * 6.0
        {
            let tiles_wide = (plat_w / TILE_SIZE) as i32;
            let spike_tile = self.rng.random_range(3..=tiles_wide - 3);
            self.hazards.push(Rect::new(
                new_x + spike_tile as f32 * TILE_SIZE,
                new_y - TILE_SIZE,
                TILE_SIZE,
                TILE_SIZE,
            ));
        }

        if self.rng.random::<f32>() < 0.5 {
            let orb_size = TILE_SIZE / 2.0;
            let rect = Rect::new(
                new_x + plat_w / 2.0 - orb_size / 2.0,
                new_y - 3.0 * TILE_SIZE,
                orb_size,
                orb_size,
            );
            if self.rng.random::<f32>() < 0.08 {
                self.health_orbs.push(rect);
            } else {
                self.orbs.push(rect);
            }
        }
    }

    pub fn spawn_credit(&mut self, x: f32, y: f32, value: f64) {
        self.credits.push(Credit::new(x, y, value));
    }

    /// Generate ahead of the cursor and drop everything far behind it.
    pub fn update(&mut self, dt: f32, gen_x: f32) {
        self.orb_timer += dt;
        self.generate_ahead(gen_x + VIRTUAL_W + GEN_AHEAD);

        let cleanup_x = gen_x - CLEANUP_MARGIN;
        self.platforms.retain(|p| p.right() > cleanup_x);
        self.hazards.retain(|h| h.right() > cleanup_x);
        self.orbs.retain(|o| o.right() > cleanup_x);
        self.health_orbs.retain(|h| h.right() > cleanup_x);
        self.enemies.retain(|e| e.alive && e.x > cleanup_x);

        let mut credits = std::mem::take(&mut self.credits);
        for c in &mut credits {
            c.update(dt, &*self);
        }
        credits.retain(|c| c.life > 0.0 && c.x > cleanup_x);
        self.credits = credits;

        if let Some(portal) = self.portal.as_mut() {
            portal.update(dt);
        }
    }

    /// Advance every live enemy (authoritative side) or run only cleanup
    /// and animation (client mirror). Returns the positions of enemies
    /// that died to spikes this frame, for credit drops.
    pub fn update_enemies(&mut self, dt: f32, cam: Rect) -> Vec<(f32, f32)> {
        let mut spike_deaths = Vec::new();
        let mut enemies = std::mem::take(&mut self.enemies);
        for e in &mut enemies {
            if self.is_client {
                if e.y > cam.bottom() + 500.0 || e.x < cam.x - 200.0 {
                    e.alive = false;
                }
                e.update_animation(dt);
            } else if e.update(dt, &*self, &self.hazards, cam) {
                spike_deaths.push((e.x, e.y));
            }
        }
        self.enemies = enemies;
        spike_deaths
    }

    pub fn draw(&self, renderer: &mut dyn Renderer, cam_x: f32, cam_y: f32) {
        for p in &self.platforms {
            if p.right() - cam_x < 0.0 || p.x - cam_x > VIRTUAL_W {
                continue;
            }
            let mut x = p.x;
            while x < p.right() {
                renderer.draw_frame("tiles", "block", 0, x - cam_x, p.y - cam_y, false);
                x += TILE_SIZE;
            }
        }

        for spike in &self.hazards {
            let bx = spike.x - cam_x;
            let by = spike.bottom() - cam_y;
            let points = [
                (bx, by),
                (bx + spike.w, by),
                (bx + spike.w / 2.0, by - spike.h),
            ];
            renderer.draw_polygon(&points, Color(200, 50, 50));
        }

        let bob = (self.orb_timer * 3.0).sin() * 3.0;
        for orb in &self.orbs {
            let cx = orb.center_x() - cam_x;
            let cy = orb.center_y() - cam_y + bob;
            renderer.draw_circle(cx, cy, orb.w / 2.0, COL_ACCENT_3, true);
        }
        for orb in &self.health_orbs {
            let cx = orb.center_x() - cam_x;
            let cy = orb.center_y() - cam_y + bob;
            renderer.draw_circle(cx, cy, orb.w / 2.0, Color(50, 255, 50), true);
            renderer.draw_line(cx - 3.0, cy, cx + 3.0, cy, Color(255, 255, 255));
            renderer.draw_line(cx, cy - 3.0, cx, cy + 3.0, Color(255, 255, 255));
        }

        for c in &self.credits {
            c.draw(renderer, cam_x, cam_y);
        }
        for e in &self.enemies {
            e.draw(renderer, cam_x, cam_y);
        }
        if let Some(portal) = &self.portal {
            portal.draw(renderer, cam_x, cam_y);
        }
    }
}

impl TileMap for Level {
    fn collision_tiles(&self, probe: Rect) -> Vec<Rect> {
        self.platforms
            .iter()
            .filter(|s| {
                !(s.right() < probe.x - BROAD_PHASE_PAD
                    || s.x > probe.right() + BROAD_PHASE_PAD
                    || s.bottom() < probe.y - BROAD_PHASE_PAD
                    || s.y > probe.bottom() + BROAD_PHASE_PAD)
            })
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_level(seed: u64) -> Level {
        Level::new(seed, false, EnemyAnimSet::default())
    }

    #[test]
    fn same_seed_same_layout() {
        let mut a = host_level(991);
        let mut b = host_level(991);
        a.generate_ahead(20_000.0);
        b.generate_ahead(20_000.0);

        assert_eq!(a.platforms, b.platforms);
        assert_eq!(a.hazards, b.hazards);
        assert_eq!(a.orbs, b.orbs);
        assert_eq!(a.health_orbs, b.health_orbs);
        let ids_a: Vec<_> = a.enemies.iter().map(|e| (e.id, e.x as i32)).collect();
        let ids_b: Vec<_> = b.enemies.iter().map(|e| (e.id, e.x as i32)).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = host_level(1);
        let mut b = host_level(2);
        a.generate_ahead(5_000.0);
        b.generate_ahead(5_000.0);
        assert_ne!(a.platforms, b.platforms);
    }

    #[test]
    fn client_shares_terrain_but_not_enemies() {
        let mut host = host_level(77);
        let mut client = Level::new(77, true, EnemyAnimSet::default());
        host.generate_ahead(12_000.0);
        client.generate_ahead(12_000.0);

        assert_eq!(host.platforms, client.platforms);
        assert_eq!(host.hazards, client.hazards);
        assert!(client.enemies.is_empty(), "enemies arrive over the wire");
        assert_eq!(client.next_enemy_id, 0);
        assert!(!host.enemies.is_empty());
    }

    #[test]
    fn portal_spawns_exactly_once() {
        let mut level = host_level(5);
        level.generate_ahead(PORTAL_SPAWN_DISTANCE + 2_000.0);
        assert!(level.portal_spawned);
        assert!(level.portal.is_some());
        let portal_x = level.portal.as_ref().unwrap().x;
        assert!(level.return_safe_pos.0 > portal_x);

        level.generate_ahead(PORTAL_SPAWN_DISTANCE + 10_000.0);
        assert_eq!(level.portal.as_ref().unwrap().x, portal_x, "trigger is one-shot");
    }

    #[test]
    fn stage_thresholds() {
        assert_eq!(Stage::from_x(0.0), Stage::One);
        assert_eq!(Stage::from_x(STAGE_1_END), Stage::Two);
        assert_eq!(Stage::from_x(STAGE_2_END), Stage::Three);
        assert_eq!(Stage::from_x(1_000_000.0), Stage::Three);
    }

    #[test]
    fn cleanup_drops_passed_geometry() {
        let mut level = host_level(9);
        level.update(1.0 / 60.0, 0.0);
        let before = level.platforms.len();
        level.update(1.0 / 60.0, 5_000.0);
        assert!(level.platforms.iter().all(|p| p.right() > 5_000.0 - 200.0));
        assert!(level.platforms.len() < before + 50, "list stays bounded");
    }

    #[test]
    fn rightmost_cursor_covers_every_platform() {
        let mut level = host_level(13);
        level.generate_ahead(8_000.0);
        let max_right = level
            .platforms
            .iter()
            .map(|p| p.right())
            .fold(0.0f32, f32::max);
        assert!(level.generated_right_x >= max_right);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Every consecutive pair of platforms must be reachable under
            // the fixed jump physics: bounded horizontal gap, bounded climb.
            #[test]
            fn gaps_stay_jumpable(seed in 0u64..150) {
                let mut level = host_level(seed);
                level.generate_ahead(15_000.0);

                for pair in level.platforms.windows(2) {
                    let gap = pair[1].x - pair[0].right();
                    prop_assert!(
                        gap >= 40.0 - 0.01 && gap <= 150.0 + 0.01,
                        "gap {gap} out of jumpable range"
                    );
                    let climb = pair[0].y - pair[1].y;
                    prop_assert!(
                        climb <= 4.0 * TILE_SIZE + 0.01,
                        "climb {climb} exceeds the max climb for any stage"
                    );
                }
            }

            // Platforms always land inside the playable vertical band.
            #[test]
            fn platforms_stay_in_band(seed in 0u64..150) {
                let mut level = host_level(seed);
                level.generate_ahead(15_000.0);
                for p in &level.platforms {
                    prop_assert!(p.y >= TILE_SIZE * 4.0 - 0.01);
                    prop_assert!(p.y <= VIRTUAL_H - TILE_SIZE * 2.0 + 0.01);
                }
            }

            // Enemy ids are unique and strictly increasing.
            #[test]
            fn enemy_ids_unique(seed in 0u64..100) {
                let mut level = host_level(seed);
                level.generate_ahead(15_000.0);
                let ids: Vec<_> = level.enemies.iter().map(|e| e.id).collect();
                for pair in ids.windows(2) {
                    prop_assert!(pair[0] < pair[1]);
                }
            }
        }
    }
}
