//! The boss arena and the portals in and out of it.

use rand::Rng;

use slimed_core::config::{BOSS_ROOM_HEIGHT, BOSS_ROOM_WIDTH, TILE_SIZE, VICTORY_CREDITS};
use slimed_core::geom::Rect;
use slimed_core::render::{COL_ACCENT_1, COL_ACCENT_3, Color, Renderer};

use crate::TileMap;

/// Frames in the portal sheet.
const PORTAL_FRAMES: u32 = 8;
/// Portal sheet plays at 10 fps.
const PORTAL_FRAME_TIME: f32 = 0.1;

#[derive(Debug, Clone)]
struct PortalParticle {
    x: f32,
    y: f32,
    angle: f32,
    radius: f32,
    life: f32,
    speed: f32,
}

/// Animated portal: the overworld entrance to the boss room, and the
/// return portal spawned after victory uses the same sheet.
#[derive(Debug, Clone)]
pub struct Portal {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub frame: u32,
    anim_timer: f32,
    particles: Vec<PortalParticle>,
}

impl Portal {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            w: 60.0,
            h: 100.0,
            frame: 0,
            anim_timer: 0.0,
            particles: Vec::new(),
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }

    pub fn overlaps(&self, other: Rect) -> bool {
        self.rect().intersects(&other)
    }

    pub fn update(&mut self, dt: f32) {
        self.anim_timer += dt;
        if self.anim_timer >= PORTAL_FRAME_TIME {
            self.anim_timer -= PORTAL_FRAME_TIME;
            self.frame = (self.frame + 1) % PORTAL_FRAMES;
        }

        // Swirling ring of particles pulled inward.
        let mut rng = rand::rng();
        if rng.random::<f32>() < 0.15 {
            let angle = rng.random_range(0.0..std::f32::consts::TAU);
            let radius = rng.random_range(25.0..50.0);
            self.particles.push(PortalParticle {
                x: self.x + self.w / 2.0 + angle.cos() * radius,
                y: self.y + self.h / 2.0 + angle.sin() * radius,
                angle,
                radius,
                life: 0.8,
                speed: rng.random_range(15.0..30.0),
            });
        }
        let (cx, cy) = (self.x + self.w / 2.0, self.y + self.h / 2.0);
        for p in &mut self.particles {
            p.life -= dt;
            p.angle += p.speed * dt * 0.1;
            p.radius -= dt * 15.0;
            p.x = cx + p.angle.cos() * p.radius;
            p.y = cy + p.angle.sin() * p.radius;
        }
        self.particles.retain(|p| p.life > 0.0 && p.radius >= 0.0);
    }

    pub fn draw(&self, renderer: &mut dyn Renderer, cam_x: f32, cam_y: f32) {
        for p in &self.particles {
            let size = (p.life * 5.0).max(2.0);
            let color = if p.radius > 30.0 {
                Color(100, 150, 255)
            } else {
                COL_ACCENT_1
            };
            renderer.draw_circle(p.x - cam_x, p.y - cam_y, size, color, true);
        }
        renderer.draw_frame(
            "portal",
            "swirl",
            self.frame as usize,
            self.x - cam_x,
            self.y - cam_y,
            false,
        );
    }
}

/// A floating victory-reward orb. The bobbing phase offset is per-orb so
/// the row doesn't move in lockstep.
#[derive(Debug, Clone)]
pub struct CreditOrb {
    pub x: f32,
    pub y: f32,
    base_y: f32,
    pub size: f32,
    pub value: u32,
    float_offset: f32,
}

impl CreditOrb {
    pub fn rect(&self) -> Rect {
        Rect::new(
            self.x - self.size / 2.0,
            self.y - self.size / 2.0,
            self.size,
            self.size,
        )
    }
}

/// Fixed small arena for the boss encounter.
#[derive(Debug, Clone)]
pub struct BossRoom {
    pub width: f32,
    pub height: f32,
    pub platforms: Vec<Rect>,
    pub return_portal: Option<Rect>,
    pub credit_orbs: Vec<CreditOrb>,
    pub victory_claimed: bool,
    anim_timer: f32,
    frame_timer: f32,
    portal_frame: u32,
}

impl Default for BossRoom {
    fn default() -> Self {
        Self::new()
    }
}

impl BossRoom {
    pub fn new() -> Self {
        let (w, h) = (BOSS_ROOM_WIDTH, BOSS_ROOM_HEIGHT);
        let t = TILE_SIZE;
        let platforms = vec![
            // Floor spans the whole room.
            Rect::new(0.0, h - t * 2.0, w, t),
            // Left ledge.
            Rect::new(50.0, h - t * 7.0, t * 6.0, t),
            // High center.
            Rect::new(w / 2.0 - t * 3.0, h - t * 12.0, t * 6.0, t),
            // Right ledge.
            Rect::new(w - t * 7.0 - 50.0, h - t * 8.0, t * 6.0, t),
            // Top perch, the highest point.
            Rect::new(w / 2.0 - t * 2.0, h - t * 16.0, t * 4.0, t),
        ];
        Self {
            width: w,
            height: h,
            platforms,
            return_portal: None,
            credit_orbs: Vec::new(),
            victory_claimed: false,
            anim_timer: 0.0,
            frame_timer: 0.0,
            portal_frame: 0,
        }
    }

    /// Spawn the return portal and the reward row. Latched: a second call
    /// has no effect.
    pub fn activate_victory(&mut self) {
        if self.victory_claimed {
            return;
        }
        self.victory_claimed = true;

        let top = self.platforms[4];
        self.return_portal = Some(Rect::new(top.center_x() - 30.0, top.y - 80.0, 60.0, 80.0));

        let floor = self.platforms[0];
        let center_x = floor.center_x();
        let ground_y = floor.y - 15.0;
        for i in 0..VICTORY_CREDITS {
            let offset_x = (i as f32 - (VICTORY_CREDITS / 2) as f32) * 30.0;
            self.credit_orbs.push(CreditOrb {
                x: center_x + offset_x,
                y: ground_y,
                base_y: ground_y,
                size: 14.0,
                value: 10,
                float_offset: i as f32 * 0.5,
            });
        }
    }

    pub fn update(&mut self, dt: f32) {
        self.anim_timer += dt;
        self.frame_timer += dt;
        while self.frame_timer >= PORTAL_FRAME_TIME {
            self.frame_timer -= PORTAL_FRAME_TIME;
            self.portal_frame = (self.portal_frame + 1) % PORTAL_FRAMES;
        }
        for orb in &mut self.credit_orbs {
            orb.y = orb.base_y + (self.anim_timer * 3.0 + orb.float_offset).sin() * 5.0;
        }
    }

    /// Collect any orbs overlapping the player; returns the total value.
    pub fn collect_credits(&mut self, player_rect: Rect) -> u32 {
        let mut collected = 0;
        self.credit_orbs.retain(|orb| {
            if orb.rect().intersects(&player_rect) {
                collected += orb.value;
                false
            } else {
                true
            }
        });
        collected
    }

    pub fn portal_entered(&self, player_rect: Rect) -> bool {
        self.return_portal
            .is_some_and(|portal| portal.intersects(&player_rect))
    }

    pub fn draw(&self, renderer: &mut dyn Renderer) {
        for platform in &self.platforms {
            let mut x = platform.x;
            while x < platform.right() {
                renderer.draw_frame("tiles", "block", 0, x, platform.y, false);
                x += TILE_SIZE;
            }
        }
        for orb in &self.credit_orbs {
            renderer.draw_circle(orb.x, orb.y, orb.size / 2.0 + 2.0, COL_ACCENT_3, true);
            renderer.draw_circle(orb.x, orb.y, orb.size / 2.0 - 1.0, Color(255, 255, 220), true);
        }
        if let Some(portal) = self.return_portal {
            renderer.draw_frame(
                "portal",
                "swirl",
                self.portal_frame as usize,
                portal.x,
                portal.y,
                false,
            );
        }
    }
}

impl TileMap for BossRoom {
    fn collision_tiles(&self, probe: Rect) -> Vec<Rect> {
        self.platforms
            .iter()
            .filter(|p| p.intersects(&probe))
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_has_five_platforms_with_full_floor() {
        let room = BossRoom::new();
        assert_eq!(room.platforms.len(), 5);
        assert_eq!(room.platforms[0].w, room.width);
    }

    #[test]
    fn victory_is_latched() {
        let mut room = BossRoom::new();
        room.activate_victory();
        assert!(room.victory_claimed);
        assert!(room.return_portal.is_some());
        let orbs = room.credit_orbs.len();
        assert_eq!(orbs as u32, VICTORY_CREDITS);

        room.activate_victory();
        assert_eq!(room.credit_orbs.len(), orbs, "second activation adds nothing");
    }

    #[test]
    fn return_portal_sits_above_top_perch() {
        let mut room = BossRoom::new();
        room.activate_victory();
        let portal = room.return_portal.unwrap();
        let top = room.platforms[4];
        assert!(portal.bottom() <= top.y);
        assert_eq!(portal.center_x(), top.center_x());
    }

    #[test]
    fn credits_collected_once() {
        let mut room = BossRoom::new();
        room.activate_victory();
        let floor = room.platforms[0];
        let sweep = Rect::new(0.0, floor.y - 40.0, room.width, 40.0);
        let total = room.collect_credits(sweep);
        assert_eq!(total, VICTORY_CREDITS * 10);
        assert_eq!(room.collect_credits(sweep), 0);
        assert!(room.credit_orbs.is_empty());
    }

    #[test]
    fn no_portal_entry_before_victory() {
        let room = BossRoom::new();
        assert!(!room.portal_entered(Rect::new(0.0, 0.0, 1000.0, 1000.0)));
    }

    #[test]
    fn orbs_bob_around_their_base() {
        let mut room = BossRoom::new();
        room.activate_victory();
        let base = room.credit_orbs[0].base_y;
        room.update(0.5);
        assert!((room.credit_orbs[0].y - base).abs() <= 5.0 + f32::EPSILON);
    }

    #[test]
    fn portal_particles_stay_bounded() {
        let mut portal = Portal::new(100.0, 100.0);
        for _ in 0..600 {
            portal.update(1.0 / 60.0);
        }
        assert!(portal.particles.len() < 100);
        assert!(portal.frame < PORTAL_FRAMES);
    }
}
