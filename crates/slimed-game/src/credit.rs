//! Dropped-currency pickups: popped out of dead enemies, they bounce to
//! rest on the terrain and expire if nobody grabs them.

use rand::Rng;

use slimed_core::config::BASE_GRAVITY;
use slimed_core::geom::Rect;
use slimed_core::render::{COL_ACCENT_3, Color, Renderer};

use crate::TileMap;

const CREDIT_LIFETIME: f32 = 15.0;
const BOUNCE_FACTOR: f32 = 0.6;
/// Below this bounce speed the credit settles.
const REST_SPEED: f32 = 50.0;

#[derive(Debug, Clone)]
pub struct Credit {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub value: f64,
    pub vx: f32,
    pub vy: f32,
    pub life: f32,
    anim_timer: f32,
}

impl Credit {
    pub fn new(x: f32, y: f32, value: f64) -> Self {
        let mut rng = rand::rng();
        Self {
            x,
            y,
            w: 14.0,
            h: 14.0,
            value,
            vx: rng.random_range(-50.0..50.0),
            vy: -250.0,
            life: CREDIT_LIFETIME,
            anim_timer: rng.random_range(0.0..10.0),
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }

    pub fn update(&mut self, dt: f32, tiles: &dyn TileMap) {
        self.life -= dt;
        self.anim_timer += dt;
        self.vy += BASE_GRAVITY * dt;
        self.x += self.vx * dt;
        self.y += self.vy * dt;

        let mut r = self.rect();
        for t in tiles.collision_tiles(r) {
            if !r.intersects(&t) {
                continue;
            }
            if self.vy > 0.0 {
                self.y = t.y - self.h;
                self.vy = -self.vy * BOUNCE_FACTOR;
                self.vx *= 0.9;
                if self.vy.abs() < REST_SPEED {
                    self.vy = 0.0;
                }
            } else if self.vy < 0.0 {
                self.y = t.bottom();
                self.vy = 0.0;
            }
            r.y = self.y;
        }
    }

    pub fn draw(&self, renderer: &mut dyn Renderer, cam_x: f32, cam_y: f32) {
        let cx = self.x - cam_x + self.w / 2.0;
        let cy = self.y - cam_y + self.h / 2.0;
        let color = if self.value >= 1.0 {
            COL_ACCENT_3
        } else {
            Color(192, 192, 192)
        };
        // Spin by squashing the disc horizontally.
        let spin = ((self.anim_timer * 4.0).cos().abs() * 6.0).max(1.0);
        renderer.draw_circle(cx, cy, spin, color, true);
        renderer.draw_circle(cx, cy, spin + 1.0, Color(255, 255, 220), false);
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

    #[test]
    fn credit_settles_on_floor() {
        let mut c = Credit::new(0.0, 0.0, 1.0);
        c.vx = 0.0;
        for _ in 0..600 {
            c.update(1.0 / 60.0, &Floor);
        }
        assert_eq!(c.vy, 0.0, "credit should come to rest");
        assert!((c.y - (100.0 - c.h)).abs() < 0.01, "resting on the floor top");
    }

    #[test]
    fn credit_expires() {
        let mut c = Credit::new(0.0, 0.0, 0.5);
        for _ in 0..(16 * 60) {
            c.update(1.0 / 60.0, &Floor);
        }
        assert!(c.life <= 0.0);
    }
}
