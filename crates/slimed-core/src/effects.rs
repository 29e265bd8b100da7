//! Session-owned visual effects: particles, floating score text, and the
//! screen-shake timer. One instance lives on the session and is passed by
//! reference to whatever wants to emit.

use rand::Rng;

use crate::geom::Rect;
use crate::render::{COL_ACCENT_1, COL_ACCENT_2, COL_ACCENT_3, Color, Renderer};

#[derive(Debug, Clone)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub color: Color,
    pub life: f32,
    pub max_life: f32,
}

#[derive(Debug, Clone)]
pub struct FloatingText {
    pub x: f32,
    pub y: f32,
    pub text: String,
    pub color: Color,
    pub life: f32,
}

#[derive(Debug, Default)]
pub struct EffectsSystem {
    pub particles: Vec<Particle>,
    pub texts: Vec<FloatingText>,
    pub shake_timer: f32,
}

impl EffectsSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.particles.clear();
        self.texts.clear();
        self.shake_timer = 0.0;
    }

    pub fn spawn_dust(&mut self, x: f32, y: f32, count: u32, color: Color) {
        let mut rng = rand::rng();
        for _ in 0..count {
            self.particles.push(Particle {
                x,
                y,
                vx: rng.random_range(-60.0..60.0),
                vy: rng.random_range(-80.0..-30.0),
                color,
                life: rng.random_range(0.2..0.5),
                max_life: 0.5,
            });
        }
    }

    /// Upward half-circle burst; particle count scales with impact power.
    pub fn spawn_slam_impact(&mut self, x: f32, y: f32, power: f32) {
        let mut rng = rand::rng();
        let count = (10.0 + power * 0.1) as u32;
        for _ in 0..count {
            let angle: f32 = rng.random_range(0.0..std::f32::consts::PI);
            let speed: f32 = rng.random_range(50.0..200.0);
            self.particles.push(Particle {
                x,
                y,
                vx: angle.cos() * speed,
                vy: -angle.sin() * speed,
                color: COL_ACCENT_2,
                life: 0.6,
                max_life: 0.6,
            });
        }
    }

    pub fn spawn_credit_text(&mut self, x: f32, y: f32, amount: f64) {
        let color = if amount >= 1.0 {
            COL_ACCENT_1
        } else {
            Color(200, 200, 200)
        };
        self.texts.push(FloatingText {
            x,
            y,
            text: format!("+{amount:.1} CREDIT"),
            color,
            life: 1.0,
        });
    }

    pub fn spawn_text(&mut self, x: f32, y: f32, text: &str, color: Color) {
        self.texts.push(FloatingText {
            x,
            y,
            text: text.to_string(),
            color,
            life: 1.0,
        });
    }

    pub fn shake(&mut self, duration: f32) {
        self.shake_timer = self.shake_timer.max(duration);
    }

    /// Current shake offset, zero once the timer runs out.
    pub fn shake_offset(&self) -> (f32, f32) {
        if self.shake_timer > 0.0 {
            let mut rng = rand::rng();
            (rng.random_range(-3.0..=3.0), rng.random_range(-3.0..=3.0))
        } else {
            (0.0, 0.0)
        }
    }

    pub fn update(&mut self, dt: f32) {
        if self.shake_timer > 0.0 {
            self.shake_timer -= dt;
        }
        for p in &mut self.particles {
            p.x += p.vx * dt;
            p.y += p.vy * dt;
            p.life -= dt;
        }
        self.particles.retain(|p| p.life > 0.0);
        for t in &mut self.texts {
            t.y -= 40.0 * dt;
            t.life -= dt;
        }
        self.texts.retain(|t| t.life > 0.0);
    }

    pub fn draw(&self, renderer: &mut dyn Renderer, cam_x: f32, cam_y: f32) {
        for p in &self.particles {
            let ratio = p.life / p.max_life;
            let sz = (4.0 * ratio).max(1.0);
            renderer.draw_rect(
                Rect::new(p.x - cam_x, p.y - cam_y, sz, sz),
                p.color,
                true,
            );
        }
        for t in &self.texts {
            renderer.draw_text(&t.text, t.x - cam_x, t.y - cam_y, t.color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particles_expire() {
        let mut fx = EffectsSystem::new();
        fx.spawn_dust(0.0, 0.0, 10, COL_ACCENT_3);
        assert_eq!(fx.particles.len(), 10);
        for _ in 0..60 {
            fx.update(1.0 / 60.0);
        }
        assert!(fx.particles.is_empty(), "Dust lives at most half a second");
    }

    #[test]
    fn slam_count_scales_with_power() {
        let mut fx = EffectsSystem::new();
        fx.spawn_slam_impact(0.0, 0.0, 0.0);
        let base = fx.particles.len();
        fx.particles.clear();
        fx.spawn_slam_impact(0.0, 0.0, 400.0);
        assert!(fx.particles.len() > base);
    }

    #[test]
    fn floating_text_rises_and_dies() {
        let mut fx = EffectsSystem::new();
        fx.spawn_credit_text(10.0, 100.0, 1.0);
        let y0 = fx.texts[0].y;
        fx.update(0.5);
        assert!(fx.texts[0].y < y0);
        fx.update(0.6);
        assert!(fx.texts.is_empty());
    }

    #[test]
    fn shake_offset_zero_when_idle() {
        let fx = EffectsSystem::new();
        assert_eq!(fx.shake_offset(), (0.0, 0.0));
    }
}
