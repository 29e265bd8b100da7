pub mod boss;
pub mod boss_room;
pub mod credit;
pub mod enemy;
pub mod input;
pub mod level;
pub mod player;
pub mod session;

use slimed_core::geom::Rect;

/// Source of solid geometry for entity collision. Implemented by the
/// scrolling level and by the boss arena, so entities simulate identically
/// in both.
pub trait TileMap {
    /// Platform rectangles near `probe` (broad-phase; may over-approximate).
    fn collision_tiles(&self, probe: Rect) -> Vec<Rect>;
}
