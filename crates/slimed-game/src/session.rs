//! Per-frame composition of every subsystem: input, networking, level
//! generation, entity updates, collision resolution, the boss encounter,
//! camera follow, scoring, and end conditions. All mutable session state
//! lives on the `Session` struct and every step is a method on it.
//!
//! Authority split: the host (or sole local simulator) owns enemies and the
//! boss; the client reports enemy hits upward and receives boss/hazard
//! damage downward. Each peer simulates only its own player and drives the
//! other as a snapshot-fed replica.

use slimed_core::anim::{BossAction, BossAnimSet, EnemyAction, EnemyAnimSet, PlayerAnimSet};
use slimed_core::config::{
    GROUND_LEVEL, SCROLL_OFFSET_X, SLAM_BASE_RADIUS, SLAM_RADIUS_PER_HEIGHT, VIRTUAL_H,
    VIRTUAL_W,
};
use slimed_core::effects::EffectsSystem;
use slimed_core::geom::{Rect, dist_sq};
use slimed_core::modes::{GameMode, NetRole};
use slimed_core::persistence::{Leaderboard, Persistence, SaveData};
use slimed_core::render::{COL_ACCENT_1, COL_ACCENT_3, Color, Renderer};
use slimed_net::peer::NetworkPeer;
use slimed_net::protocol::{EnemyDelta, PlayerSnapshot};

use crate::boss::{Boss, BossPhase};
use crate::boss_room::BossRoom;
use crate::enemy::Enemy;
use crate::input::FrameInput;
use crate::level::Level;
use crate::player::{Ability, Player};

/// Physics never steps more than this, however long the frame stalled.
const MAX_STEP: f32 = 0.05;
/// Positional error beyond which a replica snaps instead of smoothing.
const SNAP_DISTANCE: f32 = 50.0;
/// Per-frame smoothing factor for small replica corrections.
const REPLICA_LERP: f32 = 0.4;
const CAM_LERP: f32 = 0.1;
/// Boss mirror positional smoothing on the client.
const BOSS_LERP: f32 = 0.2;
/// Re-damage cadence while standing in platform fire.
const FIRE_RETRIGGER: f32 = 0.5;
/// Falling past this many pixels below the playfield costs 1 HP and a
/// respawn at the last safe spot.
const FALL_OUT_MARGIN: f32 = 200.0;
/// Bounce off an enemy stomp or a boss hit.
const STOMP_BOUNCE_VY: f32 = -700.0;
const BOSS_BOUNCE_VY: f32 = -350.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    P1,
    P2,
}

pub struct SessionConfig {
    pub mode: GameMode,
    pub role: NetRole,
    /// Both players on this keyboard (local co-op / split versus).
    pub local_two_players: bool,
    /// Map seed; ignored on a client, which adopts the host's.
    pub seed: u64,
    pub player_name: String,
    pub p1_ability: Ability,
    pub p2_ability: Ability,
    pub player_anim: PlayerAnimSet,
    pub enemy_anim: EnemyAnimSet,
    pub boss_anim: BossAnimSet,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: GameMode::Single,
            role: NetRole::LocalOnly,
            local_two_players: false,
            seed: 1,
            player_name: "Player".to_string(),
            p1_ability: Ability::Slam,
            p2_ability: Ability::Slam,
            player_anim: PlayerAnimSet::default(),
            enemy_anim: EnemyAnimSet::default(),
            boss_anim: BossAnimSet::default(),
        }
    }
}

pub struct Session {
    pub mode: GameMode,
    pub role: NetRole,
    local_two_players: bool,
    pub seed: u64,

    pub level: Level,
    pub p1: Player,
    pub p2: Player,
    use_p2: bool,
    pub effects: EffectsSystem,

    pub cam_x: f32,
    pub cam_y: f32,
    cam_p1: (f32, f32),
    cam_p2: (f32, f32),
    base_x: f32,

    pub elapsed: f32,
    p1_distance: f32,
    p2_distance: f32,
    p1_orbs: i64,
    p2_orbs: i64,
    pub session_credits: f64,

    pub waiting_for_seed: bool,
    pub game_over: bool,
    pub winner_text: String,
    exit_requested: bool,

    pub in_boss_room: bool,
    pub boss_room: Option<BossRoom>,
    pub boss: Option<Boss>,
    boss_defeated: bool,

    network: Option<NetworkPeer>,
    store: Box<dyn Persistence>,
    save: SaveData,
    lb: Leaderboard,
    player_name: String,

    enemy_anim: EnemyAnimSet,
    boss_anim: BossAnimSet,
}

impl Session {
    pub fn new(
        cfg: SessionConfig,
        store: Box<dyn Persistence>,
        network: Option<NetworkPeer>,
    ) -> Self {
        let save = store.load_save();
        let lb = store.load_leaderboard();

        let is_client = cfg.role == NetRole::Client;
        let level_seed = if is_client { 0 } else { cfg.seed };
        let level = Level::new(level_seed, is_client, cfg.enemy_anim.clone());

        let spawn_x = 100.0;
        let spawn_y = GROUND_LEVEL - 60.0;

        // Upgrades apply only to the player this machine simulates; in a
        // purely local session both get them.
        let p1_stats = (cfg.role != NetRole::Client).then_some(&save.upgrades);
        let p2_stats = (cfg.role != NetRole::Host).then_some(&save.upgrades);

        let p1 = Player::new(
            spawn_x,
            spawn_y,
            p1_stats,
            cfg.p1_ability,
            cfg.player_anim.clone(),
        );
        let p2 = Player::new(
            spawn_x - 30.0,
            spawn_y,
            p2_stats,
            cfg.p2_ability,
            cfg.player_anim.clone(),
        );

        let cam_x = spawn_x - SCROLL_OFFSET_X;
        Self {
            mode: cfg.mode,
            role: cfg.role,
            local_two_players: cfg.local_two_players,
            seed: cfg.seed,
            level,
            p1,
            p2,
            use_p2: cfg.mode != GameMode::Single,
            effects: EffectsSystem::new(),
            cam_x,
            cam_y: 0.0,
            cam_p1: (cam_x, 0.0),
            cam_p2: (cam_x, 0.0),
            base_x: spawn_x,
            elapsed: 0.0,
            p1_distance: 0.0,
            p2_distance: 0.0,
            p1_orbs: 0,
            p2_orbs: 0,
            session_credits: 0.0,
            waiting_for_seed: is_client,
            game_over: false,
            winner_text: String::new(),
            exit_requested: false,
            in_boss_room: false,
            boss_room: None,
            boss: None,
            boss_defeated: false,
            network,
            store,
            save,
            lb,
            player_name: cfg.player_name,
            enemy_anim: cfg.enemy_anim,
            boss_anim: cfg.boss_anim,
        }
    }

    fn local_is_p1(&self) -> bool {
        self.role != NetRole::Client
    }

    fn p1_is_local(&self) -> bool {
        self.role != NetRole::Client
    }

    fn p2_is_local(&self) -> bool {
        self.role == NetRole::Client
            || (self.role == NetRole::LocalOnly && self.local_two_players)
    }

    pub fn p1_total(&self) -> i64 {
        (self.p1_distance / 10.0) as i64 + self.p1_orbs * 100
    }

    pub fn p2_total(&self) -> i64 {
        (self.p2_distance / 10.0) as i64 + self.p2_orbs * 100
    }

    /// The player wants back to the lobby (local Escape or remote signal).
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn request_exit(&mut self) {
        self.exit_requested = true;
        if let Some(peer) = &self.network {
            peer.send_lobby_exit();
        }
    }

    pub fn update(&mut self, dt: f32, p1_input: FrameInput, p2_input: FrameInput) {
        let dt = dt.min(MAX_STEP);
        if !self.game_over && !self.waiting_for_seed {
            self.elapsed += dt;
        }
        self.effects.update(dt);

        if let Some(peer) = &self.network {
            peer.poll();
            if !peer.is_connected() && !self.game_over {
                self.game_over = true;
                self.winner_text = "OPPONENT DISCONNECTED".to_string();
            }
            if let Some(text) = peer.take_game_over()
                && !self.game_over
            {
                self.game_over = true;
                self.winner_text = text;
            }
            if peer.take_lobby_exit() {
                self.exit_requested = true;
            }
        }
        if self.game_over {
            return;
        }

        self.network_exchange();
        if self.waiting_for_seed {
            return;
        }

        self.adjudicate_and_mirror_enemies();
        self.check_portal_trigger();
        self.update_boss_room(dt);
        self.update_local_players(dt, p1_input, p2_input);
        self.update_camera();
        self.update_level(dt);
        self.collect_pickups();
        self.resolve_contacts();
        self.sync_shared_entities();
        self.check_end_conditions();
    }

    /// One snapshot out, one (or more) in, every frame.
    fn network_exchange(&mut self) {
        let (damage, snap) = {
            let Some(peer) = &self.network else { return };
            let lp = if self.local_is_p1() { &self.p1 } else { &self.p2 };
            let score = if self.local_is_p1() {
                self.p1_total()
            } else {
                self.p2_total()
            };
            // Only the host carries the seed; a client always sends 0.
            let seed = if self.role == NetRole::Host { self.seed } else { 0 };
            peer.send_player_state(&PlayerSnapshot {
                x: lp.x,
                y: lp.y,
                alive: lp.alive,
                score,
                seed,
                hp: lp.hp,
                vx: lp.vx,
                vy: lp.vy,
                facing_right: lp.facing_right,
                max_hp: lp.max_hp,
                slam_active: lp.slam_active,
                dash_active: lp.dash_active,
                invul_timer: lp.invul_timer,
                flash_on_invul: lp.flash_on_invul,
                action: lp.action,
                frame: lp.frame,
            });
            (peer.take_damage_received(), peer.remote_state())
        };

        if damage > 0 {
            let lp = if self.local_is_p1() {
                &mut self.p1
            } else {
                &mut self.p2
            };
            if lp.alive {
                lp.take_damage(damage, None);
            }
        }

        self.apply_remote_snapshot(snap);
    }

    /// Drive the replica from an authoritative snapshot: snap on large
    /// corrections, smooth on small ones, adopt the map seed exactly once.
    fn apply_remote_snapshot(&mut self, snap: PlayerSnapshot) {
        let remote_is_p1 = !self.local_is_p1();
        let mut slam_ended_at = None;
        {
            let rp = if remote_is_p1 { &mut self.p1 } else { &mut self.p2 };
            let dx = snap.x - rp.x;
            let dy = snap.y - rp.y;
            if dx.abs() > SNAP_DISTANCE || dy.abs() > SNAP_DISTANCE {
                rp.x = snap.x;
                rp.y = snap.y;
            } else {
                rp.x += dx * REPLICA_LERP;
                rp.y += dy * REPLICA_LERP;
            }
            rp.alive = snap.alive;
            rp.hp = snap.hp;
            rp.max_hp = snap.max_hp;
            rp.vx = snap.vx;
            rp.vy = snap.vy;
            rp.facing_right = snap.facing_right;
            if rp.slam_active && !snap.slam_active {
                slam_ended_at = Some((rp.x + rp.w / 2.0, rp.y + rp.h));
            }
            rp.slam_active = snap.slam_active;
            rp.dash_active = snap.dash_active;
            rp.invul_timer = snap.invul_timer;
            rp.flash_on_invul = snap.flash_on_invul;
            rp.action = snap.action;
            rp.frame = snap.frame;
        }
        if let Some((x, y)) = slam_ended_at {
            // The replica's slam landed somewhere we didn't simulate.
            self.effects.spawn_slam_impact(x, y, 100.0);
        }

        // The wire carries one combined score int; unpack it.
        if remote_is_p1 {
            self.p1_orbs = snap.score / 100;
            self.p1_distance = (snap.score % 100 * 10) as f32;
        } else {
            self.p2_orbs = snap.score / 100;
            self.p2_distance = (snap.score % 100 * 10) as f32;
        }

        if self.waiting_for_seed && snap.seed != 0 {
            self.seed = snap.seed;
            self.level = Level::new(snap.seed, true, self.enemy_anim.clone());
            self.waiting_for_seed = false;
            tracing::info!("Adopted host seed {}", snap.seed);
        }
    }

    /// Host: apply client hit reports to its enemies and broadcast the
    /// result. Client: fold the host's enemy deltas into local mirrors.
    fn adjudicate_and_mirror_enemies(&mut self) {
        match self.role {
            NetRole::LocalOnly => {},
            NetRole::Host => {
                let hits = self
                    .network
                    .as_ref()
                    .map(|p| p.take_hits())
                    .unwrap_or_default();
                for (enemy_id, damage) in hits {
                    let mut killed_at = None;
                    let mut hurt_at = None;
                    let mut delta = None;
                    if let Some(e) = self
                        .level
                        .enemies
                        .iter_mut()
                        .find(|e| e.id == enemy_id && e.alive)
                    {
                        if e.take_damage(damage) {
                            killed_at = Some((e.x, e.y));
                        } else {
                            hurt_at = Some((e.x + e.w / 2.0, e.y));
                        }
                        delta = Some(EnemyDelta {
                            id: e.id,
                            x: e.x as i32,
                            y: e.y as i32,
                            facing_right: e.facing_right,
                            hp: e.hp as i32,
                            dead: !e.alive,
                        });
                    }
                    if let Some((x, y)) = killed_at {
                        self.level.spawn_credit(x, y, 1.0);
                    }
                    if let Some((x, y)) = hurt_at {
                        self.effects.spawn_dust(x, y, 3, Color(255, 100, 100));
                    }
                    if let (Some(peer), Some(delta)) = (&self.network, delta) {
                        peer.send_enemy_update(delta);
                    }
                }
            },
            NetRole::Client => {
                let updates = self
                    .network
                    .as_ref()
                    .map(|p| p.take_enemy_updates())
                    .unwrap_or_default();
                let mut dust = Vec::new();
                for d in updates {
                    if let Some(e) = self.level.enemies.iter_mut().find(|e| e.id == d.id) {
                        e.x = d.x as f32;
                        e.y = d.y as f32;
                        e.facing_right = d.facing_right;
                        if (d.hp as f32) < e.hp {
                            e.action = EnemyAction::Hurt;
                            e.invul_timer = 0.2;
                            dust.push((e.x + e.w / 2.0, e.y, Color(255, 100, 100)));
                        }
                        e.hp = d.hp as f32;
                        if d.dead && e.alive {
                            e.alive = false;
                            dust.push((e.x + e.w / 2.0, e.y, Color(150, 150, 150)));
                        }
                    } else if !d.dead {
                        // First sight of a host-spawned enemy.
                        let mut e =
                            Enemy::new(d.id, d.x as f32, d.y as f32, self.enemy_anim.clone());
                        e.facing_right = d.facing_right;
                        e.hp = d.hp as f32;
                        e.max_hp = d.hp as f32;
                        self.level.enemies.push(e);
                        self.level.next_enemy_id = self.level.next_enemy_id.max(d.id + 1);
                    }
                }
                for (x, y, color) in dust {
                    self.effects.spawn_dust(x, y, 3, color);
                }
                self.level.enemies.retain(|e| e.alive);
            },
        }
    }

    fn check_portal_trigger(&mut self) {
        if self.in_boss_room {
            return;
        }
        let trigger = if self.role == NetRole::Client {
            // The host's first boss delta is the client's entry signal.
            self.network.as_ref().is_some_and(|p| p.boss_mirror().active)
        } else {
            match &self.level.portal {
                None => false,
                Some(portal) => {
                    (self.p1.alive && portal.overlaps(self.p1.rect()))
                        || (self.use_p2
                            && self.p2.alive
                            && portal.overlaps(self.p2.rect()))
                },
            }
        };
        if trigger {
            self.enter_boss_room();
        }
    }

    fn enter_boss_room(&mut self) {
        let room = BossRoom::new();
        let boss = Boss::new(
            room.width,
            room.height,
            room.platforms.clone(),
            self.boss_anim.clone(),
        );
        let cx = room.width / 2.0;
        let spawn_y = room.height - 150.0;
        if self.p1_is_local() {
            Self::place_in_room(&mut self.p1, cx, spawn_y);
        }
        if self.use_p2 && self.p2_is_local() {
            Self::place_in_room(&mut self.p2, cx - 40.0, spawn_y);
        }
        self.in_boss_room = true;
        self.boss_room = Some(room);
        self.boss = Some(boss);
        tracing::info!("Boss encounter started");
    }

    fn place_in_room(p: &mut Player, cx: f32, y: f32) {
        p.x = cx - p.w / 2.0;
        p.y = y;
        p.vx = 0.0;
        p.vy = 0.0;
    }

    fn update_boss_room(&mut self, dt: f32) {
        if !self.in_boss_room {
            return;
        }
        if let Some(room) = self.boss_room.as_mut() {
            room.update(dt);
        }
        let Some(mut boss) = self.boss.take() else {
            return;
        };

        // Simulate on the authority, mirror on the client.
        if self.role.is_authority() {
            let mut target = None;
            let bx = boss.x;
            let by = boss.y;
            let mut candidates = vec![&self.p1];
            if self.use_p2 {
                candidates.push(&self.p2);
            }
            for p in candidates {
                if !p.alive {
                    continue;
                }
                let d = dist_sq(p.x, p.y, bx, by);
                if target.is_none_or(|(best, _, _)| d < best) {
                    target = Some((d, p.x + p.w / 2.0, p.y + p.h / 2.0));
                }
            }
            let (tx, ty) = target
                .map(|(_, x, y)| (x, y))
                .unwrap_or((VIRTUAL_W / 2.0, VIRTUAL_H / 2.0));
            boss.update(dt, tx, ty);
        } else if let Some(peer) = &self.network {
            let mirror = peer.boss_mirror();
            boss.hp = mirror.hp;
            if !mirror.defeated {
                boss.x += (mirror.x - boss.x) * BOSS_LERP;
                boss.y += (mirror.y - boss.y) * BOSS_LERP;
                if boss.action != mirror.action {
                    let (lx, ly) = (self.p2.x, self.p2.y);
                    boss.action = mirror.action;
                    boss.frame = mirror.frame;
                    // Replay attack visuals locally; the damage they deal
                    // is still the host's call.
                    match mirror.action {
                        BossAction::Cast => boss.start_arrow_volley(lx, ly),
                        BossAction::Attack => boss.start_platform_fire(),
                        _ => {},
                    }
                }
            }
            if mirror.defeated && !self.boss_defeated {
                self.boss_defeated = true;
                boss.alive = false;
                if let Some(room) = self.boss_room.as_mut() {
                    room.activate_victory();
                }
            }
            boss.update_visuals_only(dt);
        }

        // Boss-to-player damage, adjudicated on the authority. The host
        // notifies the client of damage to its player.
        if boss.alive && self.role.is_authority() {
            let src = boss.x + boss.w / 2.0;
            if self.p1.alive && Self::boss_damage_pass(&mut boss, &mut self.p1, dt) {
                self.p1.take_damage(1, Some(src));
            }
            if self.use_p2
                && self.p2.alive
                && Self::boss_damage_pass(&mut boss, &mut self.p2, dt)
            {
                self.p2.take_damage(1, Some(src));
                if self.role == NetRole::Host
                    && let Some(peer) = &self.network
                {
                    peer.send_damage(1);
                }
            }
        }

        // Players hurting the boss: only while TIRED, only slamming or
        // falling hard.
        if boss.alive && self.role.is_authority() {
            let mut victory = false;
            let use_p2 = self.use_p2;
            let mut attackers = vec![&mut self.p1];
            if use_p2 {
                attackers.push(&mut self.p2);
            }
            for p in attackers {
                if !p.alive || !p.rect().intersects(&boss.rect()) {
                    continue;
                }
                if boss.phase == BossPhase::Tired && (p.slam_active || p.vy > 100.0) {
                    let died = boss.take_damage(1);
                    p.vy = BOSS_BOUNCE_VY;
                    if died {
                        victory = true;
                    }
                }
            }
            if victory {
                self.boss_defeated = true;
                self.p1_orbs += 5;
                if let Some(room) = self.boss_room.as_mut() {
                    room.activate_victory();
                }
                tracing::info!("Boss defeated");
            }
        }

        // Rewards and the way out, both keyed to the locally simulated
        // player(s).
        let p1_local = self.p1_is_local();
        let p2_local = self.use_p2 && self.p2_is_local();
        let local_is_p1 = self.local_is_p1();
        let mut exited = false;
        if let Some(room) = self.boss_room.as_mut() {
            let mut collected = 0;
            if p1_local && self.p1.alive {
                collected += room.collect_credits(self.p1.rect());
            }
            if p2_local && self.p2.alive {
                collected += room.collect_credits(self.p2.rect());
            }
            self.session_credits += collected as f64;

            if self.boss_defeated {
                let local = if local_is_p1 { &self.p1 } else { &self.p2 };
                if room.portal_entered(local.rect()) {
                    exited = true;
                }
            }
        }

        if exited {
            self.exit_boss_room();
        } else {
            if self.role == NetRole::Host
                && let Some(peer) = &self.network
            {
                peer.send_boss_state(
                    boss.hp,
                    self.boss_defeated,
                    boss.x,
                    boss.y,
                    boss.action,
                    boss.frame,
                );
            }
            self.boss = Some(boss);
        }
    }

    /// One boss-sourced damage check for one player: projectile, then
    /// platform fire (on a re-damage cadence), then body contact.
    fn boss_damage_pass(boss: &mut Boss, p: &mut Player, dt: f32) -> bool {
        if boss.consume_projectile_hit(p.rect()) {
            return true;
        }
        if boss.check_platform_fire_damage(p.rect()) {
            p.fire_retrigger -= dt;
            if p.fire_retrigger <= 0.0 {
                p.fire_retrigger = FIRE_RETRIGGER;
                return true;
            }
            return false;
        }
        p.fire_retrigger = 0.0;
        if boss.contact_damage_active() && p.rect().intersects(&boss.rect()) {
            return true;
        }
        false
    }

    fn exit_boss_room(&mut self) {
        self.in_boss_room = false;
        self.boss_room = None;
        self.boss = None;
        self.boss_defeated = false;
        self.level.portal = None;

        let (sx, sy) = self.level.return_safe_pos;
        if self.p1_is_local() {
            Self::place_at_return(&mut self.p1, sx, sy);
        }
        if self.use_p2 && self.p2_is_local() {
            Self::place_at_return(&mut self.p2, sx - 30.0, sy);
        }
        if self.role == NetRole::Client
            && let Some(peer) = &self.network
        {
            peer.clear_boss_mirror();
        }
        tracing::info!("Returned to the overworld");
    }

    fn place_at_return(p: &mut Player, x: f32, y: f32) {
        p.x = x;
        p.y = y - p.h;
        p.vx = 0.0;
        p.vy = 0.0;
        p.slam_active = false;
        p.dash_active = false;
    }

    fn update_local_players(&mut self, dt: f32, p1_input: FrameInput, p2_input: FrameInput) {
        // In a networked session the one local keyboard drives the one
        // local player, whichever slot that is.
        let (p1_in, p2_in) = match self.role {
            NetRole::LocalOnly => (p1_input, p2_input),
            NetRole::Host => (p1_input, FrameInput::none()),
            NetRole::Client => (FrameInput::none(), p1_input),
        };

        if self.p1_is_local() {
            if let Some(room) = &self.boss_room {
                self.p1.update(dt, room, p1_in, &mut self.effects);
            } else {
                self.p1.update(dt, &self.level, p1_in, &mut self.effects);
            }
        }
        if self.use_p2 && self.p2_is_local() {
            if let Some(room) = &self.boss_room {
                self.p2.update(dt, room, p2_in, &mut self.effects);
            } else {
                self.p2.update(dt, &self.level, p2_in, &mut self.effects);
            }
        }
    }

    fn update_camera(&mut self) {
        if self.mode == GameMode::Versus && self.role == NetRole::LocalOnly && self.use_p2 {
            // Independent half-screen cameras; generation follows the
            // furthest one.
            let tx1 = if self.p1.alive { self.p1.x } else { self.p2.x };
            let tx2 = if self.p2.alive { self.p2.x } else { self.p1.x };
            let ty1 = if self.p1.alive { self.p1.y } else { self.p2.y };
            let ty2 = if self.p2.alive { self.p2.y } else { self.p1.y };

            self.cam_p1.0 += (tx1 - SCROLL_OFFSET_X - self.cam_p1.0) * CAM_LERP;
            self.cam_p2.0 += (tx2 - SCROLL_OFFSET_X - self.cam_p2.0) * CAM_LERP;
            self.cam_p1.1 += (ty1 - VIRTUAL_H / 4.0 - self.cam_p1.1) * CAM_LERP;
            self.cam_p2.1 += (ty2 - VIRTUAL_H / 4.0 - self.cam_p2.1) * CAM_LERP;

            self.cam_x = self.cam_p1.0.max(self.cam_p2.0);
            self.cam_y = 0.0;
            return;
        }

        let target_x = match self.mode {
            GameMode::Single => {
                if self.local_is_p1() {
                    self.p1.x
                } else {
                    self.p2.x
                }
            },
            _ if self.role.is_networked() => {
                let (local, remote) = if self.local_is_p1() {
                    (&self.p1, &self.p2)
                } else {
                    (&self.p2, &self.p1)
                };
                if local.alive {
                    local.x
                } else if remote.alive {
                    remote.x
                } else {
                    local.x
                }
            },
            _ => {
                if self.p1.alive && self.p2.alive {
                    self.p1.x.max(self.p2.x)
                } else if self.p1.alive {
                    self.p1.x
                } else if self.p2.alive {
                    self.p2.x
                } else {
                    self.p1.x
                }
            },
        };
        self.cam_x += (target_x - SCROLL_OFFSET_X - self.cam_x) * CAM_LERP;
        self.cam_y = 0.0;
    }

    fn update_level(&mut self, dt: f32) {
        // Generation tracks the furthest player, not just the camera, so a
        // networked partner far ahead never outruns the terrain.
        let mut gen_x = self.cam_x;
        if self.role.is_networked() {
            let furthest = self.p1.x.max(self.p2.x);
            if furthest > self.cam_x + SCROLL_OFFSET_X {
                gen_x = furthest - SCROLL_OFFSET_X;
            }
        }
        self.level.update(dt, gen_x);

        let cam_rect = Rect::new(self.cam_x, self.cam_y, VIRTUAL_W, VIRTUAL_H);
        let spike_deaths = self.level.update_enemies(dt, cam_rect);
        if self.role.is_authority() {
            for (x, y) in spike_deaths {
                self.level.spawn_credit(x, y, 0.5);
            }
        }

        if self.p1.alive && self.p1_is_local() {
            self.p1_distance = self.p1_distance.max(self.p1.x - self.base_x);
        }
        if self.use_p2 && self.p2.alive && self.p2_is_local() {
            self.p2_distance = self.p2_distance.max(self.p2.x - self.base_x);
        }
    }

    fn collect_pickups(&mut self) {
        let p1_rect = (self.p1.alive).then(|| self.p1.rect());
        let p2_rect = (self.use_p2 && self.p2.alive).then(|| self.p2.rect());

        // Dropped credits go to locally simulated players only; the
        // partner's pickups reach us through its score field.
        let p1_collects = self.p1_is_local();
        let p2_collects = self.p2_is_local();
        let mut gained = 0.0;
        let mut credit_texts = Vec::new();
        let mut credits = std::mem::take(&mut self.level.credits);
        credits.retain(|c| {
            let r = c.rect();
            let taken = (p1_collects && p1_rect.is_some_and(|p| p.intersects(&r)))
                || (p2_collects && p2_rect.is_some_and(|p| p.intersects(&r)));
            if taken {
                gained += c.value;
                credit_texts.push((c.x, c.y, c.value));
            }
            !taken
        });
        self.level.credits = credits;
        self.session_credits += gained;
        for (x, y, value) in credit_texts {
            self.effects.spawn_credit_text(x, y, value);
        }

        // Point orbs: +100 to whoever touches them, both players tracked
        // on both sides of the wire.
        let mut orb_texts = Vec::new();
        let mut orbs = std::mem::take(&mut self.level.orbs);
        orbs.retain(|orb| {
            if p1_rect.is_some_and(|p| p.intersects(orb)) {
                self.p1_orbs += 1;
                orb_texts.push((orb.x, orb.y));
                false
            } else if p2_rect.is_some_and(|p| p.intersects(orb)) {
                self.p2_orbs += 1;
                orb_texts.push((orb.x, orb.y));
                false
            } else {
                true
            }
        });
        self.level.orbs = orbs;
        for (x, y) in orb_texts {
            self.effects.spawn_text(x, y, "+100 PTS", COL_ACCENT_3);
        }

        let mut heal_texts = Vec::new();
        let mut health_orbs = std::mem::take(&mut self.level.health_orbs);
        health_orbs.retain(|orb| {
            if p1_rect.is_some_and(|p| p.intersects(orb)) {
                heal_texts.push((orb.x, orb.y, self.p1.heal()));
                false
            } else if p2_rect.is_some_and(|p| p.intersects(orb)) {
                heal_texts.push((orb.x, orb.y, self.p2.heal()));
                false
            } else {
                true
            }
        });
        self.level.health_orbs = health_orbs;
        for (x, y, healed) in heal_texts {
            if healed {
                self.effects.spawn_text(x, y, "+1 HP", Color(50, 255, 50));
            } else {
                self.effects.spawn_text(x, y, "MAX HP", Color(200, 255, 200));
            }
        }
    }

    fn resolve_contacts(&mut self) {
        // The client resolves only its own player; the host covers both so
        // the replica's hits are at least visually immediate.
        if self.role != NetRole::Client {
            self.handle_world_contacts(Slot::P1);
        }
        if self.use_p2 {
            self.handle_world_contacts(Slot::P2);
        }

        // Slam impacts resolve wherever the pending flag can be set: the
        // host for both slots, the client for its own player.
        if self.role != NetRole::Client {
            self.resolve_slam_for(Slot::P1);
        }
        if self.use_p2 {
            self.resolve_slam_for(Slot::P2);
        }
    }

    /// Hazards, enemies, and falling out of the world, for one player.
    fn handle_world_contacts(&mut self, slot: Slot) {
        let role = self.role;
        let p = match slot {
            Slot::P1 => &mut self.p1,
            Slot::P2 => &mut self.p2,
        };
        if !p.alive || p.is_dying {
            return;
        }

        if p.y > VIRTUAL_H + FALL_OUT_MARGIN {
            p.take_damage(1, None);
            if p.alive {
                p.respawn_at_last_safe();
            }
            return;
        }

        let r = p.rect();
        for hazard in &self.level.hazards {
            if r.intersects(hazard) {
                if p.dash_active {
                    continue;
                }
                let src = hazard.center_x();
                p.take_damage(1, Some(src));
                return;
            }
        }

        let mut kill_credit = None;
        let mut hit_report = None;
        for e in &mut self.level.enemies {
            if !e.alive || !r.intersects(&e.rect()) {
                continue;
            }
            if p.dash_active {
                continue;
            }

            let is_above = p.y + p.h < e.y + e.h * 0.5 + 5.0;
            let is_falling = p.vy > 0.0;
            if p.slam_active || p.pending_slam_impact || (is_falling && is_above) {
                let damage = if p.slam_active || p.pending_slam_impact {
                    e.slam_damage()
                } else {
                    0.5
                };
                if role.is_authority() {
                    if e.take_damage(damage) {
                        kill_credit = Some((e.x, e.y));
                    }
                } else {
                    // Clients never adjudicate enemies; report the hit.
                    hit_report = Some((e.id, damage));
                }
                p.vy = STOMP_BOUNCE_VY;
                p.invul_timer = 0.2;
                p.flash_on_invul = false;
                p.slam_cooldown = 0.0;
                p.slam_active = false;
            } else {
                let src = e.x + e.w / 2.0;
                p.take_damage(1, Some(src));
            }
            break;
        }

        if let Some((x, y)) = kill_credit {
            self.level.spawn_credit(x, y, 1.0);
        }
        if let Some((id, damage)) = hit_report
            && let Some(peer) = &self.network
        {
            peer.send_hit(id, damage);
        }
    }

    /// Consume a pending slam landing: radial damage around the impact
    /// point, scaled by fall distance.
    fn resolve_slam_for(&mut self, slot: Slot) {
        let role = self.role;
        let (cx, cy, power) = {
            let p = match slot {
                Slot::P1 => &mut self.p1,
                Slot::P2 => &mut self.p2,
            };
            if !p.pending_slam_impact {
                return;
            }
            p.pending_slam_impact = false;
            // Brief grace window after the impact; no flicker, unlike a
            // real hit.
            p.invul_timer = 0.5;
            p.flash_on_invul = false;
            (p.x + p.w / 2.0, p.y + p.h, p.slam_impact_power)
        };

        if power > 150.0 {
            self.effects.shake(0.2);
        }

        if !role.is_authority() {
            return;
        }
        let radius = SLAM_BASE_RADIUS + power * SLAM_RADIUS_PER_HEIGHT;
        let mut credits = Vec::new();
        let mut dust = Vec::new();
        for e in &mut self.level.enemies {
            if !e.alive {
                continue;
            }
            let ex = e.x + e.w / 2.0;
            let ey = e.y + e.h / 2.0;
            if dist_sq(ex, ey, cx, cy) <= radius * radius {
                let damage = e.slam_damage();
                if e.take_damage(damage) {
                    credits.push((e.x, e.y));
                } else {
                    dust.push((ex, e.y));
                }
            }
        }
        for (x, y) in credits {
            self.level.spawn_credit(x, y, 1.0);
        }
        for (x, y) in dust {
            self.effects.spawn_dust(x, y, 3, Color(255, 100, 100));
        }
    }

    /// End-of-frame authoritative broadcast: every live (or just-died)
    /// enemy, last-value-wins.
    fn sync_shared_entities(&mut self) {
        if self.role != NetRole::Host {
            return;
        }
        let Some(peer) = &self.network else { return };
        for e in &self.level.enemies {
            peer.send_enemy_update(EnemyDelta {
                id: e.id,
                x: e.x as i32,
                y: e.y as i32,
                facing_right: e.facing_right,
                hp: e.hp as i32,
                dead: !e.alive,
            });
        }
    }

    fn check_end_conditions(&mut self) {
        if self.game_over {
            return;
        }
        match self.mode {
            GameMode::Single => {
                let (alive, score) = if self.local_is_p1() {
                    (self.p1.alive, self.p1_total())
                } else {
                    (self.p2.alive, self.p2_total())
                };
                if !alive {
                    let name = self.player_name.clone();
                    self.finish(&name, score, "GAME OVER");
                }
            },
            GameMode::Coop => {
                if !self.p1.alive && !self.p2.alive {
                    let score = self.p1_total() + self.p2_total();
                    self.finish("Team", score, "MISSION FAILED");
                }
            },
            GameMode::Versus => {
                if !self.p1.alive && !self.p2.alive {
                    let (a, b) = (self.p1_total(), self.p2_total());
                    let winner = if a == b {
                        "DRAW"
                    } else if a > b {
                        "P1 WINS"
                    } else {
                        "P2 WINS"
                    };
                    self.finish(winner, a.max(b), winner);
                }
            },
        }
    }

    /// Fires exactly once per session: leaderboard entry, credit
    /// persistence, and the game-over broadcast.
    fn finish(&mut self, name: &str, score: i64, text: &str) {
        self.game_over = true;
        self.winner_text = text.to_string();

        self.lb.add_score(self.mode, name, score);
        if let Err(e) = self.store.save_leaderboard(&self.lb) {
            tracing::warn!("Failed to persist leaderboard: {e}");
        }
        if self.session_credits > 0.0 {
            self.save.credits += self.session_credits;
            if let Err(e) = self.store.save_save(&self.save) {
                tracing::warn!("Failed to persist credits: {e}");
            }
        }
        if let Some(peer) = &self.network {
            peer.send_game_over(&self.winner_text);
        }
    }

    pub fn draw(&self, renderer: &mut dyn Renderer) {
        if self.waiting_for_seed {
            renderer.draw_text(
                "SYNCING MAP DATA...",
                VIRTUAL_W / 2.0 - 70.0,
                VIRTUAL_H / 2.0,
                COL_ACCENT_1,
            );
            return;
        }

        let (shake_x, shake_y) = self.effects.shake_offset();
        let (cam_x, cam_y) = if self.in_boss_room {
            (0.0, 0.0)
        } else {
            (self.cam_x + shake_x, self.cam_y + shake_y)
        };

        if self.in_boss_room {
            if let Some(room) = &self.boss_room {
                room.draw(renderer);
            }
            if let Some(boss) = &self.boss {
                boss.draw(renderer);
            }
        } else {
            self.level.draw(renderer, cam_x, cam_y);
        }

        self.p1.draw(renderer, "p1", cam_x, cam_y);
        if self.use_p2 {
            self.p2.draw(renderer, "p2", cam_x, cam_y);
        }
        self.effects.draw(renderer, cam_x, cam_y);

        if self.game_over {
            renderer.draw_text(
                &self.winner_text,
                VIRTUAL_W / 2.0 - 60.0,
                VIRTUAL_H / 2.0 - 40.0,
                COL_ACCENT_3,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use slimed_core::persistence::{PersistenceError, Settings};
    use slimed_core::test_helpers::MemoryStore;

    use crate::boss_room::Portal;

    const DT: f32 = 1.0 / 60.0;

    /// Handle kept by the test so persistence writes stay inspectable
    /// after the session takes its boxed copy.
    #[derive(Clone)]
    struct SharedStore(Rc<MemoryStore>);

    impl Persistence for SharedStore {
        fn load_save(&self) -> SaveData {
            self.0.load_save()
        }
        fn save_save(&self, data: &SaveData) -> Result<(), PersistenceError> {
            self.0.save_save(data)
        }
        fn load_leaderboard(&self) -> Leaderboard {
            self.0.load_leaderboard()
        }
        fn save_leaderboard(&self, lb: &Leaderboard) -> Result<(), PersistenceError> {
            self.0.save_leaderboard(lb)
        }
        fn load_settings(&self) -> Settings {
            self.0.load_settings()
        }
        fn save_settings(&self, settings: &Settings) -> Result<(), PersistenceError> {
            self.0.save_settings(settings)
        }
    }

    fn session_with(cfg: SessionConfig) -> (Session, Rc<MemoryStore>) {
        let store = Rc::new(MemoryStore::default());
        let session = Session::new(cfg, Box::new(SharedStore(Rc::clone(&store))), None);
        (session, store)
    }

    fn local_single() -> (Session, Rc<MemoryStore>) {
        session_with(SessionConfig::default())
    }

    fn client_coop() -> (Session, Rc<MemoryStore>) {
        session_with(SessionConfig {
            mode: GameMode::Coop,
            role: NetRole::Client,
            ..Default::default()
        })
    }

    fn snapshot(x: f32, y: f32, seed: u64) -> PlayerSnapshot {
        PlayerSnapshot {
            x,
            y,
            seed,
            ..Default::default()
        }
    }

    #[test]
    fn client_blocks_until_seed_arrives_then_adopts_once() {
        let (mut s, _) = client_coop();
        assert!(s.waiting_for_seed);

        // A zero seed (client-originated snapshot) changes nothing.
        s.apply_remote_snapshot(snapshot(0.0, 0.0, 0));
        assert!(s.waiting_for_seed);

        s.apply_remote_snapshot(snapshot(0.0, 0.0, 42));
        assert!(!s.waiting_for_seed);
        assert_eq!(s.seed, 42);
        assert!(s.level.is_client);

        // A later, different seed must not rebuild the level.
        s.apply_remote_snapshot(snapshot(0.0, 0.0, 99));
        assert_eq!(s.seed, 42, "seed adoption happens exactly once");
    }

    #[test]
    fn replica_lerps_small_corrections_and_snaps_large_ones() {
        let (mut s, _) = client_coop();
        // On a client, p1 is the remote replica.
        s.p1.x = 100.0;
        s.p1.y = 100.0;

        s.apply_remote_snapshot(snapshot(110.0, 100.0, 0));
        let lerped = 100.0 + 10.0 * REPLICA_LERP;
        assert!((s.p1.x - lerped).abs() < 0.001, "small delta smooths");

        let before = s.p1.x;
        s.apply_remote_snapshot(snapshot(before + 200.0, 100.0, 0));
        assert_eq!(s.p1.x, before + 200.0, "large delta snaps");
    }

    #[test]
    fn wire_score_unpacks_into_orbs_and_distance() {
        let (mut s, _) = client_coop();
        let mut snap = snapshot(0.0, 0.0, 0);
        snap.score = 305;
        s.apply_remote_snapshot(snap);
        assert_eq!(s.p1_orbs, 3);
        assert_eq!(s.p1_distance, 50.0);
    }

    #[test]
    fn slam_impact_kills_walkers_in_radius() {
        let (mut s, _) = local_single();
        // Impact center lands at (100, 300) with 200 px of fall behind it.
        s.p1.x = 100.0 - s.p1.w / 2.0;
        s.p1.y = 300.0 - s.p1.h;
        s.p1.pending_slam_impact = true;
        s.p1.slam_impact_power = 200.0;

        let radius = SLAM_BASE_RADIUS + 200.0 * SLAM_RADIUS_PER_HEIGHT;
        let mut near = Enemy::new(1, 0.0, 0.0, EnemyAnimSet::default());
        near.x = 100.0 + radius - near.w / 2.0 - 5.0;
        near.y = 300.0 - near.h / 2.0;
        near.hp = 3.0;
        near.max_hp = 3.0;
        let mut far = Enemy::new(2, 0.0, 0.0, EnemyAnimSet::default());
        far.x = 100.0 + radius + 50.0;
        far.y = 300.0;
        s.level.enemies.push(near);
        s.level.enemies.push(far);

        s.resolve_slam_for(Slot::P1);

        assert!(!s.level.enemies[0].alive, "walker inside the radius dies outright");
        assert!(s.level.enemies[1].alive, "walker outside is untouched");
        assert_eq!(s.level.credits.len(), 1, "kill drops a credit");
        assert_eq!(s.p1.invul_timer, 0.5);
        assert!(!s.p1.flash_on_invul, "impact grace does not flicker");
        assert!(!s.p1.pending_slam_impact);
    }

    #[test]
    fn finish_persists_exactly_once() {
        let (mut s, store) = local_single();
        s.session_credits = 5.0;
        s.p1.alive = false;

        s.update(DT, FrameInput::none(), FrameInput::none());
        assert!(s.game_over);
        assert_eq!(s.winner_text, "GAME OVER");
        assert_eq!(*store.save_writes.borrow(), 1);
        assert_eq!(*store.leaderboard_writes.borrow(), 1);
        assert_eq!(store.save.borrow().credits, 5.0);
        assert_eq!(store.leaderboard.borrow().single.len(), 1);

        // Another frame changes nothing.
        s.update(DT, FrameInput::none(), FrameInput::none());
        assert_eq!(*store.save_writes.borrow(), 1);
        assert_eq!(*store.leaderboard_writes.borrow(), 1);
    }

    #[test]
    fn versus_compares_scores_when_both_fall() {
        let (mut s, store) = session_with(SessionConfig {
            mode: GameMode::Versus,
            local_two_players: true,
            ..Default::default()
        });
        s.p1_orbs = 2;
        s.p2_orbs = 1;
        s.p1.alive = false;
        s.p2.alive = false;

        s.update(DT, FrameInput::none(), FrameInput::none());
        assert!(s.game_over);
        assert_eq!(s.winner_text, "P1 WINS");
        let lb = store.leaderboard.borrow();
        assert_eq!(lb.versus[0].score, 200);
        assert_eq!(lb.versus[0].name, "P1 WINS");
    }

    #[test]
    fn coop_ends_only_when_both_are_down() {
        let (mut s, _) = session_with(SessionConfig {
            mode: GameMode::Coop,
            local_two_players: true,
            ..Default::default()
        });
        s.p1.alive = false;
        s.update(DT, FrameInput::none(), FrameInput::none());
        assert!(!s.game_over, "one survivor keeps the mission alive");

        s.p2.alive = false;
        s.update(DT, FrameInput::none(), FrameInput::none());
        assert!(s.game_over);
        assert_eq!(s.winner_text, "MISSION FAILED");
    }

    #[test]
    fn portal_overlap_starts_the_boss_fight() {
        let (mut s, _) = local_single();
        s.level.portal = Some(Portal::new(s.p1.x, s.p1.y));

        s.update(DT, FrameInput::none(), FrameInput::none());
        assert!(s.in_boss_room);
        assert!(s.boss.is_some());
        assert!(s.boss_room.is_some());
        let room = s.boss_room.as_ref().unwrap();
        assert!(s.p1.x > 0.0 && s.p1.x < room.width, "player moved into the arena");
    }

    #[test]
    fn boss_victory_spawns_rewards_and_scores() {
        let (mut s, _) = local_single();
        s.level.portal = Some(Portal::new(s.p1.x, s.p1.y));
        s.update(DT, FrameInput::none(), FrameInput::none());
        assert!(s.in_boss_room);

        // Force the kill shot: tired boss under a slamming player.
        {
            let boss = s.boss.as_mut().unwrap();
            boss.hp = 1;
            boss.phase = BossPhase::Tired;
            boss.invul_timer = 0.0;
            s.p1.x = boss.x;
            s.p1.y = boss.y;
            s.p1.slam_active = true;
            s.p1.alive = true;
        }
        let orbs_before = s.p1_orbs;
        s.update_boss_room(DT);

        assert!(s.boss_defeated);
        assert_eq!(s.p1_orbs, orbs_before + 5);
        assert!(s.boss_room.as_ref().unwrap().victory_claimed);
    }

    #[test]
    fn fall_out_respawns_at_last_safe_with_one_damage() {
        let (mut s, _) = local_single();
        s.p1.last_safe_x = 150.0;
        s.p1.last_safe_y = GROUND_LEVEL - 60.0;
        s.p1.y = VIRTUAL_H + FALL_OUT_MARGIN + 10.0;
        let hp = s.p1.hp;

        s.handle_world_contacts(Slot::P1);
        assert_eq!(s.p1.hp, hp - 1);
        assert_eq!(s.p1.x, 150.0);
        assert!(s.p1.y < GROUND_LEVEL);
    }

    #[test]
    fn dash_passes_through_hazards() {
        let (mut s, _) = local_single();
        s.level.hazards.push(s.p1.rect());
        s.p1.dash_active = true;
        let hp = s.p1.hp;
        s.handle_world_contacts(Slot::P1);
        assert_eq!(s.p1.hp, hp, "dashing through spikes is free");
    }

    #[test]
    fn stomp_kills_and_bounces() {
        let (mut s, _) = local_single();
        let mut e = Enemy::new(3, s.p1.x, s.p1.y + s.p1.h - 2.0, EnemyAnimSet::default());
        e.h = 32.0;
        s.level.enemies.push(e);
        s.p1.vy = 200.0;

        s.handle_world_contacts(Slot::P1);
        assert_eq!(s.p1.vy, STOMP_BOUNCE_VY);
        // Stomp damage is 0.5 against a 1 hp walker: survives the first hit.
        assert!(s.level.enemies[0].alive);
        assert_eq!(s.level.enemies[0].hp, 0.5);
    }

    #[test]
    fn enemy_contact_from_the_side_hurts_the_player() {
        let (mut s, _) = local_single();
        let e = Enemy::new(4, s.p1.x + 5.0, s.p1.y, EnemyAnimSet::default());
        s.level.enemies.push(e);
        s.p1.vy = 0.0;
        let hp = s.p1.hp;

        s.handle_world_contacts(Slot::P1);
        assert_eq!(s.p1.hp, hp - 1);
        assert!(s.p1.knockback_timer > 0.0);
    }

    #[test]
    fn max_step_clamps_stalled_frames() {
        let (mut s, _) = local_single();
        s.update(10.0, FrameInput::none(), FrameInput::none());
        assert!(s.elapsed <= MAX_STEP + f32::EPSILON);
    }

    #[test]
    fn long_run_holds_core_invariants() {
        let (mut s, _) = local_single();
        let hold_right = FrameInput {
            right: true,
            jump: true,
            ..Default::default()
        };
        for _ in 0..(5 * 60) {
            s.update(DT, hold_right, FrameInput::none());
            assert!(s.p1.hp >= 0 && s.p1.hp <= s.p1.max_hp);
            assert!(!(s.p1.slam_active && s.p1.dash_active));
            assert!(s.p1.x.is_finite() && s.p1.y.is_finite());
        }
        assert!(
            s.level.generated_right_x > 800.0,
            "generation kept pace with the session"
        );
        if !s.p1.alive {
            assert!(s.game_over, "a dead single player ends the session");
        }
    }
}
