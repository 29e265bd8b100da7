//! Peer connection lifecycle.
//!
//! One ordered TCP stream per session. The host listens and accepts exactly
//! one client, broadcasting a discovery beacon while unconnected; the client
//! makes one outbound connection. All per-frame socket traffic is
//! non-blocking so the simulation never stalls: `WouldBlock` means "nothing
//! this frame", a zero-byte read or any hard error means the peer is gone.
//!
//! A single background worker (accept loop) is the only extra thread. It
//! publishes the accepted socket under the one mutex shared with the frame
//! loop; a stop flag ends it. On peer loss the host resets just the
//! connection and keeps listening so a new client can join; the client
//! closes the session outright.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use slimed_core::anim::BossAction;
use slimed_core::modes::NetRole;

use crate::discovery::RoomScanner;
use crate::protocol::{self, EnemyDelta, PlayerSnapshot, WireMessage};

/// Default TCP port for game sessions.
pub const GAME_PORT: u16 = 50007;

/// Seconds between discovery beacons while hosting unconnected.
const BEACON_INTERVAL: Duration = Duration::from_secs(1);
/// Accept-loop poll cadence.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Client-side mirror of the host's boss, merged from `B|` deltas.
#[derive(Debug, Clone)]
pub struct BossMirror {
    /// Latched once the first boss delta arrives; the client uses this as
    /// its "the fight has started" trigger.
    pub active: bool,
    pub hp: i32,
    pub defeated: bool,
    pub x: f32,
    pub y: f32,
    pub action: BossAction,
    pub frame: u32,
}

impl Default for BossMirror {
    fn default() -> Self {
        Self {
            active: false,
            hp: 5,
            defeated: false,
            x: 0.0,
            y: 0.0,
            action: BossAction::Idle,
            frame: 0,
        }
    }
}

/// Everything touched by both the frame loop and the accept worker.
struct Shared {
    socket: Option<TcpStream>,
    connected: bool,
    stop: bool,
    broadcasting: bool,
    broadcast_mode: String,
    recv_buffer: String,
    remote_state: PlayerSnapshot,
    enemy_updates: Vec<EnemyDelta>,
    hits: Vec<(i64, f32)>,
    damage_queue: i32,
    game_over: Option<String>,
    start_triggered: bool,
    lobby_exit: bool,
    kicked: bool,
    remote_lobby_mode: Option<String>,
    char_select: (u8, u8),
    boss: BossMirror,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            socket: None,
            connected: false,
            stop: false,
            broadcasting: false,
            broadcast_mode: "versus".to_string(),
            recv_buffer: String::new(),
            remote_state: PlayerSnapshot::default(),
            enemy_updates: Vec::new(),
            hits: Vec::new(),
            damage_queue: 0,
            game_over: None,
            start_triggered: false,
            lobby_exit: false,
            kicked: false,
            remote_lobby_mode: None,
            char_select: (3, 0),
            boss: BossMirror::default(),
        }
    }
}

pub struct NetworkPeer {
    role: NetRole,
    shared: Arc<Mutex<Shared>>,
    local_addr: Option<SocketAddr>,
}

impl NetworkPeer {
    /// Start hosting: bind and listen synchronously (so port conflicts
    /// surface to the caller), then hand the listener to the accept worker.
    /// Port 0 binds an ephemeral port; see [`NetworkPeer::local_addr`].
    pub fn host(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr().ok();

        let shared = Arc::new(Mutex::new(Shared {
            broadcasting: true,
            ..Shared::default()
        }));

        let scanner = match RoomScanner::new() {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!("Discovery beacon unavailable: {e}");
                None
            },
        };

        let worker_shared = Arc::clone(&shared);
        thread::spawn(move || accept_worker(listener, scanner, worker_shared));

        tracing::info!("Hosting on {:?}", local_addr);
        Ok(Self {
            role: NetRole::Host,
            shared,
            local_addr,
        })
    }

    /// Connect to a host. The blocking connect runs on a short-lived
    /// background thread; watch [`NetworkPeer::is_connected`] /
    /// [`NetworkPeer::is_closed`] for the outcome.
    pub fn join(host_ip: &str, port: u16) -> Self {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let worker_shared = Arc::clone(&shared);
        let target = format!("{host_ip}:{port}");
        thread::spawn(move || match TcpStream::connect(&target) {
            Ok(stream) => {
                if stream.set_nonblocking(true).is_err() {
                    worker_shared.lock().unwrap().stop = true;
                    return;
                }
                let mut shared = worker_shared.lock().unwrap();
                shared.socket = Some(stream);
                shared.connected = true;
                tracing::info!("Connected to {target}");
            },
            Err(e) => {
                tracing::warn!("Connect to {target} failed: {e}");
                worker_shared.lock().unwrap().stop = true;
            },
        });
        Self {
            role: NetRole::Client,
            shared,
            local_addr: None,
        }
    }

    pub fn role(&self) -> NetRole {
        self.role
    }

    /// Bound listener address (host only). Tests host on port 0 and read
    /// the real port from here.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().unwrap().connected
    }

    /// True once the session is permanently down (client disconnect, kick,
    /// or explicit close). The host never reports closed from peer loss.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().unwrap().stop
    }

    /// Mode advertised by the discovery beacon while hosting.
    pub fn set_broadcast_mode(&self, mode: &str) {
        self.shared.lock().unwrap().broadcast_mode = mode.to_string();
    }

    /// Drain the socket and route complete records. Call once per frame.
    pub fn poll(&self) {
        let mut shared = self.shared.lock().unwrap();
        let mut buf = [0u8; 4096];
        let read_result = {
            let Some(stream) = shared.socket.as_ref() else {
                return;
            };
            let mut reader: &TcpStream = stream;
            reader.read(&mut buf)
        };
        let chunk = match read_result {
            Ok(0) => {
                tracing::info!("Peer closed the connection");
                self.teardown(&mut shared);
                return;
            },
            Ok(n) => String::from_utf8_lossy(&buf[..n]).into_owned(),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                tracing::info!("Read failed: {e}");
                self.teardown(&mut shared);
                return;
            },
        };
        shared.recv_buffer.push_str(&chunk);

        while let Some(idx) = shared.recv_buffer.find('\n') {
            let line: String = shared.recv_buffer.drain(..=idx).collect();
            let line = line.trim_end_matches('\n');
            if line.is_empty() {
                continue;
            }
            match protocol::decode(line) {
                Ok(msg) => {
                    if self.route(&mut shared, msg) {
                        return;
                    }
                },
                Err(e) => tracing::trace!("Dropping malformed record: {e}"),
            }
        }
    }

    /// Apply one decoded message. Returns true if the connection was torn
    /// down (remaining buffered lines are discarded with it).
    fn route(&self, shared: &mut Shared, msg: WireMessage) -> bool {
        match msg {
            WireMessage::Kick => {
                shared.kicked = true;
                self.close_locked(shared);
                return true;
            },
            WireMessage::GameOver { text } => shared.game_over = Some(text),
            WireMessage::LobbyMode { mode } => shared.remote_lobby_mode = Some(mode),
            WireMessage::Start => shared.start_triggered = true,
            WireMessage::LobbyExit => shared.lobby_exit = true,
            WireMessage::Damage { amount } => shared.damage_queue += amount,
            WireMessage::CharSelect { color, ability } => {
                shared.char_select = (color, ability);
            },
            WireMessage::Hit { enemy_id, damage } => shared.hits.push((enemy_id, damage)),
            WireMessage::EnemyUpdate(delta) => shared.enemy_updates.push(delta),
            WireMessage::BossState(delta) => {
                shared.boss.active = true;
                shared.boss.hp = delta.hp;
                shared.boss.defeated = delta.defeated;
                if let Some((x, y)) = delta.pos {
                    shared.boss.x = x as f32;
                    shared.boss.y = y as f32;
                }
                if let Some((action, frame)) = delta.anim {
                    shared.boss.action = action;
                    shared.boss.frame = frame;
                }
            },
            WireMessage::PlayerState(snap) => shared.remote_state = snap,
        }
        false
    }

    fn send(&self, msg: &WireMessage) {
        let mut shared = self.shared.lock().unwrap();
        if !shared.connected {
            return;
        }
        let line = protocol::encode(msg) + "\n";
        let write_result = {
            let Some(stream) = shared.socket.as_ref() else {
                return;
            };
            let mut writer: &TcpStream = stream;
            writer.write_all(line.as_bytes())
        };
        match write_result {
            Ok(()) => {},
            // A full send buffer drops this frame's message; the next frame
            // carries fresher state anyway.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {},
            Err(e) => {
                tracing::info!("Send failed: {e}");
                self.teardown(&mut shared);
            },
        }
    }

    pub fn send_player_state(&self, snap: &PlayerSnapshot) {
        self.send(&WireMessage::PlayerState(snap.clone()));
    }

    /// Client -> host hit report; the client is never authoritative for
    /// enemies, so damage is adjudicated on the host.
    pub fn send_hit(&self, enemy_id: i64, damage: f32) {
        self.send(&WireMessage::Hit { enemy_id, damage });
    }

    /// Host -> client: boss/hazard damage to apply to the client's player.
    pub fn send_damage(&self, amount: i32) {
        if self.role == NetRole::Host {
            self.send(&WireMessage::Damage { amount });
        }
    }

    pub fn send_game_over(&self, text: &str) {
        self.send(&WireMessage::GameOver {
            text: text.to_string(),
        });
    }

    pub fn send_lobby_mode(&self, mode: &str) {
        self.send(&WireMessage::LobbyMode {
            mode: mode.to_string(),
        });
    }

    pub fn send_start(&self) {
        self.send(&WireMessage::Start);
    }

    pub fn send_char_select(&self, color: u8, ability: u8) {
        self.send(&WireMessage::CharSelect { color, ability });
    }

    pub fn send_enemy_update(&self, delta: EnemyDelta) {
        self.send(&WireMessage::EnemyUpdate(delta));
    }

    pub fn send_boss_state(
        &self,
        hp: i32,
        defeated: bool,
        x: f32,
        y: f32,
        action: BossAction,
        frame: u32,
    ) {
        self.send(&WireMessage::BossState(crate::protocol::BossDelta {
            hp,
            defeated,
            pos: Some((x as i32, y as i32)),
            anim: Some((action, frame)),
        }));
    }

    pub fn send_lobby_exit(&self) {
        self.send(&WireMessage::LobbyExit);
    }

    /// Kick the connected client and reopen the lobby slot.
    pub fn kick_client(&self) {
        self.send(&WireMessage::Kick);
        thread::sleep(Duration::from_millis(100));
        self.reset_connection();
    }

    /// Latest remote player snapshot (last-value-wins).
    pub fn remote_state(&self) -> PlayerSnapshot {
        self.shared.lock().unwrap().remote_state.clone()
    }

    pub fn take_enemy_updates(&self) -> Vec<EnemyDelta> {
        std::mem::take(&mut self.shared.lock().unwrap().enemy_updates)
    }

    pub fn take_hits(&self) -> Vec<(i64, f32)> {
        std::mem::take(&mut self.shared.lock().unwrap().hits)
    }

    /// Accumulated host-reported damage since the last call.
    pub fn take_damage_received(&self) -> i32 {
        std::mem::take(&mut self.shared.lock().unwrap().damage_queue)
    }

    pub fn take_game_over(&self) -> Option<String> {
        self.shared.lock().unwrap().game_over.take()
    }

    pub fn take_start_triggered(&self) -> bool {
        std::mem::take(&mut self.shared.lock().unwrap().start_triggered)
    }

    pub fn take_lobby_exit(&self) -> bool {
        std::mem::take(&mut self.shared.lock().unwrap().lobby_exit)
    }

    pub fn was_kicked(&self) -> bool {
        self.shared.lock().unwrap().kicked
    }

    pub fn remote_lobby_mode(&self) -> Option<String> {
        self.shared.lock().unwrap().remote_lobby_mode.clone()
    }

    pub fn remote_char_select(&self) -> (u8, u8) {
        self.shared.lock().unwrap().char_select
    }

    pub fn boss_mirror(&self) -> BossMirror {
        self.shared.lock().unwrap().boss.clone()
    }

    /// Forget the mirrored boss; the next boss delta re-latches it. Called
    /// when the client leaves the boss room so the fight doesn't re-trigger.
    pub fn clear_boss_mirror(&self) {
        self.shared.lock().unwrap().boss = BossMirror::default();
    }

    /// Drop only the connection: the listener stays up, the beacon resumes,
    /// and a fresh client can join without restarting the host.
    pub fn reset_connection(&self) {
        let mut shared = self.shared.lock().unwrap();
        self.reset_connection_locked(&mut shared);
    }

    fn reset_connection_locked(&self, shared: &mut Shared) {
        if let Some(sock) = shared.socket.take() {
            let _ = sock.shutdown(Shutdown::Both);
        }
        shared.connected = false;
        shared.broadcasting = true;
        shared.recv_buffer.clear();
        shared.remote_state.alive = true;
        shared.boss.active = false;
    }

    fn close_locked(&self, shared: &mut Shared) {
        if let Some(sock) = shared.socket.take() {
            let _ = sock.shutdown(Shutdown::Both);
        }
        shared.connected = false;
        shared.broadcasting = false;
        shared.stop = true;
    }

    /// Role-dependent reaction to peer loss.
    fn teardown(&self, shared: &mut Shared) {
        if self.role == NetRole::Host {
            self.reset_connection_locked(shared);
        } else {
            self.close_locked(shared);
        }
    }

    /// Tear the whole peer down, ending the accept worker.
    pub fn close(&self) {
        let mut shared = self.shared.lock().unwrap();
        self.close_locked(&mut shared);
    }
}

impl Drop for NetworkPeer {
    fn drop(&mut self) {
        self.close();
    }
}

fn accept_worker(listener: TcpListener, scanner: Option<RoomScanner>, shared: Arc<Mutex<Shared>>) {
    let mut last_beacon = Instant::now() - BEACON_INTERVAL;
    loop {
        {
            let shared = shared.lock().unwrap();
            if shared.stop {
                break;
            }
        }

        let connected = shared.lock().unwrap().connected;
        if !connected {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if stream.set_nonblocking(true).is_ok() {
                        tracing::info!("Accepted client from {addr}");
                        let mut shared = shared.lock().unwrap();
                        shared.recv_buffer.clear();
                        shared.socket = Some(stream);
                        shared.connected = true;
                        shared.broadcasting = false;
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {},
                Err(e) => tracing::warn!("Accept failed: {e}"),
            }

            if last_beacon.elapsed() >= BEACON_INTERVAL {
                let (broadcasting, mode) = {
                    let shared = shared.lock().unwrap();
                    (shared.broadcasting, shared.broadcast_mode.clone())
                };
                if broadcasting
                    && let Some(scanner) = scanner.as_ref()
                {
                    scanner.broadcast(&mode);
                }
                last_beacon = Instant::now();
            }
        }

        thread::sleep(ACCEPT_POLL);
    }
}
