//! LAN discovery: hosts broadcast a UDP beacon while waiting for a client;
//! browsers listen and collect `{address: mode}` announcements.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// Fixed discovery port shared by beacon and listeners.
pub const DISCOVERY_PORT: u16 = 50008;
/// Magic payload prefix; the suffix after `:` is the advertised game mode.
pub const DISCOVERY_MAGIC: &str = "PLATFORMER_HOST_HERE";

/// UDP broadcast beacon and announcement collector.
///
/// Binding the shared port can fail when another instance on the same
/// machine already holds it; the scanner then falls back to an ephemeral
/// port, which still lets it broadcast (hosting works, browsing does not).
pub struct RoomScanner {
    socket: UdpSocket,
    port: u16,
    found_hosts: HashMap<IpAddr, String>,
}

impl RoomScanner {
    pub fn new() -> io::Result<Self> {
        Self::with_port(DISCOVERY_PORT)
    }

    pub fn with_port(port: u16) -> io::Result<Self> {
        let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Discovery port {port} unavailable ({e}), broadcast-only mode");
                UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?
            },
        };
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            port,
            found_hosts: HashMap::new(),
        })
    }

    /// Announce this host and its lobby mode. Send failures are ignored;
    /// the beacon fires again next interval.
    pub fn broadcast(&self, mode: &str) {
        let msg = format!("{DISCOVERY_MAGIC}:{mode}");
        let target = SocketAddr::from((Ipv4Addr::BROADCAST, self.port));
        if let Err(e) = self.socket.send_to(msg.as_bytes(), target) {
            tracing::trace!("Discovery broadcast failed: {e}");
        }
    }

    /// Drain pending announcements into the host map.
    pub fn listen(&mut self) {
        let mut buf = [0u8; 1024];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, addr)) => {
                    let Ok(text) = std::str::from_utf8(&buf[..len]) else {
                        continue;
                    };
                    let Some(rest) = text.strip_prefix(DISCOVERY_MAGIC) else {
                        continue;
                    };
                    let mode = rest.strip_prefix(':').unwrap_or("versus");
                    self.found_hosts.insert(addr.ip(), mode.to_string());
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
    }

    pub fn hosts(&self) -> &HashMap<IpAddr, String> {
        &self.found_hosts
    }

    pub fn clear(&mut self) {
        self.found_hosts.clear();
    }
}
