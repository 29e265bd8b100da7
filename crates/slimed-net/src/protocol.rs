//! Wire protocol: newline-delimited ASCII records.
//!
//! Every record is a single line. Control records carry a one-letter prefix
//! and a `|` separator; a line without a known prefix is a player snapshot.
//! Within a record, `|` separates segments and `,` separates fields;
//! booleans are `0`/`1`. Raw lines are decoded into [`WireMessage`] right at
//! the transport boundary so nothing above this module touches strings.

use slimed_core::anim::{BossAction, PlayerAction};

#[derive(Debug)]
pub enum ProtocolError {
    EmptyRecord,
    FieldCount { kind: &'static str, got: usize },
    BadNumber(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRecord => write!(f, "empty record"),
            Self::FieldCount { kind, got } => {
                write!(f, "{kind} record has too few fields ({got})")
            },
            Self::BadNumber(s) => write!(f, "unparseable number: {s:?}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Per-frame player snapshot. The host's copy is the only carrier of the
/// map seed; a client always sends seed 0.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub x: f32,
    pub y: f32,
    pub alive: bool,
    pub score: i64,
    pub seed: u64,
    pub hp: i32,
    pub vx: f32,
    pub vy: f32,
    pub facing_right: bool,
    pub max_hp: i32,
    pub slam_active: bool,
    pub dash_active: bool,
    pub invul_timer: f32,
    pub flash_on_invul: bool,
    pub action: PlayerAction,
    pub frame: u32,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            alive: true,
            score: 0,
            seed: 0,
            hp: 3,
            vx: 0.0,
            vy: 0.0,
            facing_right: true,
            max_hp: 3,
            slam_active: false,
            dash_active: false,
            invul_timer: 0.0,
            flash_on_invul: false,
            action: PlayerAction::Idle,
            frame: 0,
        }
    }
}

/// Authoritative per-enemy state broadcast by the host, keyed by enemy id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemyDelta {
    pub id: i64,
    pub x: i32,
    pub y: i32,
    pub facing_right: bool,
    pub hp: i32,
    pub dead: bool,
}

/// Boss mirror update. Position and animation segments are optional on the
/// wire; absent fields leave the client's last-known values untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BossDelta {
    pub hp: i32,
    pub defeated: bool,
    pub pos: Option<(i32, i32)>,
    pub anim: Option<(BossAction, u32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    PlayerState(PlayerSnapshot),
    /// Client -> host: "I hit enemy `id` for `damage`".
    Hit { enemy_id: i64, damage: f32 },
    /// Host -> client: flat damage to apply to the local player.
    Damage { amount: i32 },
    GameOver { text: String },
    LobbyMode { mode: String },
    CharSelect { color: u8, ability: u8 },
    Start,
    Kick,
    LobbyExit,
    EnemyUpdate(EnemyDelta),
    BossState(BossDelta),
}

fn b(v: bool) -> u8 {
    v as u8
}

/// Encode a message as one line, without the trailing newline.
pub fn encode(msg: &WireMessage) -> String {
    match msg {
        WireMessage::PlayerState(s) => format!(
            "{:.2},{:.2},{},{},{},{},{:.2},{:.2},{},{},{},{},{:.2},{}|{},{}",
            s.x,
            s.y,
            b(s.alive),
            s.score,
            s.seed,
            s.hp,
            s.vx,
            s.vy,
            b(s.facing_right),
            s.max_hp,
            b(s.slam_active),
            b(s.dash_active),
            s.invul_timer,
            b(s.flash_on_invul),
            s.action.as_str(),
            s.frame,
        ),
        WireMessage::Hit { enemy_id, damage } => format!("H|{enemy_id},{damage:?}"),
        WireMessage::Damage { amount } => format!("D|{amount}"),
        WireMessage::GameOver { text } => format!("G|{text}"),
        WireMessage::LobbyMode { mode } => format!("M|{mode}"),
        WireMessage::CharSelect { color, ability } => format!("C|{color},{ability}"),
        WireMessage::Start => "S|START".to_string(),
        WireMessage::Kick => "K|KICK".to_string(),
        WireMessage::LobbyExit => "L|EXIT".to_string(),
        WireMessage::EnemyUpdate(e) => format!(
            "E|{},{},{},{},{},{}",
            e.id,
            e.x,
            e.y,
            b(e.facing_right),
            e.hp,
            b(e.dead),
        ),
        WireMessage::BossState(bs) => {
            let (x, y) = bs.pos.unwrap_or((0, 0));
            let (action, frame) = bs.anim.unwrap_or((BossAction::Idle, 0));
            format!(
                "B|{},{},{},{}|{},{}",
                bs.hp,
                b(bs.defeated),
                x,
                y,
                action.as_str(),
                frame,
            )
        },
    }
}

fn parse_f32(s: &str) -> Result<f32, ProtocolError> {
    s.trim()
        .parse()
        .map_err(|_| ProtocolError::BadNumber(s.to_string()))
}

fn parse_i64(s: &str) -> Result<i64, ProtocolError> {
    s.trim()
        .parse()
        .map_err(|_| ProtocolError::BadNumber(s.to_string()))
}

fn parse_i32(s: &str) -> Result<i32, ProtocolError> {
    s.trim()
        .parse()
        .map_err(|_| ProtocolError::BadNumber(s.to_string()))
}

fn parse_bool(s: &str) -> Result<bool, ProtocolError> {
    Ok(parse_i32(s)? != 0)
}

/// Decode one line (no newline) into a typed message.
pub fn decode(line: &str) -> Result<WireMessage, ProtocolError> {
    if line.is_empty() {
        return Err(ProtocolError::EmptyRecord);
    }
    if line.starts_with("K|") {
        return Ok(WireMessage::Kick);
    }
    if let Some(rest) = line.strip_prefix("G|") {
        return Ok(WireMessage::GameOver {
            text: rest.to_string(),
        });
    }
    if let Some(rest) = line.strip_prefix("M|") {
        return Ok(WireMessage::LobbyMode {
            mode: rest.trim().to_string(),
        });
    }
    if line.starts_with("S|") {
        return Ok(WireMessage::Start);
    }
    if line.starts_with("L|") {
        return Ok(WireMessage::LobbyExit);
    }
    if let Some(rest) = line.strip_prefix("D|") {
        return Ok(WireMessage::Damage {
            amount: parse_i32(rest)?,
        });
    }
    if let Some(rest) = line.strip_prefix("C|") {
        let parts: Vec<&str> = rest.trim().split(',').collect();
        if parts.len() != 2 {
            return Err(ProtocolError::FieldCount {
                kind: "char-select",
                got: parts.len(),
            });
        }
        return Ok(WireMessage::CharSelect {
            color: parse_i32(parts[0])? as u8,
            ability: parse_i32(parts[1])? as u8,
        });
    }
    if let Some(rest) = line.strip_prefix("H|") {
        let parts: Vec<&str> = rest.trim().split(',').collect();
        if parts.len() < 2 {
            return Err(ProtocolError::FieldCount {
                kind: "hit",
                got: parts.len(),
            });
        }
        return Ok(WireMessage::Hit {
            enemy_id: parse_i64(parts[0])?,
            damage: parse_f32(parts[1])?,
        });
    }
    if let Some(rest) = line.strip_prefix("E|") {
        let parts: Vec<&str> = rest.trim().split(',').collect();
        if parts.len() < 6 {
            return Err(ProtocolError::FieldCount {
                kind: "enemy",
                got: parts.len(),
            });
        }
        return Ok(WireMessage::EnemyUpdate(EnemyDelta {
            id: parse_i64(parts[0])?,
            x: parse_i32(parts[1])?,
            y: parse_i32(parts[2])?,
            facing_right: parse_bool(parts[3])?,
            hp: parse_i32(parts[4])?,
            dead: parse_bool(parts[5])?,
        }));
    }
    if let Some(rest) = line.strip_prefix("B|") {
        let segments: Vec<&str> = rest.split('|').collect();
        let stats: Vec<&str> = segments[0].split(',').collect();
        if stats.len() < 2 {
            return Err(ProtocolError::FieldCount {
                kind: "boss",
                got: stats.len(),
            });
        }
        let pos = if stats.len() > 3 {
            Some((parse_i32(stats[2])?, parse_i32(stats[3])?))
        } else {
            None
        };
        let anim = match segments.get(1) {
            Some(seg) => {
                let parts: Vec<&str> = seg.split(',').collect();
                let action = BossAction::parse(parts[0]);
                let frame = parts
                    .get(1)
                    .map(|s| parse_i32(s))
                    .transpose()?
                    .unwrap_or(0) as u32;
                Some((action, frame))
            },
            None => None,
        };
        return Ok(WireMessage::BossState(BossDelta {
            hp: parse_i32(stats[0])?,
            defeated: parse_bool(stats[1])?,
            pos,
            anim,
        }));
    }

    decode_player_state(line)
}

fn decode_player_state(line: &str) -> Result<WireMessage, ProtocolError> {
    let mut segments = line.splitn(2, '|');
    let stats_str = segments.next().unwrap_or("");
    let anim_str = segments.next().unwrap_or("idle,0");

    let parts: Vec<&str> = stats_str.split(',').collect();
    if parts.len() < 13 {
        return Err(ProtocolError::FieldCount {
            kind: "player-state",
            got: parts.len(),
        });
    }

    let aparts: Vec<&str> = anim_str.split(',').collect();
    let action = PlayerAction::parse(aparts[0]);
    let frame = aparts
        .get(1)
        .and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(0);

    Ok(WireMessage::PlayerState(PlayerSnapshot {
        x: parse_f32(parts[0])?,
        y: parse_f32(parts[1])?,
        alive: parse_bool(parts[2])?,
        score: parse_i64(parts[3])?,
        seed: parse_i64(parts[4])?.max(0) as u64,
        hp: parse_i32(parts[5])?,
        vx: parse_f32(parts[6])?,
        vy: parse_f32(parts[7])?,
        facing_right: parse_bool(parts[8])?,
        max_hp: parse_i32(parts[9])?,
        slam_active: parse_bool(parts[10])?,
        dash_active: parse_bool(parts[11])?,
        invul_timer: parse_f32(parts[12])?,
        flash_on_invul: parts.get(13).map(|s| parse_bool(s)).transpose()?.unwrap_or(false),
        action,
        frame,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PlayerSnapshot {
        PlayerSnapshot {
            x: 123.45,
            y: 67.8,
            alive: true,
            score: 420,
            seed: 991_122,
            hp: 2,
            vx: -220.0,
            vy: 15.5,
            facing_right: false,
            max_hp: 4,
            slam_active: true,
            dash_active: false,
            invul_timer: 0.75,
            flash_on_invul: true,
            action: PlayerAction::Slam,
            frame: 3,
        }
    }

    #[test]
    fn player_state_wire_shape() {
        let line = encode(&WireMessage::PlayerState(snapshot()));
        assert_eq!(
            line,
            "123.45,67.80,1,420,991122,2,-220.00,15.50,0,4,1,0,0.75,1|slam,3"
        );
    }

    #[test]
    fn player_state_roundtrip() {
        let msg = WireMessage::PlayerState(snapshot());
        assert_eq!(decode(&encode(&msg)).unwrap(), msg);
    }

    #[test]
    fn control_records_roundtrip() {
        let msgs = [
            WireMessage::Hit {
                enemy_id: 7,
                damage: 32.0,
            },
            WireMessage::Damage { amount: 1 },
            WireMessage::GameOver {
                text: "P2 WINS".to_string(),
            },
            WireMessage::LobbyMode {
                mode: "versus".to_string(),
            },
            WireMessage::CharSelect {
                color: 3,
                ability: 1,
            },
            WireMessage::Start,
            WireMessage::Kick,
            WireMessage::LobbyExit,
            WireMessage::EnemyUpdate(EnemyDelta {
                id: 12,
                x: 4010,
                y: 380,
                facing_right: true,
                hp: 1,
                dead: false,
            }),
        ];
        for msg in msgs {
            assert_eq!(decode(&encode(&msg)).unwrap(), msg, "roundtrip of {msg:?}");
        }
    }

    #[test]
    fn boss_state_roundtrip_keeps_segments() {
        let msg = WireMessage::BossState(BossDelta {
            hp: 3,
            defeated: false,
            pos: Some((270, 20)),
            anim: Some((BossAction::Cast, 2)),
        });
        let line = encode(&msg);
        assert_eq!(line, "B|3,0,270,20|cast,2");
        assert_eq!(decode(&line).unwrap(), msg);
    }

    #[test]
    fn boss_state_without_position_or_anim() {
        let msg = decode("B|5,0").unwrap();
        match msg {
            WireMessage::BossState(d) => {
                assert_eq!(d.hp, 5);
                assert!(!d.defeated);
                assert_eq!(d.pos, None);
                assert_eq!(d.anim, None);
            },
            other => panic!("expected BossState, got {other:?}"),
        }
    }

    #[test]
    fn truncated_player_state_rejected() {
        assert!(decode("1.0,2.0,1,0").is_err());
    }

    #[test]
    fn garbage_numbers_rejected_not_panicking() {
        assert!(decode("a,b,c,d,e,f,g,h,i,j,k,l,m|idle,0").is_err());
        assert!(decode("E|x,1,2,1,1,0").is_err());
        assert!(decode("D|lots").is_err());
    }

    #[test]
    fn missing_anim_segment_defaults_to_idle() {
        let line = "10.00,20.00,1,0,0,3,0.00,0.00,1,3,0,0,0.00,0";
        match decode(line).unwrap() {
            WireMessage::PlayerState(s) => {
                assert_eq!(s.action, PlayerAction::Idle);
                assert_eq!(s.frame, 0);
            },
            other => panic!("expected PlayerState, got {other:?}"),
        }
    }

    #[test]
    fn thirteen_field_legacy_snapshot_accepted() {
        // Peers that predate the flash flag send 13 stats fields.
        let line = "10.00,20.00,1,0,5,3,0.00,0.00,1,3,0,0,0.40|move,1";
        match decode(line).unwrap() {
            WireMessage::PlayerState(s) => {
                assert!(!s.flash_on_invul);
                assert_eq!(s.seed, 5);
                assert_eq!(s.action, PlayerAction::Move);
            },
            other => panic!("expected PlayerState, got {other:?}"),
        }
    }

    #[test]
    fn kick_matches_any_payload() {
        assert_eq!(decode("K|KICK").unwrap(), WireMessage::Kick);
        assert_eq!(decode("K|").unwrap(), WireMessage::Kick);
    }
}
