use serde::{Deserialize, Serialize};

/// Session game mode. The string form doubles as the lobby-broadcast
/// payload and the leaderboard key, so it must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    Single,
    Coop,
    Versus,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Coop => "coop",
            Self::Versus => "versus",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single" => Some(Self::Single),
            "coop" => Some(Self::Coop),
            "versus" => Some(Self::Versus),
            _ => None,
        }
    }
}

/// Which side of the connection this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetRole {
    LocalOnly,
    Host,
    Client,
}

impl NetRole {
    pub fn is_networked(&self) -> bool {
        !matches!(self, Self::LocalOnly)
    }

    /// Whether this side simulates shared entities (enemies, boss).
    pub fn is_authority(&self) -> bool {
        !matches!(self, Self::Client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_string_roundtrip() {
        for mode in [GameMode::Single, GameMode::Coop, GameMode::Versus] {
            assert_eq!(GameMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(GameMode::parse("deathmatch"), None);
    }

    #[test]
    fn client_is_not_authority() {
        assert!(NetRole::Host.is_authority());
        assert!(NetRole::LocalOnly.is_authority());
        assert!(!NetRole::Client.is_authority());
        assert!(!NetRole::LocalOnly.is_networked());
    }
}
