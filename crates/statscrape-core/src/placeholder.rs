use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ScrapeError;

/// Closed vocabulary of fillable slots an endpoint template may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Placeholder {
    Season,
    PlayerId,
    GameDate,
    DateTo,
    GameId,
    PlayerPosition,
}

impl Placeholder {
    /// Every placeholder, in the order used for substitution mappings.
    pub const ALL: [Placeholder; 6] = [
        Placeholder::Season,
        Placeholder::PlayerId,
        Placeholder::GameDate,
        Placeholder::DateTo,
        Placeholder::GameId,
        Placeholder::PlayerPosition,
    ];

    /// Placeholders whose values are partitioned by season.
    pub const SEASON_DEPENDENT: [Placeholder; 4] = [
        Placeholder::PlayerId,
        Placeholder::GameDate,
        Placeholder::DateTo,
        Placeholder::GameId,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Placeholder::Season => "SEASON",
            Placeholder::PlayerId => "PLAYER_ID",
            Placeholder::GameDate => "GAME_DATE",
            Placeholder::DateTo => "DATE_TO",
            Placeholder::GameId => "GAME_ID",
            Placeholder::PlayerPosition => "PLAYER_POSITION",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn is_season_dependent(self) -> bool {
        Self::SEASON_DEPENDENT.contains(&self)
    }

    /// Neither `SEASON` nor season-dependent: cross-joined as its own axis.
    pub fn is_independent(self) -> bool {
        self != Placeholder::Season && !self.is_season_dependent()
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Placeholder {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('{').trim_end_matches('}');
        Self::from_name(name).ok_or_else(|| ScrapeError::UnsupportedPlaceholder {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for p in Placeholder::ALL {
            assert_eq!(p.name().parse::<Placeholder>().unwrap(), p);
        }
        assert_eq!("{DATE_TO}".parse::<Placeholder>().unwrap(), Placeholder::DateTo);
    }

    #[test]
    fn unknown_name_is_unsupported() {
        let err = "TEAM_ID".parse::<Placeholder>().unwrap_err();
        assert!(matches!(err, ScrapeError::UnsupportedPlaceholder { ref name } if name == "TEAM_ID"));
    }

    #[test]
    fn only_player_position_is_independent() {
        let independent: Vec<_> = Placeholder::ALL
            .into_iter()
            .filter(|p| p.is_independent())
            .collect();
        assert_eq!(independent, vec![Placeholder::PlayerPosition]);
        assert!(!Placeholder::Season.is_season_dependent());
        assert!(Placeholder::DateTo.is_season_dependent());
    }
}
