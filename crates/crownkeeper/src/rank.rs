use serde::{Deserialize, Serialize};

/// Per-room permission tier. Stored as a bare integer; names are for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rank(pub u8);

const RANK_NAMES: [&str; 4] = ["user", "moderator", "admin", "owner"];

impl Rank {
    pub const USER: Rank = Rank(0);
    pub const MODERATOR: Rank = Rank(1);
    pub const ADMIN: Rank = Rank(2);
    pub const OWNER: Rank = Rank(3);

    pub const ALL: [Rank; 4] = [Rank::USER, Rank::MODERATOR, Rank::ADMIN, Rank::OWNER];

    pub fn level(self) -> u8 {
        self.0
    }

    pub fn name(self) -> &'static str {
        RANK_NAMES.get(usize::from(self.0)).copied().unwrap_or("unknown")
    }

    /// Accepts a rank name (any case) or its level.
    pub fn parse(s: &str) -> Option<Rank> {
        let lc = s.trim().to_ascii_lowercase();
        if let Ok(n) = lc.parse::<u8>() {
            return Rank::ALL.into_iter().find(|r| r.0 == n);
        }
        RANK_NAMES
            .iter()
            .position(|n| *n == lc)
            .and_then(|i| u8::try_from(i).ok())
            .map(Rank)
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Rank;

    #[test]
    fn ranks_are_ordered() {
        assert!(Rank::USER < Rank::MODERATOR);
        assert!(Rank::MODERATOR < Rank::ADMIN);
        assert!(Rank::ADMIN < Rank::OWNER);
        assert_eq!(Rank::default(), Rank::USER);
    }

    #[test]
    fn parse_names_and_levels() {
        assert_eq!(Rank::parse("Admin"), Some(Rank::ADMIN));
        assert_eq!(Rank::parse("moderator"), Some(Rank::MODERATOR));
        assert_eq!(Rank::parse("3"), Some(Rank::OWNER));
        assert_eq!(Rank::parse("0"), Some(Rank::USER));
        assert_eq!(Rank::parse("4"), None);
        assert_eq!(Rank::parse("king"), None);
        assert_eq!(Rank::parse(""), None);
    }

    #[test]
    fn display_shows_name_and_level() {
        assert_eq!(Rank::ADMIN.to_string(), "admin (2)");
        assert_eq!(Rank(9).to_string(), "unknown (9)");
    }
}
