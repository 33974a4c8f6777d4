use crate::rank::Rank;
use crate::store::PermissionStore;

/// What a command or subcommand demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Access {
    pub rank: Option<Rank>,
    pub admin: bool,
}

impl Access {
    pub const OPEN: Access = Access {
        rank: None,
        admin: false,
    };

    pub const fn rank(rank: Rank) -> Self {
        Self {
            rank: Some(rank),
            admin: false,
        }
    }

    pub const fn admin() -> Self {
        Self {
            rank: None,
            admin: true,
        }
    }
}

/// The caller as seen from one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    pub rank: Rank,
    pub admin: bool,
}

impl Standing {
    pub fn lookup(store: &PermissionStore, room: &str, participant: &str) -> Self {
        Self {
            rank: store.rank(room, participant),
            admin: store.is_global_admin(participant),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Rank { have: Rank, need: Rank },
    NotAdmin,
}

/// Both requirements are checked independently; either one failing denies.
pub fn authorize(access: &Access, who: Standing) -> Result<(), Denial> {
    if let Some(need) = access.rank {
        if who.rank < need {
            return Err(Denial::Rank {
                have: who.rank,
                need,
            });
        }
    }
    if access.admin && !who.admin {
        return Err(Denial::NotAdmin);
    }
    Ok(())
}

/// Rank assignment may never reach above the assigner's own rank.
pub fn can_assign(actor: Rank, new_rank: Rank) -> bool {
    new_rank <= actor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn who(rank: u8, admin: bool) -> Standing {
        Standing {
            rank: Rank(rank),
            admin,
        }
    }

    #[test]
    fn rank_requirement_is_a_floor() {
        for need in 0..=3u8 {
            let access = Access::rank(Rank(need));
            for have in 0..=3u8 {
                assert_eq!(
                    authorize(&access, who(have, false)).is_ok(),
                    have >= need,
                    "have={have} need={need}"
                );
            }
        }
    }

    #[test]
    fn admin_requirement_ignores_rank() {
        let access = Access::admin();
        assert_eq!(
            authorize(&access, who(3, false)),
            Err(Denial::NotAdmin)
        );
        assert!(authorize(&access, who(0, true)).is_ok());
    }

    #[test]
    fn both_requirements_must_hold() {
        let access = Access {
            rank: Some(Rank::ADMIN),
            admin: true,
        };
        assert!(authorize(&access, who(2, true)).is_ok());
        assert_eq!(authorize(&access, who(2, false)), Err(Denial::NotAdmin));
        assert_eq!(
            authorize(&access, who(1, true)),
            Err(Denial::Rank {
                have: Rank::MODERATOR,
                need: Rank::ADMIN
            })
        );
    }

    #[test]
    fn open_access_allows_everyone() {
        assert!(authorize(&Access::OPEN, who(0, false)).is_ok());
    }

    #[test]
    fn assignment_is_bounded_by_own_rank() {
        assert!(!can_assign(Rank::MODERATOR, Rank::ADMIN));
        assert!(can_assign(Rank::MODERATOR, Rank::MODERATOR));
        assert!(can_assign(Rank::OWNER, Rank::USER));
    }
}
