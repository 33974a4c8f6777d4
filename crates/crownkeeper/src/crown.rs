use std::time::Duration;

use roomproto::Crown;

/// How long a crown must sit vacant before we take it.
pub const RECLAIM_GRACE_MS: u64 = 14_800;

/// A claim the room never acknowledged is re-sent after this long.
pub const CLAIM_RETRY_MS: u64 = 2_000;

pub const RECLAIM_PERIOD: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrownState {
    /// We let go of the crown on purpose; don't take it back until it changes hands.
    pub dropped: bool,
    /// `crown.time` of the hold we let go of. Until the room reports the release, our view
    /// still shows that hold, and it must not count as the crown changing hands.
    released: Option<u64>,
    /// `(crown.time, local ms)` of our last claim for the current vacancy.
    claim: Option<(u64, u64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing to do (no crown slot, or we just claimed).
    Idle,
    /// Someone holds the crown.
    Held,
    /// Vacant but still inside the grace window, or suppressed.
    Waiting,
    Claim,
}

impl CrownState {
    pub fn mark_dropped(&mut self, held_since: Option<u64>) {
        self.dropped = true;
        self.released = held_since;
        self.claim = None;
    }

    pub fn mark_given(&mut self) {
        self.dropped = false;
        self.released = None;
        self.claim = None;
    }

    /// Decides what the reclaim loop should do for one room and records the claim if it
    /// says so.
    ///
    /// `server_ms` is the room's clock, `local_ms` ours.
    pub fn tick(&mut self, crown: Option<&Crown>, server_ms: u64, local_ms: u64) -> Verdict {
        let Some(crown) = crown else {
            return Verdict::Idle;
        };

        if crown.participant_id.is_some() {
            if self.released != Some(crown.time) {
                self.dropped = false;
                self.released = None;
            }
            self.claim = None;
            return Verdict::Held;
        }

        if self.dropped || server_ms.saturating_sub(crown.time) < RECLAIM_GRACE_MS {
            return Verdict::Waiting;
        }

        if let Some((vacancy, at)) = self.claim {
            if vacancy == crown.time && local_ms.saturating_sub(at) < CLAIM_RETRY_MS {
                return Verdict::Idle;
            }
        }

        self.claim = Some((crown.time, local_ms));
        Verdict::Claim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vacant(time: u64) -> Crown {
        Crown {
            participant_id: None,
            user_id: Some("u-old".to_string()),
            time,
        }
    }

    fn held(time: u64) -> Crown {
        Crown {
            participant_id: Some("p-someone".to_string()),
            user_id: Some("u-someone".to_string()),
            time,
        }
    }

    #[test]
    fn waits_out_the_grace_period() {
        let mut st = CrownState::default();
        let c = vacant(1_000);
        assert_eq!(st.tick(Some(&c), 1_000 + 14_799, 0), Verdict::Waiting);
        assert_eq!(st.tick(Some(&c), 1_000 + 14_800, 0), Verdict::Claim);
    }

    #[test]
    fn claims_once_per_vacancy() {
        let mut st = CrownState::default();
        let c = vacant(0);
        assert_eq!(st.tick(Some(&c), 20_000, 50_000), Verdict::Claim);
        for dt in (20..2_000).step_by(20) {
            assert_eq!(st.tick(Some(&c), 20_000 + dt, 50_000 + dt), Verdict::Idle);
        }
        // The room never reported the new owner; try again.
        assert_eq!(st.tick(Some(&c), 22_000, 52_000), Verdict::Claim);
    }

    #[test]
    fn assignment_ends_the_claim_until_next_vacancy() {
        let mut st = CrownState::default();
        assert_eq!(st.tick(Some(&vacant(0)), 20_000, 20_000), Verdict::Claim);
        assert_eq!(st.tick(Some(&held(20_010)), 20_020, 20_020), Verdict::Held);
        assert_eq!(st.tick(Some(&held(20_010)), 40_000, 40_000), Verdict::Held);

        let next = vacant(40_000);
        assert_eq!(st.tick(Some(&next), 40_100, 40_100), Verdict::Waiting);
        assert_eq!(st.tick(Some(&next), 54_800, 54_800), Verdict::Claim);
    }

    #[test]
    fn dropped_flag_suppresses_until_crown_changes_hands() {
        let mut st = CrownState::default();
        st.mark_dropped(None);
        assert_eq!(st.tick(Some(&vacant(0)), 60_000, 60_000), Verdict::Waiting);

        assert_eq!(st.tick(Some(&held(60_000)), 60_010, 60_010), Verdict::Held);
        assert!(!st.dropped);
        assert_eq!(st.tick(Some(&vacant(61_000)), 80_000, 80_000), Verdict::Claim);
    }

    #[test]
    fn stale_view_of_our_own_hold_keeps_suppression() {
        let mut st = CrownState::default();
        st.mark_dropped(Some(5_000));

        // The release hasn't come back yet; we still see the hold we let go of.
        assert_eq!(st.tick(Some(&held(5_000)), 30_000, 30_000), Verdict::Held);
        assert!(st.dropped);

        assert_eq!(st.tick(Some(&vacant(30_010)), 60_000, 60_000), Verdict::Waiting);
        assert_eq!(st.tick(Some(&vacant(30_010)), 120_000, 120_000), Verdict::Waiting);

        // Someone else picks it up: suppression ends.
        assert_eq!(st.tick(Some(&held(121_000)), 121_010, 121_010), Verdict::Held);
        assert!(!st.dropped);
    }

    #[test]
    fn rooms_without_crown_slot_are_ignored() {
        let mut st = CrownState::default();
        assert_eq!(st.tick(None, 100_000, 100_000), Verdict::Idle);
    }
}
