use crate::error::ConflictError;

/// Screenshare arbitration: at most one participant holds the share at a
/// time. Local requests are refused while someone else owns it; remote
/// flag transitions move ownership reactively.
#[derive(Debug, Default)]
pub struct ScreenshareArbiter {
    owner: Option<String>,
}

impl ScreenshareArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Claim the share for the local participant. Re-claiming while already
    /// the owner is a no-op.
    pub fn request_local(&mut self, self_id: &str) -> Result<(), ConflictError> {
        match &self.owner {
            Some(owner) if owner != self_id => Err(ConflictError { owner: owner.clone() }),
            _ => {
                self.owner = Some(self_id.to_string());
                Ok(())
            }
        }
    }

    /// Release the local claim. Ignored if someone else owns it.
    pub fn release_local(&mut self, self_id: &str) {
        if self.owner.as_deref() == Some(self_id) {
            self.owner = None;
        }
    }

    /// A participant's screenshare flag changed. Turning on takes ownership;
    /// turning off clears it only if that participant was the owner.
    pub fn apply_remote(&mut self, participant_id: &str, enabled: bool) {
        if enabled {
            self.owner = Some(participant_id.to_string());
        } else if self.owner.as_deref() == Some(participant_id) {
            self.owner = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_writer() {
        let mut arb = ScreenshareArbiter::new();
        arb.apply_remote("P1", true);

        // P2's start request is rejected while P1 owns the share
        let err = arb.request_local("P2").unwrap_err();
        assert_eq!(err.owner, "P1");
        assert_eq!(arb.owner(), Some("P1"));

        // Once P1's flag turns false, P2 may start
        arb.apply_remote("P1", false);
        assert!(arb.request_local("P2").is_ok());
        assert_eq!(arb.owner(), Some("P2"));
    }

    #[test]
    fn test_release_only_by_owner() {
        let mut arb = ScreenshareArbiter::new();
        assert!(arb.request_local("me").is_ok());

        arb.release_local("someone-else");
        assert_eq!(arb.owner(), Some("me"));

        arb.release_local("me");
        assert_eq!(arb.owner(), None);
    }

    #[test]
    fn test_stale_off_does_not_clear_new_owner() {
        let mut arb = ScreenshareArbiter::new();
        arb.apply_remote("P1", true);
        arb.apply_remote("P2", true); // ownership moved
        arb.apply_remote("P1", false); // late flag-off from the old owner
        assert_eq!(arb.owner(), Some("P2"));
    }

    #[test]
    fn test_reclaim_is_idempotent() {
        let mut arb = ScreenshareArbiter::new();
        assert!(arb.request_local("me").is_ok());
        assert!(arb.request_local("me").is_ok());
        assert_eq!(arb.owner(), Some("me"));
    }
}
