use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

/// How long a token stays valid after it was issued.
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Expired tokens are swept once every this many logins.
const SWEEP_INTERVAL: usize = 256;

#[derive(Clone, Copy)]
struct Grant {
    user_id: i64,
    issued_at: Instant,
}

/// Bearer tokens issued at login or registration, mapped to user ids.
pub struct Sessions {
    tokens: DashMap<String, Grant>,
    ttl: Duration,
    issued: AtomicUsize,
}

impl Default for Sessions {
    fn default() -> Self {
        Self::with_ttl(SESSION_TTL)
    }
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Sessions {
            tokens: DashMap::new(),
            ttl,
            issued: AtomicUsize::new(0),
        }
    }

    pub fn issue(&self, user_id: i64) -> String {
        if self.issued.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            self.purge_expired();
        }

        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(
            token.clone(),
            Grant {
                user_id,
                issued_at: Instant::now(),
            },
        );
        token
    }

    pub fn resolve(&self, token: &str) -> Option<i64> {
        let grant = *self.tokens.get(token)?.value();
        if self.is_expired(&grant) {
            self.tokens.remove_if(token, |_, grant| self.is_expired(grant));
            return None;
        }
        Some(grant.user_id)
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.remove(token);
    }

    pub fn revoke_user(&self, user_id: i64) {
        self.tokens.retain(|_, grant| grant.user_id != user_id);
    }

    pub fn purge_expired(&self) {
        let before = self.tokens.len();
        self.tokens.retain(|_, grant| !self.is_expired(grant));
        let purged = before.saturating_sub(self.tokens.len());
        if purged > 0 {
            log::debug!("Purged {} expired session(s).", purged);
        }
    }

    fn is_expired(&self, grant: &Grant) -> bool {
        grant.issued_at.elapsed() >= self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_resolve_revoke() {
        let sessions = Sessions::new();
        let token = sessions.issue(7);

        assert_eq!(sessions.resolve(&token), Some(7));
        sessions.revoke(&token);
        assert_eq!(sessions.resolve(&token), None);
    }

    #[test]
    fn test_revoke_user_drops_every_token() {
        let sessions = Sessions::new();
        let first = sessions.issue(7);
        let second = sessions.issue(7);
        let other = sessions.issue(8);

        sessions.revoke_user(7);

        assert_eq!(sessions.resolve(&first), None);
        assert_eq!(sessions.resolve(&second), None);
        assert_eq!(sessions.resolve(&other), Some(8));
    }

    #[test]
    fn test_expired_token_is_rejected_and_dropped() {
        let sessions = Sessions::with_ttl(Duration::ZERO);
        let token = sessions.issue(7);

        assert_eq!(sessions.resolve(&token), None);
        assert!(sessions.tokens.is_empty());
    }

    #[test]
    fn test_logins_sweep_expired_tokens() {
        let sessions = Sessions::with_ttl(Duration::ZERO);
        for user_id in 0..SWEEP_INTERVAL as i64 {
            sessions.issue(user_id);
        }

        // The last login swept everything issued before it.
        assert_eq!(sessions.tokens.len(), 1);

        sessions.purge_expired();
        assert!(sessions.tokens.is_empty());
    }
}
