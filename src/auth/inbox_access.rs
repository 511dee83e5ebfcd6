use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Short-lived grant allowing anonymous submissions to one private inbox.
/// Issued only after the inbox password has been verified.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub inbox_id: String,
    pub expires_at: Instant,
}

/// Store for private-inbox access grants
pub struct InboxAccessStore {
    ttl: Duration,
    pub(crate) grants: HashMap<String, AccessGrant>,
}

impl InboxAccessStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            grants: HashMap::new(),
        }
    }

    /// Issue a new grant for `inbox_id` and return its token
    pub fn issue(&mut self, inbox_id: &str) -> String {
        self.clear_stale();

        let token = generate_secure_token();
        self.grants.insert(
            token.clone(),
            AccessGrant {
                inbox_id: inbox_id.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );

        token
    }

    /// Check that `token` is an unexpired grant for exactly `inbox_id`.
    /// Grants are reusable until they expire.
    pub fn is_valid(&self, token: &str, inbox_id: &str) -> bool {
        match self.grants.get(token) {
            Some(grant) => grant.inbox_id == inbox_id && Instant::now() < grant.expires_at,
            None => false,
        }
    }

    /// Drop every grant for an inbox, e.g. after its password changed
    pub fn revoke_inbox(&mut self, inbox_id: &str) {
        self.grants.retain(|_, grant| grant.inbox_id != inbox_id);
    }

    /// Remove expired grants
    fn clear_stale(&mut self) {
        let now = Instant::now();
        self.grants.retain(|_, grant| now < grant.expires_at);
    }
}

/// Generate a cryptographically secure random token
fn generate_secure_token() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    const TOKEN_LEN: usize = 32;

    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}
