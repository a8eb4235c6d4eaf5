//! Identity & Auth (spec §4.1). Stateless HMAC tokens bound to a player id;
//! the secret is process-wide configuration, so rotating it invalidates
//! every outstanding token by design.

use crate::data::players::PlayerRecord;
use crate::error::{CoreError, CoreResult};
use crate::kv::KvStore;
use hmac::{Hmac, Mac};
use rand::seq::SliceRandom;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct Auth {
    secret: Vec<u8>,
}

impl Auth {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Auth { secret: secret.into() }
    }

    /// `token = HMAC(secret, playerId)`, hex-encoded.
    pub fn issue_token(&self, player_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(player_id.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time verification via `Mac::verify_slice` — never compares
    /// decoded bytes with `==`, which would reopen the timing side channel
    /// the HMAC construction is meant to close.
    pub fn verify(&self, player_id: &str, token: &str) -> bool {
        let Ok(provided) = hex::decode(token) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(player_id.as_bytes());
        mac.verify_slice(&provided).is_ok()
    }
}

/// Registers a new player, or returns the existing record (with a freshly
/// computed token) if the username already exists case-insensitively.
pub async fn register(
    kv: &dyn KvStore,
    auth: &Auth,
    colors: &[String],
    username: &str,
) -> CoreResult<(PlayerRecord, String)> {
    let trimmed = username.trim();
    if trimmed.chars().count() < 2 || trimmed.chars().count() > 24 {
        return Err(CoreError::BadInput(
            "username must be between 2 and 24 characters".into(),
        ));
    }

    if let Some(existing) = crate::data::players::find_by_username(kv, trimmed).await? {
        let token = auth.issue_token(&existing.id);
        return Ok((existing, token));
    }

    let player_id = uuid::Uuid::new_v4().to_string();
    let color = colors
        .choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_else(|| "#e74c3c".to_string());
    let record = crate::data::players::create(kv, &player_id, trimmed, &color).await?;
    let token = auth.issue_token(&record.id);
    Ok((record, token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_its_own_token_and_rejects_tampering() {
        let auth = Auth::new("top-secret");
        let token = auth.issue_token("player-1");
        assert!(auth.verify("player-1", &token));
        assert!(!auth.verify("player-2", &token));
        assert!(!auth.verify("player-1", "not-hex-at-all"));
    }

    #[test]
    fn rotating_the_secret_invalidates_all_tokens() {
        let old_auth = Auth::new("secret-a");
        let new_auth = Auth::new("secret-b");
        let token = old_auth.issue_token("player-1");
        assert!(!new_auth.verify("player-1", &token));
    }
}
