use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{config::JwtConfig, state::AppState};

/// Bearer token payload: the subject (username) and an absolute expiry.
/// Validity is decided purely by signature and expiry at verification
/// time; there is no server-side session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Signing and verification keys plus the token lifetime, built once
/// from the immutable app config.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    ttl: Duration,
}

impl FromRef<AppState> for TokenKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            algorithm,
            ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            ttl: Duration::minutes(ttl_minutes),
        }
    }
}

impl TokenKeys {
    fn sign_with_ttl(&self, username: &str, ttl: Duration) -> anyhow::Result<String> {
        let exp = OffsetDateTime::now_utc() + ttl;
        let claims = Claims {
            sub: username.to_string(),
            exp: exp.unix_timestamp() as usize,
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)?;
        debug!(username, "token signed");
        Ok(token)
    }

    pub fn sign(&self, username: &str) -> anyhow::Result<String> {
        self.sign_with_ttl(username, self.ttl)
    }

    /// Verifies signature and expiry. Zero leeway, and the boundary is
    /// inclusive: a token whose `exp` equals the current second is
    /// already expired.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        // The library's expiry check keeps an exp == now token alive
        // for the rest of that second.
        if data.claims.exp as i64 <= OffsetDateTime::now_utc().unix_timestamp() {
            anyhow::bail!("token expired");
        }
        debug!(username = %data.claims.sub, "token verified");
        Ok(data.claims)
    }
}
