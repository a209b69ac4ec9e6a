//! Check Work Token Use Case

use chrono::Utc;
use std::sync::Arc;

use crate::domain::entities::token_digest;
use crate::domain::repository::WorkTokenRepository;
use crate::error::PowResult;

/// Token shape: two 32-char hex halves around a dot
const TOKEN_LEN: usize = 65;

/// Check Work Token Use Case
pub struct CheckWorkTokenUseCase<T>
where
    T: WorkTokenRepository,
{
    token_repo: Arc<T>,
}

impl<T> CheckWorkTokenUseCase<T>
where
    T: WorkTokenRepository,
{
    pub fn new(token_repo: Arc<T>) -> Self {
        Self { token_repo }
    }

    /// Whether a presented token was issued here and has not expired
    pub async fn check(&self, token: &str) -> PowResult<bool> {
        if !is_well_formed(token) {
            return Ok(false);
        }
        self.token_repo
            .is_valid(&token_digest(token), Utc::now().timestamp_millis())
            .await
    }
}

fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LEN
        && token
            .split_once('.')
            .is_some_and(|(a, b)| is_hex_128(a) && is_hex_128(b))
}

fn is_hex_128(part: &str) -> bool {
    part.len() == 32 && part.bytes().all(|b| b.is_ascii_hexdigit())
}
