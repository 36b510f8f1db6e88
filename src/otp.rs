//! In-memory one-time-code store for the phone registration channel.
//!
//! Known limitation: codes live in process memory only. They do not survive a
//! restart and are not visible to other instances behind a load balancer; a
//! multi-instance deployment must swap this for a shared store behind the
//! same issue/verify surface.

use crate::errors::ApiError;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const CODE_TTL: Duration = Duration::from_secs(5 * 60);
pub const RESEND_COOLDOWN: Duration = Duration::from_secs(60);
pub const MAX_ATTEMPTS: u32 = 5;

struct CodeEntry {
    code: String,
    issued_at: Instant,
    attempts: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CodeCheck {
    Valid,
    Mismatch,
    NotFoundOrExpired,
    TooManyAttempts,
}

#[derive(Default)]
pub struct CodeStore {
    entries: Mutex<HashMap<String, CodeEntry>>,
}

impl CodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh 6-digit code for `phone`. Rejects with `CooldownActive`
    /// (carrying the remaining seconds) if a live code was issued less than
    /// 60 seconds ago; after the cooldown a resend replaces the old code.
    pub fn issue(&self, phone: &str) -> Result<String, ApiError> {
        let mut entries = self.entries.lock().map_err(|_| ApiError::Internal)?;
        // Expiry is enforced on read; this sweep just keeps the map small.
        entries.retain(|_, e| e.issued_at.elapsed() < CODE_TTL);

        if let Some(existing) = entries.get(phone) {
            let elapsed = existing.issued_at.elapsed();
            if elapsed < RESEND_COOLDOWN {
                let remaining = (RESEND_COOLDOWN - elapsed).as_secs_f64().ceil() as i64;
                return Err(ApiError::CooldownActive(remaining));
            }
        }

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        entries.insert(
            phone.to_string(),
            CodeEntry {
                code: code.clone(),
                issued_at: Instant::now(),
                attempts: 0,
            },
        );
        Ok(code)
    }

    /// Check `submitted` against the live code for `phone`.
    ///
    /// A match consumes the entry (single use). A mismatch costs one attempt;
    /// once 5 attempts are spent the entry is dropped and even the correct
    /// code is refused. Expiry is checked here, not only by the issue sweep.
    pub fn verify(&self, phone: &str, submitted: &str) -> Result<CodeCheck, ApiError> {
        let mut entries = self.entries.lock().map_err(|_| ApiError::Internal)?;
        let entry = match entries.get_mut(phone) {
            Some(e) => e,
            None => return Ok(CodeCheck::NotFoundOrExpired),
        };
        if entry.issued_at.elapsed() >= CODE_TTL {
            entries.remove(phone);
            return Ok(CodeCheck::NotFoundOrExpired);
        }
        if entry.attempts >= MAX_ATTEMPTS {
            entries.remove(phone);
            return Ok(CodeCheck::TooManyAttempts);
        }
        if entry.code != submitted {
            entry.attempts += 1;
            return Ok(CodeCheck::Mismatch);
        }
        entries.remove(phone);
        Ok(CodeCheck::Valid)
    }

    /// Shift an entry's issuance into the past (tests only).
    #[cfg(test)]
    fn backdate(&self, phone: &str, by: Duration) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(e) = entries.get_mut(phone) {
            e.issued_at -= by;
        }
    }
}
