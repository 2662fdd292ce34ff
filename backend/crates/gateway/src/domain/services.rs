//! Domain Services
//!
//! Pure OTP logic: code generation, keyed hashing and attempt evaluation.

use rand::Rng;

use crate::domain::entities::AttemptRecord;
use crate::domain::value_objects::{Email, OtpCode};
use crate::error::OtpFailure;

const DIGITS: &[u8] = b"0123456789";
/// Uppercase alphanumerics without 0/O and 1/I/L
const ALPHANUMERIC: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Alphabet codes are drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OtpCharset {
    #[default]
    Numeric,
    Alphanumeric,
}

impl OtpCharset {
    fn alphabet(&self) -> &'static [u8] {
        match self {
            OtpCharset::Numeric => DIGITS,
            OtpCharset::Alphanumeric => ALPHANUMERIC,
        }
    }
}

/// Draw a fresh code uniformly from the charset
pub fn generate_code(len: usize, charset: OtpCharset) -> OtpCode {
    let alphabet = charset.alphabet();
    let mut rng = rand::rng();
    let code: String = (0..len)
        .map(|_| char::from(alphabet[rng.random_range(0..alphabet.len())]))
        .collect();
    OtpCode::from_generated(code)
}

/// Keyed one-way hash of a code, bound to the email it was issued for
pub fn hash_code(pepper: &[u8], email: &Email, code: &OtpCode) -> [u8; 32] {
    let mut message = Vec::with_capacity(email.as_str().len() + 1 + code.as_str().len());
    message.extend_from_slice(email.as_str().as_bytes());
    message.push(0);
    message.extend_from_slice(code.as_str().as_bytes());
    platform::crypto::hmac_sha256(pepper, &message)
}

/// Decide an attempt that has already been counted.
///
/// Order matters: an exhausted or expired token fails even when the
/// supplied code is correct.
pub fn evaluate_attempt(
    record: &AttemptRecord,
    now_ms: i64,
    supplied_hash: &[u8],
) -> Result<(), OtpFailure> {
    let token = &record.token;

    if token.used {
        return Err(OtpFailure::NoActiveToken);
    }
    if record.prior_attempts >= token.max_attempts {
        return Err(OtpFailure::AttemptsExhausted);
    }
    if token.is_expired_at(now_ms) {
        return Err(OtpFailure::Expired);
    }
    if !platform::crypto::constant_time_eq(&token.token_hash, supplied_hash) {
        return Err(OtpFailure::Mismatch);
    }

    Ok(())
}
