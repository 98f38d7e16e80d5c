//! ClickBank Proof Token
//!
//! ClickBank appends a `cbpop` value to the thank-you page redirect. It is the
//! first eight hex characters of `SHA1("{secret}|{receipt}|{time}|{item}")`,
//! uppercased. Only 32 bits survive the truncation, so this authenticates the
//! notification against the shared secret but is not a strong MAC.

use sha1::{Digest, Sha1};

/// Number of digest bytes kept (8 hex characters)
const PROOF_BYTES: usize = 4;

/// Compute the expected proof token for a notification
pub fn proof_token(secret: &str, receipt: &str, time: u64, item: &str) -> String {
    let digest = Sha1::digest(format!("{secret}|{receipt}|{time}|{item}").as_bytes());
    hex::encode_upper(&digest[..PROOF_BYTES])
}

/// Check a received proof token (case-sensitive, whole string)
pub fn verify_proof_token(
    secret: &str,
    receipt: &str,
    time: u64,
    item: &str,
    token: &str,
) -> bool {
    proof_token(secret, receipt, time, item) == token
}
