// =============================================================================
// Request Signer — HMAC-SHA512 over the exact request body
// =============================================================================
//
// SECURITY: the secret is only ever passed through to the MAC. Never log it.
// =============================================================================

use hmac::{Hmac, Mac};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

/// Sign `body` with `secret`, returning the lowercase hex digest
/// (128 characters).
pub fn sign(body: &[u8], secret: &[u8]) -> String {
    let mut mac = HmacSha512::new_from_slice(secret).expect("HMAC accepts any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
