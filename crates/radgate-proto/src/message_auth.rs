//! Message-Authenticator (RFC 2869 Section 5.14)
//!
//! An HMAC-MD5 keyed with the shared secret over the whole packet, carried
//! in attribute 80. The attribute's own 16 value octets count as zeros
//! while the HMAC is computed, so signing fills a zeroed placeholder and
//! verification re-zeroes the received value before comparing.

use hmac::{Hmac, Mac};
use md5_digest::Md5;

type HmacMd5 = Hmac<Md5>;

/// HMAC-MD5 over `packet_bytes`, which must carry zeros where the
/// Message-Authenticator value goes
pub fn calculate_message_authenticator(packet_bytes: &[u8], secret: &[u8]) -> [u8; 16] {
    let mut hmac = HmacMd5::new_from_slice(secret).expect("HMAC accepts any key length");
    hmac.update(packet_bytes);
    hmac.finalize().into_bytes().into()
}

/// Check the Message-Authenticator carried at `value_offset` (the offset of
/// the 16 value octets, as reported by
/// [`crate::packet::message_authenticator_offset`])
pub fn verify_message_authenticator(
    packet_bytes: &[u8],
    secret: &[u8],
    value_offset: usize,
) -> bool {
    let claimed = match packet_bytes.get(value_offset..value_offset + 16) {
        Some(claimed) => claimed.to_vec(),
        None => return false,
    };

    let mut zeroed = packet_bytes.to_vec();
    zeroed[value_offset..value_offset + 16].fill(0);

    calculate_message_authenticator(&zeroed, secret)[..] == claimed[..]
}
