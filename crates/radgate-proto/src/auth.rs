//! Authenticator calculations and User-Password crypto
//!
//! RFC 2865 Section 3 derives every non-random authenticator the same way:
//! MD5 over the packet with a chosen value in the authenticator field, then
//! the shared secret. Which value goes in the field is what differs —
//! sixteen zeros for computed request authenticators (RFC 2866 Section 3,
//! RFC 5176 Section 2.3), the request's authenticator for replies. All the
//! functions here work on encoded packet bytes.

use crate::packet::Packet;
use rand::Rng;

/// Generate a random Request Authenticator (16 bytes) per RFC 2865 Section 3
pub fn generate_request_authenticator() -> [u8; 16] {
    let mut authenticator = [0u8; 16];
    rand::rng().fill(&mut authenticator);
    authenticator
}

/// MD5 over `data` with `authenticator` standing in for octets 4..20,
/// followed by the secret. `data` must be an encoded packet.
fn digest_with_authenticator(data: &[u8], authenticator: &[u8; 16], secret: &[u8]) -> [u8; 16] {
    let mut input = Vec::with_capacity(data.len() + secret.len());
    input.extend_from_slice(&data[..4]);
    input.extend_from_slice(authenticator);
    input.extend_from_slice(&data[Packet::HEADER_LEN..]);
    input.extend_from_slice(secret);
    md5::compute(&input).0
}

/// Calculate a computed Request Authenticator over encoded packet bytes
///
/// Used by the client side of Accounting-Request and CoA/Disconnect-Request;
/// whatever the authenticator field currently holds is treated as zeros.
pub fn calculate_request_authenticator(data: &[u8], secret: &[u8]) -> [u8; 16] {
    digest_with_authenticator(data, &[0u8; 16], secret)
}

/// Verify a computed Request Authenticator on raw packet bytes
///
/// Accounting-Request (RFC 2866 Section 3) and CoA/Disconnect-Request
/// (RFC 5176 Section 2.3) carry a computed authenticator. Access-Request
/// carries a random value and is not checked here.
pub fn verify_computed_request_authenticator(data: &[u8], secret: &[u8]) -> bool {
    if data.len() < Packet::HEADER_LEN {
        return false;
    }
    let declared = u16::from_be_bytes([data[2], data[3]]) as usize;
    if declared < Packet::HEADER_LEN || data.len() < declared {
        return false;
    }

    calculate_request_authenticator(&data[..declared], secret)[..] == data[4..Packet::HEADER_LEN]
}

/// Calculate the Response Authenticator for an encoded reply
///
/// The digest runs over the reply with the originating request's
/// authenticator in the field (RFC 2865 Section 3); the caller writes the
/// result back into octets 4..20 before transmission.
pub fn response_authenticator(
    reply: &[u8],
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> [u8; 16] {
    digest_with_authenticator(reply, request_authenticator, secret)
}

/// Verify a received reply's Response Authenticator against the request it
/// answers
pub fn verify_response_authenticator(
    reply: &[u8],
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    if reply.len() < Packet::HEADER_LEN {
        return false;
    }
    response_authenticator(reply, request_authenticator, secret)[..]
        == reply[4..Packet::HEADER_LEN]
}

/// Encrypt User-Password attribute per RFC 2865 Section 5.2
///
/// The password is padded to a multiple of 16 bytes, then XORed with
/// MD5(secret + request_authenticator) for the first block and
/// MD5(secret + previous_ciphertext_block) for subsequent blocks.
pub fn encrypt_user_password(password: &str, secret: &[u8], authenticator: &[u8; 16]) -> Vec<u8> {
    let password_bytes = password.as_bytes();

    let mut padded = password_bytes.to_vec();
    let padding_needed = (16 - (padded.len() % 16)) % 16;
    padded.resize(padded.len() + padding_needed, 0);
    if padded.is_empty() {
        padded.resize(16, 0);
    }

    let mut result = Vec::with_capacity(padded.len());
    let mut previous_block = authenticator.to_vec();

    for chunk in padded.chunks(16) {
        let mut data = Vec::new();
        data.extend_from_slice(secret);
        data.extend_from_slice(&previous_block);
        let hash = md5::compute(&data);

        let mut encrypted_block = [0u8; 16];
        for i in 0..16 {
            encrypted_block[i] = chunk[i] ^ hash.0[i];
        }

        previous_block = encrypted_block.to_vec();
        result.extend_from_slice(&encrypted_block);
    }

    result
}

/// Decrypt User-Password attribute per RFC 2865 Section 5.2
pub fn decrypt_user_password(
    encrypted: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
) -> Option<String> {
    if encrypted.is_empty() || encrypted.len() % 16 != 0 {
        return None;
    }

    let mut decrypted = Vec::with_capacity(encrypted.len());
    let mut previous_block = authenticator.to_vec();

    for chunk in encrypted.chunks(16) {
        let mut data = Vec::new();
        data.extend_from_slice(secret);
        data.extend_from_slice(&previous_block);
        let hash = md5::compute(&data);

        for i in 0..16 {
            decrypted.push(chunk[i] ^ hash.0[i]);
        }

        previous_block = chunk.to_vec();
    }

    // Strip the zero padding
    while decrypted.last() == Some(&0) {
        decrypted.pop();
    }

    String::from_utf8(decrypted).ok()
}
