//! Reply encoding
//!
//! Builds the wire bytes for a server reply: the reply inherits the
//! request's identifier, its Response Authenticator is computed over the
//! request's authenticator (RFC 2865 Section 3), and an optional
//! Message-Authenticator attribute is appended and filled per RFC 2869.

use crate::attribute::{Attribute, AttributeType};
use crate::auth::response_authenticator;
use crate::code::Code;
use crate::message_auth::calculate_message_authenticator;
use crate::packet::{Packet, PacketError};

/// Encode a reply packet.
///
/// When `message_authenticator` is set, a zeroed Message-Authenticator
/// attribute is appended last; the HMAC-MD5 is computed with the request
/// authenticator in the authenticator field, then the Response Authenticator
/// is computed over the finished attribute list — the order RFC 2869
/// Section 5.14 prescribes.
pub fn encode_reply(
    request_id: u8,
    request_authenticator: &[u8; 16],
    code: Code,
    attributes: &[Attribute],
    secret: &[u8],
    message_authenticator: bool,
) -> Result<Vec<u8>, PacketError> {
    let mut packet = Packet::new(code, request_id, *request_authenticator);
    for attr in attributes {
        if attr.attr_type == AttributeType::MessageAuthenticator as u8 {
            // The codec owns this attribute; a handler-supplied one would be
            // overwritten anyway
            continue;
        }
        packet.add_attribute(attr.clone());
    }

    if message_authenticator {
        packet.add_attribute(Attribute::new(
            AttributeType::MessageAuthenticator as u8,
            vec![0u8; 16],
        )?);
    }

    let mut bytes = packet.encode()?;

    if message_authenticator {
        // The zeroed attribute was appended last, so its value is the
        // final 16 octets
        let offset = bytes.len() - 16;
        let hmac = calculate_message_authenticator(&bytes, secret);
        bytes[offset..].copy_from_slice(&hmac);
    }

    // Octets 4..20 still hold the request authenticator, exactly what the
    // response digest runs over
    let sealed = response_authenticator(&bytes, request_authenticator, secret);
    bytes[4..Packet::HEADER_LEN].copy_from_slice(&sealed);

    Ok(bytes)
}
