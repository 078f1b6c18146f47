//! Decoded request view handed to handler callbacks

use radgate_proto::{
    message_authenticator_offset, verify_computed_request_authenticator,
    verify_message_authenticator, Attribute, AttributeType, Code, Packet, PacketError,
};

/// A decoded, authenticity-checked RADIUS request
#[derive(Debug, Clone)]
pub struct RadiusRequest {
    pub code: Code,
    pub identifier: u8,
    pub authenticator: [u8; 16],
    pub attributes: Vec<Attribute>,
    /// The request carried a valid Message-Authenticator attribute
    pub msg_hmac: bool,
    /// Concatenated EAP-Message payload, empty when absent
    pub eap_message: Vec<u8>,
}

impl RadiusRequest {
    /// Decode and verify request bytes with the NAS's shared secret.
    ///
    /// Accounting and CoA/Disconnect requests have their computed Request
    /// Authenticator checked (RFC 2866 Section 3, RFC 5176 Section 2.3); a
    /// present Message-Authenticator is verified per RFC 2869 Section 5.14.
    /// Any failure is a bad PDU.
    pub fn decode(data: &[u8], secret: &[u8]) -> Result<Self, PacketError> {
        let packet = Packet::decode(data)?;

        if packet.code.has_computed_authenticator()
            && !verify_computed_request_authenticator(data, secret)
        {
            return Err(PacketError::BadAuthenticator);
        }

        let msg_hmac = match message_authenticator_offset(data) {
            Some(offset) => {
                if !verify_message_authenticator(data, secret, offset) {
                    return Err(PacketError::BadMessageAuthenticator);
                }
                true
            }
            None => false,
        };

        let eap_message = packet.eap_message();

        Ok(RadiusRequest {
            code: packet.code,
            identifier: packet.identifier,
            authenticator: packet.authenticator,
            attributes: packet.attributes,
            msg_hmac,
            eap_message,
        })
    }

    /// Find first attribute by type
    pub fn find_attribute(&self, attr_type: AttributeType) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.attr_type == attr_type as u8)
    }

    /// Proxy-State attributes, which replies must echo in order
    /// (RFC 2865 Section 5.33)
    pub fn proxy_state(&self) -> Vec<&Attribute> {
        self.attributes
            .iter()
            .filter(|a| a.attr_type == AttributeType::ProxyState as u8)
            .collect()
    }
}
