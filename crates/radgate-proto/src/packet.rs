use crate::attribute::{Attribute, AttributeType};
use crate::code::Code;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Invalid packet length: {0}")]
    InvalidLength(usize),
    #[error("Invalid packet code: {0}")]
    InvalidCode(u8),
    #[error("Attribute error: {0}")]
    AttributeError(String),
    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
    #[error("Request authenticator verification failed")]
    BadAuthenticator,
    #[error("Message-Authenticator verification failed")]
    BadMessageAuthenticator,
}

/// A RADIUS packet (RFC 2865 Section 3): a 20-octet header of code,
/// identifier, 16-bit big-endian length and 16-octet authenticator,
/// followed by a run of attributes
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet type (1 byte)
    pub code: Code,
    /// Packet identifier for matching requests/responses (1 byte)
    pub identifier: u8,
    /// Request Authenticator (16 bytes)
    pub authenticator: [u8; 16],
    /// List of attributes
    pub attributes: Vec<Attribute>,
}

impl Packet {
    /// Fixed header size, also the smallest legal packet
    pub const HEADER_LEN: usize = 20;
    /// Largest packet RFC 2865 permits
    pub const MAX_LEN: usize = 4096;

    pub fn new(code: Code, identifier: u8, authenticator: [u8; 16]) -> Self {
        Packet {
            code,
            identifier,
            authenticator,
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// Size of the encoded packet
    pub fn wire_len(&self) -> usize {
        Self::HEADER_LEN
            + self
                .attributes
                .iter()
                .map(Attribute::wire_len)
                .sum::<usize>()
    }

    /// Encode to wire bytes. The total length is known up front, so the
    /// header is written complete rather than patched afterwards.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let total = self.wire_len();
        if total > Self::MAX_LEN {
            return Err(PacketError::PacketTooLarge(total));
        }

        let mut out = Vec::with_capacity(total);
        out.push(self.code.as_u8());
        out.push(self.identifier);
        out.extend_from_slice(&(total as u16).to_be_bytes());
        out.extend_from_slice(&self.authenticator);
        for attr in &self.attributes {
            attr.write(&mut out)?;
        }

        Ok(out)
    }

    /// Decode wire bytes. Octets past the declared Length field are
    /// ignored as padding per RFC 2865 Section 3.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::HEADER_LEN {
            return Err(PacketError::InvalidLength(data.len()));
        }

        let code = Code::from_u8(data[0]).ok_or(PacketError::InvalidCode(data[0]))?;
        let declared = u16::from_be_bytes([data[2], data[3]]) as usize;
        if declared < Self::HEADER_LEN || declared > Self::MAX_LEN || declared > data.len() {
            return Err(PacketError::InvalidLength(declared));
        }

        let mut authenticator = [0u8; 16];
        authenticator.copy_from_slice(&data[4..Self::HEADER_LEN]);

        let mut attributes = Vec::new();
        let mut rest = &data[Self::HEADER_LEN..declared];
        while !rest.is_empty() {
            let (attr, tail) = Attribute::read(rest)?;
            attributes.push(attr);
            rest = tail;
        }

        Ok(Packet {
            code,
            identifier: data[1],
            authenticator,
            attributes,
        })
    }

    /// Find first attribute by type
    pub fn find_attribute(&self, attr_type: u8) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.attr_type == attr_type)
    }

    /// All attributes of one type, in order of appearance
    pub fn attributes_of(&self, attr_type: u8) -> impl Iterator<Item = &Attribute> {
        self.attributes
            .iter()
            .filter(move |a| a.attr_type == attr_type)
    }

    /// Concatenated EAP-Message payload (RFC 2869 Section 5.13 requires
    /// fragments to be joined in order of appearance)
    pub fn eap_message(&self) -> Vec<u8> {
        self.attributes_of(AttributeType::EapMessage as u8)
            .flat_map(|a| a.value.iter().copied())
            .collect()
    }
}

/// Byte offset of the Message-Authenticator attribute value within an
/// encoded packet, if present. Walks the raw TLV stream so the offset
/// matches the bytes as received, which is what the HMAC is computed over.
pub fn message_authenticator_offset(data: &[u8]) -> Option<usize> {
    if data.len() < Packet::HEADER_LEN {
        return None;
    }
    let declared = u16::from_be_bytes([data[2], data[3]]) as usize;
    let end = declared.min(data.len());
    let mut pos = Packet::HEADER_LEN;

    while pos + Attribute::HEADER_LEN <= end {
        let attr_type = data[pos];
        let attr_len = data[pos + 1] as usize;
        if attr_len < Attribute::HEADER_LEN || pos + attr_len > end {
            return None;
        }
        if attr_type == AttributeType::MessageAuthenticator as u8 && attr_len == 18 {
            return Some(pos + Attribute::HEADER_LEN);
        }
        pos += attr_len;
    }
    None
}
