use crate::packet::PacketError;

/// Well-known attribute types used by the server core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttributeType {
    UserName = 1,
    UserPassword = 2,
    NasIpAddress = 4,
    NasPort = 5,
    ReplyMessage = 18,
    State = 24,
    ProxyState = 33,
    /// EAP-Message (RFC 2869 Section 5.13)
    EapMessage = 79,
    /// Message-Authenticator (RFC 2869 Section 5.14)
    MessageAuthenticator = 80,
}

/// One RADIUS attribute: a type octet, a length octet covering the whole
/// TLV, and up to 253 value octets (RFC 2865 Section 5)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute type (1 byte)
    pub attr_type: u8,
    /// Attribute value (0-253 bytes)
    pub value: Vec<u8>,
}

impl Attribute {
    /// Octets of type and length preceding the value
    pub const HEADER_LEN: usize = 2;
    /// Largest value that fits the one-byte TLV length
    pub const MAX_VALUE_LEN: usize = 253;

    pub fn new(attr_type: u8, value: Vec<u8>) -> Result<Self, PacketError> {
        if value.len() > Self::MAX_VALUE_LEN {
            return Err(PacketError::AttributeError(format!(
                "value of attribute {} is {} bytes, limit is {}",
                attr_type,
                value.len(),
                Self::MAX_VALUE_LEN
            )));
        }
        Ok(Attribute { attr_type, value })
    }

    /// Create a string attribute
    pub fn string(attr_type: u8, value: impl Into<String>) -> Result<Self, PacketError> {
        Self::new(attr_type, value.into().into_bytes())
    }

    /// Create an integer attribute (32-bit big-endian)
    pub fn integer(attr_type: u8, value: u32) -> Result<Self, PacketError> {
        Self::new(attr_type, value.to_be_bytes().to_vec())
    }

    /// Interpret the value as a UTF-8 string
    pub fn as_string(&self) -> Result<String, PacketError> {
        std::str::from_utf8(&self.value)
            .map(str::to_owned)
            .map_err(|e| {
                PacketError::AttributeError(format!(
                    "attribute {} is not UTF-8: {}",
                    self.attr_type, e
                ))
            })
    }

    /// Size of the encoded TLV
    pub fn wire_len(&self) -> usize {
        Self::HEADER_LEN + self.value.len()
    }

    /// Append the TLV form to an output buffer
    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), PacketError> {
        let len = self.wire_len();
        if len > u8::MAX as usize {
            return Err(PacketError::AttributeError(format!(
                "attribute {} does not fit a one-byte length: {} octets",
                self.attr_type, len
            )));
        }
        out.push(self.attr_type);
        out.push(len as u8);
        out.extend_from_slice(&self.value);
        Ok(())
    }

    /// Split one attribute off the front of a TLV stream, returning it
    /// together with the unconsumed remainder
    pub fn read(data: &[u8]) -> Result<(Self, &[u8]), PacketError> {
        let (attr_type, declared) = match data {
            [t, l, ..] => (*t, *l as usize),
            _ => {
                return Err(PacketError::AttributeError(format!(
                    "truncated attribute header: {} bytes left",
                    data.len()
                )))
            }
        };

        if declared < Self::HEADER_LEN {
            return Err(PacketError::AttributeError(format!(
                "attribute {} declares impossible length {}",
                attr_type, declared
            )));
        }

        let value = data.get(Self::HEADER_LEN..declared).ok_or_else(|| {
            PacketError::AttributeError(format!(
                "attribute {} declares {} octets but only {} remain",
                attr_type,
                declared,
                data.len()
            ))
        })?;

        Ok((
            Attribute {
                attr_type,
                value: value.to_vec(),
            },
            &data[declared..],
        ))
    }
}
