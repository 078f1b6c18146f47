//! RADIUS Wire Protocol Implementation
//!
//! This crate implements the RADIUS packet format per RFC 2865 (access),
//! RFC 2866 (accounting), RFC 2869 (Message-Authenticator / EAP-Message)
//! and RFC 5176 (CoA / Disconnect, as referenced by RFC 3576).
//!
//! It is the codec layer underneath the `radgate-server` crate: packet and
//! attribute encode/decode, authenticator calculations, and reply encoding
//! that preserves the request's identifier and authenticator linkage.

pub mod attribute;
pub mod auth;
pub mod code;
pub mod message_auth;
pub mod packet;
pub mod reply;

pub use attribute::{Attribute, AttributeType};
pub use auth::{
    calculate_request_authenticator, decrypt_user_password, encrypt_user_password,
    generate_request_authenticator, response_authenticator,
    verify_computed_request_authenticator, verify_response_authenticator,
};
pub use code::Code;
pub use message_auth::{calculate_message_authenticator, verify_message_authenticator};
pub use packet::{message_authenticator_offset, Packet, PacketError};
pub use reply::encode_reply;
