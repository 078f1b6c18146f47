//! Handler callback interface
//!
//! A handler consumes a decoded request and produces a reply or declines to
//! answer. Handlers are registered per NAS through the registry; one handler
//! instance serves many concurrent requests, so implementations must be
//! `Send + Sync`.

use crate::nas::NasProperties;
use crate::request::RadiusRequest;
use async_trait::async_trait;
use radgate_proto::{decrypt_user_password, Attribute, AttributeType, Code};
use std::collections::HashMap;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Reply produced by a handler
#[derive(Debug, Clone)]
pub struct ReplyParams {
    /// Reply command; must be one of the reply codes
    pub code: Code,
    /// Attributes to carry in the reply
    pub attributes: Vec<Attribute>,
    /// Force a Message-Authenticator on the reply even when the request
    /// carried none
    pub msg_hmac: bool,
}

impl ReplyParams {
    pub fn new(code: Code) -> Self {
        ReplyParams {
            code,
            attributes: Vec::new(),
            msg_hmac: false,
        }
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_msg_hmac(mut self, msg_hmac: bool) -> Self {
        self.msg_hmac = msg_hmac;
        self
    }
}

/// What the server does with the handler's verdict
#[derive(Debug, Clone)]
pub enum HandlerDecision {
    /// Encode and transmit a reply, then retain it for retransmission
    Reply(ReplyParams),
    /// Send nothing; the NAS will retransmit and time out
    NoReply,
}

/// User-supplied request callback
///
/// Invoked at most once per request key. An `Err` return or a panic is
/// counted as a handler failure and the request is discarded without a
/// reply; the server itself is unaffected.
#[async_trait]
pub trait RadiusHandler: Send + Sync + 'static {
    async fn radius_request(
        &self,
        request: &RadiusRequest,
        nas: &NasProperties,
    ) -> Result<HandlerDecision, HandlerError>;
}

/// Simple in-memory PAP authentication handler
///
/// Answers Access-Requests against a static user/password map and
/// acknowledges accounting requests. Everything else gets no reply.
pub struct SimpleAuthHandler {
    users: HashMap<String, String>,
}

impl SimpleAuthHandler {
    pub fn new() -> Self {
        SimpleAuthHandler {
            users: HashMap::new(),
        }
    }

    pub fn add_user(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.users.insert(username.into(), password.into());
    }

    fn check_password(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .map(|p| p == password)
            .unwrap_or(false)
    }
}

impl Default for SimpleAuthHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RadiusHandler for SimpleAuthHandler {
    async fn radius_request(
        &self,
        request: &RadiusRequest,
        nas: &NasProperties,
    ) -> Result<HandlerDecision, HandlerError> {
        match request.code {
            Code::AccessRequest => {
                let username = match request
                    .find_attribute(AttributeType::UserName)
                    .and_then(|a| a.as_string().ok())
                {
                    Some(name) => name,
                    None => return Ok(HandlerDecision::Reply(ReplyParams::new(Code::AccessReject))),
                };

                let password = request
                    .find_attribute(AttributeType::UserPassword)
                    .and_then(|a| {
                        decrypt_user_password(&a.value, &nas.secret, &request.authenticator)
                    });

                let accepted = password
                    .map(|p| self.check_password(&username, &p))
                    .unwrap_or(false);

                let code = if accepted {
                    Code::AccessAccept
                } else {
                    Code::AccessReject
                };
                Ok(HandlerDecision::Reply(ReplyParams::new(code)))
            }
            Code::AccountingRequest => Ok(HandlerDecision::Reply(ReplyParams::new(
                Code::AccountingResponse,
            ))),
            _ => Ok(HandlerDecision::NoReply),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radgate_proto::{encrypt_user_password, generate_request_authenticator, Packet};

    fn request_with_credentials(username: &str, password: &str, secret: &[u8]) -> RadiusRequest {
        let auth = generate_request_authenticator();
        let mut packet = Packet::new(Code::AccessRequest, 1, auth);
        packet.add_attribute(Attribute::string(AttributeType::UserName as u8, username).unwrap());
        packet.add_attribute(
            Attribute::new(
                AttributeType::UserPassword as u8,
                encrypt_user_password(password, secret, &auth),
            )
            .unwrap(),
        );
        let bytes = packet.encode().unwrap();
        RadiusRequest::decode(&bytes, secret).unwrap()
    }

    #[tokio::test]
    async fn test_simple_auth_accepts_known_user() {
        let mut handler = SimpleAuthHandler::new();
        handler.add_user("alice", "wonder");
        let nas = NasProperties::for_tests();

        let request = request_with_credentials("alice", "wonder", &nas.secret);
        match handler.radius_request(&request, &nas).await.unwrap() {
            HandlerDecision::Reply(reply) => assert_eq!(reply.code, Code::AccessAccept),
            HandlerDecision::NoReply => panic!("expected a reply"),
        }
    }

    #[tokio::test]
    async fn test_simple_auth_rejects_bad_password() {
        let mut handler = SimpleAuthHandler::new();
        handler.add_user("alice", "wonder");
        let nas = NasProperties::for_tests();

        let request = request_with_credentials("alice", "wrong", &nas.secret);
        match handler.radius_request(&request, &nas).await.unwrap() {
            HandlerDecision::Reply(reply) => assert_eq!(reply.code, Code::AccessReject),
            HandlerDecision::NoReply => panic!("expected a reply"),
        }
    }

    #[tokio::test]
    async fn test_simple_auth_rejects_missing_username() {
        let handler = SimpleAuthHandler::new();
        let nas = NasProperties::for_tests();

        let auth = generate_request_authenticator();
        let packet = Packet::new(Code::AccessRequest, 1, auth);
        let bytes = packet.encode().unwrap();
        let request = RadiusRequest::decode(&bytes, &nas.secret).unwrap();

        match handler.radius_request(&request, &nas).await.unwrap() {
            HandlerDecision::Reply(reply) => assert_eq!(reply.code, Code::AccessReject),
            HandlerDecision::NoReply => panic!("expected a reply"),
        }
    }
}
