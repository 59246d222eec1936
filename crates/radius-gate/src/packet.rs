//! Inbound datagram wrapper
//!
//! A [`ClientPacket`] owns the raw bytes of one datagram and decodes them at
//! most once. The decode outcome (packet or error) is memoized, so every stage
//! of a pass observes the same result no matter how often it asks. The shared
//! secret the packet is answered under is bound once as well, after the
//! secret check picked it.

use crate::secrets::SecretError;
use radius_proto::message_auth::verify_message_authenticator;
use radius_proto::{verify_accounting_request_authenticator, AttributeType, Code, Packet, PacketError};
use std::net::{IpAddr, SocketAddr};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unable to decode packet: {0}")]
    Malformed(#[from] PacketError),
}

/// One received datagram and its lazily decoded form
#[derive(Debug)]
pub struct ClientPacket {
    buffer: Vec<u8>,
    client_addr: Option<SocketAddr>,
    decoded: OnceLock<Result<Packet, DecodeError>>,
    secret: OnceLock<Vec<u8>>,
}

impl ClientPacket {
    pub fn new(buffer: Vec<u8>, client_addr: Option<SocketAddr>) -> Self {
        ClientPacket {
            buffer,
            client_addr,
            decoded: OnceLock::new(),
            secret: OnceLock::new(),
        }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    /// Source host with IPv4-mapped IPv6 addresses folded back to IPv4
    pub fn host(&self) -> Option<IpAddr> {
        self.client_addr.map(|addr| addr.ip().to_canonical())
    }

    /// Decode the buffer, or return the outcome of the first attempt
    pub(crate) fn decode(&self) -> Result<&Packet, &DecodeError> {
        self.decoded
            .get_or_init(|| Packet::decode(&self.buffer).map_err(DecodeError::from))
            .as_ref()
    }

    /// Whether a decode has been attempted, successful or not
    pub fn decode_attempted(&self) -> bool {
        self.decoded.get().is_some()
    }

    pub fn packet(&self) -> Option<&Packet> {
        self.decoded.get().and_then(|r| r.as_ref().ok())
    }

    /// Record the secret replies to this packet are keyed with
    ///
    /// Only the first call counts.
    pub(crate) fn bind_secret(&self, secret: &[u8]) {
        let _ = self.secret.set(secret.to_vec());
    }

    pub fn secret(&self) -> Option<&[u8]> {
        self.secret.get().map(Vec::as_slice)
    }

    pub fn error(&self) -> Option<&DecodeError> {
        self.decoded.get().and_then(|r| r.as_ref().err())
    }

    /// Check that the sender of this packet holds `secret`
    ///
    /// Accounting-Requests carry an MD5 Request Authenticator (RFC 2866);
    /// other packets prove the secret through Message-Authenticator
    /// (RFC 3579). An Access-Request without Message-Authenticator carries no
    /// proof at all and only passes when `require_message_authenticator` is off.
    pub fn verify_secret(
        &self,
        secret: &[u8],
        require_message_authenticator: bool,
    ) -> Result<(), SecretError> {
        let packet = self.packet().ok_or(SecretError::NoPacket)?;
        let bytes = &self.buffer[..packet.length()];

        if packet.code == Code::AccountingRequest {
            return if verify_accounting_request_authenticator(bytes, secret) {
                Ok(())
            } else {
                Err(SecretError::Mismatch)
            };
        }

        match packet.attribute_value_offset(AttributeType::MessageAuthenticator as u8) {
            Some(offset) if verify_message_authenticator(bytes, secret, offset) => Ok(()),
            Some(_) => Err(SecretError::Mismatch),
            None if require_message_authenticator => Err(SecretError::MissingAuthenticator),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use radius_proto::message_auth::sign_message_authenticator;
    use radius_proto::{calculate_accounting_request_authenticator, Attribute};

    /// Access-Request for `user`/`mac`, signed with Message-Authenticator under `secret`
    pub(crate) fn signed_request(secret: &[u8], user: &str, mac: &str) -> Vec<u8> {
        let mut packet = Packet::new(Code::AccessRequest, 7, [9u8; 16]);
        packet.add_attribute(Attribute::string(AttributeType::UserName as u8, user).unwrap());
        packet.add_attribute(Attribute::string(AttributeType::CallingStationId as u8, mac).unwrap());
        packet.add_attribute(
            Attribute::new(AttributeType::MessageAuthenticator as u8, vec![0u8; 16]).unwrap(),
        );
        let offset = packet
            .attribute_value_offset(AttributeType::MessageAuthenticator as u8)
            .unwrap();
        let mut bytes = packet.encode().unwrap();
        assert!(sign_message_authenticator(&mut bytes, secret, offset));
        bytes
    }

    pub(crate) fn accounting_request(secret: &[u8]) -> Vec<u8> {
        let mut packet = Packet::new(Code::AccountingRequest, 3, [0u8; 16]);
        packet.add_attribute(Attribute::integer(AttributeType::AcctStatusType as u8, 1).unwrap());
        packet.add_attribute(Attribute::string(AttributeType::AcctSessionId as u8, "s-1").unwrap());
        packet.authenticator = calculate_accounting_request_authenticator(&packet, secret).unwrap();
        packet.encode().unwrap()
    }

    #[test]
    fn test_decode_is_memoized() {
        let packet = ClientPacket::new(signed_request(b"one", "alice", "aa"), None);
        assert!(!packet.decode_attempted());

        let first = packet.decode().unwrap() as *const Packet;
        let second = packet.decode().unwrap() as *const Packet;
        assert_eq!(first, second);
        assert!(packet.decode_attempted());
    }

    #[test]
    fn test_first_bound_secret_sticks() {
        let packet = ClientPacket::new(signed_request(b"one", "alice", "aa"), None);
        assert_eq!(packet.secret(), None);

        packet.bind_secret(b"one");
        packet.bind_secret(b"two");
        assert_eq!(packet.secret(), Some(&b"one"[..]));
    }

    #[test]
    fn test_decode_error_is_memoized() {
        let packet = ClientPacket::new(vec![1, 2, 3], None);
        let first = packet.decode().unwrap_err().to_string();
        let second = packet.decode().unwrap_err().to_string();
        assert_eq!(first, second);
        assert!(packet.packet().is_none());
        assert!(packet.error().is_some());
    }

    #[test]
    fn test_host_unmaps_ipv4() {
        let addr: SocketAddr = "[::ffff:10.0.0.9]:1812".parse().unwrap();
        let packet = ClientPacket::new(vec![], Some(addr));
        assert_eq!(packet.host(), Some("10.0.0.9".parse().unwrap()));
    }

    #[test]
    fn test_verify_secret_message_authenticator() {
        let packet = ClientPacket::new(signed_request(b"topsecret", "alice", "aa"), None);
        packet.decode().unwrap();
        assert!(packet.verify_secret(b"topsecret", true).is_ok());
        assert!(matches!(packet.verify_secret(b"wrong", false), Err(SecretError::Mismatch)));
    }

    #[test]
    fn test_verify_secret_accounting() {
        let packet = ClientPacket::new(accounting_request(b"acct"), None);
        packet.decode().unwrap();
        assert!(packet.verify_secret(b"acct", true).is_ok());
        assert!(packet.verify_secret(b"nope", false).is_err());
    }

    #[test]
    fn test_verify_secret_unsigned_access_request() {
        let mut request = Packet::new(Code::AccessRequest, 1, [4u8; 16]);
        request.add_attribute(Attribute::string(AttributeType::UserName as u8, "bob").unwrap());
        let packet = ClientPacket::new(request.encode().unwrap(), None);
        packet.decode().unwrap();

        assert!(packet.verify_secret(b"anything", false).is_ok());
        assert!(matches!(
            packet.verify_secret(b"anything", true),
            Err(SecretError::MissingAuthenticator)
        ));
    }

    #[test]
    fn test_verify_secret_requires_decode() {
        let packet = ClientPacket::new(vec![0u8; 4], None);
        assert!(matches!(packet.verify_secret(b"x", false), Err(SecretError::NoPacket)));
    }
}
