//! RADIUS Protocol Codec
//!
//! Wire-level support for the parts of RFC 2865, 2866 and 3579 that a
//! pre/post-authorization front end needs: decoding and encoding packets,
//! computing and verifying authenticators, and the Message-Authenticator
//! attribute.
//!
//! # Example
//!
//! ```rust
//! use radius_proto::{Attribute, AttributeType, Code, Packet};
//!
//! let mut packet = Packet::new(Code::AccessRequest, 1, [7u8; 16]);
//! packet.add_attribute(Attribute::string(AttributeType::UserName as u8, "alice").unwrap());
//!
//! let bytes = packet.encode().unwrap();
//! let decoded = Packet::decode(&bytes).unwrap();
//! assert_eq!(decoded.identifier, 1);
//! ```

pub mod accounting;
pub mod attributes;
pub mod auth;
pub mod message_auth;
pub mod packet;

pub use accounting::AcctStatusType;
pub use attributes::{Attribute, AttributeType};
pub use auth::{
    calculate_accounting_request_authenticator, calculate_response_authenticator,
    verify_accounting_request_authenticator, verify_response_authenticator,
};
pub use message_auth::{
    calculate_message_authenticator, sign_message_authenticator, verify_message_authenticator,
};
pub use packet::{Code, Packet, PacketError};
