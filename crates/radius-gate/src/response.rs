//! Reject policy
//!
//! Turns a verdict into either silence or an Access-Reject written back to
//! the client. Two cases stay silent on purpose: a failed secret check (a
//! reject would confirm a guessed secret) and `no_reject` deployments.

use crate::context::{Authorization, Context, ReasonCode};
use crate::packet::ClientPacket;
use radius_proto::{
    calculate_response_authenticator, sign_message_authenticator, Attribute, AttributeType, Code,
    Packet, PacketError,
};
use std::net::SocketAddr;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("request was never decoded")]
    NotDecoded,
    #[error("no shared secret bound to request")]
    NoSecret,
    #[error("unable to encode reject: {0}")]
    Encode(#[from] PacketError),
    #[error("unable to sign Message-Authenticator")]
    MessageAuthenticator,
}

/// Authorization entry point handed to [`handle_auth`]
pub type AuthorizePacket = fn(&Context, Vec<u8>, Option<SocketAddr>) -> Authorization;

/// Build an Access-Reject for a decoded request
///
/// The reply carries the request identifier and Proxy-State attributes and
/// is keyed with the secret bound to the request. When the request was signed
/// with Message-Authenticator, so is the reply.
pub fn build_reject(request: &ClientPacket) -> Result<Vec<u8>, ResponseError> {
    let packet = request.packet().ok_or(ResponseError::NotDecoded)?;
    let secret = request.secret().ok_or(ResponseError::NoSecret)?;

    let mut reject = packet.response(Code::AccessReject);
    let signed = packet
        .find_attribute(AttributeType::MessageAuthenticator as u8)
        .is_some();
    if signed {
        reject.add_attribute(Attribute::new(
            AttributeType::MessageAuthenticator as u8,
            vec![0u8; 16],
        )?);
    }

    // Message-Authenticator is computed with the request authenticator in
    // place, the response authenticator afterwards over the signed bytes
    let mut bytes = reject.encode()?;
    if signed {
        let offset = reject
            .attribute_value_offset(AttributeType::MessageAuthenticator as u8)
            .ok_or(ResponseError::MessageAuthenticator)?;
        if !sign_message_authenticator(&mut bytes, secret, offset) {
            return Err(ResponseError::MessageAuthenticator);
        }
        reject = Packet::decode(&bytes)?;
    }

    let authenticator = calculate_response_authenticator(&reject, &packet.authenticator, secret)?;
    bytes[4..Packet::MIN_PACKET_SIZE].copy_from_slice(&authenticator);
    Ok(bytes)
}

/// Authorize a request and answer failures as policy allows
///
/// Returns whether the request was authorized. `write_back` receives the
/// encoded reject, if one is sent at all; send errors are the writer's
/// concern.
pub fn handle_auth(
    authorize: AuthorizePacket,
    ctx: &Context,
    bytes: Vec<u8>,
    addr: Option<SocketAddr>,
    write_back: Option<&dyn Fn(&[u8])>,
) -> bool {
    let Authorization { packet, reason } = authorize(ctx, bytes, addr);
    if reason.is_success() {
        return true;
    }

    if ctx.no_reject() || reason == ReasonCode::BadSecret {
        debug!(client_addr = ?addr, reason = ?reason, "Not sending reject");
        return false;
    }

    if let Some(e) = packet.error() {
        debug!(client_addr = ?addr, error = %e, "Not responding to undecodable packet");
        return false;
    }

    match build_reject(&packet) {
        Ok(reject) => {
            if let Some(write) = write_back {
                write(&reject);
            }
        }
        Err(e) => warn!(client_addr = ?addr, error = %e, "Unable to build reject"),
    }

    false
}
