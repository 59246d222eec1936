use crate::packet::{Packet, PacketError};

/// MD5 over an encoded packet whose authenticator field is replaced by
/// `authenticator`, followed by the shared secret.
fn digest_with_authenticator(
    packet: &Packet,
    authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    let mut data = packet.encode()?;
    data[4..Packet::MIN_PACKET_SIZE].copy_from_slice(authenticator);
    data.extend_from_slice(secret);
    Ok(md5::compute(&data).0)
}

/// Calculate Response Authenticator per RFC 2865 Section 3
///
/// Response Authenticator = MD5(Code + ID + Length + Request Authenticator + Attributes + Secret)
///
/// This is used for Access-Accept, Access-Reject, and Access-Challenge packets.
pub fn calculate_response_authenticator(
    packet: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    digest_with_authenticator(packet, request_authenticator, secret)
}

/// Verify Response Authenticator
pub fn verify_response_authenticator(
    response: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    calculate_response_authenticator(response, request_authenticator, secret)
        .map(|calculated| calculated == response.authenticator)
        .unwrap_or(false)
}

/// Calculate the Request Authenticator of an Accounting-Request (RFC 2866 Section 3)
///
/// Request Authenticator = MD5(Code + ID + Length + 16 zero octets + Attributes + Secret)
pub fn calculate_accounting_request_authenticator(
    packet: &Packet,
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    digest_with_authenticator(packet, &[0u8; 16], secret)
}

/// Verify the Request Authenticator of a raw Accounting-Request
///
/// Works on the received bytes rather than a re-encoded packet so that
/// attribute ordering and padding quirks of the sender cannot matter.
pub fn verify_accounting_request_authenticator(data: &[u8], secret: &[u8]) -> bool {
    let length = match Packet::declared_length(data) {
        Ok(length) => length,
        Err(_) => return false,
    };

    let mut copy = data[..length].to_vec();
    copy[4..Packet::MIN_PACKET_SIZE].fill(0);
    copy.extend_from_slice(secret);
    md5::compute(&copy).0 == data[4..Packet::MIN_PACKET_SIZE]
}
