//! Message-Authenticator Support (RFC 3579 Section 3.2)
//!
//! Message-Authenticator = HMAC-MD5(shared secret, packet) where the packet is
//! taken with the Message-Authenticator value set to sixteen zero octets and,
//! for replies, with the Request Authenticator in the authenticator field.
//! It is the only per-packet proof of the shared secret that an
//! Access-Request can carry.

use hmac::{Hmac, Mac};
use md5_digest::Md5;

type HmacMd5 = Hmac<Md5>;

fn keyed(secret: &[u8]) -> HmacMd5 {
    HmacMd5::new_from_slice(secret).expect("HMAC can take key of any size")
}

/// Calculate Message-Authenticator over packet bytes whose attribute value is already zeroed
pub fn calculate_message_authenticator(packet_bytes: &[u8], secret: &[u8]) -> [u8; 16] {
    let mut mac = keyed(secret);
    mac.update(packet_bytes);
    mac.finalize().into_bytes().into()
}

/// Zero the value at `offset`, compute the HMAC and write it in place
///
/// Returns false when `offset` does not leave room for a 16-byte value.
pub fn sign_message_authenticator(packet_bytes: &mut [u8], secret: &[u8], offset: usize) -> bool {
    let Some(value) = packet_bytes.get_mut(offset..offset + 16) else {
        return false;
    };
    value.fill(0);
    let auth = calculate_message_authenticator(packet_bytes, secret);
    packet_bytes[offset..offset + 16].copy_from_slice(&auth);
    true
}

/// Verify Message-Authenticator in a RADIUS packet
///
/// `message_auth_offset` is the byte offset of the attribute value (after the
/// type and length octets). The comparison is constant-time.
pub fn verify_message_authenticator(
    packet_bytes: &[u8],
    secret: &[u8],
    message_auth_offset: usize,
) -> bool {
    let Some(received) = packet_bytes.get(message_auth_offset..message_auth_offset + 16) else {
        return false;
    };

    let mut packet_copy = packet_bytes.to_vec();
    packet_copy[message_auth_offset..message_auth_offset + 16].fill(0);

    let mut mac = keyed(secret);
    mac.update(&packet_copy);
    mac.verify_slice(received).is_ok()
}
