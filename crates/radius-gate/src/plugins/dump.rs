//! Request dumps shared by the `log` and `debug` plugins

use crate::audit::AuditEntry;
use crate::packet::ClientPacket;
use radius_proto::{AcctStatusType, Attribute, AttributeType};
use std::fmt::Write;

const REDACTED: &str = "<redacted>";

/// Printable value of one attribute
///
/// Passwords and authenticators are never rendered.
pub fn render_attribute(attr: &Attribute) -> String {
    let Some(kind) = attr.kind() else {
        return hex(&attr.value);
    };

    if kind.is_sensitive() {
        return REDACTED.to_string();
    }
    if kind == AttributeType::NasIpAddress {
        if let Ok(ip) = attr.as_ipv4() {
            return ip.to_string();
        }
    }
    if kind == AttributeType::AcctStatusType {
        if let Some(status) = attr.as_integer().ok().and_then(AcctStatusType::from_u32) {
            return status.name().to_string();
        }
    }
    if kind.is_integer() {
        if let Ok(value) = attr.as_integer() {
            return value.to_string();
        }
    }
    if kind.is_text() {
        if let Ok(text) = attr.as_string() {
            return text;
        }
    }
    hex(&attr.value)
}

/// Attribute name as used for dump keys
pub fn attribute_name(attr_type: u8) -> String {
    AttributeType::from_u8(attr_type)
        .map(|kind| kind.name().to_string())
        .unwrap_or_else(|| format!("Attr-{}", attr_type))
}

/// Audit record describing a decoded request
///
/// Repeated attributes are joined with `", "` in arrival order. Undecoded
/// packets only carry their size and source.
pub fn request_entry(plugin: &str, mode: &str, packet: &ClientPacket) -> AuditEntry {
    let mut entry = AuditEntry::new(plugin, mode).with_field(
        "client",
        packet
            .host()
            .map(|host| host.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    );

    let Some(decoded) = packet.packet() else {
        return entry.with_field("undecoded_bytes", packet.buffer().len().to_string());
    };

    entry = entry
        .with_field("code", decoded.code.name())
        .with_field("id", decoded.identifier.to_string());

    for attr in &decoded.attributes {
        let value = render_attribute(attr);
        entry
            .fields
            .entry(attribute_name(attr.attr_type))
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.clone());
    }
    entry
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::tests::signed_request;
    use std::net::Ipv4Addr;

    #[test]
    fn test_render_values() {
        let name = Attribute::string(AttributeType::UserName as u8, "alice").unwrap();
        assert_eq!(render_attribute(&name), "alice");

        let port = Attribute::integer(AttributeType::NasPort as u8, 12).unwrap();
        assert_eq!(render_attribute(&port), "12");

        let ip = Attribute::ipv4(AttributeType::NasIpAddress as u8, Ipv4Addr::new(10, 1, 2, 3)).unwrap();
        assert_eq!(render_attribute(&ip), "10.1.2.3");

        let unknown = Attribute::new(200, vec![0xde, 0xad]).unwrap();
        assert_eq!(render_attribute(&unknown), "dead");
        assert_eq!(attribute_name(200), "Attr-200");
    }

    #[test]
    fn test_sensitive_values_are_redacted() {
        let password = Attribute::new(AttributeType::UserPassword as u8, b"hunter2".to_vec()).unwrap();
        assert_eq!(render_attribute(&password), REDACTED);
    }

    #[test]
    fn test_request_entry() {
        let packet = ClientPacket::new(
            signed_request(b"s", "alice", "aa-bb"),
            Some("10.0.0.5:1000".parse().unwrap()),
        );
        packet.decode().unwrap();

        let entry = request_entry("log", "preauth", &packet);
        assert_eq!(entry.event, "preauth");
        assert_eq!(entry.fields["client"], "10.0.0.5");
        assert_eq!(entry.fields["User-Name"], "alice");
        assert_eq!(entry.fields["Calling-Station-Id"], "aa-bb");
        assert_eq!(entry.fields["Message-Authenticator"], REDACTED);
    }

    #[test]
    fn test_undecoded_entry() {
        let packet = ClientPacket::new(vec![1, 2, 3], None);
        let entry = request_entry("log", "trace", &packet);
        assert_eq!(entry.fields["undecoded_bytes"], "3");
        assert_eq!(entry.fields["client"], "unknown");
    }
}
