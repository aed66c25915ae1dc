//! Minimal STUN connectivity-check keep-alive (RFC 5389 §6, binding
//! method only). Full ICE candidate gathering/prioritization and TURN
//! relay allocation are out of scope; this is just enough to keep a NAT
//! binding open and confirm the peer is still reachable.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

const MAGIC_COOKIE: u32 = 0x2112_A442;
const BINDING_REQUEST: u16 = 0x0001;
const BINDING_RESPONSE: u16 = 0x0101;
const XOR_MAPPED_ADDRESS: u16 = 0x0020;
const USERNAME: u16 = 0x0006;

pub type TransactionId = [u8; 12];

fn padded_len(len: usize) -> usize {
    len + (4 - len % 4) % 4
}

/// Builds a STUN Binding Request carrying a USERNAME attribute formed as
/// `local_ice || remote_ice`, the keep-alive credential convention this
/// minimal ICE exchange uses in place of full short-term-credential
/// message integrity (no MESSAGE-INTEGRITY/FINGERPRINT — out of scope).
pub fn build_binding_request(transaction_id: TransactionId, username: &str) -> Vec<u8> {
    let mut attrs = Vec::new();
    let bytes = username.as_bytes();
    attrs.extend_from_slice(&USERNAME.to_be_bytes());
    attrs.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    attrs.extend_from_slice(bytes);
    attrs.resize(4 + padded_len(bytes.len()), 0);

    let mut out = Vec::with_capacity(20 + attrs.len());
    out.extend_from_slice(&BINDING_REQUEST.to_be_bytes());
    out.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
    out.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    out.extend_from_slice(&transaction_id);
    out.extend_from_slice(&attrs);
    out
}

/// Builds a STUN Binding Response carrying the reflexive address as
/// XOR-MAPPED-ADDRESS.
pub fn build_binding_response(transaction_id: TransactionId, mapped: SocketAddr) -> Vec<u8> {
    let mut attr = Vec::new();
    match mapped.ip() {
        IpAddr::V4(addr) => {
            attr.push(0);
            attr.push(0x01);
            attr.extend_from_slice(&(mapped.port() ^ (MAGIC_COOKIE >> 16) as u16).to_be_bytes());
            let octets = u32::from(addr) ^ MAGIC_COOKIE;
            attr.extend_from_slice(&octets.to_be_bytes());
        }
        IpAddr::V6(addr) => {
            attr.push(0);
            attr.push(0x02);
            attr.extend_from_slice(&(mapped.port() ^ (MAGIC_COOKIE >> 16) as u16).to_be_bytes());
            let mut cookie_and_tx = Vec::with_capacity(16);
            cookie_and_tx.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
            cookie_and_tx.extend_from_slice(&transaction_id);
            for (byte, key) in addr.octets().iter().zip(cookie_and_tx.iter()) {
                attr.push(byte ^ key);
            }
        }
    }

    let mut out = Vec::with_capacity(20 + 4 + attr.len());
    out.extend_from_slice(&BINDING_RESPONSE.to_be_bytes());
    out.extend_from_slice(&((4 + attr.len()) as u16).to_be_bytes());
    out.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    out.extend_from_slice(&transaction_id);
    out.extend_from_slice(&XOR_MAPPED_ADDRESS.to_be_bytes());
    out.extend_from_slice(&(attr.len() as u16).to_be_bytes());
    out.extend_from_slice(&attr);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StunMessage {
    BindingRequest { transaction_id: TransactionId, username: Option<String> },
    BindingResponse { transaction_id: TransactionId, mapped: SocketAddr },
    Other,
}

/// Recognizes a STUN header and, for a binding response, decodes the
/// XOR-MAPPED-ADDRESS. Anything that doesn't start with a valid STUN
/// header and the magic cookie is reported as [`StunMessage::Other`]
/// rather than an error, since this keep-alive channel shares a socket
/// with RTP/RTCP and most datagrams on it won't be STUN at all.
pub fn parse(buf: &[u8]) -> StunMessage {
    if buf.len() < 20 {
        return StunMessage::Other;
    }

    let message_type = u16::from_be_bytes([buf[0], buf[1]]);
    let cookie = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if cookie != MAGIC_COOKIE {
        return StunMessage::Other;
    }

    let mut transaction_id = [0u8; 12];
    transaction_id.copy_from_slice(&buf[8..20]);

    let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    let body = &buf[20..(20 + length).min(buf.len())];

    match message_type {
        BINDING_REQUEST => StunMessage::BindingRequest {
            transaction_id,
            username: decode_username(body),
        },
        BINDING_RESPONSE => match decode_xor_mapped_address(body, transaction_id) {
            Some(mapped) => StunMessage::BindingResponse { transaction_id, mapped },
            None => StunMessage::Other,
        },
        _ => StunMessage::Other,
    }
}

/// Walks a STUN attribute TLV section, calling `visit` with each
/// attribute's type and value until it returns `Some`, or the attributes
/// are exhausted (malformed trailing bytes are treated as "no more
/// attributes" rather than an error, matching [`parse`]'s permissive
/// stance on this shared, mostly-non-STUN socket).
fn walk_attributes<T>(body: &[u8], mut visit: impl FnMut(u16, &[u8]) -> Option<T>) -> Option<T> {
    let mut pos = 0;
    while pos + 4 <= body.len() {
        let attr_type = u16::from_be_bytes([body[pos], body[pos + 1]]);
        let attr_len = u16::from_be_bytes([body[pos + 2], body[pos + 3]]) as usize;
        let start = pos + 4;
        let end = start + attr_len;
        if end > body.len() {
            return None;
        }

        if let Some(found) = visit(attr_type, &body[start..end]) {
            return Some(found);
        }

        pos = end + (4 - end % 4) % 4;
    }
    None
}

fn decode_username(body: &[u8]) -> Option<String> {
    walk_attributes(body, |attr_type, value| {
        (attr_type == USERNAME).then(|| String::from_utf8_lossy(value).into_owned())
    })
}

fn decode_xor_mapped_address(body: &[u8], transaction_id: TransactionId) -> Option<SocketAddr> {
    walk_attributes(body, |attr_type, value| {
        if attr_type != XOR_MAPPED_ADDRESS || value.len() < 4 {
            return None;
        }

        let family = value[1];
        let port = u16::from_be_bytes([value[2], value[3]]) ^ (MAGIC_COOKIE >> 16) as u16;

        match family {
            0x01 => {
                let xored = u32::from_be_bytes(value[4..8].try_into().ok()?);
                let ip = Ipv4Addr::from(xored ^ MAGIC_COOKIE);
                Some(SocketAddr::new(IpAddr::V4(ip), port))
            }
            0x02 => {
                let mut cookie_and_tx = Vec::with_capacity(16);
                cookie_and_tx.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
                cookie_and_tx.extend_from_slice(&transaction_id);
                let mut octets = [0u8; 16];
                for (i, (byte, key)) in value[4..20].iter().zip(cookie_and_tx.iter()).enumerate() {
                    octets[i] = byte ^ key;
                }
                Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
            }
            _ => None,
        }
    })
}
