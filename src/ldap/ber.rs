//! BER (X.690) TLV encoding, limited to the definite-length forms LDAP uses.
//!
//! Format: [identifier:1+][length:1+][contents:N]

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Packets larger than this are refused before their contents are read.
pub const MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

pub const TAG_BOOLEAN: u32 = 1;
pub const TAG_INTEGER: u32 = 2;
pub const TAG_OCTET_STRING: u32 = 4;
pub const TAG_ENUMERATED: u32 = 10;
pub const TAG_SEQUENCE: u32 = 16;
pub const TAG_SET: u32 = 17;

#[derive(Debug, Error)]
pub enum BerError {
    #[error("unexpected end of packet")]
    Truncated,
    #[error("indefinite length is not supported")]
    IndefiniteLength,
    #[error("packet of {0} bytes exceeds the size limit")]
    TooLarge(usize),
    #[error("invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BerError {
    pub fn invalid(kind: &'static str, reason: impl Into<String>) -> Self {
        BerError::Invalid {
            kind,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Universal,
    Application,
    Context,
    Private,
}

impl Class {
    fn from_bits(identifier: u8) -> Self {
        match identifier >> 6 {
            0 => Class::Universal,
            1 => Class::Application,
            2 => Class::Context,
            _ => Class::Private,
        }
    }

    fn bits(&self) -> u8 {
        match self {
            Class::Universal => 0x00,
            Class::Application => 0x40,
            Class::Context => 0x80,
            Class::Private => 0xc0,
        }
    }
}

/// One TLV. Constructed packets keep their children decoded; primitive
/// packets keep their raw contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub class: Class,
    pub constructed: bool,
    pub tag: u32,
    pub data: Vec<u8>,
    pub children: Vec<Packet>,
}

impl Packet {
    pub fn primitive(class: Class, tag: u32, data: Vec<u8>) -> Self {
        Packet {
            class,
            constructed: false,
            tag,
            data,
            children: Vec::new(),
        }
    }

    pub fn constructed(class: Class, tag: u32, children: Vec<Packet>) -> Self {
        Packet {
            class,
            constructed: true,
            tag,
            data: Vec::new(),
            children,
        }
    }

    pub fn sequence(children: Vec<Packet>) -> Self {
        Self::constructed(Class::Universal, TAG_SEQUENCE, children)
    }

    pub fn set(children: Vec<Packet>) -> Self {
        Self::constructed(Class::Universal, TAG_SET, children)
    }

    pub fn integer(value: i64) -> Self {
        Self::primitive(Class::Universal, TAG_INTEGER, encode_integer(value))
    }

    pub fn enumerated(value: i64) -> Self {
        Self::primitive(Class::Universal, TAG_ENUMERATED, encode_integer(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::primitive(Class::Universal, TAG_BOOLEAN, vec![if value { 0xff } else { 0 }])
    }

    pub fn octet_string(value: impl AsRef<[u8]>) -> Self {
        Self::primitive(Class::Universal, TAG_OCTET_STRING, value.as_ref().to_vec())
    }

    pub fn is(&self, class: Class, tag: u32) -> bool {
        self.class == class && self.tag == tag
    }

    pub fn child(&self, index: usize) -> Result<&Packet, BerError> {
        self.children.get(index).ok_or_else(|| {
            BerError::invalid(
                "packet",
                format!("expected at least {} children, found {}", index + 1, self.children.len()),
            )
        })
    }

    /// Contents of an INTEGER or ENUMERATED.
    pub fn as_i64(&self) -> Result<i64, BerError> {
        if self.constructed || self.data.is_empty() || self.data.len() > 8 {
            return Err(BerError::invalid(
                "integer",
                format!("{} content bytes", self.data.len()),
            ));
        }
        let negative = self.data[0] & 0x80 != 0;
        let mut value: i64 = if negative { -1 } else { 0 };
        for byte in &self.data {
            value = (value << 8) | i64::from(*byte);
        }
        Ok(value)
    }

    pub fn as_bool(&self) -> Result<bool, BerError> {
        match self.data.as_slice() {
            [byte] => Ok(*byte != 0),
            other => Err(BerError::invalid("boolean", format!("{} content bytes", other.len()))),
        }
    }

    /// Contents of a primitive packet as text. LDAP strings are UTF-8.
    pub fn as_str(&self) -> Result<String, BerError> {
        if self.constructed {
            return Err(BerError::invalid("string", "constructed encoding"));
        }
        String::from_utf8(self.data.clone()).map_err(|e| BerError::invalid("string", e.to_string()))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut Vec<u8>) {
        let contents = if self.constructed {
            let mut contents = Vec::new();
            for child in &self.children {
                child.write_into(&mut contents);
            }
            contents
        } else {
            self.data.clone()
        };
        let constructed = if self.constructed { 0x20 } else { 0 };
        if self.tag < 31 {
            out.push(self.class.bits() | constructed | self.tag as u8);
        } else {
            out.push(self.class.bits() | constructed | 0x1f);
            let mut groups = Vec::new();
            let mut tag = self.tag;
            loop {
                groups.push((tag & 0x7f) as u8);
                tag >>= 7;
                if tag == 0 {
                    break;
                }
            }
            for (i, group) in groups.iter().enumerate().rev() {
                out.push(if i == 0 { *group } else { group | 0x80 });
            }
        }
        write_length(contents.len(), out);
        out.extend_from_slice(&contents);
    }

    /// Decodes one packet from the front of `buf`, returning it with the
    /// number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Packet, usize), BerError> {
        let (header, length) = read_header(buf)?;
        let end = header
            .checked_add(length)
            .filter(|end| *end <= buf.len())
            .ok_or(BerError::Truncated)?;
        let identifier = buf[0];
        let (tag, _) = read_tag(buf)?;
        let class = Class::from_bits(identifier);
        let contents = &buf[header..end];
        let packet = if identifier & 0x20 != 0 {
            let mut children = Vec::new();
            let mut offset = 0;
            while offset < contents.len() {
                let (child, used) = Packet::decode(&contents[offset..])?;
                children.push(child);
                offset += used;
            }
            Packet::constructed(class, tag, children)
        } else {
            Packet::primitive(class, tag, contents.to_vec())
        };
        Ok((packet, end))
    }

    /// Reads exactly one packet. `Ok(None)` means the peer closed the stream
    /// between packets.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Packet>, BerError> {
        let mut buf = Vec::with_capacity(64);
        let mut byte = [0u8; 1];
        if reader.read(&mut byte).await? == 0 {
            return Ok(None);
        }
        buf.push(byte[0]);
        if byte[0] & 0x1f == 0x1f {
            loop {
                reader.read_exact(&mut byte).await?;
                buf.push(byte[0]);
                if byte[0] & 0x80 == 0 {
                    break;
                }
                if buf.len() > 6 {
                    return Err(BerError::invalid("tag", "tag number too large"));
                }
            }
        }
        reader.read_exact(&mut byte).await?;
        buf.push(byte[0]);
        if byte[0] & 0x80 != 0 {
            let count = usize::from(byte[0] & 0x7f);
            if count == 0 {
                return Err(BerError::IndefiniteLength);
            }
            if count > 8 {
                return Err(BerError::invalid("length", format!("{} length bytes", count)));
            }
            let start = buf.len();
            buf.resize(start + count, 0);
            reader.read_exact(&mut buf[start..]).await?;
        }
        let (header, length) = read_header(&buf)?;
        if length > MAX_PACKET_SIZE {
            return Err(BerError::TooLarge(length));
        }
        buf.resize(header + length, 0);
        reader.read_exact(&mut buf[header..]).await?;
        let (packet, _) = Packet::decode(&buf)?;
        Ok(Some(packet))
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), BerError> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

fn write_length(length: usize, out: &mut Vec<u8>) {
    if length < 0x80 {
        out.push(length as u8);
        return;
    }
    let bytes = length.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

/// Tag number and the identifier length in bytes.
fn read_tag(buf: &[u8]) -> Result<(u32, usize), BerError> {
    let first = *buf.first().ok_or(BerError::Truncated)?;
    if first & 0x1f != 0x1f {
        return Ok((u32::from(first & 0x1f), 1));
    }
    let mut tag: u32 = 0;
    for (i, byte) in buf.iter().enumerate().skip(1) {
        if i > 5 {
            return Err(BerError::invalid("tag", "tag number too large"));
        }
        tag = (tag << 7) | u32::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok((tag, i + 1));
        }
    }
    Err(BerError::Truncated)
}

/// Header length and content length.
fn read_header(buf: &[u8]) -> Result<(usize, usize), BerError> {
    let (_, offset) = read_tag(buf)?;
    let first = *buf.get(offset).ok_or(BerError::Truncated)?;
    if first & 0x80 == 0 {
        return Ok((offset + 1, usize::from(first)));
    }
    let count = usize::from(first & 0x7f);
    if count == 0 {
        return Err(BerError::IndefiniteLength);
    }
    if count > 8 {
        return Err(BerError::invalid("length", format!("{} length bytes", count)));
    }
    let bytes = buf
        .get(offset + 1..offset + 1 + count)
        .ok_or(BerError::Truncated)?;
    let length = bytes
        .iter()
        .try_fold(0usize, |acc, b| acc.checked_mul(256).map(|v| v + usize::from(*b)))
        .ok_or_else(|| BerError::invalid("length", "overflow"))?;
    Ok((offset + 1 + count, length))
}
