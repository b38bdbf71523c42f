//! Fixed-layout packet header: 25 bytes, plus an optional 4-byte
//! fragmentation extension when the high bit of the type byte is set.

use crate::error::{WireError, WireResult};
use std::io::{Read, Write};

/// High bit of the wire type byte marks a fragment.
pub const FRAGMENT_FLAG: u8 = 0x80;

pub const HEADER_SIZE: usize = 25;
pub const HEADER_SIZE_FOR_FRAGMENTATION: usize = 29;

/// The seven-bit packet type space. Values are the *masked* (actual) id;
/// the fragment flag is carried separately in [`PacketHeader::fragment`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    ConnectionRejected,
    PublicKeyRequest,
    PublicKeyData,
    SignatureRequest,
    PublicKeySigned,
    SignaturePublicKeyRequest,
    SignedPacketSigPublicKey,
}

impl PacketType {
    pub fn as_u8(self) -> u8 {
        match self {
            PacketType::ConnectionRejected => 1,
            PacketType::PublicKeyRequest => 5,
            PacketType::PublicKeyData => 6,
            PacketType::SignatureRequest => 7,
            PacketType::PublicKeySigned => 8,
            PacketType::SignaturePublicKeyRequest => 9,
            PacketType::SignedPacketSigPublicKey => 10,
        }
    }

    pub fn from_u8(value: u8) -> WireResult<Self> {
        match value {
            1 => Ok(PacketType::ConnectionRejected),
            5 => Ok(PacketType::PublicKeyRequest),
            6 => Ok(PacketType::PublicKeyData),
            7 => Ok(PacketType::SignatureRequest),
            8 => Ok(PacketType::PublicKeySigned),
            9 => Ok(PacketType::SignaturePublicKeyRequest),
            10 => Ok(PacketType::SignedPacketSigPublicKey),
            other => Err(WireError::InvalidPacketId(other)),
        }
    }
}

/// Fragment metadata, present on the wire only when the fragment flag is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragmentMeta {
    pub index: u8,
    pub count: u8,
    pub size: u16,
}

#[derive(Clone, Debug)]
pub struct PacketHeader {
    pub id: PacketType,
    pub connection_uuid: [u8; 16],
    /// Non-negative milliseconds since the Unix epoch.
    pub time_ms: i64,
    pub fragment: Option<FragmentMeta>,
}

impl PacketHeader {
    pub fn new(id: PacketType, connection_uuid: [u8; 16], time_ms: i64) -> Self {
        Self {
            id,
            connection_uuid,
            time_ms,
            fragment: None,
        }
    }

    /// The masked id: identical whether or not the fragment flag is set.
    pub fn actual_id(&self) -> PacketType {
        self.id
    }

    fn wire_id_byte(&self) -> u8 {
        if self.fragment.is_some() {
            self.id.as_u8() | FRAGMENT_FLAG
        } else {
            self.id.as_u8()
        }
    }

    /// A non-fragment copy of this header: same id, uuid, time; no fragment metadata.
    pub fn clone_plain(&self) -> Self {
        Self {
            id: self.id,
            connection_uuid: self.connection_uuid,
            time_ms: self.time_ms,
            fragment: None,
        }
    }

    /// A copy of this header carrying fragment metadata.
    pub fn clone_as_fragment(&self, index: u8, count: u8, size: u16) -> Self {
        Self {
            id: self.id,
            connection_uuid: self.connection_uuid,
            time_ms: self.time_ms,
            fragment: Some(FragmentMeta { index, count, size }),
        }
    }

    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> WireResult<usize> {
        if self.time_ms < 0 {
            return Err(WireError::TimeOutOfRange);
        }
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.wire_id_byte();
        buf[1..17].copy_from_slice(&self.connection_uuid);
        buf[17..25].copy_from_slice(&(self.time_ms as u64).to_le_bytes());
        out.write_all(&buf)?;
        let mut written = HEADER_SIZE;

        if let Some(frag) = self.fragment {
            let mut fbuf = [0u8; 4];
            fbuf[0] = frag.index;
            fbuf[1] = frag.count;
            fbuf[2..4].copy_from_slice(&frag.size.to_le_bytes());
            out.write_all(&fbuf)?;
            written += 4;
        }
        Ok(written)
    }

    pub fn read_from<R: Read + ?Sized>(input: &mut R) -> WireResult<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        input.read_exact(&mut buf)?;

        let raw_id = buf[0];
        let has_fragment = raw_id & FRAGMENT_FLAG != 0;
        let id = PacketType::from_u8(raw_id & !FRAGMENT_FLAG)?;

        let mut connection_uuid = [0u8; 16];
        connection_uuid.copy_from_slice(&buf[1..17]);

        let time_raw = u64::from_le_bytes(buf[17..25].try_into().unwrap());
        if time_raw > i64::MAX as u64 {
            return Err(WireError::TimeOutOfRange);
        }
        let time_ms = time_raw as i64;

        let fragment = if has_fragment {
            let mut fbuf = [0u8; 4];
            input.read_exact(&mut fbuf)?;
            Some(FragmentMeta {
                index: fbuf[0],
                count: fbuf[1],
                size: u16::from_le_bytes([fbuf[2], fbuf[3]]),
            })
        } else {
            None
        };

        Ok(Self {
            id,
            connection_uuid,
            time_ms,
            fragment,
        })
    }
}

impl PartialEq for PacketHeader {
    /// Compares the masked id, connection uuid, and timestamp only;
    /// fragment metadata is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.connection_uuid == other.connection_uuid
            && self.time_ms == other.time_ms
    }
}
impl Eq for PacketHeader {}
