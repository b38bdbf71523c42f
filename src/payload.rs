//! The payload catalog: every concrete packet body the marshaller knows how
//! to read and write, dispatched by [`PacketType`](crate::header::PacketType).

use crate::error::{WireError, WireResult};
use crate::header::PacketType;
use crate::scheme::{KemScheme, KemPublicKey, SigPublicKey, SigScheme};
use crate::sig_data::SigData;
use crate::varint::{read_varint, varint_len, write_varint};
use std::io::{Read, Write};

/// Every wire payload serializes, deserializes, and reports its own exact
/// byte count. `Read`/`Write` are taken as trait objects so the catalog can
/// be dispatched dynamically by packet type.
pub trait Payload: std::fmt::Debug {
    fn read_from(&mut self, input: &mut dyn Read) -> WireResult<usize>;
    fn write_to(&self, out: &mut dyn Write) -> WireResult<usize>;
    fn size(&self) -> usize;
}

/// Zero-byte control payload. Read and write touch nothing and report zero
/// bytes transferred.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmptyPayload;

impl Payload for EmptyPayload {
    fn read_from(&mut self, _input: &mut dyn Read) -> WireResult<usize> {
        Ok(0)
    }
    fn write_to(&self, _out: &mut dyn Write) -> WireResult<usize> {
        Ok(0)
    }
    fn size(&self) -> usize {
        0
    }
}

fn write_length_prefixed(out: &mut dyn Write, bytes: &[u8]) -> WireResult<usize> {
    let n = write_varint(out, bytes.len() as u64)?;
    out.write_all(bytes)?;
    Ok(n + bytes.len())
}

fn read_length_prefixed(input: &mut dyn Read) -> WireResult<(usize, Vec<u8>)> {
    let (prefix_len, len) = read_varint(input)?;
    let mut bytes = vec![0u8; len as usize];
    input.read_exact(&mut bytes)?;
    Ok((prefix_len + bytes.len(), bytes))
}

/// Raw KEM public-key bytes. `varint(len) || bytes` on the wire.
#[derive(Debug, Default, Clone)]
pub struct PublicKeyPayload {
    pub bytes: Vec<u8>,
    cached: Option<KemPublicKey>,
}

impl PartialEq for PublicKeyPayload {
    /// Compares wire bytes only; `cached` is a lazily-populated derived
    /// value, not part of the payload's identity.
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}
impl Eq for PublicKeyPayload {}

impl PublicKeyPayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, cached: None }
    }

    /// Marshals `key` into `bytes` and caches the typed form.
    pub fn save(&mut self, key: &KemPublicKey) {
        self.bytes = key.bytes.clone();
        self.cached = Some(key.clone());
    }

    /// Parses `bytes` into a typed key via `scheme`, caching the result.
    pub fn load(&mut self, scheme: &dyn KemScheme) -> WireResult<&KemPublicKey> {
        if self.cached.is_none() {
            let parsed = scheme.parse_public_key(&self.bytes)?;
            self.cached = Some(KemPublicKey {
                bytes: parsed,
                scheme_name: scheme.name(),
            });
        }
        Ok(self.cached.as_ref().unwrap())
    }
}

impl Payload for PublicKeyPayload {
    fn read_from(&mut self, input: &mut dyn Read) -> WireResult<usize> {
        let (n, bytes) = read_length_prefixed(input)?;
        self.bytes = bytes;
        self.cached = None;
        Ok(n)
    }
    fn write_to(&self, out: &mut dyn Write) -> WireResult<usize> {
        write_length_prefixed(out, &self.bytes)
    }
    fn size(&self) -> usize {
        varint_len(self.bytes.len() as u64) + self.bytes.len()
    }
}

/// Raw signature-scheme public-key bytes. Identical wire shape to
/// [`PublicKeyPayload`] but a distinct type so dispatch-by-packet-type
/// (type 10) routes correctly.
#[derive(Debug, Default, Clone)]
pub struct SignedPacketSigPublicKeyPayload {
    pub bytes: Vec<u8>,
    cached: Option<SigPublicKey>,
}

impl PartialEq for SignedPacketSigPublicKeyPayload {
    /// Compares wire bytes only; `cached` is a lazily-populated derived
    /// value, not part of the payload's identity.
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}
impl Eq for SignedPacketSigPublicKeyPayload {}

impl SignedPacketSigPublicKeyPayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, cached: None }
    }

    pub fn save(&mut self, key: &SigPublicKey) {
        self.bytes = key.bytes.clone();
        self.cached = Some(key.clone());
    }

    pub fn load(&mut self, scheme: &dyn SigScheme) -> WireResult<&SigPublicKey> {
        if self.cached.is_none() {
            let parsed = scheme.parse_public_key(&self.bytes)?;
            self.cached = Some(SigPublicKey {
                bytes: parsed,
                scheme_name: scheme.name(),
            });
        }
        Ok(self.cached.as_ref().unwrap())
    }
}

impl Payload for SignedPacketSigPublicKeyPayload {
    fn read_from(&mut self, input: &mut dyn Read) -> WireResult<usize> {
        let (n, bytes) = read_length_prefixed(input)?;
        self.bytes = bytes;
        self.cached = None;
        Ok(n)
    }
    fn write_to(&self, out: &mut dyn Write) -> WireResult<usize> {
        write_length_prefixed(out, &self.bytes)
    }
    fn size(&self) -> usize {
        varint_len(self.bytes.len() as u64) + self.bytes.len()
    }
}

/// The signed-key envelope payload: a marshaled [`SigData`] (without its
/// certified public key) plus a hash identifying the trust anchor it
/// should be verified against.
///
/// Wire format: `varint(len(SignatureData)) || SignatureData ||
/// varint(len(SigPubKeyHash)) || SigPubKeyHash`.
#[derive(Debug, Default, Clone)]
pub struct PublicKeySignedPacketPayload {
    pub signature_data: Vec<u8>,
    pub sig_pub_key_hash: Vec<u8>,
    cached: Option<SigData>,
}

impl PartialEq for PublicKeySignedPacketPayload {
    /// Compares wire fields only; `cached` is a lazily-populated derived
    /// value, not part of the payload's identity.
    fn eq(&self, other: &Self) -> bool {
        self.signature_data == other.signature_data && self.sig_pub_key_hash == other.sig_pub_key_hash
    }
}
impl Eq for PublicKeySignedPacketPayload {}

impl PublicKeySignedPacketPayload {
    /// Marshals `sig_data` into `signature_data`.
    pub fn save(&mut self, sig_data: &SigData) -> WireResult<()> {
        self.signature_data = sig_data.marshal_binary()?;
        self.cached = Some(sig_data.clone());
        Ok(())
    }

    /// Parses `signature_data` into a [`SigData`], filling in its
    /// `public_key` field from `kem_public_key_being_certified` (the
    /// envelope itself never carries that key on the wire).
    pub fn load(&mut self, kem_public_key_being_certified: Option<&[u8]>) -> WireResult<&SigData> {
        let Some(kem_key) = kem_public_key_being_certified else {
            return Err(WireError::KeyNil);
        };
        let mut parsed = SigData::unmarshal_binary(&self.signature_data)?;
        parsed.public_key = Some(kem_key.to_vec());
        self.cached = Some(parsed);
        Ok(self.cached.as_ref().unwrap())
    }
}

impl Payload for PublicKeySignedPacketPayload {
    fn read_from(&mut self, input: &mut dyn Read) -> WireResult<usize> {
        let (n1, sig) = read_length_prefixed(input)?;
        let (n2, hash) = read_length_prefixed(input)?;
        self.signature_data = sig;
        self.sig_pub_key_hash = hash;
        self.cached = None;
        Ok(n1 + n2)
    }
    fn write_to(&self, out: &mut dyn Write) -> WireResult<usize> {
        let n1 = write_length_prefixed(out, &self.signature_data)?;
        let n2 = write_length_prefixed(out, &self.sig_pub_key_hash)?;
        Ok(n1 + n2)
    }
    fn size(&self) -> usize {
        varint_len(self.signature_data.len() as u64)
            + self.signature_data.len()
            + varint_len(self.sig_pub_key_hash.len() as u64)
            + self.sig_pub_key_hash.len()
    }
}

/// Constructs the empty, zero-initialized payload value appropriate for
/// `id`, ready to have `read_from` fill it in.
pub fn empty_for(id: PacketType) -> Box<dyn Payload> {
    match id {
        PacketType::ConnectionRejected
        | PacketType::PublicKeyRequest
        | PacketType::SignatureRequest
        | PacketType::SignaturePublicKeyRequest => Box::new(EmptyPayload),
        PacketType::PublicKeyData => Box::new(PublicKeyPayload::default()),
        PacketType::PublicKeySigned => Box::new(PublicKeySignedPacketPayload::default()),
        PacketType::SignedPacketSigPublicKey => {
            Box::new(SignedPacketSigPublicKeyPayload::default())
        }
    }
}
