//! Wire layer for a post-quantum handshake toolkit: packet framing with
//! MTU-aware fragmentation, a typed payload catalog, and a signed-key
//! envelope that binds a KEM public key to a validity window.
//!
//! Concrete post-quantum primitives are not part of this crate. Callers
//! supply a [`scheme::KemScheme`] and/or [`scheme::SigScheme`]; the wire
//! layer consumes them only through those interfaces.

pub mod error;
pub mod header;
pub mod marshaller;
pub mod payload;
pub mod scheme;
pub mod sig_data;
pub mod varint;

pub use error::{WireError, WireResult};
pub use header::{FragmentMeta, PacketHeader, PacketType, HEADER_SIZE, HEADER_SIZE_FOR_FRAGMENTATION};
pub use marshaller::{Marshaller, Transport};
pub use payload::{
    EmptyPayload, Payload, PublicKeyPayload, PublicKeySignedPacketPayload,
    SignedPacketSigPublicKeyPayload,
};
pub use scheme::{wrap_kem, wrap_sig, KemPublicKey, KemScheme, SigPublicKey, SigScheme};
pub use sig_data::{now_ms, signing_payload, HashFn, SigData};
