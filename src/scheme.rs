//! Abstract KEM and signature scheme interfaces the wire layer depends on,
//! plus the process-wide registry that canonicalizes scheme wrappers.
//!
//! The core never names a concrete post-quantum algorithm. Implementers
//! supply a [`KemScheme`] and/or [`SigScheme`] and register it once via
//! [`wrap_kem`] / [`wrap_sig`]; keys then resolve their scheme by name
//! through the registry rather than holding a direct reference to it.

use crate::error::{WireError, WireResult};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// A Key Encapsulation Mechanism: keygen, encapsulate, decapsulate, and the
/// fixed sizes a wire-layer caller needs to size buffers ahead of time.
pub trait KemScheme: Send + Sync {
    fn name(&self) -> &'static str;
    fn generate_keypair(&self) -> WireResult<(Vec<u8>, Vec<u8>)>;
    fn encapsulate(&self, public_key: &[u8]) -> WireResult<(Vec<u8>, Vec<u8>)>;
    fn decapsulate(&self, private_key: &[u8], ciphertext: &[u8]) -> WireResult<Vec<u8>>;
    fn parse_public_key(&self, bytes: &[u8]) -> WireResult<Vec<u8>>;
    fn parse_private_key(&self, bytes: &[u8]) -> WireResult<Vec<u8>>;
    fn ciphertext_size(&self) -> usize;
    fn shared_key_size(&self) -> usize;
    fn public_key_size(&self) -> usize;
    fn private_key_size(&self) -> usize;
}

/// A signature scheme: keygen, sign, verify, and the fixed sizes a wire
/// layer caller needs.
pub trait SigScheme: Send + Sync {
    fn name(&self) -> &'static str;
    fn generate_keypair(&self) -> WireResult<(Vec<u8>, Vec<u8>)>;
    fn sign(&self, private_key: &[u8], message: &[u8]) -> WireResult<Vec<u8>>;
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool;
    fn parse_public_key(&self, bytes: &[u8]) -> WireResult<Vec<u8>>;
    fn parse_private_key(&self, bytes: &[u8]) -> WireResult<Vec<u8>>;
    fn public_key_size(&self) -> usize;
    fn private_key_size(&self) -> usize;
    fn signature_size(&self) -> usize;
}

/// Calls `f`, catching any unwind from inside it and converting it into
/// [`WireError::PrimitiveFailure`]. Scheme primitives must never be allowed
/// to propagate a panic across the trait boundary.
pub(crate) fn guarded<F, T>(label: &'static str, f: F) -> WireResult<T>
where
    F: FnOnce() -> WireResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => Err(WireError::PrimitiveFailure(label)),
    }
}

struct Registry {
    kem: RwLock<HashMap<&'static str, Arc<dyn KemScheme>>>,
    sig: RwLock<HashMap<&'static str, Arc<dyn SigScheme>>>,
}

impl Registry {
    fn new() -> Self {
        Self {
            kem: RwLock::new(HashMap::new()),
            sig: RwLock::new(HashMap::new()),
        }
    }
}

fn registry() -> &'static Registry {
    use std::sync::OnceLock;
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}

/// Installs (or returns the already-installed) wrapper for a KEM scheme,
/// keyed by its name. Readers never observe a half-initialized entry: the
/// fast path takes only a read lock; a miss upgrades to a write lock and
/// re-checks before inserting (double-checked locking).
pub fn wrap_kem(scheme: Arc<dyn KemScheme>) -> Arc<dyn KemScheme> {
    let name = scheme.name();
    if let Some(existing) = registry().kem.read().unwrap().get(name) {
        return existing.clone();
    }
    let mut guard = registry().kem.write().unwrap();
    guard.entry(name).or_insert(scheme).clone()
}

/// Installs (or returns the already-installed) wrapper for a signature scheme.
pub fn wrap_sig(scheme: Arc<dyn SigScheme>) -> Arc<dyn SigScheme> {
    let name = scheme.name();
    if let Some(existing) = registry().sig.read().unwrap().get(name) {
        return existing.clone();
    }
    let mut guard = registry().sig.write().unwrap();
    guard.entry(name).or_insert(scheme).clone()
}

/// Looks up a previously-wrapped KEM scheme by name.
pub fn lookup_kem(name: &str) -> Option<Arc<dyn KemScheme>> {
    registry().kem.read().unwrap().get(name).cloned()
}

/// Looks up a previously-wrapped signature scheme by name.
pub fn lookup_sig(name: &str) -> Option<Arc<dyn SigScheme>> {
    registry().sig.read().unwrap().get(name).cloned()
}

/// A KEM public key: raw bytes plus a lookup (not ownership) back to the
/// scheme that produced it.
#[derive(Clone, Debug)]
pub struct KemPublicKey {
    pub bytes: Vec<u8>,
    pub scheme_name: &'static str,
}

impl KemPublicKey {
    pub fn scheme(&self) -> WireResult<Arc<dyn KemScheme>> {
        lookup_kem(self.scheme_name).ok_or(WireError::IncompatibleKey)
    }
}

impl PartialEq for KemPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes && self.scheme_name == other.scheme_name
    }
}
impl Eq for KemPublicKey {}

/// A signature-scheme public key: raw bytes plus a scheme lookup.
#[derive(Clone, Debug)]
pub struct SigPublicKey {
    pub bytes: Vec<u8>,
    pub scheme_name: &'static str,
}

impl SigPublicKey {
    pub fn scheme(&self) -> WireResult<Arc<dyn SigScheme>> {
        lookup_sig(self.scheme_name).ok_or(WireError::IncompatibleKey)
    }
}

impl PartialEq for SigPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes && self.scheme_name == other.scheme_name
    }
}
impl Eq for SigPublicKey {}
