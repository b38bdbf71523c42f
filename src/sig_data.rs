//! Signed-key envelope: binds a KEM public key to a validity window with a
//! signature, reproducible bit-for-bit between signer and verifier.

use crate::error::{WireError, WireResult};
use crate::scheme::{guarded, SigScheme};
use crate::varint::{decode_varint, encode_varint};
use std::time::{SystemTime, UNIX_EPOCH};

/// A caller-supplied reduction applied to the signing payload before it is
/// signed or verified (e.g. a domain-separated digest). `None` signs the
/// raw concatenation.
pub type HashFn = fn(&[u8]) -> Vec<u8>;

/// Current time as non-negative Unix milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Builds `publicKey || varint(issue.ms) || varint(expiry.ms)`, optionally
/// reduced by `hash`. Fails if either timestamp is negative or if
/// `expiry <= issue`.
pub fn signing_payload(
    public_key: &[u8],
    issue_ms: i64,
    expiry_ms: i64,
    hash: Option<HashFn>,
) -> WireResult<Vec<u8>> {
    if issue_ms < 0 || expiry_ms < 0 {
        return Err(WireError::TimeOutOfRange);
    }
    if expiry_ms <= issue_ms {
        return Err(WireError::TimeOutOfRange);
    }
    let mut payload = Vec::with_capacity(public_key.len() + 18);
    payload.extend_from_slice(public_key);
    payload.extend_from_slice(&encode_varint(issue_ms as u64));
    payload.extend_from_slice(&encode_varint(expiry_ms as u64));
    Ok(match hash {
        Some(h) => h(&payload),
        None => payload,
    })
}

/// A signed certificate binding a KEM public key to `[issue, expiry)`.
///
/// `public_key` is deliberately not part of the wire encoding (see
/// [`SigData::marshal_binary`]): the verifier already knows which key this
/// envelope certifies from context, so the key is supplied out-of-band.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigData {
    pub public_key: Option<Vec<u8>>,
    pub signature: Vec<u8>,
    pub issue_time_ms: i64,
    pub expiry_time_ms: i64,
}

impl SigData {
    /// Builds the signing payload, signs it with `private_key`, and
    /// packages the result.
    pub fn new(
        public_key: &[u8],
        issue_ms: i64,
        expiry_ms: i64,
        hash: Option<HashFn>,
        private_key: &[u8],
        scheme: &dyn SigScheme,
    ) -> WireResult<Self> {
        let payload = signing_payload(public_key, issue_ms, expiry_ms, hash)?;
        let signature = guarded("sig-sign", || scheme.sign(private_key, &payload))?;
        Ok(Self {
            public_key: Some(public_key.to_vec()),
            signature,
            issue_time_ms: issue_ms,
            expiry_time_ms: expiry_ms,
        })
    }

    /// `varint(len(Signature)) || Signature || varint(IssueTime.ms) || varint(ExpiryTime.ms)`.
    pub fn marshal_binary(&self) -> WireResult<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&encode_varint(self.signature.len() as u64));
        out.extend_from_slice(&self.signature);
        if self.issue_time_ms < 0 || self.expiry_time_ms < 0 {
            return Err(WireError::TimeOutOfRange);
        }
        out.extend_from_slice(&encode_varint(self.issue_time_ms as u64));
        out.extend_from_slice(&encode_varint(self.expiry_time_ms as u64));
        Ok(out)
    }

    /// Inverse of [`SigData::marshal_binary`]. `public_key` is left `None`:
    /// the caller supplies it separately once known.
    pub fn unmarshal_binary(bytes: &[u8]) -> WireResult<Self> {
        let mut cursor = bytes;
        let (consumed, sig_len) = decode_varint(cursor)?;
        cursor = &cursor[consumed..];
        if cursor.len() < sig_len as usize {
            return Err(WireError::Io(std::io::Error::from(
                std::io::ErrorKind::UnexpectedEof,
            )));
        }
        let signature = cursor[..sig_len as usize].to_vec();
        cursor = &cursor[sig_len as usize..];

        let (consumed, issue_time_ms) = decode_varint(cursor)?;
        cursor = &cursor[consumed..];
        let (consumed, expiry_time_ms) = decode_varint(cursor)?;
        let _ = &cursor[consumed..];

        Ok(Self {
            public_key: None,
            signature,
            issue_time_ms: issue_time_ms as i64,
            expiry_time_ms: expiry_time_ms as i64,
        })
    }

    /// Returns false (never an error) if the verifier key, the certified
    /// public key, or the time window make this envelope invalid right
    /// now; otherwise reconstructs the signing payload and checks the
    /// signature. `ExpiryTime == now_ms` is treated as already expired.
    pub fn verify(
        &self,
        hash: Option<HashFn>,
        verifier_public_key: Option<&[u8]>,
        scheme: &dyn SigScheme,
        now_ms: i64,
    ) -> bool {
        let Some(public_key) = self.public_key.as_deref() else {
            return false;
        };
        let Some(verifier_public_key) = verifier_public_key else {
            return false;
        };
        if self.issue_time_ms > now_ms {
            return false;
        }
        if self.expiry_time_ms <= now_ms {
            return false;
        }
        let payload = match signing_payload(public_key, self.issue_time_ms, self.expiry_time_ms, hash) {
            Ok(p) => p,
            Err(_) => return false,
        };
        guarded("sig-verify", || {
            Ok(scheme.verify(verifier_public_key, &payload, &self.signature))
        })
        .unwrap_or(false)
    }
}
