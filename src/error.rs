use std::fmt;
use std::io;

/// Unified error type for the wire layer.
///
/// Variant names follow the error *kinds* a caller needs to branch on, not
/// the underlying primitive that produced them.
#[derive(Debug)]
pub enum WireError {
    /// A key was handed to a scheme that did not produce it.
    IncompatibleKey,
    /// A required key was absent.
    KeyNil,
    /// A required signature was absent.
    SigNil,
    /// A timestamp's millisecond value was negative on write, or otherwise
    /// out of the range this crate accepts on read.
    TimeOutOfRange,
    /// An unknown packet type code appeared after the fragment bit was masked.
    InvalidPacketId(u8),
    /// A fragment's index was not less than its reported count.
    FragmentIndexOutOfRange { index: u8, count: u8 },
    /// Not an error condition: more fragments are required before the
    /// packet can be dispatched. Callers loop on this variant.
    FragmentReceived,
    /// The configured MTU cannot carry even one byte of payload, or the
    /// payload would require more than 255 fragments.
    MTUTooSmall,
    /// A single write exceeded the space available in the datagram buffer.
    TooMuchData,
    /// `flush` was called with nothing buffered.
    NoPacketToFlush,
    /// A scheme primitive panicked; the unwind was caught at the wrapper
    /// boundary and converted into this error.
    PrimitiveFailure(&'static str),
    /// Transport misbehavior (short write, unexpected EOF, etc.).
    Io(io::Error),
}

pub type WireResult<T> = Result<T, WireError>;

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::IncompatibleKey => write!(f, "key was not produced by this scheme"),
            WireError::KeyNil => write!(f, "required key was absent"),
            WireError::SigNil => write!(f, "required signature was absent"),
            WireError::TimeOutOfRange => write!(f, "timestamp out of representable range"),
            WireError::InvalidPacketId(id) => write!(f, "invalid packet id: {id}"),
            WireError::FragmentIndexOutOfRange { index, count } => {
                write!(f, "fragment index {index} out of range for count {count}")
            }
            WireError::FragmentReceived => write!(f, "fragment received, more needed"),
            WireError::MTUTooSmall => write!(f, "mtu too small for header and fragmentation"),
            WireError::TooMuchData => write!(f, "write exceeds buffer capacity"),
            WireError::NoPacketToFlush => write!(f, "flush called with no buffered packet"),
            WireError::PrimitiveFailure(msg) => write!(f, "scheme primitive failure: {msg}"),
            WireError::Io(err) => write!(f, "transport error: {err}"),
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WireError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for WireError {
    fn from(err: io::Error) -> Self {
        WireError::Io(err)
    }
}

impl PartialEq for WireError {
    /// Structural comparison ignoring the wrapped [`io::Error`], which has
    /// no meaningful equality of its own. Tests compare error *kinds*.
    fn eq(&self, other: &Self) -> bool {
        use WireError::*;
        match (self, other) {
            (IncompatibleKey, IncompatibleKey)
            | (KeyNil, KeyNil)
            | (SigNil, SigNil)
            | (TimeOutOfRange, TimeOutOfRange)
            | (FragmentReceived, FragmentReceived)
            | (MTUTooSmall, MTUTooSmall)
            | (TooMuchData, TooMuchData)
            | (NoPacketToFlush, NoPacketToFlush) => true,
            (InvalidPacketId(a), InvalidPacketId(b)) => a == b,
            (FragmentIndexOutOfRange { index: ai, count: ac }, FragmentIndexOutOfRange { index: bi, count: bc }) => {
                ai == bi && ac == bc
            }
            (PrimitiveFailure(a), PrimitiveFailure(b)) => a == b,
            (Io(_), Io(_)) => true,
            _ => false,
        }
    }
}
