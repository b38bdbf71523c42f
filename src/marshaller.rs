//! MTU-aware packet marshaller: drives the fragment-reassembly state
//! machine on receive and the fragmenting writer on send.

use crate::error::{WireError, WireResult};
use crate::header::{PacketHeader, PacketType, FragmentMeta, HEADER_SIZE, HEADER_SIZE_FOR_FRAGMENTATION};
use crate::payload::{empty_for, Payload};
use std::io::{Read, Write};
use std::sync::Mutex;

/// A byte-oriented reader/writer. When the marshaller's MTU is nonzero the
/// transport is assumed datagram-like: one `read` call yields exactly one
/// sent datagram (truncated to the destination buffer length) and one
/// `write` call emits exactly one datagram. When MTU is zero the transport
/// is treated as a plain stream.
pub trait Transport: Read + Write {}
impl<T: Read + Write> Transport for T {}

struct ReassemblyState {
    header: Option<PacketHeader>,
    fragments: Vec<Option<Vec<u8>>>,
}

impl ReassemblyState {
    fn empty() -> Self {
        Self {
            header: None,
            fragments: Vec::new(),
        }
    }
}

/// Owns the in-progress fragment buffer. Guarded by a mutex so
/// [`Marshaller::clear_fragment_cache`] is safely callable from another
/// thread while [`Marshaller::unmarshal`] is running.
struct Reassembler {
    state: Mutex<ReassemblyState>,
}

impl Reassembler {
    fn new() -> Self {
        Self {
            state: Mutex::new(ReassemblyState::empty()),
        }
    }

    fn clear(&self) {
        *self.state.lock().unwrap() = ReassemblyState::empty();
    }

    /// Accepts one fragment. Returns `Ok(Some(bytes))` once every slot up
    /// to `frag.count` is filled (the reassembled payload bytes), `Ok(None)`
    /// if slots remain outstanding.
    fn accept(
        &self,
        header: &PacketHeader,
        frag: FragmentMeta,
        body: Vec<u8>,
    ) -> WireResult<Option<Vec<u8>>> {
        let mut state = self.state.lock().unwrap();

        let belongs_to_current = state
            .header
            .as_ref()
            .map(|h| h == header)
            .unwrap_or(false);
        if !belongs_to_current {
            if let Some(discarded) = state.header.as_ref() {
                let filled = state.fragments.iter().filter(|f| f.is_some()).count();
                tracing::warn!(
                    filled,
                    expected = state.fragments.len(),
                    connection = ?discarded.connection_uuid,
                    "reassembly buffer reset mid-flight by a fragment for a different packet"
                );
            }
            state.header = Some(header.clone_plain());
            state.fragments = vec![None; frag.count as usize];
        }

        if frag.index >= frag.count {
            return Err(WireError::FragmentIndexOutOfRange {
                index: frag.index,
                count: frag.count,
            });
        }

        state.fragments[frag.index as usize] = Some(body);

        if state.fragments.iter().any(Option::is_none) {
            return Ok(None);
        }

        let mut combined = Vec::new();
        for slot in state.fragments.drain(..) {
            combined.extend(slot.expect("all slots verified filled above"));
        }
        state.header = None;
        Ok(Some(combined))
    }
}

fn dispatch_payload(id: PacketType, source: &mut dyn Read) -> WireResult<Box<dyn Payload>> {
    let mut payload = empty_for(id);
    payload.read_from(source)?;
    Ok(payload)
}

fn parse_header_and_payload(
    reassembler: &Reassembler,
    source: &mut dyn Read,
) -> WireResult<(PacketHeader, Box<dyn Payload>)> {
    let header = PacketHeader::read_from(source)?;

    let Some(frag) = header.fragment else {
        let payload = dispatch_payload(header.actual_id(), source)?;
        return Ok((header.clone_plain(), payload));
    };

    let mut body = vec![0u8; frag.size as usize];
    source.read_exact(&mut body)?;

    match reassembler.accept(&header, frag, body)? {
        None => {
            tracing::trace!(index = frag.index, count = frag.count, "fragment received, awaiting more");
            Err(WireError::FragmentReceived)
        }
        Some(combined) => {
            let mut cursor = combined.as_slice();
            let payload = dispatch_payload(header.actual_id(), &mut cursor)?;
            Ok((header.clone_plain(), payload))
        }
    }
}

/// Drives the MTU-aware writer and the fragment-reassembly state machine
/// over a single [`Transport`].
pub struct Marshaller<T> {
    transport: T,
    mtu: u16,
    reassembler: Reassembler,
}

impl<T: Transport> Marshaller<T> {
    /// `mtu == 0` disables fragmentation; the transport is treated as a stream.
    pub fn new(transport: T, mtu: u16) -> Self {
        Self {
            transport,
            mtu,
            reassembler: Reassembler::new(),
        }
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Discards any in-progress reassembly state. Safe to call concurrently
    /// with [`Marshaller::unmarshal`] from another thread.
    pub fn clear_fragment_cache(&self) {
        self.reassembler.clear();
    }

    /// Reads one header/payload pair, or `Err(WireError::FragmentReceived)`
    /// if a fragment arrived and the packet is not yet complete. Callers
    /// loop until any other outcome.
    pub fn unmarshal(&mut self) -> WireResult<(PacketHeader, Box<dyn Payload>)> {
        if self.mtu > 0 {
            let mtu = self.mtu as usize;
            let mut buf = vec![0u8; mtu];
            let n = self.transport.read(&mut buf)?;
            let mut cursor = &buf[..n];
            parse_header_and_payload(&self.reassembler, &mut cursor)
        } else {
            parse_header_and_payload(&self.reassembler, &mut self.transport)
        }
    }

    /// Serializes `header` and `payload`, fragmenting across multiple
    /// datagrams when the MTU demands it.
    pub fn marshal(&mut self, header: &PacketHeader, payload: &dyn Payload) -> WireResult<()> {
        if self.mtu == 0 {
            let plain = header.clone_plain();
            plain.write_to(&mut self.transport)?;
            payload.write_to(&mut self.transport)?;
            return Ok(());
        }

        let mtu = self.mtu as usize;
        if HEADER_SIZE_FOR_FRAGMENTATION >= mtu {
            return Err(WireError::MTUTooSmall);
        }

        let mut payload_bytes = Vec::new();
        payload.write_to(&mut payload_bytes)?;
        let sz = payload_bytes.len();

        if sz + HEADER_SIZE <= mtu {
            let mut buf = vec![0u8; mtu];
            {
                let mut header_region: &mut [u8] = &mut buf[..HEADER_SIZE];
                header.clone_plain().write_to(&mut header_region)?;
            }
            buf[HEADER_SIZE..HEADER_SIZE + sz].copy_from_slice(&payload_bytes);
            self.transport.write_all(&buf)?;
            return Ok(());
        }

        tracing::debug!(size = sz, mtu, "packet requires fragmentation");

        let fragment_payload_size = mtu - HEADER_SIZE_FOR_FRAGMENTATION;
        let fragment_count = (sz + fragment_payload_size - 1) / fragment_payload_size;
        if fragment_count > 255 {
            return Err(WireError::MTUTooSmall);
        }

        for index in 0..fragment_count {
            let start = index * fragment_payload_size;
            let end = (start + fragment_payload_size).min(sz);
            let chunk = &payload_bytes[start..end];

            let frag_header = header.clone_as_fragment(index as u8, fragment_count as u8, chunk.len() as u16);
            let mut buf = vec![0u8; mtu];
            {
                let mut header_region: &mut [u8] = &mut buf[..HEADER_SIZE_FOR_FRAGMENTATION];
                frag_header.write_to(&mut header_region)?;
            }
            buf[HEADER_SIZE_FOR_FRAGMENTATION..HEADER_SIZE_FOR_FRAGMENTATION + chunk.len()]
                .copy_from_slice(chunk);
            self.transport.write_all(&buf)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{EmptyPayload, PublicKeyPayload};
    use std::collections::VecDeque;
    use std::io;

    /// An in-memory datagram channel: one `write` call enqueues one
    /// datagram, one `read` call dequeues one datagram (truncated to the
    /// destination buffer), matching the transport contract for MTU > 0.
    #[derive(Default)]
    struct MemTransport {
        datagrams: VecDeque<Vec<u8>>,
    }

    impl Read for MemTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.datagrams.pop_front() {
                Some(datagram) => {
                    let n = datagram.len().min(buf.len());
                    buf[..n].copy_from_slice(&datagram[..n]);
                    Ok(n)
                }
                None => Ok(0),
            }
        }
    }

    impl Write for MemTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.datagrams.push_back(buf.to_vec());
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn mtu_zero_connection_rejected_is_exactly_header_size() {
        let mut marshaller = Marshaller::new(io::Cursor::new(Vec::<u8>::new()), 0);
        let header = PacketHeader::new(PacketType::ConnectionRejected, [0u8; 16], 1_700_000_000_000);
        marshaller.marshal(&header, &EmptyPayload).unwrap();
        assert_eq!(marshaller.transport.get_ref().len(), HEADER_SIZE);

        let mut cursor: &[u8] = marshaller.transport.get_ref().as_slice();
        let parsed_header = PacketHeader::read_from(&mut cursor).unwrap();
        assert_eq!(parsed_header, header);
    }

    #[test]
    fn mtu_equal_to_fragmentation_header_is_too_small() {
        let mut marshaller = Marshaller::new(MemTransport::default(), HEADER_SIZE_FOR_FRAGMENTATION as u16);
        let header = PacketHeader::new(PacketType::PublicKeyRequest, [1u8; 16], 1);
        assert_eq!(
            marshaller.marshal(&header, &EmptyPayload),
            Err(WireError::MTUTooSmall)
        );
    }

    #[test]
    fn round_trip_matches_across_mtu_zero_and_fragmented() {
        let header = PacketHeader::new(PacketType::PublicKeyData, [3u8; 16], 1_700_000_000_000);
        let payload = PublicKeyPayload::new(vec![9u8; 100]);

        let mut unbounded = Marshaller::new(io::Cursor::new(Vec::<u8>::new()), 0);
        unbounded.marshal(&header, &payload).unwrap();
        let mut cursor: &[u8] = unbounded.transport.get_ref().as_slice();
        let (plain_header, plain_payload) =
            parse_header_and_payload(&Reassembler::new(), &mut cursor).unwrap();

        let mut fragmented = Marshaller::new(MemTransport::default(), 64);
        fragmented.marshal(&header, &payload).unwrap();
        let mut result = fragmented.unmarshal();
        let mut loops = 0;
        while matches!(result, Err(WireError::FragmentReceived)) {
            loops += 1;
            result = fragmented.unmarshal();
        }
        let (frag_header, frag_payload) = result.unwrap();

        assert_eq!(frag_header, header);
        assert_eq!(frag_header, plain_header);
        assert!(loops > 0);
        assert_eq!(frag_payload.size(), payload.size());

        let mut frag_bytes = Vec::new();
        frag_payload.write_to(&mut frag_bytes).unwrap();
        let mut plain_bytes = Vec::new();
        plain_payload.write_to(&mut plain_bytes).unwrap();
        assert_eq!(frag_bytes, plain_bytes);
    }

    #[test]
    fn large_key_fragments_into_expected_count_and_reassembles() {
        // ML-KEM-768-sized public key: 1184 bytes, MTU 64 -> ceil(1184/35) = 34 fragments.
        let header = PacketHeader::new(PacketType::PublicKeyData, [4u8; 16], 1);
        let payload = PublicKeyPayload::new(vec![0xab; 1184]);

        let mut marshaller = Marshaller::new(MemTransport::default(), 64);
        marshaller.marshal(&header, &payload).unwrap();
        assert_eq!(marshaller.transport.datagrams.len(), 34);

        let mut fragment_received_count = 0;
        let mut final_result = marshaller.unmarshal();
        while matches!(final_result, Err(WireError::FragmentReceived)) {
            fragment_received_count += 1;
            final_result = marshaller.unmarshal();
        }
        assert_eq!(fragment_received_count, 33);

        let (_, reassembled) = final_result.unwrap();
        let mut reassembled_bytes = Vec::new();
        reassembled.write_to(&mut reassembled_bytes).unwrap();
        let mut original_bytes = Vec::new();
        payload.write_to(&mut original_bytes).unwrap();
        assert_eq!(reassembled_bytes, original_bytes);
    }

    #[test]
    fn fragment_index_out_of_range_is_rejected() {
        let reassembler = Reassembler::new();
        let header = PacketHeader::new(PacketType::PublicKeyData, [0u8; 16], 1);
        let frag = FragmentMeta { index: 5, count: 3, size: 1 };
        let result = reassembler.accept(&header, frag, vec![0u8]);
        assert_eq!(
            result,
            Err(WireError::FragmentIndexOutOfRange { index: 5, count: 3 })
        );
    }

    #[test]
    fn new_packet_resets_reassembly_buffer() {
        let reassembler = Reassembler::new();
        let header_a = PacketHeader::new(PacketType::PublicKeyData, [0u8; 16], 1);
        let header_b = PacketHeader::new(PacketType::PublicKeyData, [1u8; 16], 1);

        let frag = FragmentMeta { index: 0, count: 2, size: 1 };
        assert_eq!(reassembler.accept(&header_a, frag, vec![1u8]), Ok(None));

        // A fragment for a different header mid-flight resets the buffer
        // rather than being treated as part of header_a's packet.
        let frag_b = FragmentMeta { index: 0, count: 1, size: 1 };
        let result = reassembler.accept(&header_b, frag_b, vec![2u8]).unwrap();
        assert_eq!(result, Some(vec![2u8]));
    }

    #[test]
    fn logs_under_a_real_subscriber_without_panicking() {
        // Exercises the trace!/debug!/warn! call sites with an actual
        // subscriber installed rather than the default no-op, so a
        // misplaced field or format argument would surface here.
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let mut marshaller = Marshaller::new(MemTransport::default(), 64);
        let header = PacketHeader::new(PacketType::PublicKeyData, [5u8; 16], 1);
        let payload = PublicKeyPayload::new(vec![0xee; 200]);
        marshaller.marshal(&header, &payload).unwrap();
        while matches!(marshaller.unmarshal(), Err(WireError::FragmentReceived)) {}

        let reassembler = Reassembler::new();
        let header_a = PacketHeader::new(PacketType::PublicKeyData, [0u8; 16], 1);
        let header_b = PacketHeader::new(PacketType::PublicKeyData, [1u8; 16], 1);
        let frag = FragmentMeta { index: 0, count: 2, size: 1 };
        reassembler.accept(&header_a, frag, vec![1u8]).unwrap();
        let frag_b = FragmentMeta { index: 0, count: 1, size: 1 };
        reassembler.accept(&header_b, frag_b, vec![2u8]).unwrap();
    }

    #[test]
    fn clear_fragment_cache_drops_in_progress_state() {
        let mut marshaller = Marshaller::new(MemTransport::default(), 64);
        let header = PacketHeader::new(PacketType::PublicKeyData, [0u8; 16], 1);
        let payload = PublicKeyPayload::new(vec![0xcd; 100]);
        marshaller.marshal(&header, &payload).unwrap();

        // Consume one fragment, then clear before it completes.
        assert!(matches!(marshaller.unmarshal(), Err(WireError::FragmentReceived)));
        marshaller.clear_fragment_cache();

        // Remaining fragments now belong to no known packet; they start a
        // fresh (still incomplete) reassembly rather than completing the
        // cleared one.
        while marshaller.transport.datagrams.len() > 1 {
            let result = marshaller.unmarshal();
            assert!(matches!(result, Err(WireError::FragmentReceived)) || result.is_ok());
        }
    }
}
