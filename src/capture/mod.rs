//! `.atpcap` v3: the versioned little-endian capture container.
//!
//! Layout, all little-endian:
//! - 20-byte file header: magic `ATPCAP01`, `i32` version (= 3), `i64`
//!   tick frequency (ticks per second, default nanoseconds).
//! - repeated records: 34-byte record header + payload.
//! - `device_index == -1` marks the meta record (JSON payload), exactly
//!   one, first in the file. Frame records carry a 32-byte frame header
//!   (`RFV3`) followed by 40-byte contact records.
//!
//! Bit-exact compatibility across platforms is required; every field is
//! written by hand, no struct transmutes.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::touch::{ContactList, ContactPhase, RawContact, RawFrame};

pub mod replay;
pub mod writer;

pub const CAPTURE_MAGIC: &[u8; 8] = b"ATPCAP01";
pub const CAPTURE_VERSION: i32 = 3;
pub const DEFAULT_TICK_FREQUENCY: i64 = 1_000_000_000;

pub const FILE_HEADER_LEN: usize = 20;
pub const RECORD_HEADER_LEN: usize = 34;
pub const FRAME_HEADER_LEN: usize = 32;
pub const CONTACT_RECORD_LEN: usize = 40;

/// `RFV3` in the frame payload header.
pub const FRAME_MAGIC: u32 = u32::from_le_bytes(*b"RFV3");

/// Meta record device index.
pub const META_DEVICE_INDEX: i32 = -1;

/// JSON payload of the single meta record at file start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureMeta {
    #[serde(rename = "type")]
    pub record_type: String,
    pub schema: String,
    #[serde(rename = "capturedAt")]
    pub captured_at: String,
    pub platform: String,
    pub source: String,
    #[serde(rename = "framesCaptured")]
    pub frames_captured: u64,
}

impl CaptureMeta {
    pub fn new(captured_at: String, source: String, frames_captured: u64) -> Self {
        Self {
            record_type: "meta".to_string(),
            schema: "g2k-replay-v1".to_string(),
            captured_at,
            platform: std::env::consts::OS.to_string(),
            source,
            frames_captured,
        }
    }
}

/// The fixed 34-byte record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub payload_len: i32,
    pub arrival_ticks: i64,
    pub device_index: i32,
    pub device_hash: u32,
    pub vendor_id: u32,
    pub product_id: u32,
    pub usage_page: u16,
    pub usage: u16,
    /// Reserved; written as 0, surfaced verbatim on read.
    pub side_hint: u8,
    /// Reserved; written as 0, surfaced verbatim on read.
    pub decoder_profile: u8,
}

impl RecordHeader {
    pub fn frame(arrival_ticks: i64, frame: &RawFrame, payload_len: usize) -> Self {
        Self {
            payload_len: payload_len as i32,
            arrival_ticks,
            device_index: frame.device_index,
            device_hash: (frame.device_id as u32) ^ ((frame.device_id >> 32) as u32),
            vendor_id: 0,
            product_id: 0,
            usage_page: 0,
            usage: 0,
            side_hint: 0,
            decoder_profile: 0,
        }
    }

    pub fn meta(payload_len: usize) -> Self {
        Self {
            payload_len: payload_len as i32,
            arrival_ticks: 0,
            device_index: META_DEVICE_INDEX,
            device_hash: 0,
            vendor_id: 0,
            product_id: 0,
            usage_page: 0,
            usage: 0,
            side_hint: 0,
            decoder_profile: 0,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.payload_len.to_le_bytes());
        out.extend_from_slice(&self.arrival_ticks.to_le_bytes());
        out.extend_from_slice(&self.device_index.to_le_bytes());
        out.extend_from_slice(&self.device_hash.to_le_bytes());
        out.extend_from_slice(&self.vendor_id.to_le_bytes());
        out.extend_from_slice(&self.product_id.to_le_bytes());
        out.extend_from_slice(&self.usage_page.to_le_bytes());
        out.extend_from_slice(&self.usage.to_le_bytes());
        out.push(self.side_hint);
        out.push(self.decoder_profile);
    }

    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        if bytes.len() < RECORD_HEADER_LEN {
            return Err(EngineError::InvalidCapture {
                reason: "truncated record header",
            });
        }
        let mut r = Cursor::new(bytes);
        Ok(Self {
            payload_len: r.i32(),
            arrival_ticks: r.i64(),
            device_index: r.i32(),
            device_hash: r.u32(),
            vendor_id: r.u32(),
            product_id: r.u32(),
            usage_page: r.u16(),
            usage: r.u16(),
            side_hint: r.u8(),
            decoder_profile: r.u8(),
        })
    }
}

/// Little-endian field reader over a validated slice.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        let b = self.bytes[self.pos];
        self.pos += 1;
        b
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn i64(&mut self) -> i64 {
        i64::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }

    fn f64(&mut self) -> f64 {
        f64::from_le_bytes(self.take())
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }
}

/// Encode one frame payload: 32-byte frame header + contact records.
pub fn encode_frame_payload(frame: &RawFrame, out: &mut Vec<u8>) {
    out.extend_from_slice(&FRAME_MAGIC.to_le_bytes());
    out.extend_from_slice(&frame.sequence.to_le_bytes());
    out.extend_from_slice(&frame.timestamp.to_le_bytes());
    out.extend_from_slice(&frame.device_id.to_le_bytes());
    out.extend_from_slice(&(frame.contacts.len() as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    for contact in &frame.contacts {
        out.extend_from_slice(&contact.id.to_le_bytes());
        out.extend_from_slice(&contact.x.to_le_bytes());
        out.extend_from_slice(&contact.y.to_le_bytes());
        out.extend_from_slice(&contact.total.to_le_bytes());
        out.extend_from_slice(&contact.pressure.to_le_bytes());
        out.extend_from_slice(&contact.major_axis.to_le_bytes());
        out.extend_from_slice(&contact.minor_axis.to_le_bytes());
        out.extend_from_slice(&contact.angle.to_le_bytes());
        out.extend_from_slice(&contact.density.to_le_bytes());
        out.push(contact.phase.code());
        out.extend_from_slice(&[0u8; 3]);
    }
}

/// Decode one frame payload. The device index comes from the record header.
pub fn decode_frame_payload(bytes: &[u8], device_index: i32) -> EngineResult<RawFrame> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Err(EngineError::InvalidCapture {
            reason: "truncated frame header",
        });
    }
    let mut r = Cursor::new(bytes);
    let magic = r.u32();
    if magic != FRAME_MAGIC {
        return Err(EngineError::InvalidCapture {
            reason: "bad frame magic",
        });
    }
    let sequence = r.u64();
    let timestamp = r.f64();
    let device_id = r.u64();
    let contact_count = r.u16() as usize;
    r.skip(2);

    if bytes.len() != FRAME_HEADER_LEN + contact_count * CONTACT_RECORD_LEN {
        return Err(EngineError::InvalidCapture {
            reason: "payload length mismatch",
        });
    }

    let mut contacts = ContactList::new();
    for _ in 0..contact_count {
        let id = r.i32();
        let x = r.f32();
        let y = r.f32();
        let total = r.f32();
        let pressure = r.f32();
        let major_axis = r.f32();
        let minor_axis = r.f32();
        let angle = r.f32();
        let density = r.f32();
        let state_code = r.u8();
        r.skip(3);
        let phase = ContactPhase::from_code(state_code).ok_or(EngineError::InvalidCapture {
            reason: "bad contact state code",
        })?;
        contacts.push(RawContact {
            id,
            x,
            y,
            total,
            pressure,
            major_axis,
            minor_axis,
            angle,
            density,
            phase,
        });
    }

    Ok(RawFrame {
        sequence,
        timestamp,
        device_id,
        device_index,
        contacts,
    })
}

/// One frame with its normalized wall-clock offset from capture start.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedFrame {
    pub at_seconds: f64,
    pub frame: RawFrame,
}

/// A fully parsed capture file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCapture {
    pub tick_frequency: i64,
    pub meta: CaptureMeta,
    pub frames: Vec<TimedFrame>,
}

impl ParsedCapture {
    pub fn duration_seconds(&self) -> f64 {
        self.frames.last().map_or(0.0, |f| f.at_seconds)
    }
}

/// Serialize a complete capture. `frames` carry their arrival ticks; the
/// writer rebases them so the first frame lands on tick zero.
pub fn encode_capture(meta: &CaptureMeta, frames: &[(i64, RawFrame)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        FILE_HEADER_LEN + frames.len() * (RECORD_HEADER_LEN + FRAME_HEADER_LEN + 5 * CONTACT_RECORD_LEN),
    );
    out.extend_from_slice(CAPTURE_MAGIC);
    out.extend_from_slice(&CAPTURE_VERSION.to_le_bytes());
    out.extend_from_slice(&DEFAULT_TICK_FREQUENCY.to_le_bytes());

    let meta_json = serde_json::to_vec(meta).expect("meta serializes");
    RecordHeader::meta(meta_json.len()).encode(&mut out);
    out.extend_from_slice(&meta_json);

    let base = frames.first().map_or(0, |(ticks, _)| *ticks);
    let mut payload = Vec::with_capacity(FRAME_HEADER_LEN + 16 * CONTACT_RECORD_LEN);
    for (ticks, frame) in frames {
        payload.clear();
        encode_frame_payload(frame, &mut payload);
        RecordHeader::frame(ticks - base, frame, payload.len()).encode(&mut out);
        out.extend_from_slice(&payload);
    }
    out
}

/// Parse and validate a capture image.
pub fn decode_capture(bytes: &[u8]) -> EngineResult<ParsedCapture> {
    if bytes.len() < FILE_HEADER_LEN {
        return Err(EngineError::InvalidCapture {
            reason: "truncated file header",
        });
    }
    if &bytes[..8] != CAPTURE_MAGIC {
        return Err(EngineError::InvalidCapture { reason: "bad magic" });
    }
    let version = i32::from_le_bytes(bytes[8..12].try_into().expect("sized"));
    if version != CAPTURE_VERSION {
        return Err(EngineError::UnsupportedCaptureVersion { actual: version });
    }
    let tick_frequency = i64::from_le_bytes(bytes[12..20].try_into().expect("sized"));
    if tick_frequency <= 0 {
        return Err(EngineError::InvalidCapture {
            reason: "bad tick frequency",
        });
    }

    let mut pos = FILE_HEADER_LEN;
    let mut meta: Option<CaptureMeta> = None;
    let mut frames: Vec<TimedFrame> = Vec::new();
    let mut expected_sequence: u64 = 1;
    let mut last_ticks: i64 = i64::MIN;
    let mut first_frame_ticks: Option<i64> = None;

    while pos < bytes.len() {
        let header = RecordHeader::decode(&bytes[pos..])?;
        pos += RECORD_HEADER_LEN;
        let payload_len = header.payload_len as usize;
        if header.payload_len < 0 || pos + payload_len > bytes.len() {
            return Err(EngineError::InvalidCapture {
                reason: "payload overruns file",
            });
        }
        let payload = &bytes[pos..pos + payload_len];
        pos += payload_len;

        if header.device_index == META_DEVICE_INDEX {
            if meta.is_some() || !frames.is_empty() {
                return Err(EngineError::InvalidCapture {
                    reason: "meta record not first",
                });
            }
            meta = Some(serde_json::from_slice(payload).map_err(|_| EngineError::InvalidCapture {
                reason: "bad meta json",
            })?);
            continue;
        }

        if !(0..=1).contains(&header.device_index) {
            return Err(EngineError::InvalidCapture {
                reason: "bad device index",
            });
        }
        if header.arrival_ticks < last_ticks {
            return Err(EngineError::InvalidCapture {
                reason: "arrival ticks not monotonic",
            });
        }
        last_ticks = header.arrival_ticks;

        let frame = decode_frame_payload(payload, header.device_index)?;
        if frame.sequence != expected_sequence {
            return Err(EngineError::InvalidCapture {
                reason: "broken sequence",
            });
        }
        expected_sequence += 1;

        let base = *first_frame_ticks.get_or_insert(header.arrival_ticks);
        let at_seconds = (header.arrival_ticks - base) as f64 / tick_frequency as f64;
        frames.push(TimedFrame { at_seconds, frame });
    }

    let meta = meta.ok_or(EngineError::InvalidCapture {
        reason: "missing meta record",
    })?;

    Ok(ParsedCapture {
        tick_frequency,
        meta,
        frames,
    })
}

/// Read and parse a capture file.
pub fn read_capture(path: &std::path::Path) -> EngineResult<ParsedCapture> {
    let bytes = std::fs::read(path).map_err(|_| EngineError::InvalidCapture {
        reason: "file unreadable",
    })?;
    decode_capture(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::touch::ContactPhase;

    fn contact(id: i32, x: f32, y: f32, phase: ContactPhase) -> RawContact {
        RawContact {
            id,
            x,
            y,
            total: 0.8,
            pressure: 0.4,
            major_axis: 7.5,
            minor_axis: 6.0,
            angle: 1.2,
            density: 0.9,
            phase,
        }
    }

    fn frame(sequence: u64, timestamp: f64, device_index: i32, contacts: Vec<RawContact>) -> RawFrame {
        RawFrame {
            sequence,
            timestamp,
            device_id: 0xA1B2_C3D4_E5F6_0718,
            device_index,
            contacts: contacts.into_iter().collect(),
        }
    }

    fn sample_capture() -> Vec<(i64, RawFrame)> {
        vec![
            (
                1_000_000,
                frame(1, 0.0, 0, vec![contact(1, 0.25, 0.5, ContactPhase::Starting)]),
            ),
            (
                9_000_000,
                frame(2, 0.008, 0, vec![contact(1, 0.26, 0.5, ContactPhase::Touching)]),
            ),
            (17_000_000, frame(3, 0.016, 1, vec![])),
        ]
    }

    fn meta() -> CaptureMeta {
        CaptureMeta::new("2026-08-01T00:00:00Z".to_string(), "test".to_string(), 3)
    }

    #[test]
    fn header_sizes_match_the_format() {
        let mut buf = Vec::new();
        RecordHeader::meta(0).encode(&mut buf);
        assert_eq!(buf.len(), RECORD_HEADER_LEN);

        let mut payload = Vec::new();
        encode_frame_payload(&frame(1, 0.0, 0, vec![contact(1, 0.1, 0.1, ContactPhase::Touching)]), &mut payload);
        assert_eq!(payload.len(), FRAME_HEADER_LEN + CONTACT_RECORD_LEN);
    }

    #[test]
    fn round_trip_preserves_fields() {
        let frames = sample_capture();
        let bytes = encode_capture(&meta(), &frames);
        let parsed = decode_capture(&bytes).unwrap();

        assert_eq!(parsed.tick_frequency, DEFAULT_TICK_FREQUENCY);
        assert_eq!(parsed.meta.schema, "g2k-replay-v1");
        assert_eq!(parsed.frames.len(), 3);
        // First frame rebased to zero.
        assert_eq!(parsed.frames[0].at_seconds, 0.0);
        assert!((parsed.frames[1].at_seconds - 0.008).abs() < 1e-9);

        for (original, decoded) in frames.iter().zip(&parsed.frames) {
            assert_eq!(original.1.sequence, decoded.frame.sequence);
            assert_eq!(original.1.device_index, decoded.frame.device_index);
            assert_eq!(original.1.contacts.len(), decoded.frame.contacts.len());
            for (a, b) in original.1.contacts.iter().zip(&decoded.frame.contacts) {
                assert_eq!(a.id, b.id);
                assert!((a.x - b.x).abs() < 1e-4);
                assert!((a.pressure - b.pressure).abs() < 1e-4);
                assert_eq!(a.phase, b.phase);
            }
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode_capture(&meta(), &sample_capture());
        bytes[0] = b'X';
        assert!(matches!(
            decode_capture(&bytes),
            Err(EngineError::InvalidCapture { reason: "bad magic" })
        ));
    }

    #[test]
    fn rejects_wrong_version() {
        let mut bytes = encode_capture(&meta(), &sample_capture());
        bytes[8..12].copy_from_slice(&2i32.to_le_bytes());
        assert!(matches!(
            decode_capture(&bytes),
            Err(EngineError::UnsupportedCaptureVersion { actual: 2 })
        ));
    }

    #[test]
    fn rejects_broken_sequence() {
        let mut frames = sample_capture();
        frames[2].1.sequence = 9;
        let bytes = encode_capture(&meta(), &frames);
        assert!(matches!(
            decode_capture(&bytes),
            Err(EngineError::InvalidCapture { reason: "broken sequence" })
        ));
    }

    #[test]
    fn rejects_bad_state_code() {
        let frames = sample_capture();
        let mut bytes = encode_capture(&meta(), &frames);
        // The state code of the first contact record lives 36 bytes into
        // the first frame payload.
        let meta_json_len = serde_json::to_vec(&meta()).unwrap().len();
        let offset = FILE_HEADER_LEN + RECORD_HEADER_LEN + meta_json_len + RECORD_HEADER_LEN + FRAME_HEADER_LEN + 36;
        bytes[offset] = 99;
        assert!(matches!(
            decode_capture(&bytes),
            Err(EngineError::InvalidCapture { reason: "bad contact state code" })
        ));
    }

    #[test]
    fn rejects_missing_meta() {
        let frames = sample_capture();
        let full = encode_capture(&meta(), &frames);
        // Strip the meta record out.
        let meta_json_len = serde_json::to_vec(&meta()).unwrap().len();
        let mut bytes = full[..FILE_HEADER_LEN].to_vec();
        bytes.extend_from_slice(&full[FILE_HEADER_LEN + RECORD_HEADER_LEN + meta_json_len..]);
        assert!(matches!(
            decode_capture(&bytes),
            Err(EngineError::InvalidCapture { reason: "missing meta record" })
        ));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let bytes = encode_capture(&meta(), &sample_capture());
        let truncated = &bytes[..bytes.len() - 10];
        assert!(matches!(
            decode_capture(truncated),
            Err(EngineError::InvalidCapture { reason: "payload overruns file" })
        ));
    }
}
