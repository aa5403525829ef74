//! Frame encoding and decoding for the Nextion serial protocol.
//!
//! Frames carry no length prefix; each one ends with three `0xFF` bytes:
//! ```text
//! ┌──────────┬─────────────────┬────────────────┐
//! │  opcode  │    payload      │  0xFF 0xFF 0xFF │
//! │  1 byte  │   0..n bytes    │    terminator   │
//! └──────────┴─────────────────┴────────────────┘
//! ```
//! Outgoing commands are plain ASCII followed by the same terminator.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;
use crate::protocol::packet::ReturnCode;

/// Frame terminator.
pub const TERMINATOR: [u8; 3] = [0xFF, 0xFF, 0xFF];

/// Largest frame the decoder will buffer while waiting for a terminator.
pub const MAX_FRAME_SIZE: usize = 4096;

/// Encodes a payload into a terminated frame.
#[must_use]
pub fn encode(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + TERMINATOR.len());
    buf.put_slice(payload);
    buf.put_slice(&TERMINATOR);
    buf.freeze()
}

/// Frame decoder that carries partial frames across reads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Creates a new frame decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Feeds data into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next complete frame.
    ///
    /// Returns `Ok(Some(frame))` with the terminator stripped, or `Ok(None)`
    /// if no complete frame is buffered yet. No frame starts with `0xFF`, so
    /// leading `0xFF` bytes (empty frames, stray terminator bytes) are
    /// skipped.
    ///
    /// Fixed-size frames are cut by length. Other frames end at the first
    /// terminator; a longer run of `0xFF` ends at its last three bytes, so a
    /// payload may itself end in `0xFF`.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::Overflow` and drops the buffer when more than
    /// `MAX_FRAME_SIZE` bytes accumulate without a terminator.
    pub fn decode(&mut self) -> Result<Option<Bytes>, FrameError> {
        let leading = self.buffer.iter().take_while(|&&b| b == 0xFF).count();
        self.buffer.advance(leading);

        let Some(&opcode) = self.buffer.first() else {
            return Ok(None);
        };

        if let Some(len) = ReturnCode::from_byte(opcode).and_then(|c| c.fixed_payload_len()) {
            let end = 1 + len;
            let Some(trailer) = self.buffer.get(end..end + TERMINATOR.len()) else {
                return Ok(None);
            };
            if trailer == TERMINATOR {
                return Ok(Some(self.take_frame(end)));
            }
            tracing::trace!("{:#04x} frame has unexpected length", opcode);
        }

        match find_frame_end(&self.buffer) {
            Some(end) => Ok(Some(self.take_frame(end))),
            None if self.buffer.len() > MAX_FRAME_SIZE => {
                let discarded = self.buffer.len();
                self.buffer.clear();
                Err(FrameError::Overflow {
                    discarded,
                    max: MAX_FRAME_SIZE,
                })
            }
            None => Ok(None),
        }
    }

    fn take_frame(&mut self, end: usize) -> Bytes {
        let frame = self.buffer.split_to(end).freeze();
        self.buffer.advance(TERMINATOR.len());
        frame
    }

    /// Returns the number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Returns where the terminator of the first frame in `data` starts.
fn find_frame_end(data: &[u8]) -> Option<usize> {
    let mut end = data
        .windows(TERMINATOR.len())
        .position(|window| window == TERMINATOR)?;
    while data.get(end + TERMINATOR.len()) == Some(&0xFF) {
        end += 1;
    }
    Some(end)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn drain(decoder: &mut FrameDecoder) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some(frame) = decoder.decode().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_encode_appends_terminator() {
        let frame = encode(b"get b0.txt");
        assert_eq!(&frame[..10], b"get b0.txt");
        assert_eq!(&frame[10..], &TERMINATOR);
    }

    #[test]
    fn test_decode_complete_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[0x66, 0x01, 0xFF, 0xFF, 0xFF]);

        let result = decoder.decode().unwrap();
        assert_eq!(result, Some(Bytes::from_static(&[0x66, 0x01])));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decode_partial_frame() {
        let mut decoder = FrameDecoder::new();

        decoder.feed(&[0x70, b'a', b'b', 0xFF]);
        assert_eq!(decoder.decode().unwrap(), None);

        decoder.feed(&[0xFF, 0xFF, 0x65]);
        let result = decoder.decode().unwrap();
        assert_eq!(result, Some(Bytes::from_static(&[0x70, b'a', b'b'])));

        // The trailing byte is carried over as the start of the next frame.
        assert_eq!(decoder.buffered(), 1);
    }

    #[test]
    fn test_decode_multiple_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[
            0x88, 0xFF, 0xFF, 0xFF, // ready
            0x66, 0x02, 0xFF, 0xFF, 0xFF, // page 2
        ]);

        let frames = drain(&mut decoder);
        assert_eq!(
            frames,
            vec![
                Bytes::from_static(&[0x88]),
                Bytes::from_static(&[0x66, 0x02])
            ]
        );
    }

    #[test]
    fn test_decode_skips_empty_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[0xFF, 0xFF, 0xFF, 0x1A, 0xFF, 0xFF, 0xFF]);

        assert_eq!(drain(&mut decoder), vec![Bytes::from_static(&[0x1A])]);
    }

    #[test]
    fn test_decode_overflow_discards_buffer() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&vec![0x41; MAX_FRAME_SIZE + 1]);

        let err = decoder.decode().unwrap_err();
        assert!(matches!(err, FrameError::Overflow { .. }));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decode_numeric_payload_ending_in_ff() {
        // -100000 as a little-endian numeric reply
        let mut stream = encode(&[0x71, 0x60, 0x79, 0xFE, 0xFF]).to_vec();
        stream.extend_from_slice(&encode(&[0x88]));

        let mut decoder = FrameDecoder::new();
        decoder.feed(&stream);
        assert_eq!(
            drain(&mut decoder),
            vec![
                Bytes::from_static(&[0x71, 0x60, 0x79, 0xFE, 0xFF]),
                Bytes::from_static(&[0x88])
            ]
        );
    }

    #[test]
    fn test_decode_numeric_minus_one_byte_by_byte() {
        let mut stream = encode(&[0x71, 0xFF, 0xFF, 0xFF, 0xFF]).to_vec();
        stream.extend_from_slice(&encode(&[0x66, 0x01]));

        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for byte in stream {
            decoder.feed(&[byte]);
            frames.extend(drain(&mut decoder));
        }
        assert_eq!(
            frames,
            vec![
                Bytes::from_static(&[0x71, 0xFF, 0xFF, 0xFF, 0xFF]),
                Bytes::from_static(&[0x66, 0x01])
            ]
        );
    }

    #[test]
    fn test_decode_string_ending_in_ff() {
        let mut stream = encode(&[0x70, b'a', 0xFF]).to_vec();
        stream.extend_from_slice(&encode(&[0x1A]));

        let mut decoder = FrameDecoder::new();
        decoder.feed(&stream);
        assert_eq!(
            drain(&mut decoder),
            vec![
                Bytes::from_static(&[0x70, b'a', 0xFF]),
                Bytes::from_static(&[0x1A])
            ]
        );
    }

    #[test]
    fn test_decode_short_fixed_frame_recovers() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[0x65, 0x01, 0xFF, 0xFF, 0xFF, 0x88, 0xFF, 0xFF, 0xFF]);

        assert_eq!(
            drain(&mut decoder),
            vec![
                Bytes::from_static(&[0x65, 0x01]),
                Bytes::from_static(&[0x88])
            ]
        );
    }

    fn fixed_payload_len(opcode: u8) -> Option<usize> {
        ReturnCode::from_byte(opcode).and_then(|c| c.fixed_payload_len())
    }

    /// Fixed-size frames with arbitrary payload bytes.
    fn fixed_frame() -> impl Strategy<Value = Vec<u8>> {
        prop::sample::select(vec![0x65u8, 0x66, 0x67, 0x68, 0x71]).prop_flat_map(|opcode| {
            let len = fixed_payload_len(opcode).unwrap();
            prop::collection::vec(any::<u8>(), len).prop_map(move |payload| {
                let mut frame = vec![opcode];
                frame.extend(payload);
                frame
            })
        })
    }

    /// Variable frames: `0xFF` may appear in the payload, but not as a
    /// terminator and not as the last byte, which a read boundary inside
    /// the terminator run would make ambiguous.
    fn variable_frame() -> impl Strategy<Value = Vec<u8>> {
        let opcode = any::<u8>()
            .prop_filter("fixed-size or 0xFF opcode", |&op| {
                op != 0xFF && fixed_payload_len(op).is_none()
            });
        let payload = prop::collection::vec(any::<u8>(), 0..32).prop_filter(
            "terminator in payload",
            |p| p.last() != Some(&0xFF) && !p.windows(3).any(|w| w == TERMINATOR),
        );
        (opcode, payload).prop_map(|(opcode, payload)| {
            let mut frame = vec![opcode];
            frame.extend(payload);
            frame
        })
    }

    fn frame_strategy() -> impl Strategy<Value = Vec<u8>> {
        prop_oneof![fixed_frame(), variable_frame()]
    }

    proptest! {
        /// Property: chunking of the input stream does not change the frames.
        #[test]
        fn prop_chunking_preserves_frames(
            frames in prop::collection::vec(frame_strategy(), 1..16),
            cuts in prop::collection::vec(1usize..16, 0..64),
        ) {
            let stream: Vec<u8> = frames.iter().flat_map(|f| encode(f)).collect();

            let mut decoder = FrameDecoder::new();
            let mut decoded = Vec::new();
            let mut rest = stream.as_slice();
            for cut in cuts {
                if rest.is_empty() {
                    break;
                }
                let (chunk, tail) = rest.split_at(cut.min(rest.len()));
                decoder.feed(chunk);
                decoded.extend(drain(&mut decoder));
                rest = tail;
            }
            decoder.feed(rest);
            decoded.extend(drain(&mut decoder));

            let decoded: Vec<Vec<u8>> = decoded.into_iter().map(|b| b.to_vec()).collect();
            prop_assert_eq!(decoded, frames);
            prop_assert_eq!(decoder.buffered(), 0);
        }
    }
}
