use crate::prelude::*;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::lxp::packet::{FRAME_HEADER_LENGTH, FRAME_LENGTH_BIAS, MAGIC_PREFIX};

/// Upper bound on a declared frame length. The length field could express
/// 64KiB but real traffic tops out well under 1KiB; anything larger is
/// treated as stream desync rather than buffered indefinitely.
pub const MAX_FRAME_LENGTH: usize = 4096;

/// Locates frame boundaries in the inbound byte stream and slices out
/// complete frames, rescanning past garbage when the stream desyncs.
/// One instance per connection; the buffer it drains is the only state.
pub struct PacketDecoder {
    skipped: u64,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self { skipped: 0 }
    }

    /// Total bytes discarded so far while hunting for a frame prefix.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn skip(&mut self, src: &mut BytesMut, count: usize) {
        src.advance(count);
        self.skipped += count as u64;
    }
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PacketDecoder {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            if src.len() < 2 {
                return Ok(None);
            }

            if src[0..2] != MAGIC_PREFIX {
                // hunt for the next candidate prefix byte; everything
                // before it is unrecoverable
                match src[1..].iter().position(|&b| b == MAGIC_PREFIX[0]) {
                    Some(idx) => {
                        debug!("resync: skipping {} bytes", idx + 1);
                        self.skip(src, idx + 1);
                    }
                    None => {
                        let len = src.len();
                        debug!("resync: discarding {} bytes, no prefix in sight", len);
                        self.skip(src, len);
                        return Ok(None);
                    }
                }
                continue;
            }

            if src.len() < FRAME_LENGTH_BIAS {
                return Ok(None);
            }

            let declared = Utils::u16ify(&src[..], 4) as usize + FRAME_LENGTH_BIAS;
            if !(FRAME_HEADER_LENGTH..=MAX_FRAME_LENGTH).contains(&declared) {
                // a corrupt length field would stall the stream forever;
                // treat the prefix as a false positive and rescan
                warn!("resync: implausible declared frame length {}", declared);
                self.skip(src, 1);
                continue;
            }

            if src.len() < declared {
                src.reserve(declared - src.len());
                return Ok(None);
            }

            let frame = Frame::new(src.split_to(declared).to_vec())?;
            return Ok(Some(frame));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !src.is_empty() {
                    let len = src.len();
                    debug!("discarding {} trailing bytes at end of stream", len);
                    self.skip(src, len);
                }
                Ok(None)
            }
        }
    }
}

/// Owns the parse buffer for one connection and yields every frame a chunk
/// completes. Collaborators handed discrete byte chunks (rather than
/// reading a socket into their own buffer) feed them through here.
pub struct FrameStream {
    decoder: PacketDecoder,
    buffer: BytesMut,
}

impl FrameStream {
    pub fn new() -> Self {
        Self {
            decoder: PacketDecoder::new(),
            buffer: BytesMut::new(),
        }
    }

    /// Append newly arrived bytes and drain every complete frame, in
    /// arrival order. Returns an empty Vec while a frame is still partial.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(frame) = self.decoder.decode(&mut self.buffer)? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Drop any partial frame, e.g. across a reconnect.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameStream {
    fn default() -> Self {
        Self::new()
    }
}
