// Chunk container and per-frame codecs
//
// Layout (big endian):
//   chunk  := "FRC1" index:u32 frame_count:u16 codec:u8 frame*
//   frame  := timestamp_ms:u64 width:u16 height:u16 len:u32 payload[len]

use anyhow::{bail, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::str::FromStr;

use crate::capture::RawFrame;

pub const CHUNK_MAGIC: &[u8; 4] = b"FRC1";
const CHUNK_HEADER_LEN: usize = 4 + 4 + 2 + 1;
const FRAME_HEADER_LEN: usize = 8 + 2 + 2 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Luma only, box-downscaled until one frame fits the per-frame byte budget
    Gray8,
    /// Full I420 frames; frames over budget are dropped instead
    I420,
}

impl Codec {
    fn tag(self) -> u8 {
        match self {
            Codec::Gray8 => 1,
            Codec::I420 => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Codec::Gray8),
            2 => Ok(Codec::I420),
            other => bail!("Unknown codec tag {}", other),
        }
    }
}

impl FromStr for Codec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gray8" => Ok(Codec::Gray8),
            "i420" => Ok(Codec::I420),
            other => bail!("Unsupported codec '{}' (expected gray8 or i420)", other),
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Codec::Gray8 => f.write_str("gray8"),
            Codec::I420 => f.write_str("i420"),
        }
    }
}

/// Smallest integer factor `k` such that a `w/k x h/k` plane fits in `budget` bytes
pub(crate) fn scale_factor(width: u32, height: u32, budget: usize) -> u32 {
    let mut k = 1;
    while k < width.max(height) {
        let plane = (width / k).max(1) as usize * (height / k).max(1) as usize;
        if plane <= budget {
            break;
        }
        k += 1;
    }
    k
}

/// Average `k x k` blocks of the luma plane
pub(crate) fn downscale_luma(frame: &RawFrame, k: u32) -> (u32, u32, Bytes) {
    let (w, h) = (frame.width as usize, frame.height as usize);
    let k = k.max(1) as usize;
    let (out_w, out_h) = ((w / k).max(1), (h / k).max(1));
    let luma = &frame.data[..(w * h).min(frame.data.len())];

    let mut out = BytesMut::with_capacity(out_w * out_h);
    for oy in 0..out_h {
        for ox in 0..out_w {
            let mut sum = 0u32;
            let mut n = 0u32;
            for y in oy * k..((oy + 1) * k).min(h) {
                for x in ox * k..((ox + 1) * k).min(w) {
                    if let Some(&px) = luma.get(y * w + x) {
                        sum += px as u32;
                        n += 1;
                    }
                }
            }
            out.put_u8(if n == 0 { 0 } else { (sum / n) as u8 });
        }
    }

    (out_w as u32, out_h as u32, out.freeze())
}

/// Accumulates encoded frames for one chunk
pub(crate) struct ChunkBuilder {
    codec: Codec,
    frames: BytesMut,
    frame_count: u16,
}

impl ChunkBuilder {
    pub(crate) fn new(codec: Codec) -> Self {
        Self {
            codec,
            frames: BytesMut::new(),
            frame_count: 0,
        }
    }

    pub(crate) fn push(&mut self, timestamp_ms: u64, width: u32, height: u32, payload: &[u8]) {
        self.frames.reserve(FRAME_HEADER_LEN + payload.len());
        self.frames.put_u64(timestamp_ms);
        self.frames.put_u16(width as u16);
        self.frames.put_u16(height as u16);
        self.frames.put_u32(payload.len() as u32);
        self.frames.put_slice(payload);
        self.frame_count += 1;
    }

    pub(crate) fn frame_count(&self) -> u16 {
        self.frame_count
    }

    pub(crate) fn is_full(&self) -> bool {
        self.frame_count == u16::MAX
    }

    /// Emit the chunk bytes and reset. An empty builder yields an empty buffer.
    pub(crate) fn finish(&mut self, index: u32) -> Bytes {
        if self.frame_count == 0 {
            return Bytes::new();
        }

        let mut out = BytesMut::with_capacity(CHUNK_HEADER_LEN + self.frames.len());
        out.put_slice(CHUNK_MAGIC);
        out.put_u32(index);
        out.put_u16(self.frame_count);
        out.put_u8(self.codec.tag());
        out.put(self.frames.split());
        self.frame_count = 0;

        out.freeze()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    pub index: u32,
    pub frame_count: u16,
    pub codec: Codec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub timestamp_ms: u64,
    pub width: u16,
    pub height: u16,
    pub payload: Bytes,
}

impl ChunkHeader {
    /// Parse a chunk produced by the encoder. Used by receivers and tests.
    pub fn parse(chunk: &Bytes) -> Result<(ChunkHeader, Vec<FrameRecord>)> {
        let mut buf = chunk.clone();
        if buf.remaining() < CHUNK_HEADER_LEN || &buf[..4] != CHUNK_MAGIC {
            bail!("Not a media chunk");
        }
        buf.advance(4);

        let header = ChunkHeader {
            index: buf.get_u32(),
            frame_count: buf.get_u16(),
            codec: Codec::from_tag(buf.get_u8())?,
        };

        let mut frames = Vec::with_capacity(header.frame_count as usize);
        for _ in 0..header.frame_count {
            if buf.remaining() < FRAME_HEADER_LEN {
                bail!("Truncated frame header");
            }
            let timestamp_ms = buf.get_u64();
            let width = buf.get_u16();
            let height = buf.get_u16();
            let len = buf.get_u32() as usize;
            if buf.remaining() < len {
                bail!("Truncated frame payload");
            }
            frames.push(FrameRecord {
                timestamp_ms,
                width,
                height,
                payload: buf.split_to(len),
            });
        }

        if buf.has_remaining() {
            bail!("{} trailing bytes after last frame", buf.remaining());
        }

        Ok((header, frames))
    }
}
