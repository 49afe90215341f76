//! Media encoding
//!
//! Turns raw camera frames into self-describing binary chunks, flushed on a
//! fixed interval so transmission starts within one interval of capture.

mod chunk;
mod container;

pub use chunk::{EncoderConfig, EncoderHandle, EncoderState, MediaChunk, MediaEncoder};
pub use container::{Codec, ChunkHeader, FrameRecord, CHUNK_MAGIC};
