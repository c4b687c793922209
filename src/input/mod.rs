//! Byte-level terminal input decoding, used when input comes from a raw
//! reader instead of the crossterm event queue.

pub mod decode;

pub use decode::{InputDecoder, MAX_SEQUENCE_LEN};
