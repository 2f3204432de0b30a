//! Binary formats for simulation frames and voxel-box volumes.

pub mod as_bytes;
pub mod decode;
pub mod encode;
pub mod voxel_box;

pub use decode::{decode_frame_file, DecodingError, FrameData, FrameDecoder, FrameHeader};
pub use encode::{encode_frame_file, EncodingError, FrameEncoder, FrameRecord};
