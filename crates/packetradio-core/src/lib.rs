pub mod crc;
pub mod error;
pub mod frame;
pub mod golay;
pub mod heartbeat;
pub mod rs;

pub use error::FrameError;
pub use frame::{DataFrame, DecodedFrame, StreamDecoder, MAGIC, MAX_PAYLOAD, MSG_ID_DATASTREAM, MSG_ID_RADIO};
pub use heartbeat::{encode_heartbeat_request, is_heartbeat_request, Heartbeat};
