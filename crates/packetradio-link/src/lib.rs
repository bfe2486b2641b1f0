pub mod link;
pub mod session;

pub use link::{LinkState, HEARTBEAT_INTERVAL};
pub use session::{Fragmenter, Reassembler};
