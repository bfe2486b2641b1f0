//! Link budget state — rssi, remaining transmit space, and the two
//! pacing deadlines a heartbeat updates. Mutated lazily on read, the same
//! way a token bucket refills itself at `allow()` time rather than on a
//! background tick.

use std::time::{Duration, Instant};

use packetradio_core::Heartbeat;

/// Remaining-space threshold above which the link is considered quiet
/// and the next heartbeat is deferred rather than sent on schedule.
const QUIET_THRESHOLD: i32 = 720;
const QUIET_DEFER: Duration = Duration::from_millis(1000);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug)]
pub struct LinkState {
    radio_rssi: f32,
    remote_rssi: f32,
    remaining_space: i32,
    next_tx_allowed: Instant,
    next_heartbeat: Instant,
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkState {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            radio_rssi: 0.0,
            remote_rssi: 0.0,
            remaining_space: 0,
            next_tx_allowed: now,
            next_heartbeat: now,
        }
    }

    /// Applies a received heartbeat: refreshes the rssi estimates and
    /// re-arms the transmit gate and next-heartbeat deadline.
    pub fn on_heartbeat(&mut self, hb: &Heartbeat) {
        let now = Instant::now();
        self.radio_rssi = hb.local_link_quality();
        self.remote_rssi = hb.remote_link_quality();
        self.remaining_space = hb.remaining_space();

        if self.remaining_space > 0 {
            self.next_tx_allowed = now;
        }
        self.next_heartbeat = if self.remaining_space > QUIET_THRESHOLD {
            now + QUIET_DEFER
        } else {
            now + HEARTBEAT_INTERVAL
        };
    }

    /// Whether a frame of `frame_size` bytes may be sent right now.
    pub fn can_transmit(&self, frame_size: usize) -> bool {
        self.remaining_space >= frame_size as i32 && Instant::now() >= self.next_tx_allowed
    }

    pub fn heartbeat_due(&self) -> bool {
        Instant::now() >= self.next_heartbeat
    }

    pub fn radio_rssi(&self) -> f32 {
        self.radio_rssi
    }

    pub fn remote_rssi(&self) -> f32 {
        self.remote_rssi
    }

    pub fn remaining_space(&self) -> i32 {
        self.remaining_space
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(txbuf_pct: u8) -> Heartbeat {
        Heartbeat {
            seq: 0,
            rx_err: 0,
            fixed: 0,
            rssi_local: 180,
            rssi_remote: 170,
            txbuf_pct,
            noise_local: 40,
            noise_remote: 45,
        }
    }

    #[test]
    fn starts_closed_for_transmission() {
        let link = LinkState::new();
        assert!(!link.can_transmit(1));
    }

    #[test]
    fn heartbeat_with_space_opens_the_gate() {
        let mut link = LinkState::new();
        link.on_heartbeat(&heartbeat(80));
        assert!(link.remaining_space() > 0);
        assert!(link.can_transmit(100));
        assert!(!link.can_transmit(10_000));
    }

    #[test]
    fn heartbeat_with_no_space_leaves_gate_closed() {
        let mut link = LinkState::new();
        link.on_heartbeat(&heartbeat(0));
        assert!(link.remaining_space() <= 0);
        assert!(!link.can_transmit(1));
    }

    #[test]
    fn quiet_link_defers_next_heartbeat_longer() {
        let mut quiet = LinkState::new();
        quiet.on_heartbeat(&heartbeat(100));
        let mut busy = LinkState::new();
        busy.on_heartbeat(&heartbeat(10));
        assert!(quiet.next_heartbeat > busy.next_heartbeat);
    }
}
