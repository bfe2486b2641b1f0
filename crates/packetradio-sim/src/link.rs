//! The simulated air interface joining two [`RadioEndpoint`]s: half-duplex
//! turn-taking, a per-bit bit-error-rate model, and preamble-drop
//! behaviour carried over from the original modem simulator's
//! `transfer_bytes`.

use packetradio_core::{DecodedFrame, StreamDecoder, MAGIC};
use rand::Rng;

use crate::endpoint::RadioEndpoint;

const PACKET_SIZE: usize = 255;
const PREAMBLE_BITS: usize = 28;
const FRAMES_PER_TURN: u8 = 3;

pub struct SimLink {
    pub left: RadioEndpoint,
    pub right: RadioEndpoint,
    transmitter: usize,
    tx_count: u8,
    /// Per-bit flip probability expressed as a fraction of `u32::MAX`,
    /// matching the original simulator's `ber` scale.
    pub ber: u32,
}

#[derive(Debug, Default)]
pub struct TransferReport {
    pub bytes_sent: usize,
    pub dropped: bool,
    pub turn_swapped: bool,
}

impl SimLink {
    pub fn new() -> Self {
        Self { left: RadioEndpoint::new("left"), right: RadioEndpoint::new("right"), transmitter: 0, tx_count: FRAMES_PER_TURN, ber: 0 }
    }

    fn endpoints_mut(&mut self) -> (&mut RadioEndpoint, &mut RadioEndpoint) {
        if self.transmitter == 0 {
            (&mut self.left, &mut self.right)
        } else {
            (&mut self.right, &mut self.left)
        }
    }

    fn bit_flips<R: Rng>(ber: u32, rng: &mut R) -> bool {
        ber != 0 && rng.gen::<u32>() < ber
    }

    /// Moves one packet's worth of bytes (if any are queued) from the
    /// current transmitter to the receiver, applying the bit-error model,
    /// and advances turn-taking state.
    pub fn transfer_once<R: Rng>(&mut self, rng: &mut R) -> TransferReport {
        let ber = self.ber;
        let (tx, rx) = self.endpoints_mut();
        let available = tx.tx_len().min(PACKET_SIZE);
        if available == 0 {
            return self.advance_turn(true);
        }

        let bytes = tx.drain_tx(available);
        check_for_heartbeat_probe(tx, &bytes);

        let mut dropped = false;
        for _ in 0..PREAMBLE_BITS {
            if Self::bit_flips(ber, rng) {
                dropped = true;
            }
        }

        if !dropped {
            for &byte in &bytes {
                let mut b = byte;
                for bit in 0..8u8 {
                    if Self::bit_flips(ber, rng) {
                        b ^= 1 << bit;
                    }
                }
                if !rx.push_rx(b) {
                    break;
                }
            }
        } else {
            tracing::debug!("dropped packet: bit flip in preamble");
        }

        let mut report = self.advance_turn(bytes.len() < PACKET_SIZE);
        report.bytes_sent = bytes.len();
        report.dropped = dropped;
        report
    }

    fn advance_turn(&mut self, exhausted: bool) -> TransferReport {
        let mut swapped = false;
        if exhausted || self.tx_count == 0 {
            self.transmitter = 1 - self.transmitter;
            self.tx_count = FRAMES_PER_TURN;
            swapped = true;
        } else {
            self.tx_count -= 1;
        }
        TransferReport { turn_swapped: swapped, ..Default::default() }
    }
}

impl Default for SimLink {
    fn default() -> Self {
        Self::new()
    }
}

/// If the bytes about to go out over the air decode as a heartbeat
/// frame, the originating radio also answers its own host immediately —
/// mirroring the real modem's local status auto-reply.
fn check_for_heartbeat_probe(origin: &mut RadioEndpoint, bytes: &[u8]) {
    if bytes.first() != Some(&MAGIC) {
        return;
    }
    let mut decoder = StreamDecoder::new();
    decoder.push(bytes);
    if let Some(DecodedFrame::Heartbeat(_)) = decoder.poll() {
        let pct = origin.txbuf_free_pct();
        origin.queue_heartbeat_reply(pct);
    }
}
