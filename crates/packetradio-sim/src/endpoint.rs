//! One side of the simulated serial link: an AT command-mode state
//! machine sitting in front of a transmit/receive byte buffer pair.
//! Mirrors the original modem simulator's `radio_state` struct and its
//! `+++` escape detection, with the fixed buffer sizes kept (1280 bytes
//! of transmit headroom, 512 of receive) since they bound how large a
//! single command-mode guard window or reply burst can be.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use packetradio_core::Heartbeat;

const TX_CAPACITY: usize = 1280;
const RX_CAPACITY: usize = 512;
const COMMAND_GUARD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscapeState {
    Online,
    Plus,
    PlusPlus,
    PlusPlusPlus,
    Command,
}

pub struct RadioEndpoint {
    pub name: &'static str,
    state: EscapeState,
    command_buffer: String,
    tx_buffer: VecDeque<u8>,
    rx_buffer: VecDeque<u8>,
    last_char_at: Option<Instant>,
    pub rssi_output: bool,
    pub seq: u8,
}

impl RadioEndpoint {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: EscapeState::Online,
            command_buffer: String::new(),
            tx_buffer: VecDeque::with_capacity(TX_CAPACITY),
            rx_buffer: VecDeque::with_capacity(RX_CAPACITY),
            last_char_at: None,
            rssi_output: false,
            seq: 0,
        }
    }

    /// Consumes bytes arriving from the attached host, running the
    /// `+++` escape detector and feeding anything outside command mode
    /// into the transmit buffer.
    pub fn feed_from_host(&mut self, bytes: &[u8]) {
        self.last_char_at = Some(Instant::now());
        for &b in bytes {
            if self.state == EscapeState::Command {
                match b {
                    b'\r' => {
                        self.process_command();
                        self.command_buffer.clear();
                    }
                    0x08 | 0x7f => {
                        self.command_buffer.pop();
                    }
                    _ if self.command_buffer.len() < 127 => self.command_buffer.push(b as char),
                    _ => {}
                }
                continue;
            }

            if b == b'+' {
                self.state = match self.state {
                    EscapeState::Online => EscapeState::Plus,
                    EscapeState::Plus => EscapeState::PlusPlus,
                    EscapeState::PlusPlus | EscapeState::PlusPlusPlus => EscapeState::PlusPlusPlus,
                    EscapeState::Command => unreachable!(),
                };
            } else {
                self.state = EscapeState::Online;
            }

            self.store_tx_byte(b);
        }

        if self.state == EscapeState::PlusPlusPlus {
            if let Some(last) = self.last_char_at {
                if last.elapsed() >= COMMAND_GUARD {
                    self.state = EscapeState::Command;
                }
            }
        }
    }

    fn store_tx_byte(&mut self, byte: u8) {
        if self.tx_buffer.len() < TX_CAPACITY {
            self.tx_buffer.push_back(byte);
        } else {
            tracing::trace!(endpoint = self.name, "dropped byte, transmit buffer full");
        }
    }

    fn process_command(&mut self) {
        let cmd = self.command_buffer.to_ascii_uppercase();
        tracing::debug!(endpoint = self.name, command = %cmd, "processing AT command");
        match cmd.as_str() {
            "AT" => self.append_reply(b"OK\r"),
            "ATO" => {
                self.append_reply(b"OK\r");
                self.state = EscapeState::Online;
            }
            "AT&T" => {
                self.append_reply(b"OK\r");
                self.rssi_output = false;
            }
            "AT&T=RSSI" => {
                self.append_reply(b"OK\r");
                self.rssi_output = true;
            }
            "ATI" => self.append_reply(b"RFD900a SIMULATOR 1.6\rOK\r"),
            _ => self.append_reply(b"ERROR\r"),
        }
    }

    fn append_reply(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.rx_buffer.len() < RX_CAPACITY {
                self.rx_buffer.push_back(b);
            }
        }
    }

    /// Queues a synthesised link-status heartbeat as if the radio had
    /// generated it in reply to a host-originated heartbeat frame.
    pub fn queue_heartbeat_reply(&mut self, remaining_space_pct: u8) {
        let hb = Heartbeat {
            seq: self.seq,
            rx_err: 0,
            fixed: 0,
            rssi_local: 43,
            rssi_remote: 35,
            txbuf_pct: remaining_space_pct,
            noise_local: 20,
            noise_remote: 20,
        };
        self.seq = self.seq.wrapping_add(1);
        self.append_reply(&hb.encode());
    }

    pub fn tx_len(&self) -> usize {
        self.tx_buffer.len()
    }

    pub fn drain_tx(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.tx_buffer.len());
        self.tx_buffer.drain(..n).collect()
    }

    pub fn push_rx(&mut self, byte: u8) -> bool {
        if self.rx_buffer.len() < RX_CAPACITY {
            self.rx_buffer.push_back(byte);
            true
        } else {
            false
        }
    }

    pub fn txbuf_free_pct(&self) -> u8 {
        let free = TX_CAPACITY - self.tx_buffer.len();
        ((free / 8) * 100 / (TX_CAPACITY / 8)) as u8
    }

    /// Drains up to `max` bytes destined for the attached host.
    pub fn drain_to_host(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.rx_buffer.len());
        self.rx_buffer.drain(..n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_bytes_pass_through_to_tx_buffer() {
        let mut ep = RadioEndpoint::new("left");
        ep.feed_from_host(b"hello");
        assert_eq!(ep.tx_len(), 5);
    }

    #[test]
    fn at_command_replies_ok() {
        let mut ep = RadioEndpoint::new("left");
        ep.state = EscapeState::Command;
        ep.feed_from_host(b"AT\r");
        assert_eq!(ep.drain_to_host(16), b"OK\r".to_vec());
    }

    #[test]
    fn unknown_command_replies_error() {
        let mut ep = RadioEndpoint::new("left");
        ep.state = EscapeState::Command;
        ep.feed_from_host(b"ATZZZ\r");
        assert_eq!(ep.drain_to_host(16), b"ERROR\r".to_vec());
    }

    #[test]
    fn rssi_toggle_commands_round_trip() {
        let mut ep = RadioEndpoint::new("left");
        ep.state = EscapeState::Command;
        ep.feed_from_host(b"AT&T=RSSI\r");
        ep.drain_to_host(16);
        assert!(ep.rssi_output);
        ep.feed_from_host(b"AT&T\r");
        ep.drain_to_host(16);
        assert!(!ep.rssi_output);
    }

    #[test]
    fn txbuf_free_pct_starts_near_full() {
        let ep = RadioEndpoint::new("left");
        assert!(ep.txbuf_free_pct() >= 99);
    }
}
