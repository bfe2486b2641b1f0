//! Fragmentation and reassembly of messages larger than one frame's
//! payload budget, ordered by the outer framing's 6-bit sequence number.
//! Reassembly is single-flight: a sequence gap drops whatever was
//! in progress rather than waiting for a retransmit, matching the
//! link's "frames arrive in order or not at all" guarantee.

use packetradio_core::{DataFrame, MAX_PAYLOAD};

#[derive(Debug, Default)]
pub struct Fragmenter {
    next_seq: u8,
}

impl Fragmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits `payload` into one or more frames under `msg_id`, never
    /// producing more than one empty frame for an empty payload.
    pub fn fragment(&mut self, msg_id: u8, payload: &[u8]) -> Vec<DataFrame> {
        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![&[][..]]
        } else {
            payload.chunks(MAX_PAYLOAD).collect()
        };
        let last = chunks.len() - 1;
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let seq = self.next_seq;
                self.next_seq = self.next_seq.wrapping_add(1) & 0x3F;
                DataFrame { seq, start: i == 0, end: i == last, msg_id, payload: chunk.to_vec() }
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct Reassembler {
    expected_seq: Option<u8>,
    msg_id: u8,
    buffer: Vec<u8>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one decoded data frame. Returns the completed `(msg_id,
    /// bytes)` once an in-order `end` frame arrives.
    pub fn accept(&mut self, frame: &DataFrame) -> Option<(u8, Vec<u8>)> {
        if frame.start {
            self.buffer.clear();
            self.msg_id = frame.msg_id;
            self.expected_seq = Some(frame.seq);
        }

        match self.expected_seq {
            Some(seq) if seq == frame.seq => {}
            _ => {
                self.expected_seq = None;
                self.buffer.clear();
                return None;
            }
        }

        self.buffer.extend_from_slice(&frame.payload);
        self.expected_seq = Some(frame.seq.wrapping_add(1) & 0x3F);

        if frame.end {
            let msg = std::mem::take(&mut self.buffer);
            self.expected_seq = None;
            Some((self.msg_id, msg))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_message_round_trips() {
        let mut frag = Fragmenter::new();
        let frames = frag.fragment(0x43, b"hello");
        assert_eq!(frames.len(), 1);

        let mut reasm = Reassembler::new();
        let result = reasm.accept(&frames[0]);
        assert_eq!(result, Some((0x43, b"hello".to_vec())));
    }

    #[test]
    fn multi_frame_message_round_trips() {
        let payload = vec![7u8; MAX_PAYLOAD * 3 + 10];
        let mut frag = Fragmenter::new();
        let frames = frag.fragment(0x43, &payload);
        assert_eq!(frames.len(), 4);

        let mut reasm = Reassembler::new();
        let mut result = None;
        for frame in &frames {
            result = reasm.accept(frame);
        }
        assert_eq!(result, Some((0x43, payload)));
    }

    #[test]
    fn dropped_frame_aborts_in_progress_reassembly() {
        let payload = vec![9u8; MAX_PAYLOAD * 2];
        let mut frag = Fragmenter::new();
        let frames = frag.fragment(0x43, &payload);
        assert_eq!(frames.len(), 2);

        let mut reasm = Reassembler::new();
        assert_eq!(reasm.accept(&frames[0]), None);
        // frames[1] is dropped in transit; a stray later frame should not complete.
        let mut skipped = frames[1].clone();
        skipped.seq = skipped.seq.wrapping_add(5) & 0x3F;
        assert_eq!(reasm.accept(&skipped), None);
    }

    #[test]
    fn empty_payload_produces_one_frame() {
        let mut frag = Fragmenter::new();
        let frames = frag.fragment(0x43, b"");
        assert_eq!(frames.len(), 1);
        assert!(frames[0].start && frames[0].end);
    }
}
