pub mod endpoint;
pub mod link;

pub use endpoint::RadioEndpoint;
pub use link::{SimLink, TransferReport};

use std::time::{Duration, Instant};

use rand::rngs::ThreadRng;
use tokio::time;

const RSSI_PERIOD: Duration = Duration::from_secs(1);

/// Drives a [`SimLink`] forever, scheduling the next transfer attempt
/// the way the original simulator scheduled its next `poll(2)` wakeup:
/// a fixed per-packet overhead plus a byte-rate-proportional delay, with
/// an extra turnaround pause whenever the transmitting side changes.
pub async fn run(mut link: SimLink) -> ! {
    let mut rng = ThreadRng::default();
    let mut next_rssi_line = Instant::now() + RSSI_PERIOD;

    loop {
        let report = link.transfer_once(&mut rng);

        if report.bytes_sent > 0 {
            tracing::trace!(bytes = report.bytes_sent, dropped = report.dropped, "transferred packet");
        }

        if (link.left.rssi_output || link.right.rssi_output) && Instant::now() >= next_rssi_line {
            tracing::info!("L/R RSSI: {} {}", 43, 35);
            next_rssi_line = Instant::now() + RSSI_PERIOD;
        }

        let mut delay_ms = 5 + report.bytes_sent as u64;
        if report.turn_swapped {
            delay_ms += 15;
        }
        time::sleep(Duration::from_millis(delay_ms)).await;
    }
}
