//! Drives the link layer described by [`LinkConfig`]: either a loopback
//! heartbeat exchange through the in-process radio simulator, or — when
//! pointed at a real serial path — a placeholder that logs and idles,
//! since no physical radio is attachable in this environment.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use packetradio_core::{DecodedFrame, Heartbeat, StreamDecoder};
use packetradio_link::LinkState;
use rhizome_core::config::LinkConfig;

/// Runs forever, updating `link_state` as heartbeats are produced and
/// looped back. Returns only if the configured device is unrecognised
/// or absent, in which case the caller's `select!` treats that as idle.
pub async fn run(config: LinkConfig, link_state: Arc<Mutex<LinkState>>) {
    if config.device.is_empty() {
        tracing::info!("no link device configured, link layer idle");
        std::future::pending::<()>().await;
    }

    if config.device.starts_with("sim://") {
        tracing::info!(device = %config.device, ber = config.simulated_ber, "attaching to in-process radio simulator");
        run_simulated(config, link_state).await;
    } else {
        tracing::warn!(device = %config.device, "serial radio devices are not available in this environment; link layer idle");
        std::future::pending::<()>().await;
    }
}

async fn run_simulated(config: LinkConfig, link_state: Arc<Mutex<LinkState>>) {
    let mut sim = packetradio_sim::SimLink::new();
    sim.ber = config.simulated_ber;
    let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::from_entropy();
    let mut ticker = tokio::time::interval(Duration::from_millis(config.heartbeat_interval_ms.max(1)));
    let mut seq: u8 = 0;

    loop {
        ticker.tick().await;

        let hb = Heartbeat {
            seq,
            rx_err: 0,
            fixed: 0,
            rssi_local: 180,
            rssi_remote: 170,
            txbuf_pct: sim.left.txbuf_free_pct(),
            noise_local: 40,
            noise_remote: 45,
        };
        seq = seq.wrapping_add(1);
        sim.left.feed_from_host(&hb.encode());

        // A heartbeat is short enough to clear the transmit buffer in a
        // handful of packet turns; stop early once it has.
        for _ in 0..4 {
            let report = sim.transfer_once(&mut rng);
            if report.bytes_sent == 0 {
                break;
            }
        }

        let received = sim.right.drain_to_host(Heartbeat::WIRE_LEN * 2);
        let mut decoder = StreamDecoder::new();
        decoder.push(&received);
        if let Some(DecodedFrame::Heartbeat(hb)) = decoder.poll() {
            link_state.lock().unwrap().on_heartbeat(&hb);
        }
    }
}
