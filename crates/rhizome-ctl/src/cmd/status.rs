//! Daemon status, link status, and store cleanup commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

#[derive(Deserialize)]
struct StatusResponse {
    identity: String,
    store_path: String,
    quota_bytes: u64,
    used_bytes: u64,
    link: LinkStatusResponse,
}

#[derive(Deserialize)]
struct LinkStatusResponse {
    radio_rssi: f32,
    remote_rssi: f32,
    remaining_space: i32,
    heartbeat_due: bool,
}

#[derive(Deserialize)]
struct CleanupResponse {
    deleted_expired_files: u64,
    freed_bytes: u64,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Rhizome Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Identity   : {}", resp.identity);
    println!("  Store path : {}", resp.store_path);
    let quota = if resp.quota_bytes == 0 { "unlimited".to_string() } else { format!("{} bytes", resp.quota_bytes) };
    println!("  Store usage: {} bytes / {}", resp.used_bytes, quota);
    println!();
    println!("  Link radio rssi  : {:.1}", resp.link.radio_rssi);
    println!("  Link remote rssi : {:.1}", resp.link.remote_rssi);
    println!("  Remaining space  : {} bytes", resp.link.remaining_space);
    println!("  Heartbeat due    : {}", resp.link.heartbeat_due);

    Ok(())
}

pub async fn cmd_link_status(port: u16) -> Result<()> {
    let resp: LinkStatusResponse = get_json(&format!("{}/link/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Link Status");
    println!("═══════════════════════════════════════");
    println!("  radio rssi      : {:.1}", resp.radio_rssi);
    println!("  remote rssi     : {:.1}", resp.remote_rssi);
    println!("  remaining space : {} bytes", resp.remaining_space);
    println!("  heartbeat due   : {}", resp.heartbeat_due);

    Ok(())
}

pub async fn cmd_store_cleanup(port: u16) -> Result<()> {
    let resp: CleanupResponse = post_json(&format!("{}/store/cleanup", base_url(port))).await?;
    println!("Evicted {} payloads, freed {} bytes.", resp.deleted_expired_files, resp.freed_bytes);
    Ok(())
}
