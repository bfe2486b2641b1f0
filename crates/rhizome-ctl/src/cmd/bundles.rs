//! Bundle compose, inspect, list, and journal-append commands.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::http::{base_url, get_json, post_bytes};

#[derive(Deserialize)]
struct BundleResponse {
    id: String,
    version: u64,
    status: String,
    message: String,
}

#[derive(Deserialize)]
struct BundleDetailResponse {
    id: String,
    version: u64,
    service: Option<String>,
    name: Option<String>,
    sender: Option<String>,
    recipient: Option<String>,
    filesize: Option<u64>,
    filehash: Option<String>,
    is_journal: bool,
    payload_stored: bool,
}

#[derive(Deserialize)]
struct BundleSummary {
    id: String,
    version: u64,
    service: Option<String>,
    name: Option<String>,
    filesize: Option<u64>,
}

#[derive(Deserialize)]
struct BundleListResponse {
    bundles: Vec<BundleSummary>,
}

pub async fn cmd_bundle_add(port: u16, path: &str, service: &str, name: Option<&str>) -> Result<()> {
    let payload = std::fs::read(path).with_context(|| format!("failed to read file: {}", path))?;
    let filename = name.map(str::to_string).or_else(|| std::path::Path::new(path).file_name().and_then(|n| n.to_str()).map(str::to_string));

    let mut form = reqwest::multipart::Form::new().text("service", service.to_string());
    if let Some(filename) = filename.clone() {
        form = form.text("name", filename.clone());
        form = form.part("payload", reqwest::multipart::Part::bytes(payload).file_name(filename));
    } else {
        form = form.part("payload", reqwest::multipart::Part::bytes(payload));
    }

    let resp: BundleResponse = reqwest::Client::new()
        .post(format!("{}/bundles", base_url(port)))
        .multipart(form)
        .send()
        .await
        .context("failed to reach rhizomed")?
        .json()
        .await
        .context("failed to parse response")?;

    println!("Bundle {} ({}): {}", resp.id, resp.status, resp.message);
    println!("  version: {}", resp.version);

    Ok(())
}

pub async fn cmd_bundle_get(port: u16, bid: &str) -> Result<()> {
    let resp: BundleDetailResponse = get_json(&format!("{}/bundles/{}", base_url(port), bid)).await?;

    println!("═══════════════════════════════════════");
    println!("  Bundle {}", resp.id);
    println!("═══════════════════════════════════════");
    println!("  version    : {}", resp.version);
    println!("  service    : {}", resp.service.as_deref().unwrap_or("(none)"));
    println!("  name       : {}", resp.name.as_deref().unwrap_or("(none)"));
    println!("  sender     : {}", resp.sender.as_deref().unwrap_or("(none)"));
    println!("  recipient  : {}", resp.recipient.as_deref().unwrap_or("(none)"));
    println!("  filesize   : {}", resp.filesize.map(|f| f.to_string()).unwrap_or_else(|| "(none)".to_string()));
    println!("  filehash   : {}", resp.filehash.as_deref().unwrap_or("(none)"));
    println!("  journal    : {}", resp.is_journal);
    println!("  payload    : {}", if resp.payload_stored { "stored" } else { "missing" });

    Ok(())
}

pub async fn cmd_bundle_list(port: u16, service: Option<&str>, name: Option<&str>) -> Result<()> {
    let mut url = format!("{}/bundles", base_url(port));
    let mut params = Vec::new();
    if let Some(s) = service {
        params.push(format!("service={}", s));
    }
    if let Some(n) = name {
        params.push(format!("name={}", n));
    }
    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }

    let resp: BundleListResponse = get_json(&url).await?;

    if resp.bundles.is_empty() {
        println!("No bundles stored.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Bundles ({})", resp.bundles.len());
    println!("═══════════════════════════════════════");
    for b in &resp.bundles {
        println!("  ┌─ {} v{}", b.id, b.version);
        println!("  │  service : {}", b.service.as_deref().unwrap_or("(none)"));
        println!("  │  name    : {}", b.name.as_deref().unwrap_or("(none)"));
        println!("  └─ size    : {}", b.filesize.map(|f| f.to_string()).unwrap_or_else(|| "(none)".to_string()));
    }

    Ok(())
}

pub async fn cmd_journal_append(port: u16, bid: &str, path: &str, advance_by: u64) -> Result<()> {
    let extra = std::fs::read(path).with_context(|| format!("failed to read file: {}", path))?;
    let url = format!("{}/bundles/{}/journal/append?advance_by={}", base_url(port), bid, advance_by);
    let resp: BundleResponse = post_bytes(&url, extra).await?;
    println!("Bundle {} ({}): {}", resp.id, resp.status, resp.message);
    println!("  version: {}", resp.version);
    Ok(())
}
