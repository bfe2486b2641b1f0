//! rhizome-ctl — command-line interface for the Rhizome daemon.

use anyhow::{Context, Result};

mod cmd;

const DEFAULT_PORT: u16 = 4110;

fn print_usage() {
    println!("Usage: rhizome-ctl [--port <port>] <command>");
    println!();
    println!("Daemon");
    println!("  status                          Identity, store usage, link summary");
    println!();
    println!("Bundles");
    println!("  bundle add <file> --service <s> [--name <n>]   Compose and store a bundle");
    println!("  bundle get <bid>                                Show a bundle's manifest");
    println!("  bundle list [--service <s>] [--name <n>]        List stored bundles");
    println!("  bundle journal-append <bid> <file> [advance_by] Append bytes to a journal bundle,");
    println!("                                                   optionally dropping advance_by bytes off the head");
    println!();
    println!("Store");
    println!("  store cleanup                   Force an eviction pass");
    println!();
    println!("Link");
    println!("  link status                     Heartbeat-derived link state");
    println!();
    println!(
        "Options:\n  --port <port>                   API port (default: {})",
        DEFAULT_PORT
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args.get(i).context("--port requires a value")?.parse().context("--port must be a number")?;
        } else {
            remaining.push(args[i].clone());
        }
        i += 1;
    }

    if remaining.first().map(String::as_str) == Some("bundle") && remaining.get(1).map(String::as_str) == Some("add") {
        let path = remaining.get(2).context("bundle add requires a file path")?;
        let mut service = None;
        let mut name = None;
        let mut i = 3;
        while i < remaining.len() {
            match remaining[i].as_str() {
                "--service" => {
                    i += 1;
                    service = remaining.get(i).cloned();
                }
                "--name" => {
                    i += 1;
                    name = remaining.get(i).cloned();
                }
                other => anyhow::bail!("Unknown option: {}", other),
            }
            i += 1;
        }
        let service = service.unwrap_or_else(|| "file".to_string());
        return cmd::bundles::cmd_bundle_add(port, path, &service, name.as_deref()).await;
    }

    if remaining.first().map(String::as_str) == Some("bundle") && remaining.get(1).map(String::as_str) == Some("list") {
        let mut service = None;
        let mut name = None;
        let mut i = 2;
        while i < remaining.len() {
            match remaining[i].as_str() {
                "--service" => {
                    i += 1;
                    service = remaining.get(i).cloned();
                }
                "--name" => {
                    i += 1;
                    name = remaining.get(i).cloned();
                }
                other => anyhow::bail!("Unknown option: {}", other),
            }
            i += 1;
        }
        return cmd::bundles::cmd_bundle_list(port, service.as_deref(), name.as_deref()).await;
    }

    let remaining_refs: Vec<&str> = remaining.iter().map(|s| s.as_str()).collect();
    match remaining_refs.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["bundle", "get", bid] => cmd::bundles::cmd_bundle_get(port, bid).await,
        ["bundle", "journal-append", bid, path] => cmd::bundles::cmd_journal_append(port, bid, path, 0).await,
        ["bundle", "journal-append", bid, path, advance_by] => {
            let advance_by = advance_by.parse().context("advance_by must be a non-negative integer")?;
            cmd::bundles::cmd_journal_append(port, bid, path, advance_by).await
        }
        ["store", "cleanup"] => cmd::status::cmd_store_cleanup(port).await,
        ["link", "status"] => cmd::status::cmd_link_status(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
