//! rhizomed — the Rhizome store-and-forward daemon.

mod identity;
mod link;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use packetradio_link::LinkState;
use rhizome_core::config::RhizomeConfig;
use rhizome_store::Store;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = RhizomeConfig::load()?;
    tracing::info!(store = %config.store.path.display(), port = config.api.port, "rhizomed starting");

    let identity = Arc::new(identity::load_or_generate(&config.store.path)?);
    tracing::info!(id = %rhizome_manifest::sign::id_from_signing_key(&identity), "daemon identity");

    let store = Arc::new(Store::open(config.store.clone())?);
    let link_state = Arc::new(Mutex::new(LinkState::new()));

    let api_state = rhizome_api::ApiState { store: store.clone(), identity: identity.clone(), link: link_state.clone() };
    let api_task = tokio::spawn(rhizome_api::serve(api_state, config.api.port));
    let link_task = tokio::spawn(link::run(config.link.clone(), link_state.clone()));

    tokio::select! {
        r = api_task => tracing::error!("api task exited: {:?}", r),
        r = link_task => tracing::error!("link task exited: {:?}", r),
    }

    Ok(())
}
