//! HTTP API handlers — exposes store, bundle, and link-layer state as JSON.

use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use packetradio_link::LinkState;
use rhizome_bundle::{compose_and_store, journal_append, ComposeRequest};
use rhizome_core::ids::{Bid, Sid};
use rhizome_manifest::{sign, Manifest};
use rhizome_store::Store;
use rusqlite::OptionalExtension;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<Store>,
    pub identity: Arc<SigningKey>,
    pub link: Arc<Mutex<LinkState>>,
}

type ApiError = (StatusCode, String);

fn bad_request(msg: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, msg.into())
}

fn internal(msg: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string())
}

/// Runs a synchronous store/database closure on the blocking thread pool.
///
/// `rhizome-store`'s rusqlite-backed calls retry `SQLITE_BUSY` with a
/// real `std::thread::sleep` backoff — fine on a thread the blocking
/// pool owns, fatal on the single `current_thread` executor this
/// daemon otherwise runs its link driver and every other request on.
/// Every handler below routes its store access through here instead of
/// calling `rhizome-store`/`rhizome-bundle` directly.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| internal(format!("blocking task panicked: {e}")))?
}

// ── /status ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub identity: String,
    pub store_path: String,
    pub quota_bytes: u64,
    pub used_bytes: u64,
    pub link: LinkStatusResponse,
}

pub async fn handle_status(State(state): State<ApiState>) -> Result<Json<StatusResponse>, ApiError> {
    let store = state.store.clone();
    let used_bytes = blocking(move || store.usage().map_err(internal)).await?;
    let link = link_snapshot(&state);
    Ok(Json(StatusResponse {
        identity: sign::id_from_signing_key(&state.identity).to_hex(),
        store_path: state.store.root.root.display().to_string(),
        quota_bytes: state.store.config.database_size,
        used_bytes,
        link,
    }))
}

// ── /bundles (POST) ───────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct BundleResponse {
    pub id: String,
    pub version: u64,
    pub status: String,
    pub message: String,
}

pub async fn handle_create_bundle(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<Json<BundleResponse>, ApiError> {
    let mut manifest = Manifest::new();
    let mut payload = Vec::new();
    let mut filename_hint = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| bad_request(e.to_string()))? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "payload" => {
                if let Some(fname) = field.file_name() {
                    filename_hint = Some(fname.to_string());
                }
                let data = field.bytes().await.map_err(|e| bad_request(e.to_string()))?;
                payload = data.to_vec();
            }
            "service" => manifest.set_service(&field.text().await.map_err(|e| bad_request(e.to_string()))?),
            "name" => manifest.set_name(&field.text().await.map_err(|e| bad_request(e.to_string()))?),
            "sender" => {
                let text = field.text().await.map_err(|e| bad_request(e.to_string()))?;
                manifest.set_sender(Sid::parse(&text).map_err(|e| bad_request(e.to_string()))?);
            }
            "recipient" => {
                let text = field.text().await.map_err(|e| bad_request(e.to_string()))?;
                manifest.set_recipient(Sid::parse(&text).map_err(|e| bad_request(e.to_string()))?);
            }
            "tail" => {
                let text = field.text().await.map_err(|e| bad_request(e.to_string()))?;
                let tail: u64 = text.parse().map_err(|_| bad_request("tail must be an integer"))?;
                manifest.set_tail(tail);
            }
            _ => {}
        }
    }

    let store = state.store.clone();
    let identity = state.identity.clone();
    let (stored, result) = blocking(move || {
        let req = ComposeRequest { manifest, payload: &payload, secret: &identity, filename_hint: filename_hint.as_deref() };
        compose_and_store(&store, req).map_err(internal)
    })
    .await?;

    Ok(Json(BundleResponse {
        id: stored.id().map(|b| b.to_hex()).unwrap_or_default(),
        version: stored.version().unwrap_or(0),
        status: format!("{:?}", result.status),
        message: result.message,
    }))
}

// ── /bundles/{bid} (GET) ──────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct BundleDetailResponse {
    pub id: String,
    pub version: u64,
    pub service: Option<String>,
    pub name: Option<String>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub filesize: Option<u64>,
    pub filehash: Option<String>,
    pub is_journal: bool,
    pub payload_stored: bool,
}

pub async fn handle_get_bundle(State(state): State<ApiState>, Path(bid): Path<String>) -> Result<Json<BundleDetailResponse>, ApiError> {
    let bid = Bid::from_hex(&bid).map_err(|e| bad_request(e.to_string()))?;
    let store = state.store.clone();
    let (manifest, payload_stored) = blocking(move || {
        let manifest = load_manifest_sync(&store, bid)?.ok_or_else(|| (StatusCode::NOT_FOUND, "bundle not found".to_string()))?;
        let payload_stored = match manifest.filehash() {
            Some(hash) => matches!(store.exists(&hash).map_err(internal)?, rhizome_store::PayloadStatus::Stored),
            None => false,
        };
        Ok((manifest, payload_stored))
    })
    .await?;

    Ok(Json(BundleDetailResponse {
        id: manifest.id().map(|b| b.to_hex()).unwrap_or_default(),
        version: manifest.version().unwrap_or(0),
        service: manifest.service(),
        name: manifest.name(),
        sender: manifest.sender().map(|s| s.to_hex()),
        recipient: manifest.recipient().map(|s| s.to_hex()),
        filesize: manifest.filesize(),
        filehash: manifest.filehash().map(|h| h.to_hex()),
        is_journal: manifest.is_journal(),
        payload_stored,
    }))
}

/// Blocking: looks up a manifest's serialized blob and reparses it.
/// Callers run this on the blocking thread pool, never inline on the
/// async executor thread.
fn load_manifest_sync(store: &Store, bid: Bid) -> Result<Option<Manifest>, ApiError> {
    let conn = store.root.conn.lock().unwrap();
    let blob: Option<Vec<u8>> = conn
        .query_row("SELECT manifest FROM manifests WHERE id = ?1", [bid.to_hex()], |r| r.get(0))
        .optional()
        .map_err(internal)?;
    drop(conn);
    blob.map(|b| Manifest::parse(&b).map_err(internal)).transpose()
}

// ── /bundles (GET, list) ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ListQuery {
    pub service: Option<String>,
    pub name: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct BundleSummary {
    pub id: String,
    pub version: u64,
    pub service: Option<String>,
    pub name: Option<String>,
    pub filesize: Option<u64>,
}

#[derive(Serialize)]
pub struct BundleListResponse {
    pub bundles: Vec<BundleSummary>,
}

pub async fn handle_list_bundles(State(state): State<ApiState>, Query(q): Query<ListQuery>) -> Result<Json<BundleListResponse>, ApiError> {
    let limit = q.limit.unwrap_or(100).min(1000);
    let store = state.store.clone();
    let bundles = blocking(move || {
        let conn = store.root.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, version, service, name, filesize FROM manifests
                 WHERE (?1 IS NULL OR service = ?1) AND (?2 IS NULL OR name = ?2)
                 ORDER BY inserttime DESC LIMIT ?3",
            )
            .map_err(internal)?;
        let rows = stmt
            .query_map(rusqlite::params![q.service, q.name, limit], |r| {
                Ok(BundleSummary {
                    id: r.get(0)?,
                    version: r.get::<_, i64>(1)? as u64,
                    service: r.get(2)?,
                    name: r.get(3)?,
                    filesize: r.get::<_, Option<i64>>(4)?.map(|v| v as u64),
                })
            })
            .map_err(internal)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(internal)
    })
    .await?;
    Ok(Json(BundleListResponse { bundles }))
}

// ── /bundles/{bid}/journal/append (POST) ──────────────────────────────────────

#[derive(Deserialize)]
pub struct JournalAppendQuery {
    pub advance_by: Option<u64>,
}

pub async fn handle_journal_append(
    State(state): State<ApiState>,
    Path(bid): Path<String>,
    Query(q): Query<JournalAppendQuery>,
    body: axum::body::Bytes,
) -> Result<Json<BundleResponse>, ApiError> {
    let bid = Bid::from_hex(&bid).map_err(|e| bad_request(e.to_string()))?;
    if bid != sign::id_from_signing_key(&state.identity) {
        return Err((StatusCode::FORBIDDEN, "journal append requires the bundle's own signing key".to_string()));
    }
    let advance_by = q.advance_by.unwrap_or(0);

    let store = state.store.clone();
    let identity = state.identity.clone();
    let (manifest, result) = blocking(move || {
        let mut manifest = load_manifest_sync(&store, bid)?.ok_or_else(|| (StatusCode::NOT_FOUND, "bundle not found".to_string()))?;
        let result = journal_append(&store, &mut manifest, advance_by, &body, &identity).map_err(internal)?;
        Ok((manifest, result))
    })
    .await?;

    Ok(Json(BundleResponse {
        id: manifest.id().map(|b| b.to_hex()).unwrap_or_default(),
        version: manifest.version().unwrap_or(0),
        status: format!("{:?}", result.status),
        message: result.message,
    }))
}

// ── /store/cleanup (POST) ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct CleanupResponse {
    pub deleted_expired_files: u64,
    pub freed_bytes: u64,
}

pub async fn handle_store_cleanup(State(state): State<ApiState>) -> Result<Json<CleanupResponse>, ApiError> {
    let store = state.store.clone();
    let report = blocking(move || store.cleanup().map_err(internal)).await?;
    Ok(Json(CleanupResponse { deleted_expired_files: report.deleted_expired_files, freed_bytes: report.freed_bytes }))
}

// ── /link/status (GET) ────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct LinkStatusResponse {
    pub radio_rssi: f32,
    pub remote_rssi: f32,
    pub remaining_space: i32,
    pub heartbeat_due: bool,
}

fn link_snapshot(state: &ApiState) -> LinkStatusResponse {
    let link = state.link.lock().unwrap();
    LinkStatusResponse {
        radio_rssi: link.radio_rssi(),
        remote_rssi: link.remote_rssi(),
        remaining_space: link.remaining_space(),
        heartbeat_due: link.heartbeat_due(),
    }
}

pub async fn handle_link_status(State(state): State<ApiState>) -> Json<LinkStatusResponse> {
    Json(link_snapshot(&state))
}
