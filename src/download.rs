//! Resumable bottle downloads.
//!
//! Sequential per file, parallel across files. Each download streams
//! through the shared HTTP client with a `Range` request when a usable
//! partial exists, handles the OCI registry bearer-token handshake on
//! 401, and verifies the SHA-256 digest before the sidecar is retired.

use crate::api::RemoteFormula;
use crate::error::{FastBrewError, Result};
use crate::http;
use crate::platform;
use crate::progress::{ProgressManager, Tracker};
use crate::resume::{self, DownloadState, ResumeStore};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Persist the sidecar's byte count at this interval while streaming.
const SIDECAR_FLUSH_INTERVAL: u64 = 4 * 1024 * 1024;

/// Cache path for a formula's bottle tarball.
pub fn bottle_path(cache_dir: &Path, name: &str, version: &str) -> PathBuf {
    cache_dir.join(format!("{name}-{version}.bottle"))
}

/// Download the bottle for `formula` into the cache, resuming any
/// usable partial. Returns the tarball path.
pub async fn download_bottle(
    formula: &RemoteFormula,
    cache_dir: &Path,
    tracker: Option<Arc<Tracker>>,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let tag = platform::bottle_tag()?;
    let bottle = formula.bottle_for_platform(&tag)?;
    let version = formula.stable_version()?;

    fs::create_dir_all(cache_dir).await?;
    let dest = bottle_path(cache_dir, &formula.name, version);
    let store = ResumeStore::new(cache_dir);

    download_with_resume(&bottle.url, &dest, &bottle.sha256, &store, tracker, cancel).await?;
    Ok(dest)
}

/// Download all bottles in parallel, bounded by `parallel` concurrent
/// transfers. Failures are collected per package rather than aborting
/// the batch.
pub async fn download_bottles(
    formulae: &[RemoteFormula],
    cache_dir: &Path,
    parallel: usize,
    progress: Option<&Arc<ProgressManager>>,
    cancel: &CancellationToken,
) -> Vec<(String, Result<PathBuf>)> {
    let semaphore = Arc::new(Semaphore::new(parallel.max(1)));
    let mut tasks = Vec::with_capacity(formulae.len());

    for formula in formulae {
        if cancel.is_cancelled() {
            tasks.push(Err(formula.name.clone()));
            continue;
        }

        let formula = formula.clone();
        let cache_dir = cache_dir.to_path_buf();
        let semaphore = semaphore.clone();
        let cancel = cancel.clone();
        let manager = progress.cloned();

        tasks.push(Ok(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let tracker = manager.as_ref().map(|m| m.register(&formula.name));

            let result = download_bottle(&formula, &cache_dir, tracker.clone(), &cancel).await;

            if let Some(tracker) = tracker {
                match &result {
                    Ok(_) => tracker.complete(),
                    Err(e) => tracker.error(&e.to_string()),
                }
            }
            if let Some(manager) = manager {
                manager.unregister(&formula.name);
            }

            (formula.name.clone(), result)
        })));
    }

    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task {
            Ok(handle) => match handle.await {
                Ok(entry) => results.push(entry),
                Err(e) => results.push((
                    String::new(),
                    Err(FastBrewError::Other(anyhow::anyhow!("task panicked: {e}"))),
                )),
            },
            Err(name) => results.push((name, Err(FastBrewError::Cancelled))),
        }
    }
    results
}

/// Core protocol: short-circuit on a verified destination, resume a
/// usable partial, otherwise start from byte zero.
pub async fn download_with_resume(
    url: &str,
    dest: &Path,
    expected_sha256: &str,
    store: &ResumeStore,
    tracker: Option<Arc<Tracker>>,
    cancel: &CancellationToken,
) -> Result<()> {
    // 1. A destination that already verifies needs no network at all.
    if fs::try_exists(dest).await? && checksum_matches(dest, expected_sha256).await? {
        return Ok(());
    }

    // 2. Consult the sidecar for a usable partial; anything else on
    // disk is stale and gets discarded.
    let mut partial = None;
    let mut start_byte: u64 = 0;

    if store.exists(dest) {
        match store.load(dest) {
            Ok(pd) if pd.url == url && pd.state.can_resume() => {
                if let Ok(meta) = fs::metadata(dest).await {
                    start_byte = meta.len();
                    partial = Some(pd);
                }
            }
            _ => {}
        }
    }
    if partial.is_none() {
        let _ = store.delete(dest);
        let _ = fs::remove_file(dest).await;
        start_byte = 0;
    }

    // 3. Open for append when resuming, create otherwise.
    let mut out = if start_byte > 0 {
        fs::OpenOptions::new().append(true).open(dest).await?
    } else {
        fs::File::create(dest).await?
    };

    let mut request = http::client().get(url);
    if start_byte > 0 {
        request = request.header("Range", format!("bytes={start_byte}-"));
    }
    let mut response = request.send().await?;

    // 4. OCI registries answer 401 with a Www-Authenticate challenge.
    if response.status().as_u16() == 401 {
        let challenge = response
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(challenge) = challenge {
            let token = fetch_bearer_token(&challenge).await?;
            let mut retry = http::client()
                .get(url)
                .header("Authorization", format!("Bearer {token}"));
            if start_byte > 0 {
                retry = retry.header("Range", format!("bytes={start_byte}-"));
            }
            response = retry.send().await?;
        }
    }

    let status = response.status().as_u16();

    // 5. A 200 after a Range request means the server ignored the range.
    if status == 200 && start_byte > 0 {
        out = fs::File::create(dest).await?;
        start_byte = 0;
    }

    // 6. A 206 must cover exactly the bytes we asked for.
    if status == 206 {
        let content_range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let expected_prefix = format!("bytes {start_byte}-");
        if !content_range.is_empty() && !content_range.starts_with(&expected_prefix) {
            out = fs::File::create(dest).await?;
            start_byte = 0;
        }
    }

    if status != 200 && status != 206 {
        return Err(FastBrewError::ApiStatus {
            name: url.to_string(),
            status,
        });
    }

    let total_size = start_byte + response.content_length().unwrap_or(0);
    let etag = header_string(&response, "etag");
    let last_modified = header_string(&response, "last-modified");

    // A validator change invalidates the partial we resumed from.
    if let Some(pd) = &partial {
        if start_byte > 0 && resume::remote_changed(pd, &last_modified, &etag) {
            drop(out);
            let _ = store.delete(dest);
            fs::remove_file(dest).await?;
            return Box::pin(download_with_resume(
                url,
                dest,
                expected_sha256,
                store,
                tracker,
                cancel,
            ))
            .await;
        }
    }

    let mut pd = match partial {
        Some(pd) => pd,
        None => store.create(url, dest)?,
    };
    pd.total_size = total_size;
    pd.checksum = expected_sha256.to_string();
    pd.etag = etag;
    pd.last_modified = last_modified;
    pd.update_state(DownloadState::InProgress)?;
    store.save(&pd)?;

    if let Some(tracker) = &tracker {
        tracker.start(total_size);
    }

    // 7. Stream to disk, observing cancellation between chunks.
    let mut downloaded = start_byte;
    let mut last_flush = start_byte;

    loop {
        if cancel.is_cancelled() {
            out.flush().await?;
            pd.downloaded_bytes = downloaded;
            // Park the partial so a re-run can resume it.
            pd.update_state(DownloadState::Pending)?;
            store.save(&pd)?;
            return Err(FastBrewError::Cancelled);
        }

        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                pd.downloaded_bytes = downloaded;
                let _ = pd.update_state(DownloadState::Failed);
                let _ = store.save(&pd);
                return Err(e.into());
            }
        };

        if let Err(e) = out.write_all(&chunk).await {
            pd.downloaded_bytes = downloaded;
            let _ = pd.update_state(DownloadState::Failed);
            let _ = store.save(&pd);
            return Err(e.into());
        }
        downloaded += chunk.len() as u64;

        if downloaded - last_flush >= SIDECAR_FLUSH_INTERVAL {
            pd.downloaded_bytes = downloaded;
            store.save(&pd)?;
            last_flush = downloaded;
        }
        if let Some(tracker) = &tracker {
            tracker.update(downloaded);
        }
    }

    out.flush().await?;
    drop(out);

    // 8. Verify, then retire the sidecar.
    if !checksum_matches(dest, expected_sha256).await? {
        let actual = compute_sha256(dest).await?;
        let _ = pd.update_state(DownloadState::Failed);
        let _ = store.save(&pd);
        fs::remove_file(dest).await?;
        return Err(FastBrewError::ChecksumMismatch {
            path: dest.to_path_buf(),
            expected: expected_sha256.to_string(),
            actual,
        });
    }

    pd.downloaded_bytes = downloaded;
    pd.update_state(DownloadState::Complete)?;
    store.delete(dest)?;

    Ok(())
}

fn header_string(response: &reqwest::Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// Parse a `Www-Authenticate: Bearer realm="...",service="...",scope="..."`
/// challenge and fetch an anonymous bearer token from the realm.
pub async fn fetch_bearer_token(challenge: &str) -> Result<String> {
    let params = parse_challenge(challenge);

    let realm = params
        .iter()
        .find(|(k, _)| k == "realm")
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| {
            FastBrewError::Other(anyhow::anyhow!(
                "no realm in Www-Authenticate challenge: {challenge}"
            ))
        })?;

    let mut query = Vec::new();
    for key in ["service", "scope"] {
        if let Some((_, value)) = params.iter().find(|(k, _)| k == key) {
            query.push((key, value.as_str()));
        }
    }

    let response = http::client().get(realm).query(&query).send().await?;
    let status = response.status().as_u16();
    if status != 200 {
        return Err(FastBrewError::ApiStatus {
            name: realm.to_string(),
            status,
        });
    }

    let token: TokenResponse = response.json().await?;
    Ok(token.token)
}

/// Split a bearer challenge into key/value pairs, trimming quotes.
fn parse_challenge(challenge: &str) -> Vec<(String, String)> {
    let body = challenge
        .trim()
        .strip_prefix("Bearer ")
        .unwrap_or(challenge.trim());

    body.split(',')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            Some((
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            ))
        })
        .collect()
}

async fn checksum_matches(path: &Path, expected: &str) -> Result<bool> {
    Ok(compute_sha256(path).await? == expected)
}

pub async fn compute_sha256(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
