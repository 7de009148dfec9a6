//! HTTP archive sources (`https://…/*.{zip,tar.gz,tgz}`).

use std::path::{Path, PathBuf};

use {
    futures::StreamExt,
    reqwest::header::{CONTENT_TYPE, USER_AGENT},
    sha2::{Digest, Sha256},
    tokio::io::AsyncWriteExt,
    tracing::{info, warn},
};

use crate::{
    archive::{self, ArchiveFormat},
    error::{Error, Result},
    types::{ArchiveLimits, make_scratch_dir},
};

pub(crate) const USER_AGENT_VALUE: &str = concat!("skillet/", env!("CARGO_PKG_VERSION"));

/// A downloaded and extracted archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResolution {
    pub format: ArchiveFormat,
    pub archive_path: PathBuf,
    pub extract_path: PathBuf,
    pub content_path: PathBuf,
    /// URL after redirects.
    pub final_url: String,
    /// `sha256:<hex>` of the archive bytes.
    pub digest: String,
    pub scratch_dir: PathBuf,
}

/// Download `url` into a fresh scratch directory and unpack it.
pub async fn resolve(
    client: &reqwest::Client,
    url: &str,
    temp_root: &Path,
    limits: ArchiveLimits,
) -> Result<HttpResolution> {
    let scratch_dir = make_scratch_dir(temp_root, "http")?;
    let partial = scratch_dir.join("download.partial");

    let download = download(client, url, &partial, limits.max_download_bytes).await?;

    let head = archive::read_head(&partial, 8)?;
    let format = archive::detect_format(url, download.content_type.as_deref(), &head)
        .or_else(|_| archive::detect_format(&download.final_url, None, &head))?;

    let archive_path = scratch_dir.join(format!("archive.{}", format.extension()));
    tokio::fs::rename(&partial, &archive_path).await?;

    let extract_path = scratch_dir.join("extract");
    archive::extract(&archive_path, format, &extract_path, limits).await?;
    let content_path = archive::content_root(&extract_path)?;

    info!(
        url = %download.final_url,
        format = format.extension(),
        bytes = download.bytes,
        "http archive resolved"
    );
    Ok(HttpResolution {
        format,
        archive_path,
        extract_path,
        content_path,
        final_url: download.final_url,
        digest: download.digest,
        scratch_dir,
    })
}

struct Download {
    final_url: String,
    content_type: Option<String>,
    bytes: u64,
    digest: String,
}

/// Stream the response body into `dest`, failing as soon as more than
/// `max_bytes` have arrived. The partial file is removed on failure.
async fn download(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    max_bytes: u64,
) -> Result<Download> {
    info!(%url, "downloading archive");
    let response = client
        .get(url)
        .header(USER_AGENT, USER_AGENT_VALUE)
        .send()
        .await
        .map_err(|e| Error::archive(format!("failed to fetch {url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::archive(format!("failed to fetch {url}: HTTP {status}")));
    }
    if let Some(declared) = response.content_length()
        && declared > max_bytes
    {
        return Err(Error::archive(format!(
            "archive at {url} is {declared} bytes, more than the limit of {max_bytes}"
        )));
    }

    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let result = stream_to_file(response, dest, url, max_bytes).await;
    let (bytes, digest) = match result {
        Ok(done) => done,
        Err(e) => {
            if let Err(remove) = tokio::fs::remove_file(dest).await {
                warn!(path = %dest.display(), error = %remove, "failed to remove partial download");
            }
            return Err(e);
        },
    };

    Ok(Download {
        final_url,
        content_type,
        bytes,
        digest,
    })
}

async fn stream_to_file(
    response: reqwest::Response,
    dest: &Path,
    url: &str,
    max_bytes: u64,
) -> Result<(u64, String)> {
    let mut file = tokio::fs::File::create(dest).await?;
    let mut hasher = Sha256::new();
    let mut received: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| Error::archive(format!("download of {url} interrupted: {e}")))?;
        received += chunk.len() as u64;
        if received > max_bytes {
            return Err(Error::archive(format!(
                "download of {url} exceeded the limit of {max_bytes} bytes"
            )));
        }
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    Ok((received, format!("sha256:{:x}", hasher.finalize())))
}
