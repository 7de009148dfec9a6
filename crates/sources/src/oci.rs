//! OCI registry artifacts (`oci://registry/repository[:tag|@sha256:digest]`).
//!
//! Only artifacts whose type is [`SKILL_ARTIFACT_TYPE`] are unpacked, and an
//! artifact must hold exactly one skill.

use std::{
    fmt,
    io::Read,
    path::{Path, PathBuf},
};

use {
    futures::StreamExt,
    reqwest::{
        StatusCode,
        header::{ACCEPT, AUTHORIZATION, USER_AGENT, WWW_AUTHENTICATE},
    },
    serde::Deserialize,
    sha2::{Digest, Sha256},
    tracing::{debug, info},
};

use crate::{
    archive::{self, ArchiveFormat},
    error::{Error, Result},
    http::USER_AGENT_VALUE,
    types::{ArchiveLimits, make_scratch_dir},
};

/// Artifact type a skill artifact must declare.
pub const SKILL_ARTIFACT_TYPE: &str = "application/vnd.skillet.skill.v1+tar";

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
                               application/vnd.oci.artifact.manifest.v1+json";

const DIGEST_HEADER: &str = "docker-content-digest";

/// Registries refuse manifests above 4 MiB; so do we.
const MAX_MANIFEST_BYTES: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Tag,
    Digest,
}

/// A parsed `oci://` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciReference {
    pub registry: String,
    pub repository: String,
    pub kind: ReferenceKind,
    /// Tag name or `sha256:<hex>` digest.
    pub reference: String,
}

impl OciReference {
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = |message: &str| Error::invalid_source(source, message);

        let rest = source
            .strip_prefix("oci://")
            .ok_or_else(|| invalid("OCI references start with oci://"))?;
        let (registry, path) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing '/' between registry and repository"))?;
        if registry.is_empty() {
            return Err(invalid("missing registry"));
        }

        let (repository, kind, reference) = if let Some((repo, digest)) = path.split_once('@') {
            let hex = digest
                .strip_prefix("sha256:")
                .ok_or_else(|| invalid("digest must be sha256:<hex>"))?;
            if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid("digest must be sha256 followed by 64 hex characters"));
            }
            (repo, ReferenceKind::Digest, digest.to_ascii_lowercase())
        } else {
            let last_slash = path.rfind('/').map_or(0, |i| i + 1);
            match path[last_slash..].rfind(':') {
                Some(colon) => {
                    let split = last_slash + colon;
                    let tag = &path[split + 1..];
                    if tag.is_empty() {
                        return Err(invalid("empty tag"));
                    }
                    (&path[..split], ReferenceKind::Tag, tag.to_string())
                },
                None => (path, ReferenceKind::Tag, "latest".to_string()),
            }
        };

        let repository = repository.trim_matches('/');
        if repository.is_empty() {
            return Err(invalid("missing repository"));
        }

        Ok(Self {
            registry: registry.to_ascii_lowercase(),
            repository: repository.to_string(),
            kind,
            reference,
        })
    }

    /// Registry host without the port.
    fn host(&self) -> &str {
        if let Some(rest) = self.registry.strip_prefix('[') {
            return rest.split(']').next().unwrap_or(rest);
        }
        self.registry.split(':').next().unwrap_or(&self.registry)
    }

    pub fn is_loopback(&self) -> bool {
        let host = self.host();
        host == "localhost" || host == "::1" || host.starts_with("127.")
    }

    /// `http` for loopback registries or when forced, else `https`.
    pub fn scheme(&self, insecure: bool) -> &'static str {
        if insecure || self.is_loopback() {
            "http"
        } else {
            "https"
        }
    }
}

impl fmt::Display for OciReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = match self.kind {
            ReferenceKind::Tag => ':',
            ReferenceKind::Digest => '@',
        };
        write!(f, "oci://{}/{}{sep}{}", self.registry, self.repository, self.reference)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    artifact_type: Option<String>,
    config: Option<Descriptor>,
    #[serde(default)]
    layers: Vec<Descriptor>,
}

impl Manifest {
    fn artifact_type(&self) -> Option<&str> {
        self.artifact_type
            .as_deref()
            .or_else(|| self.config.as_ref().map(|c| c.media_type.as_str()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    media_type: String,
    digest: String,
    size: Option<u64>,
}

/// `WWW-Authenticate: Bearer realm=...,service=...,scope=...`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

fn parse_bearer_challenge(header: &str) -> Option<BearerChallenge> {
    let params = header.trim().strip_prefix("Bearer ")?;
    let mut realm = None;
    let mut service = None;
    let mut scope = None;
    for part in split_params(params) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match key.trim() {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            "scope" => scope = Some(value),
            _ => {},
        }
    }
    Some(BearerChallenge {
        realm: realm?,
        service,
        scope,
    })
}

/// Split on commas that are not inside quotes.
fn split_params(params: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in params.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                out.push(&params[start..i]);
                start = i + 1;
            },
            _ => {},
        }
    }
    out.push(&params[start..]);
    out
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// One registry conversation; remembers a bearer token once obtained.
struct RegistrySession<'a> {
    http: &'a reqwest::Client,
    base: String,
    token: Option<String>,
}

impl<'a> RegistrySession<'a> {
    fn new(http: &'a reqwest::Client, reference: &OciReference, insecure: bool) -> Self {
        Self {
            http,
            base: format!("{}://{}", reference.scheme(insecure), reference.registry),
            token: None,
        }
    }

    async fn get(&mut self, path: &str, accept: Option<&str>) -> Result<reqwest::Response> {
        let url = format!("{}{path}", self.base);
        let response = self.send(&url, accept).await?;
        if response.status() != StatusCode::UNAUTHORIZED || self.token.is_some() {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_bearer_challenge)
            .ok_or_else(|| Error::oci(format!("{url} requires authentication")))?;
        self.token = Some(self.fetch_token(&challenge).await?);
        self.send(&url, accept).await
    }

    async fn send(&self, url: &str, accept: Option<&str>) -> Result<reqwest::Response> {
        let mut request = self.http.get(url).header(USER_AGENT, USER_AGENT_VALUE);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        if let Some(ref token) = self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        request
            .send()
            .await
            .map_err(|e| Error::oci(format!("request to {url} failed: {e}")))
    }

    async fn fetch_token(&self, challenge: &BearerChallenge) -> Result<String> {
        let params = challenge
            .service
            .iter()
            .map(|s| ("service", s.as_str()))
            .chain(challenge.scope.iter().map(|s| ("scope", s.as_str())));
        let url = url::Url::parse_with_params(&challenge.realm, params)
            .map_err(|e| Error::oci(format!("invalid token realm {}: {e}", challenge.realm)))?;

        debug!(realm = %challenge.realm, "requesting anonymous registry token");
        let response = self
            .http
            .get(url)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .send()
            .await
            .map_err(|e| Error::oci(format!("token request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::oci(format!("token request failed: HTTP {status}")));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::oci(format!("invalid token response: {e}")))?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| Error::oci("token response carried no token"))
    }

    /// Raw manifest bytes plus the registry-reported digest, if any.
    async fn manifest(&mut self, reference: &OciReference) -> Result<(Vec<u8>, Option<String>)> {
        let path = format!(
            "/v2/{}/manifests/{}",
            reference.repository, reference.reference
        );
        let response = self.get(&path, Some(MANIFEST_ACCEPT)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::oci(format!(
                "manifest {reference} not available: HTTP {status}"
            )));
        }
        let header_digest = response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let what = format!("manifest {reference}");
        let body = read_capped(response, MAX_MANIFEST_BYTES, &what).await?;
        Ok((body, header_digest))
    }

    async fn blob(
        &mut self,
        reference: &OciReference,
        layer: &Descriptor,
        max_bytes: u64,
    ) -> Result<Vec<u8>> {
        if let Some(size) = layer.size
            && size > max_bytes
        {
            return Err(Error::oci(format!(
                "layer {} is {size} bytes, more than the limit of {max_bytes}",
                layer.digest
            )));
        }
        let path = format!("/v2/{}/blobs/{}", reference.repository, layer.digest);
        let response = self.get(&path, None).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::oci(format!(
                "blob {} not available: HTTP {status}",
                layer.digest
            )));
        }
        let bytes = read_capped(response, max_bytes, &format!("layer {}", layer.digest)).await?;

        let actual = sha256_digest(&bytes);
        if !actual.eq_ignore_ascii_case(&layer.digest) {
            return Err(Error::oci(format!(
                "layer digest mismatch: expected {}, got {actual}",
                layer.digest
            )));
        }
        Ok(bytes)
    }
}

/// Buffer a response body, failing as soon as more than `max_bytes` have
/// arrived.
async fn read_capped(response: reqwest::Response, max_bytes: u64, what: &str) -> Result<Vec<u8>> {
    if let Some(declared) = response.content_length()
        && declared > max_bytes
    {
        return Err(Error::oci(format!(
            "{what} is {declared} bytes, more than the limit of {max_bytes}"
        )));
    }
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::oci(format!("failed to read {what}: {e}")))?;
        if (body.len() + chunk.len()) as u64 > max_bytes {
            return Err(Error::oci(format!("{what} exceeds the limit of {max_bytes} bytes")));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}

fn resolved_digest(
    reference: &OciReference,
    header_digest: Option<String>,
    manifest: &[u8],
) -> String {
    match reference.kind {
        ReferenceKind::Digest => reference.reference.clone(),
        ReferenceKind::Tag => header_digest.unwrap_or_else(|| sha256_digest(manifest)),
    }
}

/// An unpacked single-skill artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciResolution {
    pub parsed: OciReference,
    pub resolved_digest: String,
    pub extract_path: PathBuf,
    /// The one directory in the artifact that holds a `SKILL.md`.
    pub content_path: PathBuf,
    pub scratch_dir: PathBuf,
}

/// Pull and unpack the artifact named by `source`.
pub async fn resolve(
    client: &reqwest::Client,
    source: &str,
    temp_root: &Path,
    insecure: bool,
    limits: ArchiveLimits,
) -> Result<OciResolution> {
    let parsed = OciReference::parse(source)?;
    let mut session = RegistrySession::new(client, &parsed, insecure);

    info!(reference = %parsed, "fetching OCI manifest");
    let (manifest_bytes, header_digest) = session.manifest(&parsed).await?;
    let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| Error::oci(format!("invalid manifest for {parsed}: {e}")))?;

    match manifest.artifact_type() {
        Some(SKILL_ARTIFACT_TYPE) => {},
        other => {
            return Err(Error::oci(format!(
                "{parsed} has artifact type '{}', expected '{SKILL_ARTIFACT_TYPE}'",
                other.unwrap_or("none")
            )));
        },
    }
    let layer = manifest
        .layers
        .first()
        .ok_or_else(|| Error::oci(format!("{parsed} has no layers")))?;

    let blob = session
        .blob(&parsed, layer, limits.max_download_bytes)
        .await?;
    let format = layer_format(&blob)?;

    let scratch_dir = make_scratch_dir(temp_root, "oci")?;
    let layer_path = scratch_dir.join(format!("layer.{}", format.extension()));
    tokio::fs::write(&layer_path, &blob).await?;

    let extract_path = scratch_dir.join("extract");
    archive::extract(&layer_path, format, &extract_path, limits).await?;

    let content_path = single_skill_dir(&extract_path)?;
    let resolved_digest = resolved_digest(&parsed, header_digest, &manifest_bytes);
    info!(reference = %parsed, digest = %resolved_digest, "OCI artifact resolved");

    Ok(OciResolution {
        parsed,
        resolved_digest,
        extract_path,
        content_path,
        scratch_dir,
    })
}

/// Current manifest digest for `source`, without pulling any blobs.
pub async fn fetch_manifest_digest(
    client: &reqwest::Client,
    source: &str,
    insecure: bool,
) -> Result<String> {
    let parsed = OciReference::parse(source)?;
    if parsed.kind == ReferenceKind::Digest {
        return Ok(parsed.reference);
    }
    let mut session = RegistrySession::new(client, &parsed, insecure);
    let (manifest, header_digest) = session.manifest(&parsed).await?;
    Ok(resolved_digest(&parsed, header_digest, &manifest))
}

/// Plain or gzip-compressed tar; anything else is rejected.
fn layer_format(blob: &[u8]) -> Result<ArchiveFormat> {
    let (format, head) = if blob.starts_with(&[0x1f, 0x8b]) {
        let mut head = Vec::with_capacity(512);
        flate2::read::GzDecoder::new(blob)
            .take(512)
            .read_to_end(&mut head)
            .map_err(|e| Error::oci(format!("layer is not valid gzip: {e}")))?;
        (ArchiveFormat::TarGz, head)
    } else {
        (ArchiveFormat::Tar, blob.iter().take(512).copied().collect())
    };

    if head.len() < 262 || &head[257..262] != b"ustar" {
        return Err(Error::oci("layer is not a tar stream"));
    }
    Ok(format)
}

fn single_skill_dir(root: &Path) -> Result<PathBuf> {
    let mut found: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file() && e.file_name() == "SKILL.md")
        .filter_map(|e| e.path().parent().map(Path::to_path_buf))
        .collect();
    found.sort();
    found.dedup();

    match found.len() {
        1 => Ok(found.remove(0)),
        n => Err(Error::oci(format!(
            "artifact must contain exactly one skill, found {n}"
        ))),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::archive::tests::{tar_bytes, tar_gz},
    };

    #[test]
    fn parses_tag_digest_and_default_tag() {
        let tagged = OciReference::parse("oci://ghcr.io/acme/skills/alpha:v1").unwrap();
        assert_eq!(tagged.registry, "ghcr.io");
        assert_eq!(tagged.repository, "acme/skills/alpha");
        assert_eq!(tagged.kind, ReferenceKind::Tag);
        assert_eq!(tagged.reference, "v1");
        assert_eq!(tagged.to_string(), "oci://ghcr.io/acme/skills/alpha:v1");

        let digest = format!("sha256:{}", "ab".repeat(32));
        let pinned = OciReference::parse(&format!("oci://localhost:5000/alpha@{digest}")).unwrap();
        assert_eq!(pinned.registry, "localhost:5000");
        assert_eq!(pinned.kind, ReferenceKind::Digest);
        assert_eq!(pinned.reference, digest);

        let latest = OciReference::parse("oci://localhost:5000/alpha").unwrap();
        assert_eq!(latest.reference, "latest");
        assert_eq!(latest.repository, "alpha");
    }

    #[test]
    fn malformed_references_fail() {
        for raw in [
            "ghcr.io/acme/alpha",
            "oci://ghcr.io",
            "oci:///alpha",
            "oci://ghcr.io/",
            "oci://ghcr.io/alpha:",
            "oci://ghcr.io/alpha@md5:abc",
        ] {
            assert!(OciReference::parse(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn loopback_registries_use_http() {
        for raw in [
            "oci://localhost:5000/a",
            "oci://127.0.0.1:5000/a",
            "oci://[::1]:5000/a",
        ] {
            assert_eq!(OciReference::parse(raw).unwrap().scheme(false), "http", "{raw}");
        }
        let remote = OciReference::parse("oci://ghcr.io/a").unwrap();
        assert_eq!(remote.scheme(false), "https");
        assert_eq!(remote.scheme(true), "http");
    }

    #[test]
    fn bearer_challenge_parsing() {
        let challenge = parse_bearer_challenge(
            concat!(
                r#"Bearer realm="https://auth.io/token",service="registry.io","#,
                r#"scope="repository:a/b:pull,push""#
            ),
        )
        .unwrap();
        assert_eq!(challenge.realm, "https://auth.io/token");
        assert_eq!(challenge.service.as_deref(), Some("registry.io"));
        assert_eq!(challenge.scope.as_deref(), Some("repository:a/b:pull,push"));
        assert!(parse_bearer_challenge("Basic realm=\"x\"").is_none());
    }

    struct Artifact {
        manifest: String,
        blob: Vec<u8>,
        blob_digest: String,
    }

    fn artifact(artifact_type: &str, blob: Vec<u8>) -> Artifact {
        let blob_digest = sha256_digest(&blob);
        let manifest = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "artifactType": artifact_type,
            "config": {
                "mediaType": "application/vnd.oci.empty.v1+json",
                "digest": sha256_digest(b"{}"),
                "size": 2
            },
            "layers": [{
                "mediaType": "application/vnd.oci.image.layer.v1.tar",
                "digest": blob_digest,
                "size": blob.len()
            }]
        })
        .to_string();
        Artifact {
            manifest,
            blob,
            blob_digest,
        }
    }

    async fn serve(server: &mut mockito::ServerGuard, repo: &str, tag: &str, artifact: &Artifact) {
        server
            .mock("GET", format!("/v2/{repo}/manifests/{tag}").as_str())
            .with_status(200)
            .with_header("content-type", "application/vnd.oci.image.manifest.v1+json")
            .with_body(artifact.manifest.clone())
            .create_async()
            .await;
        server
            .mock("GET", format!("/v2/{repo}/blobs/{}", artifact.blob_digest).as_str())
            .with_status(200)
            .with_body(artifact.blob.clone())
            .create_async()
            .await;
    }

    fn source(server: &mockito::ServerGuard, repo_and_ref: &str) -> String {
        let host = server.host_with_port();
        format!("oci://{host}/{repo_and_ref}")
    }

    #[tokio::test]
    async fn resolves_single_skill_artifact_with_fallback_digest() {
        let mut server = mockito::Server::new_async().await;
        let art = artifact(
            SKILL_ARTIFACT_TYPE,
            tar_bytes(&[
                ("alpha/SKILL.md", b"---\nname: alpha\ndescription: a\n---\n"),
                ("alpha/notes.txt", b"notes"),
            ]),
        );
        serve(&mut server, "acme/alpha", "v1", &art).await;

        let tmp = tempfile::tempdir().unwrap();
        let resolved = resolve(
            &reqwest::Client::new(),
            &source(&server, "acme/alpha:v1"),
            tmp.path(),
            false,
            ArchiveLimits::default(),
        )
        .await
        .unwrap();

        assert!(resolved.content_path.ends_with("alpha"));
        assert!(resolved.content_path.join("notes.txt").is_file());
        assert_eq!(
            resolved.resolved_digest,
            sha256_digest(art.manifest.as_bytes())
        );
    }

    #[tokio::test]
    async fn registry_digest_header_wins_and_gzip_layers_unpack() {
        let mut server = mockito::Server::new_async().await;
        let art = artifact(
            SKILL_ARTIFACT_TYPE,
            tar_gz(&[("beta/SKILL.md", b"---\nname: beta\ndescription: b\n---\n")]),
        );
        let header_digest = format!("sha256:{}", "cd".repeat(32));
        server
            .mock("GET", "/v2/beta/manifests/latest")
            .with_status(200)
            .with_header("docker-content-digest", &header_digest)
            .with_body(art.manifest.clone())
            .create_async()
            .await;
        server
            .mock("GET", format!("/v2/beta/blobs/{}", art.blob_digest).as_str())
            .with_status(200)
            .with_body(art.blob.clone())
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let client = reqwest::Client::new();
        let resolved = resolve(
            &client,
            &source(&server, "beta"),
            tmp.path(),
            false,
            ArchiveLimits::default(),
        )
        .await
        .unwrap();
        assert_eq!(resolved.resolved_digest, header_digest);
        assert!(resolved.content_path.join("SKILL.md").is_file());

        let current = fetch_manifest_digest(&client, &source(&server, "beta"), false)
            .await
            .unwrap();
        assert_eq!(current, header_digest);
    }

    #[tokio::test]
    async fn foreign_artifact_type_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let art = artifact(
            "application/vnd.example.other+tar",
            tar_bytes(&[("alpha/SKILL.md", b"x")]),
        );
        serve(&mut server, "alpha", "v1", &art).await;

        let tmp = tempfile::tempdir().unwrap();
        let err = resolve(
            &reqwest::Client::new(),
            &source(&server, "alpha:v1"),
            tmp.path(),
            false,
            ArchiveLimits::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("artifact type"), "{err}");
    }

    #[tokio::test]
    async fn multi_skill_artifact_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let art = artifact(
            SKILL_ARTIFACT_TYPE,
            tar_bytes(&[("alpha/SKILL.md", b"a"), ("beta/SKILL.md", b"b")]),
        );
        serve(&mut server, "pair", "v1", &art).await;

        let tmp = tempfile::tempdir().unwrap();
        let err = resolve(
            &reqwest::Client::new(),
            &source(&server, "pair:v1"),
            tmp.path(),
            false,
            ArchiveLimits::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("found 2"), "{err}");
    }

    #[tokio::test]
    async fn traversal_in_layer_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let art = artifact(
            SKILL_ARTIFACT_TYPE,
            tar_bytes(&[("alpha/SKILL.md", b"a"), ("../escape.txt", b"pwned")]),
        );
        serve(&mut server, "evil", "v1", &art).await;

        let tmp = tempfile::tempdir().unwrap();
        let temp_root = tmp.path().join("scratch");
        let err = resolve(
            &reqwest::Client::new(),
            &source(&server, "evil:v1"),
            &temp_root,
            false,
            ArchiveLimits::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Archive { .. }), "{err}");
    }

    #[tokio::test]
    async fn tampered_blob_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let mut art = artifact(SKILL_ARTIFACT_TYPE, tar_bytes(&[("alpha/SKILL.md", b"a")]));
        art.blob = tar_bytes(&[("alpha/SKILL.md", b"tampered")]);
        serve(&mut server, "alpha", "v1", &art).await;

        let tmp = tempfile::tempdir().unwrap();
        let err = resolve(
            &reqwest::Client::new(),
            &source(&server, "alpha:v1"),
            tmp.path(),
            false,
            ArchiveLimits::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("digest mismatch"), "{err}");
    }

    #[tokio::test]
    async fn streamed_blob_over_the_limit_aborts() {
        use std::io::Write;

        let mut server = mockito::Server::new_async().await;
        let art = artifact(SKILL_ARTIFACT_TYPE, tar_bytes(&[("alpha/SKILL.md", b"a")]));
        server
            .mock("GET", "/v2/alpha/manifests/v1")
            .with_status(200)
            .with_body(art.manifest.clone())
            .create_async()
            .await;
        // The descriptor size fits; the body the registry streams does not.
        server
            .mock("GET", format!("/v2/alpha/blobs/{}", art.blob_digest).as_str())
            .with_status(200)
            .with_chunked_body(|w| w.write_all(&[0u8; 64 * 1024]))
            .create_async()
            .await;

        let limits = ArchiveLimits {
            max_download_bytes: art.blob.len() as u64 + 16,
            ..ArchiveLimits::default()
        };
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve(
            &reqwest::Client::new(),
            &source(&server, "alpha:v1"),
            tmp.path(),
            false,
            limits,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("exceeds the limit"), "{err}");
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn anonymous_bearer_challenge_is_answered() {
        let mut server = mockito::Server::new_async().await;
        let art = artifact(SKILL_ARTIFACT_TYPE, tar_bytes(&[("alpha/SKILL.md", b"a")]));
        let realm = format!("{}/token", server.url());

        server
            .mock("GET", "/v2/private/manifests/v1")
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(401)
            .with_header(
                "www-authenticate",
                &format!(
                    r#"Bearer realm="{realm}",service="registry",scope="repository:private:pull""#
                ),
            )
            .create_async()
            .await;
        let token = server
            .mock("GET", "/token")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("service".into(), "registry".into()),
                mockito::Matcher::UrlEncoded("scope".into(), "repository:private:pull".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"token":"anon-token"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/v2/private/manifests/v1")
            .match_header("authorization", "Bearer anon-token")
            .with_status(200)
            .with_body(art.manifest.clone())
            .create_async()
            .await;
        server
            .mock("GET", format!("/v2/private/blobs/{}", art.blob_digest).as_str())
            .match_header("authorization", "Bearer anon-token")
            .with_status(200)
            .with_body(art.blob.clone())
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        resolve(
            &reqwest::Client::new(),
            &source(&server, "private:v1"),
            tmp.path(),
            false,
            ArchiveLimits::default(),
        )
        .await
        .unwrap();
        token.assert_async().await;
    }

    #[tokio::test]
    async fn digest_pinned_reference_needs_no_network() {
        let digest = format!("sha256:{}", "ef".repeat(32));
        let current = fetch_manifest_digest(
            &reqwest::Client::new(),
            &format!("oci://registry.invalid/alpha@{digest}"),
            false,
        )
        .await
        .unwrap();
        assert_eq!(current, digest);
    }
}
