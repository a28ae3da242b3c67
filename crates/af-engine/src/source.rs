//! Job inputs: uploaded files and remote pulls.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use url::Url;

use af_av::RemoteExtractor;
use af_core::{Error, Result};

/// Where a job's media comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A file already written into the staging directory by the upload layer.
    /// The engine owns its deletion.
    LocalFile { path: PathBuf },
    /// A URL handed to the remote extraction provider.
    RemotePull { url: Url },
}

impl InputSource {
    /// Stable identifier used in logs and job summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            InputSource::LocalFile { .. } => "local_file",
            InputSource::RemotePull { .. } => "remote_pull",
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::LocalFile { path } => write!(f, "file {}", path.display()),
            InputSource::RemotePull { url } => {
                write!(f, "url {}", url.host_str().unwrap_or_default())
            }
        }
    }
}

/// Check an uploaded file before a job is built around it.
///
/// The file must exist, be a regular file and live inside `staging_dir`.
/// Returns the canonical path.
pub fn validate_local_file(path: &Path, staging_dir: &Path) -> Result<PathBuf> {
    let meta = std::fs::metadata(path)
        .map_err(|_| Error::invalid("the uploaded file does not exist"))?;
    if !meta.is_file() {
        return Err(Error::invalid("the uploaded input is not a regular file"));
    }

    let canonical = path
        .canonicalize()
        .map_err(|_| Error::invalid("the uploaded file path cannot be resolved"))?;
    let root = staging_dir
        .canonicalize()
        .map_err(|_| Error::invalid("the staging directory is unavailable"))?;

    if !canonical.starts_with(&root) {
        return Err(Error::invalid(
            "the uploaded file is outside the staging directory",
        ));
    }

    Ok(canonical)
}

/// Check a remote URL before any network activity.
///
/// Accepts absolute `http`/`https` URLs with a host. A non-empty
/// `allowed_hosts` list restricts the host to a listed name or one of its
/// subdomains.
pub fn validate_remote_url(raw: &str, allowed_hosts: &[String]) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| Error::invalid(format!("invalid url: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::invalid(format!(
            "unsupported url scheme '{}'",
            url.scheme()
        )));
    }

    let host = match url.host_str() {
        Some(h) if !h.is_empty() => h.to_ascii_lowercase(),
        _ => return Err(Error::invalid("url has no host")),
    };

    if !allowed_hosts.is_empty() && !host_allowed(&host, allowed_hosts) {
        return Err(Error::invalid(format!("host '{host}' is not allowed")));
    }

    Ok(url)
}

fn host_allowed(host: &str, allowed_hosts: &[String]) -> bool {
    allowed_hosts.iter().any(|allowed| {
        let allowed = allowed.trim().trim_start_matches('.').to_ascii_lowercase();
        !allowed.is_empty()
            && (host == allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.')))
    })
}

/// Pull `url` through `extractor` into a new file at `dest`.
///
/// The whole pull, including the provider's exit, must finish within
/// `fetch_timeout`. Returns the number of bytes staged. A partially written
/// `dest` is left for the caller to remove.
pub async fn stage_remote(
    extractor: &dyn RemoteExtractor,
    url: &Url,
    dest: &Path,
    fetch_timeout: Duration,
) -> Result<u64> {
    let pull = async {
        let stream = extractor.resolve(url).await?;
        let mut file = tokio::fs::File::create(dest).await.map_err(staging_error)?;
        let bytes = stream.copy_to(&mut file).await?;
        file.flush().await.map_err(staging_error)?;
        file.sync_all().await.map_err(staging_error)?;
        Ok::<_, Error>(bytes)
    };

    match tokio::time::timeout(fetch_timeout, pull).await {
        Ok(result) => result,
        Err(_) => Err(Error::source_fetch(format!(
            "provider did not finish within {fetch_timeout:?}"
        ))),
    }
}

/// The input was never acquired, so local disk failures count as fetch failures.
fn staging_error(e: std::io::Error) -> Error {
    Error::source_fetch(format!("cannot stage remote input: {e}"))
}
