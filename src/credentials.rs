use std::path::Path;

use crate::error::{Error, Result};

/// Loads a credential file named by the backend in its handshake message.
///
/// The backend is the one supplying these paths, which makes them an attack
/// surface: a compromised backend could point the frontend at a symlink to a
/// privileged file. Symbolic links are therefore refused unconditionally,
/// before any read happens. This is policy, not a best-effort check, and
/// there is no fallback path.
///
/// A missing or empty path resolves to empty content rather than an error;
/// the handshake legitimately omits the passphrase file in some
/// configurations.
pub async fn load(path: Option<&Path>) -> Result<String> {
    let Some(path) = path else {
        return Ok(String::new());
    };
    if path.as_os_str().is_empty() {
        return Ok(String::new());
    }

    // symlink_metadata stats the link itself and never follows it
    let metadata = tokio::fs::symlink_metadata(path)
        .await
        .map_err(|source| Error::CredentialIo {
            path: path.to_owned(),
            source,
        })?;

    if metadata.file_type().is_symlink() {
        tracing::warn!(?path, "refusing to load credential file through a symbolic link");
        return Err(Error::SymlinkRejected {
            path: path.to_owned(),
        });
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::CredentialIo {
            path: path.to_owned(),
            source,
        })?;

    tracing::debug!(?path, bytes = content.len(), "loaded credential file");
    Ok(content)
}
