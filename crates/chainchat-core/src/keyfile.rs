//! On-disk identity files: `<dir>/<username>.key`.
//!
//! ```text
//! PublicKey: <hex SPKI>
//! PrivateKey: <hex SEC1>
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroizing;

use chainchat_crypto::{KeyError, KeyPair};

const PUBLIC_PREFIX: &str = "PublicKey:";
const PRIVATE_PREFIX: &str = "PrivateKey:";

#[derive(Debug, Error)]
pub enum KeyFileError {
    #[error("key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("key file is missing its {0} line")]
    Incomplete(&'static str),

    #[error("invalid username {0:?}")]
    InvalidUsername(String),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Path of the key file for `username` under `dir`.
pub fn key_file_path(dir: &Path, username: &str) -> Result<PathBuf, KeyFileError> {
    validate_username(username)?;
    Ok(dir.join(format!("{username}.key")))
}

/// Usernames become file names, so only a conservative character set is allowed.
fn validate_username(username: &str) -> Result<(), KeyFileError> {
    let ok = !username.is_empty()
        && !username.starts_with('.')
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(KeyFileError::InvalidUsername(username.to_string()))
    }
}

/// Parse the two-line format. Unknown lines are ignored; the last occurrence wins.
pub fn parse_key_file(contents: &str) -> Result<KeyPair, KeyFileError> {
    let mut public = None;
    let mut private = None;

    for line in contents.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(PUBLIC_PREFIX) {
            public = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix(PRIVATE_PREFIX) {
            private = Some(rest.trim());
        }
    }

    let public = public
        .filter(|s| !s.is_empty())
        .ok_or(KeyFileError::Incomplete("PublicKey"))?;
    let private = private
        .filter(|s| !s.is_empty())
        .ok_or(KeyFileError::Incomplete("PrivateKey"))?;

    Ok(KeyPair::from_encoded(public, private)?)
}

pub fn render_key_file(keys: &KeyPair) -> Result<Zeroizing<String>, KeyFileError> {
    let private = keys.private_text()?;
    Ok(Zeroizing::new(format!(
        "{PUBLIC_PREFIX} {}\n{PRIVATE_PREFIX} {}\n",
        keys.public_text(),
        private.as_str()
    )))
}

/// Load `<dir>/<username>.key`.
pub async fn load_keys(dir: &Path, username: &str) -> Result<KeyPair, KeyFileError> {
    let path = key_file_path(dir, username)?;
    debug!(path = %path.display(), "loading key file");
    let contents = Zeroizing::new(
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| KeyFileError::Io {
                path: path.clone(),
                source,
            })?,
    );
    parse_key_file(&contents)
}

/// Write `<dir>/<username>.key`, creating `dir` if needed. Owner-only on unix.
pub async fn save_keys(dir: &Path, username: &str, keys: &KeyPair) -> Result<PathBuf, KeyFileError> {
    let path = key_file_path(dir, username)?;
    let io_err = |source| KeyFileError::Io {
        path: path.clone(),
        source,
    };

    tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
    let contents = render_key_file(keys)?;
    tokio::fs::write(&path, contents.as_bytes())
        .await
        .map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(io_err)?;
    }

    info!(path = %path.display(), "saved key file");
    Ok(path)
}
