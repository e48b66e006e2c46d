//! Persisted username → password-hash mapping.
//!
//! The file holds one `username:<argon2 PHC string>` entry per line. Blank
//! lines and `#` comments are skipped on load; saving rewrites the whole file.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
// rand_core 0.6 is what password-hash/argon2 depends on; must match that version.
use rand_core::OsRng;
use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

const DECOY_PASSWORD: &str = "decoy password for unknown users";

#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error("credential file {0} does not exist")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed entry on line {line}")]
    Malformed { line: usize },
    #[error("username must be non-empty and may not contain ':' or control characters")]
    InvalidUsername,
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("password hashing failed: {0}")]
    Hash(String),
}

pub struct CredentialStore {
    users: BTreeMap<String, String>,
    hasher: Argon2<'static>,
    /// Hash checked for unknown usernames so both failure paths cost the same.
    decoy: String,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::with_hasher(Argon2::default())
    }
}

impl CredentialStore {
    fn with_hasher(hasher: Argon2<'static>) -> Self {
        let decoy = hash_with(&hasher, DECOY_PASSWORD).unwrap_or_else(|e| {
            tracing::warn!("cannot build decoy hash: {}", e);
            String::new()
        });
        Self {
            users: BTreeMap::new(),
            hasher,
            decoy,
        }
    }

    /// Load the mapping from `path`. A missing file is reported as
    /// [`CredentialError::NotFound`] so callers can treat it as a first run.
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(r) => r,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CredentialError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(CredentialError::Io(e)),
        };

        let mut users = BTreeMap::new();
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, hash) = line
                .split_once(':')
                .ok_or(CredentialError::Malformed { line: idx + 1 })?;
            if !valid_username(name) || PasswordHash::new(hash).is_err() {
                return Err(CredentialError::Malformed { line: idx + 1 });
            }
            users.insert(name.to_string(), hash.to_string());
        }

        Ok(Self {
            users,
            ..Self::default()
        })
    }

    /// Like [`load`](Self::load), but an absent file yields an empty store.
    pub fn load_or_default(path: &Path) -> Result<Self, CredentialError> {
        match Self::load(path) {
            Err(CredentialError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Overwrite `path` with the full mapping. Not crash-atomic.
    pub fn save(&self, path: &Path) -> Result<(), CredentialError> {
        let mut out = String::new();
        for (name, hash) in &self.users {
            out.push_str(name);
            out.push(':');
            out.push_str(hash);
            out.push('\n');
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, out)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Hash `password` and insert it under `username`, replacing any
    /// existing entry. Returns whether an entry was replaced.
    pub fn add_user(&mut self, username: &str, password: &str) -> Result<bool, CredentialError> {
        if !valid_username(username) {
            return Err(CredentialError::InvalidUsername);
        }
        if password.is_empty() {
            return Err(CredentialError::EmptyPassword);
        }
        let hash = hash_with(&self.hasher, password)?;
        Ok(self.users.insert(username.to_string(), hash).is_some())
    }

    /// Verify a username/password pair. Returns `false` for an unknown user
    /// or a wrong password alike.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let stored = match self.users.get(username) {
            Some(h) => h.as_str(),
            None => self.decoy.as_str(),
        };
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        let verified = self
            .hasher
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();
        verified && self.users.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    #[cfg(test)]
    pub fn with_params(self, params: argon2::Params) -> Self {
        let hasher = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
        Self {
            users: self.users,
            ..Self::with_hasher(hasher)
        }
    }
}

/// Hash a password with argon2id and return the PHC string.
fn hash_with(hasher: &Argon2<'_>, password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CredentialError::Hash(e.to_string()))?
        .to_string();
    Ok(hash)
}

fn valid_username(name: &str) -> bool {
    !name.is_empty() && !name.contains(':') && !name.chars().any(char::is_control)
}

#[cfg(test)]
pub fn fast_params() -> argon2::Params {
    argon2::Params::new(8, 1, 1, None).unwrap()
}
