//! User accounts and their persistence.
//!
//! # Design Decisions
//! - Passwords are stored as Argon2id PHC strings (salt and parameters inline)
//! - Hashing happens before the username slot is locked
//! - The data file is replaced atomically: write a sibling temp file, then rename

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::store::{StoreError, UserStore};

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Standard,
}

/// A console user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub role: Role,
    /// Argon2id hash in PHC string format.
    pub password_hash: String,
}

impl User {
    /// Check a candidate password against the stored hash.
    pub fn verify_password(&self, password: &str) -> bool {
        match PasswordHash::new(&self.password_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(user_id = self.id, error = %e, "Stored password hash is malformed");
                false
            }
        }
    }

    pub fn is_administrator(&self) -> bool {
        self.role == Role::Administrator
    }
}

fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Hashing(e.to_string()))
}

/// A thread-safe, cloneable handle to the user accounts.
#[derive(Clone)]
pub struct UserRepository {
    /// Accounts keyed by lowercased username.
    inner: Arc<DashMap<String, User>>,
    next_id: Arc<AtomicU64>,
    persistence_path: Option<PathBuf>,
}

impl UserRepository {
    /// Create a new empty repository.
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            persistence_path,
        }
    }

    /// Load from file if it exists; start empty otherwise.
    pub fn load_from_file(path: &Path) -> Result<Self, StoreError> {
        let repo = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let users: Vec<User> = serde_json::from_reader(reader)?;

            let max_id = users.iter().map(|u| u.id).max().unwrap_or(0);
            repo.next_id.store(max_id + 1, Ordering::SeqCst);
            for user in users {
                repo.inner.insert(user.username.to_lowercase(), user);
            }
            tracing::info!(path = %path.display(), users = repo.count(), "Loaded user store");
        }
        Ok(repo)
    }

    /// Save to the persistence file, if one is configured.
    ///
    /// A crash mid-write leaves the previous file intact.
    pub fn save_to_file(&self) -> Result<(), StoreError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let users = self.list_users();

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &users)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        tracing::info!(path = %path.display(), users = users.len(), "Saved user store");
        Ok(())
    }

    /// Create an account. Usernames are unique, case-insensitively.
    pub fn create_user(&self, username: &str, password: &str, role: Role) -> Result<User, StoreError> {
        use dashmap::mapref::entry::Entry;

        let password_hash = hash_password(password)?;

        match self.inner.entry(username.to_lowercase()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateUsername(username.to_string())),
            Entry::Vacant(slot) => {
                let user = User {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst),
                    username: username.to_string(),
                    role,
                    password_hash,
                };
                slot.insert(user.clone());
                tracing::info!(user_id = user.id, username = %user.username, role = ?user.role, "User created");
                Ok(user)
            }
        }
    }

    /// Look up an account by username (case-insensitive).
    pub fn user_by_username(&self, username: &str) -> Option<User> {
        self.inner.get(&username.to_lowercase()).map(|r| r.value().clone())
    }

    /// All accounts, ordered by id.
    pub fn list_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.inner.iter().map(|r| r.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        users
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }
}

impl Default for UserRepository {
    fn default() -> Self {
        Self::new(None)
    }
}

impl UserStore for UserRepository {
    fn has_administrator(&self) -> Result<bool, StoreError> {
        Ok(self.inner.iter().any(|r| r.value().is_administrator()))
    }
}
