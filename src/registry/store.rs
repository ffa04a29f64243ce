//! File-backed user registry.
//!
//! All records live in memory behind a single async mutex. Every mutation
//! rewrites the JSON document (temp file + rename) before the call returns;
//! if that write fails the in-memory change is rolled back.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{UserId, UserRecord};

/// Current on-disk format version.
const FORMAT_VERSION: u32 = 1;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("User {0} is not registered")]
    NotFound(UserId),

    #[error("Failed to access registry file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse registry file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Aggregate counts for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    pub users: usize,
    pub verified: usize,
    pub unlocked: usize,
}

/// Result of [`UserRegistry::verify_and_credit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    /// This call performed the false to true change.
    pub newly_verified: bool,

    /// Referrer's `invited_count` after the credit, if a referrer was credited.
    pub referrer_count: Option<u32>,
}

#[derive(Serialize)]
struct RegistrySnapshot<'a> {
    version: u32,
    users: Vec<&'a UserRecord>,
}

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    users: Vec<UserRecord>,
}

/// Persistent mapping from user id to referral state.
pub struct UserRegistry {
    /// Backing file, `None` for an in-memory registry.
    path: Option<PathBuf>,

    users: Mutex<BTreeMap<UserId, UserRecord>>,
}

impl UserRegistry {
    /// Opens the registry stored at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();

        let users = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let file: RegistryFile = serde_json::from_str(&content)?;
                if file.version > FORMAT_VERSION {
                    warn!(
                        "Registry file version {} is newer than supported version {}",
                        file.version, FORMAT_VERSION
                    );
                }
                let mut users = BTreeMap::new();
                for record in file.users {
                    if let Some(previous) = users.insert(record.user_id, record) {
                        warn!("Duplicate registry entry for user {}, keeping the last one", previous.user_id);
                    }
                }
                users
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No registry at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!("Opened registry {} ({} users)", path.display(), users.len());

        Ok(Self {
            path: Some(path),
            users: Mutex::new(users),
        })
    }

    /// Creates a registry that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            users: Mutex::new(BTreeMap::new()),
        }
    }

    /// Creates a record with zero counters if `user_id` is unknown.
    ///
    /// Returns `true` if a record was created. Existing records, including
    /// their referrer, are left untouched.
    pub async fn register(
        &self,
        user_id: UserId,
        username: Option<String>,
        referrer_id: Option<UserId>,
    ) -> Result<bool, RegistryError> {
        let mut users = self.users.lock().await;
        if users.contains_key(&user_id) {
            debug!("User {} already registered", user_id);
            return Ok(false);
        }

        users.insert(user_id, UserRecord::new(user_id, username, referrer_id));
        if let Err(e) = self.persist(&users).await {
            users.remove(&user_id);
            return Err(e);
        }

        info!(
            "Registered user {} (referrer: {})",
            user_id,
            referrer_id.map_or_else(|| "none".to_owned(), |r| r.to_string())
        );
        Ok(true)
    }

    /// Returns the current state of a user.
    pub async fn get(&self, user_id: UserId) -> Option<UserRecord> {
        self.users.lock().await.get(&user_id).cloned()
    }

    /// Sets `channels_followed` for a user.
    ///
    /// Returns `true` only when this call performed the false to true change.
    pub async fn mark_followed(&self, user_id: UserId) -> Result<bool, RegistryError> {
        let mut users = self.users.lock().await;
        let record = users
            .get_mut(&user_id)
            .ok_or(RegistryError::NotFound(user_id))?;
        if record.channels_followed {
            return Ok(false);
        }

        let previous = record.clone();
        record.channels_followed = true;
        record.verified_at = Some(Utc::now());

        if let Err(e) = self.persist(&users).await {
            users.insert(user_id, previous);
            return Err(e);
        }
        Ok(true)
    }

    /// Marks the user verified and credits their referrer in one write.
    ///
    /// Nothing changes if the user is already verified. A referrer missing
    /// from the registry is not credited. If the write fails, both changes
    /// are rolled back so a retry can apply them again.
    pub async fn verify_and_credit(&self, user_id: UserId) -> Result<Verification, RegistryError> {
        let mut users = self.users.lock().await;
        let previous = users
            .get(&user_id)
            .cloned()
            .ok_or(RegistryError::NotFound(user_id))?;
        if previous.channels_followed {
            return Ok(Verification {
                newly_verified: false,
                referrer_count: None,
            });
        }

        if let Some(record) = users.get_mut(&user_id) {
            record.channels_followed = true;
            record.verified_at = Some(Utc::now());
        }

        let credited = previous
            .referrer_id
            .and_then(|referrer_id| users.get_mut(&referrer_id))
            .map(|referrer| {
                let before = referrer.invited_count;
                referrer.invited_count = before.saturating_add(1);
                (referrer.user_id, before, referrer.invited_count)
            });

        if let Err(e) = self.persist(&users).await {
            users.insert(user_id, previous);
            if let Some((referrer_id, before, _)) = credited
                && let Some(referrer) = users.get_mut(&referrer_id)
            {
                referrer.invited_count = before;
            }
            return Err(e);
        }

        Ok(Verification {
            newly_verified: true,
            referrer_count: credited.map(|(_, _, count)| count),
        })
    }

    /// Increments a referrer's `invited_count` and returns the new value.
    pub async fn increment_invited(&self, referrer_id: UserId) -> Result<u32, RegistryError> {
        let mut users = self.users.lock().await;
        let record = users
            .get_mut(&referrer_id)
            .ok_or(RegistryError::NotFound(referrer_id))?;

        let previous = record.invited_count;
        record.invited_count = previous.saturating_add(1);
        let count = record.invited_count;

        if let Err(e) = self.persist(&users).await {
            if let Some(record) = users.get_mut(&referrer_id) {
                record.invited_count = previous;
            }
            return Err(e);
        }
        Ok(count)
    }

    /// Returns aggregate counts; `threshold` decides which users count as unlocked.
    pub async fn stats(&self, threshold: u32) -> RegistryStats {
        let users = self.users.lock().await;
        users.values().fold(
            RegistryStats {
                users: users.len(),
                ..RegistryStats::default()
            },
            |mut stats, record| {
                if record.channels_followed {
                    stats.verified += 1;
                }
                if record.has_reached(threshold) {
                    stats.unlocked += 1;
                }
                stats
            },
        )
    }

    /// Writes a final snapshot. The registry stays usable afterwards.
    pub async fn close(&self) -> Result<(), RegistryError> {
        let users = self.users.lock().await;
        self.persist(&users).await?;
        if let Some(path) = &self.path {
            info!("Registry {} closed ({} users)", path.display(), users.len());
        }
        Ok(())
    }

    /// Atomically replaces the backing file with the given state.
    async fn persist(&self, users: &BTreeMap<UserId, UserRecord>) -> Result<(), RegistryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let snapshot = RegistrySnapshot {
            version: FORMAT_VERSION,
            users: users.values().collect(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let tmp_path = temp_path_for(path);
        if let Err(e) = write_and_replace(&tmp_path, path, &json).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await
                && cleanup.kind() != std::io::ErrorKind::NotFound
            {
                warn!("Failed to remove {}: {}", tmp_path.display(), cleanup);
            }
            return Err(e.into());
        }
        Ok(())
    }
}

/// Writes `contents` to `tmp_path`, syncs it, then renames it over `path`.
async fn write_and_replace(tmp_path: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp_path).await?;
    file.write_all(contents).await?;
    // tokio reports a failed background write only on flush.
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(tmp_path, path).await
}

impl std::fmt::Debug for UserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRegistry")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
