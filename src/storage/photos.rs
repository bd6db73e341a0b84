use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::kv::{load_json, save_json, KeyValueStore};
use super::remote::{Filter, RemoteApi, RowQuery};
use super::StoreError;

pub const PHOTOS_KEY: &str = "supabase_user_photos";
pub const USER_PHOTOS_BUCKET: &str = "user-photos";
pub const CUISINE_PHOTOS_BUCKET: &str = "cuisine-photos";
pub const USER_PHOTOS_TABLE: &str = "user_photos";
pub const CUISINE_PHOTOS_TABLE: &str = "cuisine_photos";
pub const LOCAL_ID_PREFIX: &str = "local_";
pub const REMOTE_ID_PREFIX: &str = "supabase_";
pub const DEFAULT_USER_ID: &str = "anonymous";
pub const DEFAULT_MAX_PHOTO_BYTES: u64 = 5 * 1024 * 1024;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPhoto {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    pub file_url: String,
    pub file_size: u64,
    pub upload_date: DateTime<Utc>,
    #[serde(default)]
    pub is_avatar: bool,
    pub created_at: DateTime<Utc>,
}

impl UserPhoto {
    pub fn is_local(&self) -> bool {
        is_local_id(&self.id)
    }
}

pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Remote table holding the records for a bucket.
pub fn table_for_bucket(bucket: &str) -> &'static str {
    if bucket == USER_PHOTOS_BUCKET {
        USER_PHOTOS_TABLE
    } else {
        CUISINE_PHOTOS_TABLE
    }
}

fn local_photo_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{}{}_{}", LOCAL_ID_PREFIX, now.timestamp_millis(), suffix)
}

/// Makes one object-path segment: anything but ASCII alphanumerics and `.` becomes `_`.
fn sanitize_segment(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect()
}

/// A file picked for upload, held fully in memory.
#[derive(Debug, Clone)]
pub struct PhotoFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PhotoFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo".to_string());
        let content_type = content_type_for(&name).to_string();
        Ok(Self::new(name, content_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.content_type, STANDARD.encode(&self.bytes))
    }
}

fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

/// Outcome of `LocalFirstStore::check_remote`, one entry per remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHealth {
    pub database: Result<(), String>,
    pub storage: Result<(), String>,
}

impl RemoteHealth {
    pub fn is_healthy(&self) -> bool {
        self.database.is_ok() && self.storage.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadTier {
    Local,
    Remote,
}

/// Uploads try the local tier, then the remote tier.
const UPLOAD_ORDER: [UploadTier; 2] = [UploadTier::Local, UploadTier::Remote];

/// Photo storage where the local key-value store is authoritative and the
/// remote backend is a best-effort mirror.
pub struct LocalFirstStore {
    local: Arc<dyn KeyValueStore>,
    remote: Option<Arc<dyn RemoteApi>>,
    max_photo_bytes: u64,
    // serializes read-modify-write of the photo collection
    write_lock: Mutex<()>,
}

impl LocalFirstStore {
    pub fn new(local: Arc<dyn KeyValueStore>) -> Self {
        Self {
            local,
            remote: None,
            max_photo_bytes: DEFAULT_MAX_PHOTO_BYTES,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteApi>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_max_photo_bytes(mut self, limit: u64) -> Self {
        self.max_photo_bytes = limit;
        self
    }

    pub async fn upload(&self, file: &PhotoFile, user_id: &str) -> Result<UserPhoto, StoreError> {
        let user_id = if user_id.trim().is_empty() {
            DEFAULT_USER_ID
        } else {
            user_id
        };

        let mut reasons = Vec::new();
        for tier in UPLOAD_ORDER {
            let attempt = match tier {
                UploadTier::Local => self.upload_local(file, user_id),
                UploadTier::Remote => self.upload_remote(file, user_id).await,
            };
            match attempt {
                Ok(photo) => {
                    tracing::info!(?tier, photo_id = %photo.id, user_id, "photo stored");
                    return Ok(photo);
                }
                Err(e) => {
                    tracing::warn!(?tier, error = %e, "photo upload tier failed");
                    reasons.push(format!("{:?}: {}", tier, e));
                }
            }
        }
        Err(StoreError::AllTiersFailed { reasons })
    }

    fn upload_local(&self, file: &PhotoFile, user_id: &str) -> Result<UserPhoto, StoreError> {
        if file.size() > self.max_photo_bytes {
            return Err(StoreError::FileTooLarge {
                size: file.size(),
                limit: self.max_photo_bytes,
            });
        }
        let now = Utc::now();
        let photo = UserPhoto {
            id: local_photo_id(now),
            user_id: user_id.to_string(),
            file_name: file.name.clone(),
            file_url: file.to_data_url(),
            file_size: file.size(),
            upload_date: now,
            is_avatar: false,
            created_at: now,
        };
        self.rewrite_local(|photos| photos.push(photo.clone()))?;
        Ok(photo)
    }

    async fn upload_remote(&self, file: &PhotoFile, user_id: &str) -> Result<UserPhoto, StoreError> {
        let remote = self.remote.as_ref().ok_or(StoreError::RemoteNotConfigured)?;
        let now = Utc::now();
        let path = format!(
            "{}_{}_{}",
            sanitize_segment(user_id),
            now.timestamp_millis(),
            sanitize_segment(&file.name)
        );
        remote
            .upload_object(USER_PHOTOS_BUCKET, &path, file.bytes.clone(), &file.content_type)
            .await?;
        Ok(UserPhoto {
            id: format!("{}{}", REMOTE_ID_PREFIX, now.timestamp_millis()),
            user_id: user_id.to_string(),
            file_name: file.name.clone(),
            file_url: remote.public_url(USER_PHOTOS_BUCKET, &path),
            file_size: file.size(),
            upload_date: now,
            is_avatar: false,
            created_at: now,
        })
    }

    /// Newest first. The local tier wins whenever it has anything for the user.
    pub async fn list(&self, user_id: &str) -> Vec<UserPhoto> {
        let mut photos: Vec<UserPhoto> = self
            .local_photos()
            .into_iter()
            .filter(|p| p.user_id == user_id)
            .collect();
        if photos.is_empty() {
            // already ordered by the server; the sort is stable so ties keep that order
            let mut photos = self.remote_photos(user_id, false).await;
            sort_newest_first(&mut photos);
            return photos;
        }
        // local records are kept in insertion order, so ties go latest stored first
        photos.reverse();
        sort_newest_first(&mut photos);
        photos
    }

    pub async fn remove(
        &self,
        photo_id: &str,
        bucket: &str,
        file_name: &str,
    ) -> Result<(), StoreError> {
        self.rewrite_local(|photos| photos.retain(|p| p.id != photo_id))?;
        tracing::info!(photo_id, "photo removed locally");

        if is_local_id(photo_id) {
            return Ok(());
        }
        if let Some(remote) = &self.remote {
            let result = async {
                // an empty name would be read as a prefix matching the whole bucket
                if file_name.trim().is_empty() {
                    tracing::warn!(photo_id, bucket, "no object name given, keeping stored object");
                } else {
                    remote
                        .remove_objects(bucket, &[file_name.to_string()])
                        .await?;
                }
                remote
                    .delete(table_for_bucket(bucket), &[Filter::eq("id", photo_id)])
                    .await
            }
            .await;
            if let Err(e) = result {
                tracing::warn!(photo_id, bucket, error = %e, "remote photo removal failed");
            }
        }
        Ok(())
    }

    pub async fn set_avatar(&self, photo_id: &str, user_id: &str) -> Result<(), StoreError> {
        self.rewrite_local(|photos| {
            for photo in photos.iter_mut().filter(|p| p.user_id == user_id) {
                photo.is_avatar = photo.id == photo_id;
            }
        })?;
        tracing::info!(photo_id, user_id, "avatar set locally");

        if is_local_id(photo_id) {
            return Ok(());
        }
        if let Some(remote) = &self.remote {
            let result = async {
                remote
                    .update(
                        USER_PHOTOS_TABLE,
                        &[Filter::eq("user_id", user_id)],
                        &json!({ "is_avatar": false }),
                    )
                    .await?;
                remote
                    .update(
                        USER_PHOTOS_TABLE,
                        &[Filter::eq("id", photo_id)],
                        &json!({ "is_avatar": true }),
                    )
                    .await
            }
            .await;
            if let Err(e) = result {
                tracing::warn!(photo_id, user_id, error = %e, "remote avatar update failed");
            }
        }
        Ok(())
    }

    /// Checks that the remote table answers a one-row select and that the
    /// photo bucket can be listed.
    pub async fn check_remote(&self) -> Result<RemoteHealth, StoreError> {
        let remote = self.remote.as_ref().ok_or(StoreError::RemoteNotConfigured)?;
        let database = remote
            .select(USER_PHOTOS_TABLE, &RowQuery::new().limit(1))
            .await
            .map(|_| ())
            .map_err(|e| e.to_string());
        let storage = remote
            .list_objects(USER_PHOTOS_BUCKET, 1)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string());
        let health = RemoteHealth { database, storage };
        if health.is_healthy() {
            tracing::info!("remote tier reachable");
        } else {
            tracing::warn!(?health, "remote tier check failed");
        }
        Ok(health)
    }

    pub async fn avatar(&self, user_id: &str) -> Option<UserPhoto> {
        let local = self
            .local_photos()
            .into_iter()
            .find(|p| p.user_id == user_id && p.is_avatar);
        if local.is_some() {
            return local;
        }
        self.remote_photos(user_id, true).await.into_iter().next()
    }

    fn local_photos(&self) -> Vec<UserPhoto> {
        load_json(self.local.as_ref(), PHOTOS_KEY).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read local photos");
            Vec::new()
        })
    }

    fn rewrite_local<F>(&self, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<UserPhoto>),
    {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut photos: Vec<UserPhoto> = load_json(self.local.as_ref(), PHOTOS_KEY)?;
        mutate(&mut photos);
        save_json(self.local.as_ref(), PHOTOS_KEY, &photos)
    }

    async fn remote_photos(&self, user_id: &str, avatar_only: bool) -> Vec<UserPhoto> {
        let Some(remote) = &self.remote else {
            return Vec::new();
        };
        let mut query = RowQuery::new()
            .filter(Filter::eq("user_id", user_id))
            .order_desc("upload_date");
        if avatar_only {
            query = query.filter(Filter::eq("is_avatar", true)).limit(1);
        }
        match remote.select(USER_PHOTOS_TABLE, &query).await {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|row| match serde_json::from_value::<UserPhoto>(row) {
                    Ok(photo) => Some(photo),
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping malformed remote photo row");
                        None
                    }
                })
                .collect(),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "remote photo query failed");
                Vec::new()
            }
        }
    }
}

fn sort_newest_first(photos: &mut [UserPhoto]) {
    photos.sort_by(|a, b| b.upload_date.cmp(&a.upload_date));
}
