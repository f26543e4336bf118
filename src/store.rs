//! JSON document store
//!
//! Each collection lives in memory and is written through to
//! `<data_dir>/<collection>.json` on every change. When a [`RemoteMirror`] is
//! configured the remote copy is preferred on startup and every write is
//! mirrored to it; remote failures are logged and the local file stays
//! authoritative.

use std::collections::HashSet;
use std::fs::{self, File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    AboutContent, CarouselImage, CarouselSettings, CaseStudy, ContactInfo, ContactMessage,
    Content, Project, Record, Skill, Testimonial, TimelineEntry,
};

/// Remote copy of the content, e.g. a Firebase Realtime Database
#[async_trait]
pub trait RemoteMirror: Send + Sync {
    /// Fetch the document stored under `name`, `None` when absent
    async fn fetch(&self, name: &str) -> AppResult<Option<Value>>;

    /// Overwrite the document stored under `name`
    async fn publish(&self, name: &str, value: &Value) -> AppResult<()>;
}

pub type SharedMirror = Arc<dyn RemoteMirror>;

/// Write `value` as pretty JSON, replacing the file atomically
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json(path: &Path) -> AppResult<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Shallow merge: top-level keys of `patch` replace those of `target`
pub fn merge_patch(target: &mut Value, patch: &Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target), Some(patch)) => {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        _ => *target = patch.clone(),
    }
}

/// Parse records from either an array or an object keyed by id
fn records_from_value<T: Record>(value: Value) -> Vec<T> {
    let entries: Vec<(Option<String>, Value)> = match value {
        Value::Array(items) => items.into_iter().map(|v| (None, v)).collect(),
        Value::Object(map) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
        _ => Vec::new(),
    };

    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .filter_map(|(key, v)| match serde_json::from_value::<T>(v) {
            Ok(mut record) => {
                if record.id().is_empty() {
                    record.meta_mut().id = key.unwrap_or_else(|| Uuid::new_v4().to_string());
                }
                Some(record)
            }
            Err(e) => {
                warn!("Skipping unreadable {} record: {}", T::COLLECTION, e);
                None
            }
        })
        .filter(|record| {
            let first = seen.insert(record.id().to_string());
            if !first {
                warn!("Skipping duplicate {} id '{}'", T::COLLECTION, record.id());
            }
            first
        })
        .collect()
}

/// Give blank ids a fresh UUID, then fail on any id used twice
pub fn ensure_unique_ids<T: Record>(records: &mut [T]) -> AppResult<()> {
    let mut seen = HashSet::new();
    for record in records.iter_mut() {
        let id = record.id().trim().to_string();
        record.meta_mut().id = if id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            id
        };
        if !seen.insert(record.id().to_string()) {
            return Err(AppError::validation(format!(
                "duplicate {} id '{}'",
                T::LABEL.to_lowercase(),
                record.id()
            )));
        }
    }
    Ok(())
}

fn sort_records<T: Record>(items: &mut [T]) {
    items.sort_by(|a, b| {
        a.order()
            .cmp(&b.order())
            .then_with(|| a.meta().created_at.cmp(&b.meta().created_at))
    });
}

fn decode_record<T: Record>(value: Value) -> AppResult<T> {
    serde_json::from_value(value)
        .map_err(|e| AppError::validation(format!("invalid {}: {}", T::LABEL.to_lowercase(), e)))
}

/// An ordered set of records of one type
pub struct Collection<T: Record> {
    path: PathBuf,
    items: RwLock<Vec<T>>,
    mirror: Option<SharedMirror>,
}

impl<T: Record> Collection<T> {
    /// Load the collection, preferring the remote copy when one is configured
    pub async fn open(data_dir: &Path, mirror: Option<SharedMirror>) -> AppResult<Self> {
        let path = data_dir.join(format!("{}.json", T::COLLECTION));

        let mut remote_items = None;
        if let Some(mirror) = &mirror {
            match mirror.fetch(T::COLLECTION).await {
                Ok(Some(value)) => remote_items = Some(records_from_value::<T>(value)),
                Ok(None) => debug!("No remote copy of {}", T::COLLECTION),
                Err(e) => warn!(
                    "Failed to fetch {} from remote, using local file: {}",
                    T::COLLECTION,
                    e
                ),
            }
        }

        let mut items = match remote_items {
            Some(items) => {
                write_json(&path, &items)?;
                items
            }
            None => read_json(&path)?
                .map(records_from_value::<T>)
                .unwrap_or_default(),
        };
        sort_records(&mut items);
        info!("Loaded {} {}", items.len(), T::COLLECTION);

        Ok(Self {
            path,
            items: RwLock::new(items),
            mirror,
        })
    }

    /// All records in display order
    pub async fn list(&self) -> Vec<T> {
        self.items.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> AppResult<T> {
        self.items
            .read()
            .await
            .iter()
            .find(|r| r.id() == id)
            .cloned()
            .ok_or_else(|| AppError::not_found(T::LABEL))
    }

    /// Create a record from client JSON
    pub async fn insert(&self, value: Value) -> AppResult<T> {
        let mut record: T = decode_record(value)?;
        record.normalize();
        record.validate()?;

        let mut items = self.items.write().await;
        let id = record.id().trim().to_string();
        if id.is_empty() {
            record.meta_mut().id = Uuid::new_v4().to_string();
        } else if items.iter().any(|r| r.id() == id) {
            return Err(AppError::Conflict(format!(
                "{} '{}' already exists",
                T::LABEL,
                id
            )));
        } else {
            record.meta_mut().id = id;
        }

        let now = Utc::now();
        record.meta_mut().created_at = Some(now);
        record.meta_mut().updated_at = Some(now);

        items.push(record.clone());
        sort_records(&mut items);
        self.persist(&items).await?;
        Ok(record)
    }

    /// Merge `patch` over an existing record
    pub async fn update(&self, id: &str, patch: Value) -> AppResult<T> {
        if !patch.is_object() {
            return Err(AppError::BadRequest("expected a JSON object".into()));
        }

        let mut items = self.items.write().await;
        let index = items
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| AppError::not_found(T::LABEL))?;

        let existing = items[index].clone();
        let mut merged = serde_json::to_value(&existing)?;
        merge_patch(&mut merged, &patch);

        let mut record: T = decode_record(merged)?;
        // Identity and creation time never change
        record.meta_mut().id = existing.meta().id.clone();
        record.meta_mut().created_at = existing.meta().created_at;
        record.meta_mut().updated_at = Some(Utc::now());
        record.normalize();
        record.validate()?;

        items[index] = record.clone();
        sort_records(&mut items);
        self.persist(&items).await?;
        Ok(record)
    }

    pub async fn delete(&self, id: &str) -> AppResult<T> {
        let mut items = self.items.write().await;
        let index = items
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| AppError::not_found(T::LABEL))?;
        let removed = items.remove(index);
        self.persist(&items).await?;
        Ok(removed)
    }

    /// Assign display positions from `ids`; records not listed follow them
    pub async fn reorder(&self, ids: &[String]) -> AppResult<Vec<T>> {
        let mut items = self.items.write().await;
        if let Some(missing) = ids.iter().find(|id| !items.iter().any(|r| r.id() == *id)) {
            return Err(AppError::NotFound(format!("{} '{}'", T::LABEL, missing)));
        }

        let listed = ids.len() as i64;
        let mut next_unlisted = listed;
        let now = Utc::now();
        for record in items.iter_mut() {
            let position = match ids.iter().position(|id| id == record.id()) {
                Some(p) => p as i64,
                None => {
                    next_unlisted += 1;
                    next_unlisted - 1
                }
            };
            record.set_order(position);
            record.meta_mut().updated_at = Some(now);
        }

        sort_records(&mut items);
        self.persist(&items).await?;
        Ok(items.clone())
    }

    /// Replace the whole collection, used when restoring a backup
    pub async fn replace_all(&self, mut records: Vec<T>) -> AppResult<()> {
        for record in records.iter_mut() {
            record.normalize();
            record.validate()?;
        }
        ensure_unique_ids(&mut records)?;
        sort_records(&mut records);

        let mut items = self.items.write().await;
        self.persist(&records).await?;
        *items = records;
        Ok(())
    }

    /// Write locally, then mirror remotely while the write lock is still held
    async fn persist(&self, items: &[T]) -> AppResult<()> {
        write_json(&self.path, items)?;

        if let Some(mirror) = &self.mirror {
            let keyed: Map<String, Value> = items
                .iter()
                .filter_map(|r| {
                    serde_json::to_value(r)
                        .ok()
                        .map(|v| (r.id().to_string(), v))
                })
                .collect();
            if let Err(e) = mirror.publish(T::COLLECTION, &Value::Object(keyed)).await {
                warn!("Failed to mirror {} to remote: {}", T::COLLECTION, e);
            }
        }
        Ok(())
    }
}

/// A single document, such as the about section
pub struct Singleton<T: Content> {
    path: PathBuf,
    value: RwLock<T>,
    mirror: Option<SharedMirror>,
}

impl<T: Content> Singleton<T> {
    pub async fn open(data_dir: &Path, mirror: Option<SharedMirror>) -> AppResult<Self> {
        let path = data_dir.join(format!("{}.json", T::NAME));

        let mut remote = None;
        if let Some(mirror) = &mirror {
            match mirror.fetch(T::NAME).await {
                Ok(Some(value)) => match serde_json::from_value::<T>(value) {
                    Ok(v) => remote = Some(v),
                    Err(e) => warn!("Remote {} is unreadable: {}", T::NAME, e),
                },
                Ok(None) => {}
                Err(e) => warn!("Failed to fetch {} from remote, using local file: {}", T::NAME, e),
            }
        }

        let value = match remote {
            Some(v) => {
                write_json(&path, &v)?;
                v
            }
            None => match read_json(&path)? {
                Some(json) => serde_json::from_value(json).unwrap_or_else(|e| {
                    warn!("Local {} is unreadable, using defaults: {}", T::NAME, e);
                    T::default()
                }),
                None => T::default(),
            },
        };

        Ok(Self {
            path,
            value: RwLock::new(value),
            mirror,
        })
    }

    pub async fn get(&self) -> T {
        self.value.read().await.clone()
    }

    /// Merge `patch` over the current document
    pub async fn update(&self, patch: Value) -> AppResult<T> {
        if !patch.is_object() {
            return Err(AppError::BadRequest("expected a JSON object".into()));
        }

        let mut current = self.value.write().await;
        let mut merged = serde_json::to_value(&*current)?;
        merge_patch(&mut merged, &patch);
        if let Some(obj) = merged.as_object_mut() {
            obj.insert("updatedAt".into(), serde_json::to_value(Utc::now())?);
        }

        let mut next: T = serde_json::from_value(merged)
            .map_err(|e| AppError::validation(format!("invalid {}: {}", T::NAME, e)))?;
        next.normalize();
        next.validate()?;

        *current = next.clone();
        self.persist(&current).await?;
        Ok(next)
    }

    pub async fn replace(&self, mut next: T) -> AppResult<()> {
        next.normalize();
        next.validate()?;
        let mut current = self.value.write().await;
        self.persist(&next).await?;
        *current = next;
        Ok(())
    }

    async fn persist(&self, value: &T) -> AppResult<()> {
        write_json(&self.path, value)?;
        if let Some(mirror) = &self.mirror {
            let json = serde_json::to_value(value)?;
            if let Err(e) = mirror.publish(T::NAME, &json).await {
                warn!("Failed to mirror {} to remote: {}", T::NAME, e);
            }
        }
        Ok(())
    }
}

/// Every collection and singleton the site serves
pub struct Store {
    pub data_dir: PathBuf,
    pub projects: Collection<Project>,
    pub case_studies: Collection<CaseStudy>,
    pub carousel_images: Collection<CarouselImage>,
    pub skills: Collection<Skill>,
    pub testimonials: Collection<Testimonial>,
    pub timeline: Collection<TimelineEntry>,
    pub messages: Collection<ContactMessage>,
    pub contact_info: Singleton<ContactInfo>,
    pub about: Singleton<AboutContent>,
    pub carousel_settings: Singleton<CarouselSettings>,
}

impl Store {
    /// Create the data directory if needed and load everything
    pub async fn open(data_dir: impl AsRef<Path>, mirror: Option<SharedMirror>) -> AppResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        if !data_dir.exists() {
            create_dir_all(&data_dir)?;
        }

        Ok(Self {
            projects: Collection::open(&data_dir, mirror.clone()).await?,
            case_studies: Collection::open(&data_dir, mirror.clone()).await?,
            carousel_images: Collection::open(&data_dir, mirror.clone()).await?,
            skills: Collection::open(&data_dir, mirror.clone()).await?,
            testimonials: Collection::open(&data_dir, mirror.clone()).await?,
            timeline: Collection::open(&data_dir, mirror.clone()).await?,
            messages: Collection::open(&data_dir, mirror.clone()).await?,
            contact_info: Singleton::open(&data_dir, mirror.clone()).await?,
            about: Singleton::open(&data_dir, mirror.clone()).await?,
            carousel_settings: Singleton::open(&data_dir, mirror).await?,
            data_dir,
        })
    }
}

/// Gives generic code access to the collection holding `Self`
pub trait Stored: Record {
    fn collection(store: &Store) -> &Collection<Self>;
}

macro_rules! stored {
    ($($ty:ty => $field:ident),* $(,)?) => {
        $(
            impl Stored for $ty {
                fn collection(store: &Store) -> &Collection<Self> {
                    &store.$field
                }
            }
        )*
    };
}

stored! {
    Project => projects,
    CaseStudy => case_studies,
    CarouselImage => carousel_images,
    Skill => skills,
    Testimonial => testimonials,
    TimelineEntry => timeline,
    ContactMessage => messages,
}

/// Gives generic code access to the singleton holding `Self`
pub trait StoredContent: Content {
    fn singleton(store: &Store) -> &Singleton<Self>;
}

impl StoredContent for ContactInfo {
    fn singleton(store: &Store) -> &Singleton<Self> {
        &store.contact_info
    }
}

impl StoredContent for AboutContent {
    fn singleton(store: &Store) -> &Singleton<Self> {
        &store.about
    }
}

impl StoredContent for CarouselSettings {
    fn singleton(store: &Store) -> &Singleton<Self> {
        &store.carousel_settings
    }
}
