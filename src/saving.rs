use std::io::{Read, Write};

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{
    AboutContent, CarouselImage, CarouselSettings, CaseStudy, ContactInfo, ContactMessage,
    Content, Project, Record, Skill, Testimonial, TimelineEntry,
};
use crate::store::{Store, ensure_unique_ids};

const BACKUP_VERSION: u32 = 1;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Snapshot of every collection and singleton
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub case_studies: Vec<CaseStudy>,
    #[serde(default)]
    pub carousel_images: Vec<CarouselImage>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub testimonials: Vec<Testimonial>,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    #[serde(default)]
    pub messages: Vec<ContactMessage>,
    #[serde(default)]
    pub contact_info: ContactInfo,
    #[serde(default)]
    pub about: AboutContent,
    #[serde(default)]
    pub carousel_settings: CarouselSettings,
}

/// Record counts of a restored backup
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    pub projects: usize,
    pub case_studies: usize,
    pub carousel_images: usize,
    pub skills: usize,
    pub testimonials: usize,
    pub timeline: usize,
    pub messages: usize,
}

fn check_records<T: Record>(records: &mut [T]) -> AppResult<()> {
    for record in records.iter_mut() {
        record.normalize();
        record.validate().map_err(|e| {
            AppError::validation(format!(
                "{} '{}' in backup: {}",
                T::LABEL,
                record.id(),
                e
            ))
        })?;
    }
    ensure_unique_ids(records)
}

fn check_content<T: Content>(content: &mut T) -> AppResult<()> {
    content.normalize();
    content.validate()
}

impl Backup {
    /// Normalise and validate every record before anything is replaced
    fn check(&mut self) -> AppResult<()> {
        if self.version > BACKUP_VERSION {
            return Err(AppError::BadRequest(format!(
                "backup version {} is newer than supported version {}",
                self.version, BACKUP_VERSION
            )));
        }
        check_records(&mut self.projects)?;
        check_records(&mut self.case_studies)?;
        check_records(&mut self.carousel_images)?;
        check_records(&mut self.skills)?;
        check_records(&mut self.testimonials)?;
        check_records(&mut self.timeline)?;
        check_records(&mut self.messages)?;
        check_content(&mut self.contact_info)?;
        check_content(&mut self.about)?;
        check_content(&mut self.carousel_settings)
    }

    fn summary(&self) -> RestoreSummary {
        RestoreSummary {
            projects: self.projects.len(),
            case_studies: self.case_studies.len(),
            carousel_images: self.carousel_images.len(),
            skills: self.skills.len(),
            testimonials: self.testimonials.len(),
            timeline: self.timeline.len(),
            messages: self.messages.len(),
        }
    }
}

impl Store {
    pub async fn snapshot(&self) -> Backup {
        Backup {
            version: BACKUP_VERSION,
            created_at: Utc::now(),
            projects: self.projects.list().await,
            case_studies: self.case_studies.list().await,
            carousel_images: self.carousel_images.list().await,
            skills: self.skills.list().await,
            testimonials: self.testimonials.list().await,
            timeline: self.timeline.list().await,
            messages: self.messages.list().await,
            contact_info: self.contact_info.get().await,
            about: self.about.get().await,
            carousel_settings: self.carousel_settings.get().await,
        }
    }

    /// Gzip-compressed JSON snapshot of all content
    pub async fn export_backup(&self) -> AppResult<Vec<u8>> {
        let backup = self.snapshot().await;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        serde_json::to_writer(&mut encoder, &backup)?;
        encoder.flush()?;
        Ok(encoder.finish()?)
    }

    /// Replace all content with a backup, gzip-compressed or plain JSON
    pub async fn import_backup(&self, bytes: &[u8]) -> AppResult<RestoreSummary> {
        let mut backup = decode_backup(bytes)?;
        backup.check()?;
        let summary = backup.summary();

        let mut replaced = Vec::new();
        if let Err(e) = self.replace_from(backup, &mut replaced).await {
            if replaced.is_empty() {
                error!("Restore failed before anything was replaced: {}", e);
            } else {
                error!(
                    "Restore failed after replacing {}; the rest still holds the old content: {}",
                    replaced.join(", "),
                    e
                );
            }
            return Err(e);
        }

        Ok(summary)
    }

    /// Swap in each part of a checked backup, noting every part done
    async fn replace_from(
        &self,
        backup: Backup,
        replaced: &mut Vec<&'static str>,
    ) -> AppResult<()> {
        self.projects.replace_all(backup.projects).await?;
        replaced.push(Project::COLLECTION);
        self.case_studies.replace_all(backup.case_studies).await?;
        replaced.push(CaseStudy::COLLECTION);
        self.carousel_images.replace_all(backup.carousel_images).await?;
        replaced.push(CarouselImage::COLLECTION);
        self.skills.replace_all(backup.skills).await?;
        replaced.push(Skill::COLLECTION);
        self.testimonials.replace_all(backup.testimonials).await?;
        replaced.push(Testimonial::COLLECTION);
        self.timeline.replace_all(backup.timeline).await?;
        replaced.push(TimelineEntry::COLLECTION);
        self.messages.replace_all(backup.messages).await?;
        replaced.push(ContactMessage::COLLECTION);
        self.contact_info.replace(backup.contact_info).await?;
        replaced.push(ContactInfo::NAME);
        self.about.replace(backup.about).await?;
        replaced.push(AboutContent::NAME);
        self.carousel_settings.replace(backup.carousel_settings).await?;
        replaced.push(CarouselSettings::NAME);
        Ok(())
    }
}

fn decode_backup(bytes: &[u8]) -> AppResult<Backup> {
    if bytes.is_empty() {
        return Err(AppError::BadRequest("backup is empty".into()));
    }

    let json = if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| AppError::BadRequest(format!("backup is not valid gzip: {e}")))?;
        out
    } else {
        bytes.to_vec()
    };

    serde_json::from_slice(&json)
        .map_err(|e| AppError::BadRequest(format!("backup is not a valid snapshot: {e}")))
}

// Web handler functions below

pub async fn handle_backup(State(state): State<AppState>) -> AppResult<Response> {
    let bytes = state.store.export_backup().await?;
    let filename = format!("portfolio-backup-{}.json.gz", Utc::now().format("%Y%m%d-%H%M%S"));
    info!("Exported backup ({} bytes)", bytes.len());

    Ok((
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

pub async fn handle_restore(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<RestoreSummary>> {
    let summary = state.store.import_backup(&body).await?;
    state.cache.clear();
    info!("Restored backup: {:?}", summary);
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_backup_restores_into_fresh_store() {
        let source_dir = TempDir::new().unwrap();
        let source = Store::open(source_dir.path(), None).await.unwrap();
        source
            .projects
            .insert(json!({"title": "Site", "technologies": ["Rust"]}))
            .await
            .unwrap();
        source
            .skills
            .insert(json!({"name": "Rust", "level": 90}))
            .await
            .unwrap();
        source
            .about
            .update(json!({"headline": "Hello"}))
            .await
            .unwrap();

        let bytes = source.export_backup().await.unwrap();
        assert!(bytes.starts_with(&GZIP_MAGIC));

        let target_dir = TempDir::new().unwrap();
        let target = Store::open(target_dir.path(), None).await.unwrap();
        target
            .testimonials
            .insert(json!({"name": "Old", "content": "Gone after restore"}))
            .await
            .unwrap();

        let summary = target.import_backup(&bytes).await.unwrap();
        assert_eq!(summary.projects, 1);
        assert_eq!(summary.skills, 1);
        assert_eq!(summary.testimonials, 0);
        assert!(target.testimonials.is_empty().await);
        assert_eq!(target.projects.list().await[0].title, "Site");
        assert_eq!(target.about.get().await.headline.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn test_plain_json_backup_accepted() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), None).await.unwrap();
        let body = json!({
            "version": 1,
            "createdAt": "2024-01-01T00:00:00Z",
            "caseStudies": [{"id": "cs", "projectTitle": "Legacy"}]
        });

        let summary = store
            .import_backup(body.to_string().as_bytes())
            .await
            .unwrap();
        assert_eq!(summary.case_studies, 1);
        assert_eq!(store.case_studies.get("cs").await.unwrap().title, "Legacy");
    }

    #[tokio::test]
    async fn test_invalid_backup_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), None).await.unwrap();
        store.skills.insert(json!({"name": "Rust"})).await.unwrap();

        let body = json!({
            "version": 1,
            "createdAt": "2024-01-01T00:00:00Z",
            "skills": [],
            "projects": [{"id": "p", "title": ""}]
        });
        let err = store
            .import_backup(body.to_string().as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.skills.len().await, 1);

        assert!(matches!(
            store.import_backup(b"not json").await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            store.import_backup(&[0x1f, 0x8b, 0x00]).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_backup_with_duplicate_ids_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), None).await.unwrap();
        let body = json!({
            "version": 1,
            "createdAt": "2024-01-01T00:00:00Z",
            "projects": [{"id": "p", "title": "A"}, {"id": "p", "title": "B"}]
        });

        let err = store
            .import_backup(body.to_string().as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("duplicate project id 'p'"));
        assert!(store.projects.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_write_stops_restore_and_reports_error() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), None).await.unwrap();
        store
            .messages
            .insert(json!({"name": "Ada", "email": "ada@example.com", "message": "Hi"}))
            .await
            .unwrap();
        store
            .timeline
            .insert(json!({"title": "Engineer", "startDate": "2020"}))
            .await
            .unwrap();

        // A non-empty directory where the timeline file belongs makes its write fail
        let blocker = dir.path().join("timeline.json");
        fs::remove_file(&blocker).unwrap();
        fs::create_dir_all(blocker.join("keep")).unwrap();

        let body = json!({
            "version": 1,
            "createdAt": "2024-01-01T00:00:00Z",
            "projects": [{"id": "p", "title": "New"}]
        });
        let err = store
            .import_backup(body.to_string().as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert_eq!(store.projects.get("p").await.unwrap().title, "New");
        assert_eq!(store.timeline.len().await, 1);
        assert_eq!(store.messages.len().await, 1);
    }
}
