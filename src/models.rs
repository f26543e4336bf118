//! Content records served by the portfolio API
//!
//! Every record is stored as camelCase JSON. Collections share the [`Record`]
//! trait so the store, the CRUD routes and the search service can treat them
//! uniformly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{AppError, AppResult};

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid");
}

/// Identity and timestamps shared by every stored record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Flattened view of a record used by the search service
#[derive(Debug, Clone)]
pub struct SearchDocument {
    pub title: String,
    pub tags: Vec<String>,
    pub body: String,
}

/// A record kept in a [`crate::store::Collection`]
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// File and remote path name of the collection
    const COLLECTION: &'static str;
    /// Human-readable name used in error messages
    const LABEL: &'static str;

    fn meta(&self) -> &Meta;
    fn meta_mut(&mut self) -> &mut Meta;

    /// Trim strings and drop empty optionals
    fn normalize(&mut self) {}

    fn validate(&self) -> AppResult<()>;

    /// Display position; lower sorts first
    fn order(&self) -> i64 {
        0
    }

    fn set_order(&mut self, _order: i64) {}

    fn search_document(&self) -> Option<SearchDocument> {
        None
    }

    fn id(&self) -> &str {
        &self.meta().id
    }
}

// Validation helpers

fn clean(value: &mut Option<String>) {
    if let Some(v) = value {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            *value = None;
        } else if trimmed.len() != v.len() {
            *value = Some(trimmed.to_string());
        }
    }
}

fn clean_list(values: &mut Vec<String>) {
    values.iter_mut().for_each(|v| *v = v.trim().to_string());
    values.retain(|v| !v.is_empty());
}

fn required(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(())
}

fn check_url(field: &str, value: &Option<String>) -> AppResult<()> {
    match value {
        Some(url) if !is_url(url) => Err(AppError::validation(format!(
            "{field} must be an absolute http(s) URL or a site path"
        ))),
        _ => Ok(()),
    }
}

pub fn is_url(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://") || value.starts_with('/')
}

pub fn is_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

fn default_true() -> bool {
    true
}

// Collections

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub order: i64,
}

impl Record for Project {
    const COLLECTION: &'static str = "projects";
    const LABEL: &'static str = "Project";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn normalize(&mut self) {
        self.title = self.title.trim().to_string();
        clean(&mut self.description);
        clean(&mut self.long_description);
        clean(&mut self.image_url);
        clean(&mut self.github_url);
        clean(&mut self.live_url);
        clean(&mut self.category);
        clean_list(&mut self.technologies);
    }

    fn validate(&self) -> AppResult<()> {
        required("title", &self.title)?;
        check_url("imageUrl", &self.image_url)?;
        check_url("githubUrl", &self.github_url)?;
        check_url("liveUrl", &self.live_url)
    }

    fn order(&self) -> i64 {
        self.order
    }

    fn set_order(&mut self, order: i64) {
        self.order = order;
    }

    fn search_document(&self) -> Option<SearchDocument> {
        let mut tags = self.technologies.clone();
        tags.extend(self.category.clone());
        Some(SearchDocument {
            title: self.title.clone(),
            tags,
            body: join_text(&[&self.description, &self.long_description]),
        })
    }
}

/// Long-form write-up of a project.
///
/// Older records used different field names for the same content, so the
/// deserializer accepts them and keeps the first non-empty value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawCaseStudy")]
pub struct CaseStudy {
    #[serde(flatten)]
    pub meta: Meta,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    pub technologies: Vec<String>,
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    pub featured: bool,
    pub order: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCaseStudy {
    #[serde(flatten)]
    meta: Meta,
    project_title: Option<String>,
    title: Option<String>,
    name: Option<String>,
    subtitle: Option<String>,
    client: Option<String>,
    role: Option<String>,
    duration: Option<String>,
    summary: Option<String>,
    overview: Option<String>,
    description: Option<String>,
    challenge: Option<String>,
    solution: Option<String>,
    outcome: Option<String>,
    results: Option<String>,
    technologies: Option<Vec<String>>,
    tech_stack: Option<Vec<String>>,
    tools: Option<Vec<String>>,
    images: Option<Vec<String>>,
    image_url: Option<String>,
    thumbnail: Option<String>,
    cover_image: Option<String>,
    live_url: Option<String>,
    github_url: Option<String>,
    featured: Option<bool>,
    order: Option<i64>,
}

fn first_text(candidates: Vec<Option<String>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|v| !v.trim().is_empty())
}

fn first_list(candidates: Vec<Option<Vec<String>>>) -> Vec<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

impl From<RawCaseStudy> for CaseStudy {
    fn from(raw: RawCaseStudy) -> Self {
        Self {
            meta: raw.meta,
            title: first_text(vec![raw.project_title, raw.title, raw.name]).unwrap_or_default(),
            subtitle: raw.subtitle,
            client: raw.client,
            role: raw.role,
            duration: raw.duration,
            summary: first_text(vec![raw.summary, raw.overview, raw.description]),
            challenge: raw.challenge,
            solution: raw.solution,
            outcome: first_text(vec![raw.outcome, raw.results]),
            technologies: first_list(vec![raw.technologies, raw.tech_stack, raw.tools]),
            images: raw.images.unwrap_or_default(),
            image_url: first_text(vec![raw.image_url, raw.thumbnail, raw.cover_image]),
            live_url: raw.live_url,
            github_url: raw.github_url,
            featured: raw.featured.unwrap_or(false),
            order: raw.order.unwrap_or(0),
        }
    }
}

impl Record for CaseStudy {
    const COLLECTION: &'static str = "case_studies";
    const LABEL: &'static str = "Case study";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn normalize(&mut self) {
        self.title = self.title.trim().to_string();
        for field in [
            &mut self.subtitle,
            &mut self.client,
            &mut self.role,
            &mut self.duration,
            &mut self.summary,
            &mut self.challenge,
            &mut self.solution,
            &mut self.outcome,
            &mut self.image_url,
            &mut self.live_url,
            &mut self.github_url,
        ] {
            clean(field);
        }
        clean_list(&mut self.technologies);
        clean_list(&mut self.images);
    }

    fn validate(&self) -> AppResult<()> {
        required("title", &self.title)?;
        check_url("imageUrl", &self.image_url)?;
        check_url("liveUrl", &self.live_url)?;
        check_url("githubUrl", &self.github_url)?;
        for image in &self.images {
            if !is_url(image) {
                return Err(AppError::validation(format!("invalid image URL '{image}'")));
            }
        }
        Ok(())
    }

    fn order(&self) -> i64 {
        self.order
    }

    fn set_order(&mut self, order: i64) {
        self.order = order;
    }

    fn search_document(&self) -> Option<SearchDocument> {
        let mut tags = self.technologies.clone();
        tags.extend(self.client.clone());
        Some(SearchDocument {
            title: self.title.clone(),
            tags,
            body: join_text(&[
                &self.subtitle,
                &self.summary,
                &self.challenge,
                &self.solution,
                &self.outcome,
            ]),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarouselImage {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
    /// Identifier at the image host, used to delete the remote file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub order: i64,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Record for CarouselImage {
    const COLLECTION: &'static str = "carousel_images";
    const LABEL: &'static str = "Carousel image";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn normalize(&mut self) {
        self.image_url = self.image_url.trim().to_string();
        clean(&mut self.title);
        clean(&mut self.caption);
        clean(&mut self.alt_text);
        clean(&mut self.link_url);
        clean(&mut self.public_id);
        clean(&mut self.provider);
    }

    fn validate(&self) -> AppResult<()> {
        required("imageUrl", &self.image_url)?;
        check_url("imageUrl", &Some(self.image_url.clone()))?;
        check_url("linkUrl", &self.link_url)
    }

    fn order(&self) -> i64 {
        self.order
    }

    fn set_order(&mut self, order: i64) {
        self.order = order;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Proficiency from 0 to 100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub order: i64,
}

impl Record for Skill {
    const COLLECTION: &'static str = "skills";
    const LABEL: &'static str = "Skill";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        clean(&mut self.category);
        clean(&mut self.icon);
    }

    fn validate(&self) -> AppResult<()> {
        required("name", &self.name)?;
        if matches!(self.level, Some(level) if level > 100) {
            return Err(AppError::validation("level must be between 0 and 100"));
        }
        Ok(())
    }

    fn order(&self) -> i64 {
        self.order
    }

    fn set_order(&mut self, order: i64) {
        self.order = order;
    }

    fn search_document(&self) -> Option<SearchDocument> {
        Some(SearchDocument {
            title: self.name.clone(),
            tags: self.category.clone().into_iter().collect(),
            body: String::new(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Testimonial {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub order: i64,
}

impl Record for Testimonial {
    const COLLECTION: &'static str = "testimonials";
    const LABEL: &'static str = "Testimonial";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.content = self.content.trim().to_string();
        clean(&mut self.role);
        clean(&mut self.company);
        clean(&mut self.avatar_url);
    }

    fn validate(&self) -> AppResult<()> {
        required("name", &self.name)?;
        required("content", &self.content)?;
        check_url("avatarUrl", &self.avatar_url)?;
        if matches!(self.rating, Some(r) if !(1..=5).contains(&r)) {
            return Err(AppError::validation("rating must be between 1 and 5"));
        }
        Ok(())
    }

    fn order(&self) -> i64 {
        self.order
    }

    fn set_order(&mut self, order: i64) {
        self.order = order;
    }

    fn search_document(&self) -> Option<SearchDocument> {
        Some(SearchDocument {
            title: self.name.clone(),
            tags: [&self.role, &self.company]
                .into_iter()
                .flatten()
                .cloned()
                .collect(),
            body: self.content.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineKind {
    #[default]
    Work,
    Education,
    Achievement,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub start_date: String,
    /// Absent while the entry is ongoing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: TimelineKind,
    #[serde(default)]
    pub order: i64,
}

impl Record for TimelineEntry {
    const COLLECTION: &'static str = "timeline";
    const LABEL: &'static str = "Timeline entry";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn normalize(&mut self) {
        self.title = self.title.trim().to_string();
        self.start_date = self.start_date.trim().to_string();
        clean(&mut self.organization);
        clean(&mut self.location);
        clean(&mut self.end_date);
        clean(&mut self.description);
    }

    fn validate(&self) -> AppResult<()> {
        required("title", &self.title)?;
        required("startDate", &self.start_date)
    }

    fn order(&self) -> i64 {
        self.order
    }

    fn set_order(&mut self, order: i64) {
        self.order = order;
    }

    fn search_document(&self) -> Option<SearchDocument> {
        Some(SearchDocument {
            title: self.title.clone(),
            tags: self.organization.clone().into_iter().collect(),
            body: join_text(&[&self.description, &self.location]),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub read: bool,
}

impl Record for ContactMessage {
    const COLLECTION: &'static str = "messages";
    const LABEL: &'static str = "Message";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_string();
        self.message = self.message.trim().to_string();
        clean(&mut self.subject);
    }

    fn validate(&self) -> AppResult<()> {
        required("name", &self.name)?;
        required("email", &self.email)?;
        required("message", &self.message)?;
        if !is_email(&self.email) {
            return Err(AppError::validation("email address is invalid"));
        }
        if self.message.len() > 5000 {
            return Err(AppError::validation("message must be at most 5000 characters"));
        }
        Ok(())
    }

    /// Newest first
    fn order(&self) -> i64 {
        -self.meta.created_at.map(|t| t.timestamp_millis()).unwrap_or(0)
    }
}

// Singletons

/// A single document with a default value, such as the about section
pub trait Content: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static {
    const NAME: &'static str;

    fn normalize(&mut self) {}

    fn validate(&self) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Network name to profile URL
    pub socials: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Content for ContactInfo {
    const NAME: &'static str = "contact_info";

    fn normalize(&mut self) {
        clean(&mut self.email);
        clean(&mut self.phone);
        clean(&mut self.location);
        clean(&mut self.availability);
        self.socials.retain(|_, url| !url.trim().is_empty());
    }

    fn validate(&self) -> AppResult<()> {
        if let Some(email) = &self.email {
            if !is_email(email) {
                return Err(AppError::validation("email address is invalid"));
            }
        }
        for (network, url) in &self.socials {
            if !is_url(url) && !url.starts_with("mailto:") {
                return Err(AppError::validation(format!("invalid URL for {network}")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AboutContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub highlights: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Content for AboutContent {
    const NAME: &'static str = "about";

    fn normalize(&mut self) {
        clean(&mut self.headline);
        clean(&mut self.bio);
        clean(&mut self.resume_url);
        clean(&mut self.image_url);
        clean_list(&mut self.highlights);
    }

    fn validate(&self) -> AppResult<()> {
        check_url("resumeUrl", &self.resume_url)?;
        check_url("imageUrl", &self.image_url)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    #[default]
    Slide,
    Fade,
}

pub const MIN_CAROUSEL_INTERVAL_MS: u64 = 1000;
pub const MAX_CAROUSEL_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CarouselSettings {
    pub autoplay: bool,
    pub interval_ms: u64,
    pub show_indicators: bool,
    pub show_arrows: bool,
    pub transition: Transition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for CarouselSettings {
    fn default() -> Self {
        Self {
            autoplay: true,
            interval_ms: 5000,
            show_indicators: true,
            show_arrows: true,
            transition: Transition::Slide,
            updated_at: None,
        }
    }
}

impl Content for CarouselSettings {
    const NAME: &'static str = "carousel_settings";

    fn normalize(&mut self) {
        self.interval_ms = self
            .interval_ms
            .clamp(MIN_CAROUSEL_INTERVAL_MS, MAX_CAROUSEL_INTERVAL_MS);
    }
}

fn join_text(parts: &[&Option<String>]) -> String {
    parts
        .iter()
        .filter_map(|p| p.as_deref())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_case_study_legacy_fields() {
        let study: CaseStudy = serde_json::from_value(json!({
            "id": "cs1",
            "projectTitle": "Legacy Title",
            "title": "Ignored",
            "overview": "An overview",
            "techStack": ["Rust", "Axum"],
            "thumbnail": "https://cdn.example.com/t.png",
            "results": "Faster"
        }))
        .unwrap();

        assert_eq!(study.meta.id, "cs1");
        assert_eq!(study.title, "Legacy Title");
        assert_eq!(study.summary.as_deref(), Some("An overview"));
        assert_eq!(study.technologies, vec!["Rust", "Axum"]);
        assert_eq!(study.image_url.as_deref(), Some("https://cdn.example.com/t.png"));
        assert_eq!(study.outcome.as_deref(), Some("Faster"));

        // Serialised with canonical names only
        let value = serde_json::to_value(&study).unwrap();
        assert_eq!(value["title"], "Legacy Title");
        assert!(value.get("projectTitle").is_none());
        assert!(value.get("thumbnail").is_none());
    }

    #[test]
    fn test_case_study_empty_legacy_title_falls_through() {
        let study: CaseStudy =
            serde_json::from_value(json!({"projectTitle": "  ", "name": "From name"})).unwrap();
        assert_eq!(study.title, "From name");
    }

    #[test]
    fn test_project_validation() {
        let mut project = Project {
            title: "  ".into(),
            ..Default::default()
        };
        project.normalize();
        assert!(project.validate().is_err());

        project.title = "Portfolio".into();
        project.live_url = Some("ftp://nope".into());
        assert!(project.validate().is_err());

        project.live_url = Some("https://example.com".into());
        project.image_url = Some("   ".into());
        project.normalize();
        assert!(project.image_url.is_none());
        assert!(project.validate().is_ok());
    }

    #[test]
    fn test_contact_message_validation() {
        let mut message = ContactMessage {
            name: "Ada".into(),
            email: "not-an-email".into(),
            message: "Hello".into(),
            ..Default::default()
        };
        assert!(message.validate().is_err());
        message.email = " ada@example.com ".into();
        message.normalize();
        assert!(message.validate().is_ok());
    }

    #[test]
    fn test_carousel_settings_defaults_and_clamp() {
        let mut settings: CarouselSettings =
            serde_json::from_value(json!({"intervalMs": 10})).unwrap();
        assert!(settings.autoplay);
        assert_eq!(settings.transition, Transition::Slide);
        settings.normalize();
        assert_eq!(settings.interval_ms, MIN_CAROUSEL_INTERVAL_MS);
    }

    #[test]
    fn test_ratings_and_levels() {
        let testimonial = Testimonial {
            name: "Grace".into(),
            content: "Great work".into(),
            rating: Some(6),
            ..Default::default()
        };
        assert!(testimonial.validate().is_err());

        let skill = Skill {
            name: "Rust".into(),
            level: Some(101),
            ..Default::default()
        };
        assert!(skill.validate().is_err());
    }

    #[test]
    fn test_carousel_image_active_by_default() {
        let image: CarouselImage =
            serde_json::from_value(json!({"imageUrl": "/uploads/a.png"})).unwrap();
        assert!(image.active);
        assert!(image.validate().is_ok());
    }

    #[test]
    fn test_timeline_type_field() {
        let entry: TimelineEntry = serde_json::from_value(json!({
            "title": "BSc", "startDate": "2018", "type": "education"
        }))
        .unwrap();
        assert_eq!(entry.kind, TimelineKind::Education);
        assert!(entry.validate().is_ok());

        let entry: TimelineEntry = serde_json::from_value(json!({
            "title": "Award", "startDate": "2020", "kind": "achievement"
        }))
        .unwrap();
        assert_eq!(entry.kind, TimelineKind::Achievement);
        assert_eq!(serde_json::to_value(&entry).unwrap()["type"], "achievement");
    }
}
