/*!
# Portfolio Backend

REST backend for a personal portfolio website, built in Rust with axum.

## Overview

The site shows projects, case studies, skills, testimonials, a career timeline
and a homepage image carousel. Visitors can search the content and send contact
messages; a single administrator edits everything through authenticated routes.

## Architecture

### Storage Layer
- Every collection is held in memory and written through to a JSON file in the
  data directory
- A Firebase Realtime Database can be configured as a remote copy; it is read
  on startup and written after every change, and the local files take over
  whenever it is unreachable
- Gzip-compressed JSON backups of all content can be exported and restored

### Service Layer
- **Auth**: Argon2-hashed admin account, in-memory session tokens, password
  reset codes sent by email
- **Media**: uploads are sniffed with the `image` crate and stored on
  Cloudinary, ImageKit or the local disk
- **Notifications**: in-memory feed for the dashboard plus an email to the
  owner for each contact message
- **Search**: weighted substring matching over the public collections
- **Cache**: TTL cache of public JSON responses, dropped on every write
- **Analytics**: in-process visitor counters

### HTTP Layer
- Public read routes, contact form, search and analytics events
- Admin routes behind the `require_admin` middleware
- CORS, request body limit, request tracing and graceful shutdown

## Modules

- **config**: environment configuration
- **error**: error type and JSON error responses
- **models**: content records and validation
- **store**: JSON collections with the remote mirror
- **firebase**: Realtime Database REST client
- **login**: admin account, sessions and auth routes
- **mailer**: SMTP delivery
- **notifications**: admin notification feed
- **media**: image hosts and upload routes
- **search**: site search
- **cache**: response cache
- **analytics**: visitor analytics
- **downloader**: contact message export (CSV, XLSX)
- **saving**: backup and restore
- **content**: CRUD routes
- **app**: shared state, routing and server startup
*/

pub mod analytics;
pub mod app;
pub mod cache;
pub mod config;
pub mod content;
pub mod downloader;
pub mod error;
pub mod firebase;
pub mod login;
pub mod mailer;
pub mod media;
pub mod models;
pub mod notifications;
pub mod saving;
pub mod search;
pub mod store;

pub use app::{AppState, build_router, run};
pub use config::Config;
pub use error::{AppError, AppJson, AppResult, ErrorResponse};
pub use store::Store;
