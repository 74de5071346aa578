//! Pika Gallery Service
//!
//! Photo gallery backend for Pika. Signed-in users upload photos tagged with a
//! location, browse them grouped by calendar date, page through them in a
//! full-image or story viewer, and export any subset as a single zip archive.
//!
//! ## Features
//!
//! - **Catalog Queries**: Owner, starred and free-text filters over image
//!   records in PostgreSQL, validated into domain records at the boundary
//! - **Multi-File Upload**: Bytes go to S3-compatible object storage, then one
//!   catalog record per file, with a configurable partial-failure policy
//! - **Date Grouping**: Images bucketed by the caller's local calendar date,
//!   newest first
//! - **Viewers**: Cyclic manual paging and a timer-driven story player whose
//!   timer task is cancelled on every exit path
//! - **Bulk Export**: Parallel, all-or-nothing fetch packed into one zip
//!
//! ## Architecture
//!
//! ```text
//! HTTP API (axum)
//! ┌──────────────┐      ┌──────────────┐       ┌──────────────┐
//! │ Session      │─────▶│ Identity     │       │ PostgreSQL   │
//! │ Extractor    │      │ Provider     │       │ images       │
//! └──────────────┘      └──────────────┘       │ profiles     │
//!        │                                     │ albums       │
//!        ▼                                     └──────────────┘
//! ┌──────────────┐      ┌──────────────┐              ▲
//! │ Gallery      │─────▶│ Catalog      │──────────────┘
//! │ View         │      │ Store        │
//! └──────────────┘      └──────────────┘
//!    │        │                ▲
//!    │        ▼                │
//!    │  ┌──────────────┐ ┌──────────────┐      ┌──────────────┐
//!    │  │ Grouping     │ │ Uploader     │─────▶│ S3 Object    │
//!    │  │ Selection    │ └──────────────┘      │ Store        │
//!    │  └──────────────┘                       └──────────────┘
//!    ▼
//! ┌──────────────┐
//! │ Exporter     │──▶ zip attachment
//! └──────────────┘
//! ```

pub mod albums;
pub mod api;
pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod export;
pub mod gallery;
pub mod grouping;
pub mod models;
pub mod object_store;
pub mod selection;
pub mod session;
pub mod story_player;
pub mod subscription;
pub mod upload;
pub mod viewer;

pub use albums::{Album, AlbumRepository, NewAlbum};
pub use api::{create_router, start_api_server, AppState};
pub use catalog::{CatalogStore, ImageFilter, ImageQuery, ImageRepository, ImageSort};
pub use config::Config;
pub use dashboard::{Dashboard, DashboardService, DashboardStats};
pub use export::{ExportArchive, Exporter, HttpImageFetcher, ImageFetcher};
pub use gallery::GalleryView;
pub use grouping::{group_by_date, DateGroup};
pub use models::{ImageId, ImageRecord, Profile};
pub use object_store::{ObjectStore, S3ObjectStore};
pub use selection::SelectionSet;
pub use session::{HttpIdentity, IdentityProvider, Session};
pub use story_player::{play, StoryHandle, StoryState, STORY_TICK};
pub use subscription::{HttpCheckout, PaymentProvider, Plan, StorageUsage, Tier};
pub use upload::{UploadFile, Uploader};
pub use viewer::{ManualViewer, Sequencer, StoryViewer, ViewerCommand};
