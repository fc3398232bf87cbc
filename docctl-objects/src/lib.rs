//! # Document Objects
//!
//! Object store collaborator for uploaded document versions.
//!
//! ## Overview
//!
//! The docctl-objects crate handles:
//! - **Contract**: the [`ObjectStore`] trait the document lifecycle depends on
//! - **HTTP client**: [`HttpObjectStore`] for S3-compatible gateways
//! - **In-memory store**: [`MemoryObjectStore`] with failure injection
//! - **Keys and URLs**: collision-resistant object keys and public URLs
//! - **Bucket setup**: [`ensure_bucket`] with retry on transient failures
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐   put / make_public / remove   ┌──────────────────┐
//! │ Document lifecycle│ ─────────────────────────────▶ │  dyn ObjectStore │
//! └───────────────────┘                                └────────┬─────────┘
//!                                                   ┌───────────┴──────────┐
//!                                                   ▼                      ▼
//!                                          HttpObjectStore        MemoryObjectStore
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docctl_objects::{object_key, HttpObjectStore, ObjectStore, ObjectStoreConfig};
//!
//! async fn upload(pdf: Vec<u8>) -> Result<String, Box<dyn std::error::Error>> {
//!     let config = ObjectStoreConfig::from_env();
//!     let store = HttpObjectStore::new(config.clone())?;
//!
//!     let key = object_key("document-versions", "policy.pdf");
//!     store.put(&config.bucket, &key, pdf.into(), "application/pdf").await?;
//!     store.make_public(&config.bucket, &key).await?;
//!     Ok(key)
//! }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod memory;
pub mod retry;
pub mod store;

pub use config::{ConfigError, ObjectStoreConfig};
pub use error::{ObjectResult, ObjectStoreError};
pub use http::HttpObjectStore;
pub use memory::{MemoryObjectStore, StoredObject};
pub use store::{ensure_bucket, object_key, public_url, ObjectStore, Upload};
