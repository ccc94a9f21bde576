//! Confluence Cloud target for redmig.
//!
//! - [`storage`] turns a [`ContentTree`](redmig_markup::ContentTree) into
//!   storage-format XHTML;
//! - [`ConfluenceClient`] talks to the v2 page API;
//! - [`ConfluenceTarget`] adapts the client to the publication sequencer;
//! - [`WikiImporter`] builds pages from an export directory and publishes
//!   them parent-first.
//!
//! # Example
//!
//! ```ignore
//! let client = ConfluenceClient::new(&conf.base_url, &conf.user, &conf.api_token, None);
//! let space = client.get_space(&conf.space_key)?;
//! let importer = WikiImporter::from_config(&store, &config)?;
//! let target = ConfluenceTarget::new(&client, &space.id, importer.titles().clone());
//! let pages = importer.prepare()?;
//! let report = importer.publish(&target, &pages, space.homepage_id.clone())?;
//! ```

mod client;
mod error;
mod importer;
pub mod storage;
mod target;
mod types;

pub use client::ConfluenceClient;
pub use error::ConfluenceError;
pub use importer::{PreparedPage, WikiImporter};
pub use storage::to_storage;
pub use target::ConfluenceTarget;
pub use types::Space;
