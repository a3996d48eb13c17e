//! `portfolio` - Backend for a personal portfolio site
//!
//! This library provides page-view tracking (a per-page counter plus a log of
//! individual visits), a token-protected stats view, and a contact form relay
//! that forwards messages to the site owner by email.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod mail;
pub mod metadata;
pub mod model;
pub mod server;
pub mod storage;
pub mod views;

pub use config::Config;
pub use connection::{ConnectionManager, Database};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use mail::{ContactMessage, ContactRelay, MailProvider};
pub use metadata::{derive_client_metadata, ClientMetadata};
pub use model::{PageViewCounter, ViewLogEntry, ViewStats};
pub use storage::{Storage, StorageSummary};
pub use views::ViewTracker;
