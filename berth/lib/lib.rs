//! `berth` is a deployment and lifecycle engine for self-hosted apps running on a
//! compose-compatible container engine.
//!
//! # Overview
//!
//! berth turns an app's compose manifest into running containers and keeps a durable
//! record of the result. It handles:
//! - Manifest resolution across install, catalog, and filesystem tiers
//! - Manifest sanitization before engine execution
//! - A multi-stage deployment pipeline with streamed progress
//! - Container detection and primary-container selection
//! - Rollback-capable updates and trash-based uninstall
//!
//! berth is not a container runtime. Process isolation, networking, and image storage
//! are delegated to an external engine CLI (`docker`, `podman`, or compatible); berth
//! drives it and owns the durable state around it.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use berth::{
//!     config::{DeployOptions, Settings},
//!     management::AppManager,
//!     progress::LogSink,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::resolve_home()?;
//!     let manager = AppManager::connect(settings, Arc::new(LogSink)).await?;
//!
//!     let options = DeployOptions::builder().app_id("nextcloud").build();
//!     let outcome = manager.deploy(options).await;
//!     assert!(outcome.success, "{:?}", outcome.error);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Settings, deploy options, and compose manifest types
//! - [`engine`] - Container engine CLI adapter
//! - [`management`] - Deployment, lifecycle, uninstall, inventory, persistence
//! - [`progress`] - Progress events and sinks
//! - [`utils`] - Common utilities and helpers

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod cli;
pub mod config;
pub mod engine;
pub mod management;
pub mod progress;
pub mod utils;

pub use error::*;
