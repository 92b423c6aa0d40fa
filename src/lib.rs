//! FastBrew - an accelerated client for Homebrew/Linuxbrew bottles.
//!
//! The library reads the upstream package catalog over HTTPS, keeps a
//! compressed local cache with a prefix-bucketed search index,
//! materializes bottles into the Cellar and exposes them through the
//! prefix symlink farm.
//!
//! # Architecture
//!
//! - **platform**: bottle tag detection and prefix discovery
//! - **http / retry**: pooled HTTP client and backoff policy
//! - **codec**: pooled zstd compression for cache artifacts
//! - **api / cache / index**: catalog access, on-disk cache, search index
//! - **resume / download**: resumable downloader with sidecar metadata
//! - **extract**: safe tar extraction into the Cellar
//! - **resolver / pipeline**: dependency closure and the four-phase install
//! - **symlink**: link farm with conflict tracking
//! - **cellar / outdated / doctor / cleanup**: local state inspection
//!
//! # Quick start
//!
//! ```no_run
//! use fastbrew::client::Client;
//!
//! # fn main() -> fastbrew::error::Result<()> {
//! let client = Client::new()?;
//! for pkg in fastbrew::cellar::list_installed(&client.cellar)? {
//!     println!("{} {}", pkg.name, pkg.version);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod cellar;
pub mod commands;
pub mod cleanup;
pub mod client;
pub mod codec;
pub mod config;
pub mod doctor;
pub mod download;
pub mod error;
pub mod extract;
pub mod http;
pub mod index;
pub mod outdated;
pub mod pipeline;
pub mod platform;
pub mod progress;
pub mod resolver;
pub mod resume;
pub mod retry;
pub mod services;
pub mod symlink;
pub mod tap;

pub use client::Client;
pub use error::{FastBrewError, Result};
