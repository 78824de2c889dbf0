//! GCP API interaction module
//!
//! This module provides the low-level plumbing for talking to Google Cloud
//! Platform APIs: authentication, the HTTP client and URL construction.
//!
//! # Module Structure
//!
//! - [`auth`] - GCP authentication using Application Default Credentials
//! - [`client`] - Main GCP client for making Compute Engine API requests
//! - [`http`] - HTTP utilities for REST API calls
//!
//! # Example
//!
//! ```ignore
//! use psclink::gcp::client::GcpClient;
//! use psclink::resource::Scope;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = GcpClient::new("my-project").await?;
//!     let networks = client.get(&client.compute_scoped_url(&Scope::Global, "networks")).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
