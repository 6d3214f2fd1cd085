//! HTTP client for the run tracking service.
//!
//! Implements [`foldwise_core::RunService`] over the service's JSON API:
//!
//! - paginated run listings with the "no results" answer mapped to
//!   [`ServiceError::NoResults`](foldwise_core::ServiceError::NoResults)
//! - strict run description and trace retrieval
//! - flow and setup existence checks
//! - run upload
//!
//! # Quick Start
//!
//! ```no_run
//! use foldwise_client::ServiceClient;
//! use foldwise_core::{run_exists, RunService};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = ServiceClient::from_env()?;
//! let duplicates = run_exists(&client, 31, 5).await?;
//! println!("{} existing runs", duplicates.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `FOLDWISE_SERVER_URL` | Service base URL (default: `https://tracking.foldwise.dev/api/v1/json`) |
//! | `FOLDWISE_API_KEY` | API key |
//! | `FOLDWISE_TIMEOUT` | Request timeout in seconds (default: 60) |
//! | `FOLDWISE_MAX_RETRIES` | Max retries for transient failures (default: 3) |
//! | `FOLDWISE_LIST_BATCH_SIZE` | Listing page size (default: 10000) |

pub mod client;
pub mod config;

pub use client::{ServiceClient, CLIENT_USER_AGENT};
pub use config::ServiceConfig;
