//! Extracts TikTok Business accounts, videos and comments as a stream of records.
//!
//! # Resource hierarchy
//!
//! The three resource types form a parent/child chain:
//!
//! - [`Resource::Accounts`]: one single-page request per configured business id.
//! - [`Resource::Videos`]: paginated, one sequence per account record.
//! - [`Resource::Comments`]: paginated, one sequence per video record (keyed by its `item_id`).
//!
//! [`Tap::run`] walks this chain depth-first: every parent record is handed to the [`Sink`]
//! before the child sequences it seeds are fetched.
//!
//! # Authentication
//!
//! All requests share one OAuth grant, managed by a single [`TokenManager`] that refreshes the
//! access token lazily and never has more than one refresh in flight.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use tap_tiktok_business::{Config, Context, Resource, TikTokClient};
//! use tokio_stream::StreamExt;
//!
//! # async fn example() -> eyre::Result<()> {
//! let config = Config::from_file("config.json").await?;
//! let client = TikTokClient::from_config(&config)?;
//!
//! let mut videos = std::pin::pin!(client.records(Resource::Videos, Context::for_business("b1")));
//! while let Some(video) = videos.next().await {
//!     let video = video?;
//!     println!("{:?} -> {:?}", video.record.get("item_id"), video.child_context);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod oauth;
pub mod pagination;
pub mod resource;
pub mod retry;
pub mod sink;
pub mod sync;

pub use client::{Emitted, TikTokClient};
pub use config::Config;
pub use context::{Context, Record};
pub use error::{Error, Result};
pub use oauth::{Credential, TokenManager};
pub use pagination::{Page, PagedStream};
pub use resource::{Cursor, Resource};
pub use retry::RetryPolicy;
pub use sink::{CollectingSink, JsonLinesSink, Sink};
pub use sync::{SyncFailure, SyncSummary, Tap};
