//! # locshare-client
//!
//! The trust-and-delivery core of locshare:
//!
//! - [`identity`]: key generation, persistence and key-id derivation
//! - [`auth`]: challenge/response handshake that turns a key pair into a
//!   bearer token
//! - [`groups`]: group listing and verified, cached recipient keys
//! - [`fanout`]: one location sample encrypted and posted per group
//! - [`retrieval`]: recent updates fetched and decrypted into markers
//! - [`scheduler`]: the two recurring loops driving fan-out and retrieval
//!
//! Every operation hangs off a [`Session`], which carries the secret store,
//! the crypto engine and the server API explicitly.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod fanout;
pub mod groups;
pub mod http;
pub mod identity;
pub mod retrieval;
pub mod scheduler;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use api::ServerApi;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use events::{EventBus, PipelineEvent};
pub use fanout::{FanoutOutcome, FanoutReport};
pub use http::HttpServerApi;
pub use retrieval::RetrievalReport;
pub use scheduler::{FixedPosition, PositionSource, Scheduler, SchedulerHandle};
pub use session::{AuthContext, Credentials, Session};
