//! Headless client core for the inkframe image-generation / e-ink display
//! service.
//!
//! This crate intentionally exposes a small surface:
//! - a realtime WebSocket transport with automatic recovery
//! - a job status tracker that polls while a server-side job is running
//! - shared state stores mutated only through named operations
//! - an inbound message router with ordered listener delivery
//!
//! [`Session`] is the application root: it constructs the state objects and
//! wires the components, so nothing in the crate relies on ambient globals.

pub mod config;
pub mod error;
pub mod router;
pub mod session;
pub mod store;
pub mod tracker;
pub mod transport;

pub use inkframe_api_client as api;

pub use config::CoreConfig;
pub use error::{CoreError, Result};
pub use router::{InboundMessage, ListenerHandle, MessageListener, MessageRouter};
pub use session::Session;
pub use store::{ActionOutcome, ConnectionFlag, ImageStore, PromptStore};
pub use tracker::{JobTracker, StatusSource};
pub use transport::{TransportClient, TransportConfig, TransportState};
