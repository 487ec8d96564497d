//! # skill-compose
//!
//! Async client and chat engine for the Skill Compose agent platform.
//!
//! ## Overview
//!
//! `skill-compose` drives agent conversations over the platform's
//! server-sent event streams and wraps its JSON API. The chat engine is
//! transport-agnostic: the host supplies where messages live and how turns
//! run, and the engine turns a stream of agent events into incremental
//! message state with mid-turn steering, stop and session restoration.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skill_compose::{ApiClient, ChatEngine, ChatStore, ChatSurface, ClientConfig};
//! use skill_compose::{HttpStreamAdapter, MemorySessionStore, SessionSlot};
//! use std::sync::Arc;
//!
//! # async fn example() -> skill_compose::Result<()> {
//! let client = ApiClient::new(&ClientConfig::default().with_env()?)?;
//! let adapter = Arc::new(HttpStreamAdapter::published(client, "agent-1"));
//! let slot = SessionSlot::open(
//!     ChatSurface::PublishedAgent("agent-1".into()),
//!     Arc::new(MemorySessionStore::default()),
//! )?;
//!
//! let engine = ChatEngine::new(Arc::new(ChatStore::new()), adapter.clone(), slot)
//!     .with_session_source(adapter);
//! engine.mount().await;
//! engine.submit(Some("Summarize today's tickets")).await?;
//! engine.wait().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **ChatEngine**: turn lifecycle (submit, steer, stop, respond, restore)
//! - **MessageAdapter** / **StreamAdapter** / **SessionSource**: host seams
//! - **ApiClient**: typed platform API (agents, tasks, channels, auth)
//! - **SessionSlot**: per-surface session id persisted in a `SessionStore`
//! - **Translator**: locale bundles for UI strings and display names

pub mod adapter;
pub mod auth;
pub mod client;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod i18n;
pub mod poller;
pub mod restore;
pub mod schedule;
pub mod session;
pub mod sse;
pub mod store;
pub mod types;

// Re-export core types
pub use adapter::{EventStream, MessageAdapter, NoSessions, SessionSource, StreamAdapter};
pub use auth::{AuthData, AuthState};
pub use client::stream::ChatEndpoint;
pub use client::ApiClient;
pub use config::ClientConfig;
pub use engine::{ChatEngine, SubmitOutcome, TurnPhase};
pub use error::{ClientError, Result};
pub use i18n::Translator;
pub use poller::{AdapterStatus, AdapterStatusPoller, AdapterStatusSource};
pub use schedule::{CronExpression, Schedule, ScheduleType};
pub use session::{ChatSurface, FileSessionStore, MemorySessionStore, SessionSlot, SessionStore};
pub use store::ChatStore;
pub use types::{
    ApiResponseMode, ChatMessage, EventKind, Role, SessionRecord, StreamEventRecord, SyncResponse,
    TurnRequest, UploadedFile, WireEvent,
};

// Re-export adapters for convenience
pub use adapter::http::HttpStreamAdapter;
pub use adapter::scripted::{LiveFeed, ScriptedAdapter};
