//! Client-side session layer for a four-person realtime chat room.
//!
//! SYSTEM CONTEXT
//! ==============
//! The backend exposes `POST /login`, `GET /health` and a WebSocket endpoint
//! at `/ws?username=<identity>`. This crate signs a user in, keeps one
//! WebSocket session alive with a bounded retry budget, and maintains the
//! ordered, de-duplicated window of messages the UI renders.
//!
//! [`session::SessionManager`] is the synchronous state machine;
//! [`driver::SessionHandle`] runs it on tokio against a real transport.

pub mod api;
pub mod compose;
pub mod config;
pub mod driver;
pub mod history;
pub mod message;
pub mod session;

pub use api::{ApiClient, ApiError, HealthStatus, LoginResponse};
pub use compose::{Credentials, DraftError, MissingCredentials, validate_credentials, validate_draft};
pub use config::{ConfigError, Deployment, Endpoint, SessionConfig};
pub use driver::SessionHandle;
pub use history::{MAX_PARTICIPANTS, MessageHistory};
pub use message::{ChatMessage, MessageKind, Notice};
pub use session::{ConnectionStatus, SessionError, SessionManager, SessionSnapshot};
