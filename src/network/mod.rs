//! Network Layer
//!
//! WebSocket server for overlay displays and ingest clients.
//! All economy decisions run through `economy/`; this layer only routes.

pub mod auth;
pub mod broadcast;
pub mod protocol;
pub mod server;

pub use auth::{AuthConfig, AuthError, AdminIdentity, authorize_admin};
pub use broadcast::Broadcaster;
pub use protocol::{
    ClientMessage, OverlayEvent, PlayEvent, BonusEvent, ActionReceipt, ErrorCode,
};
pub use server::{OverlayServer, ServerConfig, ServerError};
