//! HTTP and WebSocket surface for the dockhand orchestrator.

pub mod auth;
pub mod relay;
pub mod server;
pub mod ws;
pub mod ws_protocol;

pub use auth::{AuthClient, Bearer};
pub use relay::{TerminalFrame, TerminalRelay};
pub use server::{build_router, GatewayState};
pub use ws_protocol::WsMessage;
