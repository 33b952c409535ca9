//! Gateway: HTTP surface and process wiring.
//!
//! Single port serves `GET /` (health) and `POST /send-message` (outbound send through the
//! session). `run_gateway` connects the session, starts the relay, and serves until shutdown.

mod server;

pub use server::{router, run_gateway, run_gateway_until, GatewayState, RunExit};
