//! Zaprelay core library: WhatsApp session access, backend relay, and the HTTP gateway
//! used by the CLI.

pub mod backend;
pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;
pub mod relay;
