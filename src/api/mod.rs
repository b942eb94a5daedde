//! API module
//!
//! This module provides the API functionality for autopm,
//! including the server and the client the CLI talks through.

pub mod client;
pub mod server;

// Re-export commonly used types
pub use client::{Client, ClientConfig, ClientError};
pub use server::{router, serve, ApiResponse, AppState, ServerConfig};
