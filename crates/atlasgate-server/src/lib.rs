//! Asset gateway for sprite frames, static resources and proxied remote assets.
//!
//! [`Gateway`] answers virtual-protocol URLs such as
//! `pet://local/1/actions/run?petId=1&action=run&frame=Frame_0.png`;
//! [`GatewayServer`] exposes it over local HTTP.

pub mod error;
pub mod gateway;
pub mod response;
pub mod server;
pub mod static_files;

pub use error::GatewayError;
pub use gateway::{DEFAULT_PRELOAD_ACTIONS, Gateway, GatewayConfig, GatewayStats, Scheme};
pub use server::{GatewayServer, ServerConfig, virtual_url};
pub use static_files::StaticFiles;
