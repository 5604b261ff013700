//! QuadFS Client - talks to the gateway on behalf of users
//!
//! Every call opens its own connection, mirroring how the gateway treats
//! its storage nodes.

pub mod gateway;

pub use gateway::{GatewayClient, archive_file_name};
