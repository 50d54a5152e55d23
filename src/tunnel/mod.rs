//! Client side of the database tunnel: connection settings, credentials,
//! transport and the public `ping` / `submit` facade.

pub mod client;
pub mod connection;
pub mod credentials;
pub mod response;
pub mod transport;

pub use client::TunnelClient;
pub use connection::{ConnectionConfig, Credentials};
pub use credentials::credential_headers;
pub use response::{Response, Row};
pub use transport::{HttpOrigin, Origin, RequestDescriptor};
