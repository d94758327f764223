//! Typed clients for the platform functions, built on backbone channels.

pub mod api_client;
pub mod asset_client;
pub mod batch_client;
pub mod device_state_client;
pub mod error;
pub mod stream;
pub mod tenant_client;

pub use api_client::*;
pub use asset_client::*;
pub use batch_client::*;
pub use device_state_client::*;
pub use error::*;
pub use stream::*;
pub use tenant_client::*;
