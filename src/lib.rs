pub mod config;
pub mod relay;
pub mod server;

pub use config::{Config, RelaySettings, ServerConfig};
pub use relay::{AttachOutcome, ClientInfo, RelayEvent, SignalingRelay};
pub use server::{AuthHandler, SignalingServer, WsQuery};
