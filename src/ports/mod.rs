pub mod capability_gate;
pub mod http_client;
pub mod token_source;

pub use capability_gate::CapabilityGate;
pub use http_client::{HttpClient, HttpClientError, HttpClientResult};
pub use token_source::{AccessToken, TokenError, TokenSource};
