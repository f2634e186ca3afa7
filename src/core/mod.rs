pub mod error;
pub mod headers;
pub mod normalizer;
pub mod query;
pub mod registry;
pub mod translator;

pub use error::{ProxyError, ProxyResult};
pub use normalizer::normalize;
pub use query::{OutboundQuery, QueryParams};
pub use registry::{DatasetDescriptor, DatasetRegistry, RegistryError};
pub use translator::{Backend, Credential, InboundRequest, Mode, OutboundCall, Translator};
