pub mod error;
pub mod gateway;
pub mod model;
pub mod provider;
pub mod registry;

pub use error::ProviderError;
pub use gateway::{Gateway, GatewayOutcome};
pub use model::*;
pub use provider::LlmProvider;
pub use registry::{FactoryError, ProviderConfig, ProviderRegistry};
