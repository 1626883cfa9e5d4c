/// Azure identity and container registry clients
pub mod cloud;
pub mod exchange;
pub mod models;
pub mod token;

pub use cloud::{CloudEnvironment, CloudError};
pub use exchange::{AcrTokenExchanger, ExchangeError, RegistryTokenExchanger};
pub use token::{ManagedIdentityCredential, ServicePrincipalCredential, TokenError, TokenSource};
