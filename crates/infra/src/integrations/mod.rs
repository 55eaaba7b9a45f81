//! External service integrations

pub mod external_api;

pub use external_api::HttpGateway;
