//! Delivery layer: the HTTP tracker server and process signal handling.
pub mod http;
pub mod signals;
