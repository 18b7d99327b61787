//! Version `v1` of the HTTP tracker: query parsing, request and response
//! types, extractors, application services, handlers and routes.
pub mod extractors;
pub mod handlers;
pub mod query;
pub mod requests;
pub mod responses;
pub mod routes;
pub mod services;
