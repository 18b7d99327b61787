//! Application services on top of the core tracker: they orchestrate one
//! request each and decouple the axum handlers from the domain layer.
pub mod announce;
pub mod peer_ip_resolver;
pub mod scrape;
