//! The HTTP tracker server.
//!
//! The announce and scrape endpoints speak the `BitTorrent` HTTP tracker
//! protocol (bencoded bodies, HTTP 200 even for failures); the control and
//! statistics endpoints are plain text.
pub mod percent_encoding;
pub mod server;
pub mod v1;
