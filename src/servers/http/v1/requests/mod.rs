//! Data structures and logic for parsing the tracker requests.
pub mod announce;
pub mod scrape;
