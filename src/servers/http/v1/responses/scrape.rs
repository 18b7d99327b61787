//! `Scrape` response for the HTTP tracker.
//!
//! The `files` dictionary is keyed by the raw 20-byte info hashes, so the
//! body is built as a raw [`serde_bencode::value::Value`] dictionary.
use std::collections::HashMap;

use serde_bencode::value::Value;

use crate::core::ScrapeData;

/// The `Scrape` response for the HTTP tracker.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct Bencoded {
    scrape_data: ScrapeData,
}

impl Bencoded {
    /// Returns the bencoded representation of the scrape data.
    #[must_use]
    pub fn body(&self) -> Vec<u8> {
        let mut files: HashMap<Vec<u8>, Value> = HashMap::new();

        for (info_hash, metadata) in &self.scrape_data.files {
            let mut stats: HashMap<Vec<u8>, Value> = HashMap::new();
            stats.insert(b"complete".to_vec(), Value::Int(i64::from(metadata.complete)));
            stats.insert(b"incomplete".to_vec(), Value::Int(i64::from(metadata.incomplete)));
            stats.insert(b"downloaded".to_vec(), Value::Int(i64::from(metadata.downloaded)));
            stats.insert(b"downloaders".to_vec(), Value::Int(i64::from(metadata.downloaders)));

            files.insert(info_hash.bytes().to_vec(), Value::Dict(stats));
        }

        let mut dict: HashMap<Vec<u8>, Value> = HashMap::new();
        dict.insert(b"files".to_vec(), Value::Dict(files));

        serde_bencode::to_bytes(&Value::Dict(dict)).expect("a scrape dictionary is always bencodable")
    }
}

impl From<ScrapeData> for Bencoded {
    fn from(scrape_data: ScrapeData) -> Self {
        Self { scrape_data }
    }
}

#[cfg(test)]
mod tests {
    use helix_tracker_primitives::info_hash::InfoHash;
    use helix_tracker_primitives::swarm_metadata::SwarmMetadata;

    use super::Bencoded;
    use crate::core::ScrapeData;

    fn sample_scrape_data() -> ScrapeData {
        let mut scrape_data = ScrapeData::empty();
        scrape_data.add_file(
            &InfoHash([0x69; 20]),
            SwarmMetadata {
                complete: 1,
                incomplete: 3,
                downloaded: 2,
                downloaders: 4,
            },
        );
        scrape_data
    }

    #[test]
    fn it_should_be_bencoded_with_all_four_counters() {
        let response = Bencoded::from(sample_scrape_data());

        let bytes = response.body();

        // cspell:disable-next-line
        let expected = b"d5:filesd20:iiiiiiiiiiiiiiiiiiiid8:completei1e10:downloadedi2e11:downloadersi4e10:incompletei3eeee";

        assert_eq!(
            String::from_utf8_lossy(&bytes),
            String::from_utf8_lossy(expected.as_slice())
        );
    }

    #[test]
    fn an_empty_scrape_has_an_empty_files_dictionary() {
        let response = Bencoded::from(ScrapeData::empty());

        assert_eq!(response.body(), b"d5:filesdee".to_vec());
    }
}
