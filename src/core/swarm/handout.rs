//! Peer handout algorithms.
//!
//! The sequential algorithm walks a category's endpoint list with a
//! fractional cursor that works like a leaky-bucket credit meter: each
//! request adds its (possibly fractional, ratio-capped) share to the cursor,
//! and endpoints are emitted only once the cursor overtakes `next_handout`.
//! In steady state every endpoint is handed out at most once per pass over
//! the list, and fractional remainders carry across announces.
//!
//! A uniformly random start index with a contiguous wrap-around run is kept
//! as a selectable alternative.
use std::str::FromStr;

use rand::Rng;

use super::endpoints::{CompactEndpoint, EndpointTable};

/// Which handout algorithm a swarm uses to pick peers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    #[default]
    Sequential,
    Random,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Self::Sequential),
            "random" => Ok(Self::Random),
            other => Err(format!("not a valid peer selection algorithm: {other}")),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Sequential => write!(f, "sequential"),
            Strategy::Random => write!(f, "random"),
        }
    }
}

impl<R: CompactEndpoint> EndpointTable<R> {
    /// Emits up to `count` endpoints (fractional counts accumulate) into
    /// `out`, advancing the cursor. Returns the number emitted.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
    pub fn sequential(&mut self, count: f64, out: &mut Vec<u8>) -> usize {
        let num_peers = self.len();
        if num_peers == 0 {
            return 0;
        }
        let count = count.min(num_peers as f64);

        self.cursor += count;
        if self.cursor < self.next_handout as f64 {
            // the rate-limit window has not opened yet
            return 0;
        }
        let hand_out = self.cursor.ceil() as usize - self.next_handout;
        if self.next_handout >= num_peers {
            // wrap, keeping the cursor/next_handout difference and the
            // fractional part of the cursor
            self.cursor -= num_peers as f64;
            self.next_handout -= num_peers;
        }

        let start = self.next_handout % num_peers;
        let emitted = self.emit_at(start, hand_out, out);
        self.next_handout += hand_out;

        debug_assert!(self.cursor <= self.next_handout as f64 || self.cursor > (num_peers - 1) as f64);

        emitted
    }

    /// Emits up to `count` contiguous endpoints starting at a uniformly
    /// random index, wrapping at the end of the list.
    pub fn random<G: Rng>(&self, count: usize, rng: &mut G, out: &mut Vec<u8>) -> usize {
        let num_peers = self.len();
        if num_peers == 0 {
            return 0;
        }
        let start = rng.gen_range(0..num_peers);
        self.emit_at(start, count.min(num_peers), out)
    }

    /// Appends `count` packed endpoints beginning at `start`, wrapping at the
    /// end of the list. Never emits an endpoint twice per call.
    fn emit_at(&self, start: usize, count: usize, out: &mut Vec<u8>) -> usize {
        let num_peers = self.len();
        if num_peers == 0 {
            return 0;
        }

        let first_run = count.min(num_peers - start);
        for index in start..start + first_run {
            out.extend_from_slice(self.record(index).as_bytes());
        }
        let mut emitted = first_run;

        if first_run < count {
            let wrapped_run = (count - first_run).min(start);
            for index in 0..wrapped_run {
                out.extend_from_slice(self.record(index).as_bytes());
            }
            emitted += wrapped_run;
        }

        emitted
    }
}
