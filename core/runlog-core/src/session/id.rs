//! Session id generation.
//!
//! Format: `YYYYMMDD-HHMMSS-xxxxxxxx`, a UTC second timestamp followed by 32
//! random bits in hex. The timestamp prefix sorts lexicographically in creation
//! order, so "most recent N" never needs file metadata.

use chrono::{DateTime, Utc};
use rand::RngCore;

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

pub fn generate_id() -> String {
    generate_id_at(Utc::now())
}

pub fn generate_id_at(now: DateTime<Utc>) -> String {
    let mut random = rand::thread_rng();
    format!("{}-{:08x}", now.format(TIMESTAMP_FORMAT), random.next_u32())
}
