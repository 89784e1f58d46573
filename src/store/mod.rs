//! Persistence of scraped product snapshots.

pub mod snapshot;

pub use snapshot::write_json;
