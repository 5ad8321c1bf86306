//! Selection vocabulary: what to fetch and for which window.

pub mod asset_class;
pub mod bucket;
pub mod frequency;
pub mod period;
pub mod source;

pub use asset_class::AssetClass;
pub use bucket::Bucket;
pub use frequency::{Frequency, Granularity};
pub use period::{parse_timestamp, Bound, Period};
pub use source::Source;
