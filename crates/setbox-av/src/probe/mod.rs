//! Source probing: report parsing, sidecar overrides and the descriptor
//! cache.

pub mod cache;
pub mod prober;
pub mod report;
pub mod sidecar;

pub use cache::DescriptorCache;
pub use prober::SourceProbe;
pub use report::parse_report;
