//! Delivery pipeline: bounded queue, background consumer, observer fan-out.

pub mod delivery;
pub mod registry;
pub mod stats;

pub use delivery::{DeliveryMode, DeliveryPipeline, PipelineOptions};
pub use registry::ObserverRegistry;
pub use stats::PipelineStats;
