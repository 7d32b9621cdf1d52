// Frame transforms and the partitioned video pipeline

pub mod orchestrator;
pub mod palette;
pub mod part_worker;
pub mod partition;
pub mod pixelate;
pub mod transform;
pub mod types;
