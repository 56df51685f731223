//! # Entities
//!
//! Mutable, identity-bearing objects with lifecycle: the pipeline state
//! machine, the health-tracking row, and the Supervisor's table record.

pub mod managed_pipeline_record;
pub mod pipeline_health;
pub mod pipeline_state;

pub use managed_pipeline_record::ManagedPipelineRecord;
pub use pipeline_health::PipelineHealth;
pub use pipeline_state::PipelineState;
