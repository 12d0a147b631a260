//! Database access for rdq-verify
//!
//! Queries over the shared tables created by `rdq_common::db::init_schema`.
//! Functions taking an `Executor` work against the pool or inside a
//! transaction (`&mut *tx`).

pub mod corrections;
pub mod resources;

pub use corrections::{corrections_for_resource, record_correction, CorrectionRecord};
pub use resources::{insert_resource, load_resource, resource_from_row, write_resource_state};
