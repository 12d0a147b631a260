//! HTTP API handlers for rdq-verify

pub mod health;
pub mod review;
pub mod runs;
pub mod verify;

pub use health::health_routes;
pub use review::{next_review_candidate, submit_correction};
pub use runs::list_runs;
pub use verify::verify_resource;
