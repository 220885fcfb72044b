//! HTTP API endpoints

pub mod health;
pub mod inspect;
pub mod jobs;

pub use health::health_routes;
pub use inspect::inspect_routes;
pub use jobs::job_routes;
