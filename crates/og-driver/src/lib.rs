//! og Driver - Load test runtime
//!
//! Pulls requests from the aggregate supplier, signs them, submits them to
//! the HTTP client under admission control, and feeds request/response pairs
//! through the event dispatch into the object population, the multipart
//! state machine, statistics and the stopping conditions.

pub mod auth;
pub mod client;
pub mod driver;
pub mod events;
pub mod listeners;
pub mod scheduler;
pub mod stats;
pub mod stopping;

// Re-exports
pub use auth::AuthMode;
pub use client::{HttpClient, ReqwestClient};
pub use driver::{Driver, RunSummary};
pub use events::{EventDispatcher, EventListener, RequestEvent};
pub use listeners::{MultipartListener, StatsListener, StoreListener};
pub use scheduler::Scheduler;
pub use stats::Statistics;
pub use stopping::StoppingCondition;
