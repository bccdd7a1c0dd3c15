pub mod middleware;
pub mod queue;
pub mod tracing;
