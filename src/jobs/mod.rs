//! Built-in job handlers.

mod endpoint;

pub use endpoint::EndpointPollJob;
