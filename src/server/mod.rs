pub mod http;

pub use http::{BoundServer, LogHooks, MediaServer, ServerHooks, DEFAULT_DRAIN_GRACE};
