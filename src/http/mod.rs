//! The HTTP side of the mock: route matching, request validation and
//! response synthesis, plus the interfaces the handler reports through.

pub mod body;
pub mod builder;
pub mod decode;
pub mod event;
pub mod handler;
#[cfg(feature = "hyper")]
pub mod hyper;
pub mod metrics;
pub mod security;
pub mod sniff;
pub mod store;

/// Request extension naming the base path a listener mounted the service
/// under. Takes precedence over the path of the first server url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePath(pub String);
