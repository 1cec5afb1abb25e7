//! Core type definitions: client identity, flow descriptors and token sets

pub mod flow;
pub mod identity;
pub mod token;

pub use flow::{
    DEFAULT_DEVICE_POLL_INTERVAL, FlowDescriptor, FlowKind, join_scopes, parse_scopes,
};
pub use identity::ClientIdentity;
pub use token::TokenSet;
