//! # Ports
//!
//! Inbound API trait and the outbound collaborator traits.

pub mod inbound;
pub mod outbound;

pub use inbound::ThreadAdapterApi;
pub use outbound::{
    EventCodec, LocalChangeListener, LocalStore, RecordStream, ThreadEvent, ThreadNetwork,
};
