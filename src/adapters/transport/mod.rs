//! Transport adapters.

mod in_memory;

pub use in_memory::{
    memory_transport, MemoryClient, MemoryFrameReceiver, MemoryFrameSender, TransportEvent,
};
