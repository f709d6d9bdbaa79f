extern crate serde;
#[macro_use]
extern crate serde_derive;

pub mod cache;
pub mod drain_worker;
pub mod event_slot;
pub mod frame;
pub mod resolver;
pub mod ringbuffer;
pub mod session;
pub mod sink;
pub mod stop_signal;
pub mod task;
pub mod util;
pub mod wire;

pub use cache::FrameEventCache;
pub use frame::{FrameDescriptor, MethodId, ThreadId};
pub use resolver::{FrameResolver, MethodTable, ResolveError};
pub use ringbuffer::{DrainStats, Ringbuffer, RingbufferError};
pub use session::configuration::Configuration;
pub use session::{Session, SessionError};
pub use sink::{LogSink, MemorySink, Sink, WriterSink};
pub use stop_signal::StopSignal;
pub use wire::{StackReassembler, WireRecord};

/// Installs `env_logger` when built with the `debug` feature. No-op otherwise.
pub fn init_logger() {
    #[cfg(feature = "debug")]
    {
        let _ = env_logger::builder()
            .format_timestamp(None)
            .format_module_path(false)
            .try_init();
    }
}
