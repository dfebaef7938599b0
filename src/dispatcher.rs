//! C4: the `Dispatcher` trait — the uniform, reference-counted, per-instance
//! mutex-protected resource API every handle ultimately resolves to.

use std::sync::Arc;

use bytes::Bytes;

use crate::awakable::Awakable;
use crate::error::{IpcResult, Status};
use crate::handle::Rights;
use crate::options::{DataPipeConsumerOptions, DataPipeProducerOptions, SharedBufferCreateOptions};
use crate::signals::{HandleSignalsState, Signals};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherType {
    MessagePipe,
    DataPipeProducer,
    DataPipeConsumer,
    SharedBuffer,
    PlatformHandle,
}

impl DispatcherType {
    /// The discriminator byte a serialized dispatcher's envelope carries
    /// (§9), so `Deserialize` knows which type's decode logic to run.
    pub fn type_tag(self) -> u8 {
        match self {
            DispatcherType::MessagePipe => 0,
            DispatcherType::DataPipeProducer => 1,
            DispatcherType::DataPipeConsumer => 2,
            DispatcherType::SharedBuffer => 3,
            DispatcherType::PlatformHandle => 4,
        }
    }

    pub fn from_type_tag(tag: u8) -> Option<DispatcherType> {
        match tag {
            0 => Some(DispatcherType::MessagePipe),
            1 => Some(DispatcherType::DataPipeProducer),
            2 => Some(DispatcherType::DataPipeConsumer),
            3 => Some(DispatcherType::SharedBuffer),
            4 => Some(DispatcherType::PlatformHandle),
            _ => None,
        }
    }
}

macro_rules! flag_set {
    ($name:ident { $($variant:ident = $value:expr),* $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(u32);

        impl $name {
            pub const NONE: $name = $name(0);
            $(pub const $variant: $name = $name($value);)*

            pub fn from_bits(bits: u32) -> $name {
                $name(bits)
            }

            pub fn bits(self) -> u32 {
                self.0
            }

            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

flag_set!(WriteMessageFlags {});
flag_set!(ReadMessageFlags {
    MAY_DISCARD = 1 << 0,
});
flag_set!(WriteDataFlags {
    ALL_OR_NONE = 1 << 0,
});
flag_set!(ReadDataFlags {
    ALL_OR_NONE = 1 << 0,
    DISCARD = 1 << 1,
    QUERY = 1 << 2,
    PEEK = 1 << 3,
});
flag_set!(MapBufferFlags {});

/// A framed message: an opaque payload plus any handles attached to it.
/// Attached dispatchers have already been through the transfer protocol
/// (§4.5) by the time a `Message` is constructed, so they are plain,
/// independently-owned dispatchers.
pub struct Message {
    pub bytes: Bytes,
    pub handles: Vec<Arc<dyn Dispatcher>>,
}

/// What `read_message` hands back to the caller.
pub struct ReadMessage {
    pub bytes: Bytes,
    pub handles: Vec<Arc<dyn Dispatcher>>,
}

/// Reported when a destination buffer can't hold a pending message; callers
/// use these to size a retry, per §7's "always written even on failure".
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredSizes {
    pub num_bytes: usize,
    pub num_handles: usize,
}

/// A mapped byte range: either a real shared-buffer `mmap` mapping, or (for
/// the data pipe's two-phase operations) a window directly into the pipe's
/// own fixed circular buffer. Both are raw-pointer based for the same
/// reason: the pointed-to memory outlives the lock that was held when the
/// pointer was computed, with a protocol flag (not the lock) guaranteeing
/// exclusivity for the lifetime of the mapping.
pub struct Mapping {
    base: *mut u8,
    len: usize,
}

// SAFETY: the pointer identifies memory this process owns or has mapped;
// the requirement to synchronize access to the pointed-to bytes is the
// caller's, the same way it would be for any other raw shared-memory API.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    /// # Safety
    /// `base` must be valid for reads and writes of `len` bytes for as long
    /// as the returned `Mapping` is alive, and nothing else may alias that
    /// range for the duration (enforced by the caller's protocol, e.g. a
    /// dispatcher's "two-phase active" flag or exclusive buffer ownership).
    pub unsafe fn new(base: *mut u8, len: usize) -> Mapping {
        Mapping { base, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.base, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.base, self.len) }
    }

    /// Exposes the base pointer for callers that must pass it to a foreign
    /// API (e.g. `munmap`); not needed by anything that only reads/writes
    /// through the safe slice accessors above.
    pub fn as_raw_ptr(&self) -> *mut u8 {
        self.base
    }
}

/// Type-erased, still-locked handle on a dispatcher mid handle-transfer.
/// Produced by [`Dispatcher::try_start_transport`]; the lock it represents
/// is released when this value is dropped (or consumed by
/// `create_equivalent_and_close`).
pub trait TransportHandle: Send {
    /// Replaces the locked dispatcher's secondary object with a fresh
    /// dispatcher and closes the original — both done while still holding
    /// the lock this transport represents.
    fn create_equivalent_and_close(&mut self) -> IpcResult<Arc<dyn Dispatcher>>;
}

pub struct Transport {
    pub rights: Rights,
    pub handle: Box<dyn TransportHandle>,
}

/// The uniform per-resource API. Every dispatcher owns its own mutex
/// (L2/L3) internally; methods here lock it as needed and return
/// `InvalidArgument` for entrypoints the concrete type doesn't support (as
/// well as for any call once `closed`).
pub trait Dispatcher: Send + Sync {
    fn dispatcher_type(&self) -> DispatcherType;

    /// Marks closed, cancels waiters, releases the resource. Idempotent
    /// calls after the first return `InvalidArgument`.
    fn close(&self) -> IpcResult<()>;

    fn write_message(&self, _bytes: Bytes, _transports: Vec<Transport>, _flags: WriteMessageFlags) -> IpcResult<()> {
        Err(Status::InvalidArgument)
    }

    /// `max_bytes`/`max_handles` cap the caller's destination buffers;
    /// `None` means unbounded. When the head message doesn't fit,
    /// `required_sizes` (if given) is always written with the sizes that
    /// would have fit, even though the call itself returns
    /// `RESOURCE_EXHAUSTED`.
    fn read_message(
        &self,
        _flags: ReadMessageFlags,
        _max_bytes: Option<usize>,
        _max_handles: Option<usize>,
        _required_sizes: Option<&mut RequiredSizes>,
    ) -> IpcResult<ReadMessage> {
        Err(Status::InvalidArgument)
    }

    fn write_data(&self, _bytes: &[u8], _flags: WriteDataFlags) -> IpcResult<usize> {
        Err(Status::InvalidArgument)
    }

    fn begin_write_data(&self, _min_bytes: usize) -> IpcResult<Mapping> {
        Err(Status::InvalidArgument)
    }

    fn end_write_data(&self, _num_bytes_written: usize) -> IpcResult<()> {
        Err(Status::InvalidArgument)
    }

    fn read_data(&self, _buf: &mut [u8], _flags: ReadDataFlags) -> IpcResult<usize> {
        Err(Status::InvalidArgument)
    }

    fn begin_read_data(&self, _min_bytes: usize) -> IpcResult<Mapping> {
        Err(Status::InvalidArgument)
    }

    fn end_read_data(&self, _num_bytes_read: usize) -> IpcResult<()> {
        Err(Status::InvalidArgument)
    }

    fn set_data_pipe_producer_options(&self, _options: DataPipeProducerOptions) -> IpcResult<()> {
        Err(Status::InvalidArgument)
    }

    fn get_data_pipe_producer_options(&self) -> IpcResult<DataPipeProducerOptions> {
        Err(Status::InvalidArgument)
    }

    fn set_data_pipe_consumer_options(&self, _options: DataPipeConsumerOptions) -> IpcResult<()> {
        Err(Status::InvalidArgument)
    }

    fn get_data_pipe_consumer_options(&self) -> IpcResult<DataPipeConsumerOptions> {
        Err(Status::InvalidArgument)
    }

    fn duplicate_buffer_handle(&self, _options: SharedBufferCreateOptions) -> IpcResult<Arc<dyn Dispatcher>> {
        Err(Status::InvalidArgument)
    }

    fn map_buffer(&self, _offset: usize, _num_bytes: usize, _flags: MapBufferFlags) -> IpcResult<Mapping> {
        Err(Status::InvalidArgument)
    }

    fn handle_signals_state(&self) -> HandleSignalsState;

    /// `AlreadyExists` if `mask` is already satisfied and not persistent;
    /// `FailedPrecondition` if `mask` is already unsatisfiable; otherwise
    /// registers the awakable and returns the state observed at
    /// registration time.
    fn add_awakable(
        &self,
        awakable: Arc<dyn Awakable>,
        mask: Signals,
        context: u64,
        persistent: bool,
    ) -> IpcResult<HandleSignalsState>;

    fn remove_awakable(&self, awakable: &Arc<dyn Awakable>, context: u64) -> HandleSignalsState;

    /// Non-blocking attempt to lock this dispatcher for handle transfer.
    /// Returns `None` if already locked elsewhere, closed, or mid a
    /// two-phase operation — any of which makes the handle `Busy` for
    /// transfer purposes (§4.5).
    fn try_start_transport(&self) -> Option<Box<dyn TransportHandle>>;
}
