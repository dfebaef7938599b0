//! C9: `SharedBufferDispatcher`. Grounded on Chromium Mojo's
//! `shared_buffer_dispatcher.cc`: a thin wrapper around a
//! `PlatformSharedBuffer` that supports duplication and mapping, with the
//! mapping itself tracked by `Core`'s mapping table rather than here.

use std::sync::Arc;

use tracing::trace;

use crate::awakable::Awakable;
use crate::channel::{PlatformHandle, SerializeSizes, SerializedDispatcher, Serializable};
use crate::dispatcher::{Dispatcher, DispatcherType, Mapping, MapBufferFlags, TransportHandle};
use crate::error::{IpcResult, Status};
use crate::options::SharedBufferCreateOptions;
use crate::platform::PlatformSharedBuffer;
use crate::signals::{HandleSignalsState, Signals};

use parking_lot::Mutex;

pub struct SharedBufferDispatcher {
    // L2: `None` once closed or transferred.
    buffer: Mutex<Option<Arc<PlatformSharedBuffer>>>,
}

impl SharedBufferDispatcher {
    pub fn new(buffer: PlatformSharedBuffer) -> Arc<dyn Dispatcher> {
        Arc::new(SharedBufferDispatcher { buffer: Mutex::new(Some(Arc::new(buffer))) })
    }

    fn wrap(buffer: Arc<PlatformSharedBuffer>) -> Arc<dyn Dispatcher> {
        Arc::new(SharedBufferDispatcher { buffer: Mutex::new(Some(buffer)) })
    }

    fn buffer(&self) -> IpcResult<Arc<PlatformSharedBuffer>> {
        self.buffer.lock().clone().ok_or(Status::InvalidArgument)
    }
}

impl Dispatcher for SharedBufferDispatcher {
    fn dispatcher_type(&self) -> DispatcherType {
        DispatcherType::SharedBuffer
    }

    fn close(&self) -> IpcResult<()> {
        self.buffer.lock().take().ok_or(Status::InvalidArgument)?;
        Ok(())
    }

    fn duplicate_buffer_handle(&self, _options: SharedBufferCreateOptions) -> IpcResult<Arc<dyn Dispatcher>> {
        let buffer = self.buffer()?;
        trace!("shared buffer handle duplicated");
        Ok(SharedBufferDispatcher::wrap(buffer))
    }

    fn map_buffer(&self, offset: usize, num_bytes: usize, _flags: MapBufferFlags) -> IpcResult<Mapping> {
        let buffer = self.buffer()?;
        let end = offset.checked_add(num_bytes).ok_or(Status::OutOfRange)?;
        if end > buffer.num_bytes() {
            return Err(Status::OutOfRange);
        }
        buffer.map(offset, num_bytes)
    }

    fn handle_signals_state(&self) -> HandleSignalsState {
        // Shared buffers carry no readiness signal of their own; every bit
        // is permanently unsatisfiable (no watchable state changes ever).
        HandleSignalsState::new(Signals::NONE, Signals::NONE)
    }

    fn add_awakable(
        &self,
        _awakable: Arc<dyn Awakable>,
        _mask: Signals,
        _context: u64,
        _persistent: bool,
    ) -> IpcResult<HandleSignalsState> {
        // No bit of `Signals` is ever satisfiable on a shared buffer, so any
        // non-empty mask is already permanently unsatisfiable.
        Err(Status::FailedPrecondition)
    }

    fn remove_awakable(&self, _awakable: &Arc<dyn Awakable>, _context: u64) -> HandleSignalsState {
        self.handle_signals_state()
    }

    fn try_start_transport(&self) -> Option<Box<dyn TransportHandle>> {
        let guard = self.buffer.try_lock()?;
        let buffer = guard.clone()?;
        Some(Box::new(SharedBufferTransport { buffer }))
    }
}

impl Serializable for SharedBufferDispatcher {
    fn start_serialize(&self) -> SerializeSizes {
        SerializeSizes { max_bytes: 8, max_platform_handles: 1 }
    }

    /// Writes `{num_bytes}` inline (§4.8); the buffer itself travels as the
    /// frame's one platform handle, passed outright if this was the last
    /// reference, duplicated otherwise.
    fn end_serialize_and_close(&self) -> IpcResult<SerializedDispatcher> {
        let buffer = self.buffer.lock().take().ok_or(Status::InvalidArgument)?;
        let num_bytes = buffer.num_bytes();
        let owned = match Arc::try_unwrap(buffer) {
            Ok(owned) => owned,
            Err(shared) => shared.duplicate_handle()?,
        };
        trace!(num_bytes, "shared buffer serialized");
        Ok(SerializedDispatcher {
            type_tag: DispatcherType::SharedBuffer.type_tag(),
            payload: (num_bytes as u64).to_le_bytes().to_vec(),
            platform_handles: vec![PlatformHandle::SharedBuffer(owned)],
        })
    }
}

/// `Deserialize` for `SharedBuffer` (§4.2 C10): the inverse of
/// `end_serialize_and_close` above.
pub(crate) fn deserialize(payload: &[u8], platform_handles: Vec<PlatformHandle>) -> IpcResult<Arc<dyn Dispatcher>> {
    let num_bytes_bytes: [u8; 8] = payload.get(0..8).and_then(|s| s.try_into().ok()).ok_or(Status::InvalidArgument)?;
    let num_bytes = u64::from_le_bytes(num_bytes_bytes) as usize;
    match platform_handles.into_iter().next() {
        Some(PlatformHandle::SharedBuffer(buffer)) if buffer.num_bytes() == num_bytes => {
            Ok(SharedBufferDispatcher::new(buffer))
        }
        _ => Err(Status::InvalidArgument),
    }
}

struct SharedBufferTransport {
    buffer: Arc<PlatformSharedBuffer>,
}

impl TransportHandle for SharedBufferTransport {
    fn create_equivalent_and_close(&mut self) -> IpcResult<Arc<dyn Dispatcher>> {
        Ok(SharedBufferDispatcher::wrap(self.buffer.clone()))
    }
}
