//! `Channel` (§6, §4.2 C10): cross-process framing. Real wire transport is
//! out of scope (§1); this is an in-memory loopback sufficient to exercise
//! the `StartSerialize`/`EndSerializeAndClose`/`Deserialize` path end to end
//! without a real socket.

use std::sync::Arc;

use crate::dispatcher::{Dispatcher, DispatcherType};
use crate::error::{IpcResult, Status};
use crate::platform::PlatformSharedBuffer;

/// An index into a frame's accompanying [`PlatformHandle`] vector, the way a
/// serialized payload refers to a handle it doesn't carry inline (mirrors
/// Mojo channel messages referring to attached platform handles by position).
pub type PlatformHandleIndex = usize;

/// A platform resource carried alongside a frame's inline bytes. A real
/// channel would carry an fd here (e.g. via `SCM_RIGHTS`); this loopback has
/// no process boundary to cross, so it carries the in-process object a real
/// implementation would reconstruct the dispatcher's secondary object from.
pub enum PlatformHandle {
    SharedBuffer(PlatformSharedBuffer),
    Dispatcher(Arc<dyn Dispatcher>),
}

/// Minimal framing contract a dispatcher's serialize/deserialize pair needs.
/// A real implementation would hand these bytes to a socket; this one hands
/// them straight to a paired `Channel` in the same process.
pub trait Channel: Send + Sync {
    fn send(&self, bytes: Vec<u8>, platform_handles: Vec<PlatformHandle>) -> IpcResult<()>;
    fn recv(&self) -> IpcResult<(Vec<u8>, Vec<PlatformHandle>)>;
}

type Frame = (Vec<u8>, Vec<PlatformHandle>);
type Queue = Arc<parking_lot::Mutex<std::collections::VecDeque<Frame>>>;

/// Two `Channel` endpoints wired directly to each other's queues, for tests
/// and for proxy message-pipe endpoints that have no real peer process.
pub struct LoopbackChannel {
    outbox: Queue,
    inbox: Queue,
}

impl LoopbackChannel {
    pub fn pair() -> (Arc<LoopbackChannel>, Arc<LoopbackChannel>) {
        let a_to_b: Queue = Arc::new(parking_lot::Mutex::new(std::collections::VecDeque::new()));
        let b_to_a: Queue = Arc::new(parking_lot::Mutex::new(std::collections::VecDeque::new()));
        // a sends into a_to_b and reads from b_to_a; b is the mirror image,
        // so each endpoint's outbox is literally the other's inbox.
        let a = Arc::new(LoopbackChannel { outbox: a_to_b.clone(), inbox: b_to_a.clone() });
        let b = Arc::new(LoopbackChannel { outbox: b_to_a, inbox: a_to_b });
        (a, b)
    }
}

impl Channel for LoopbackChannel {
    fn send(&self, bytes: Vec<u8>, platform_handles: Vec<PlatformHandle>) -> IpcResult<()> {
        self.outbox.lock().push_back((bytes, platform_handles));
        Ok(())
    }

    fn recv(&self) -> IpcResult<(Vec<u8>, Vec<PlatformHandle>)> {
        self.inbox.lock().pop_front().ok_or(Status::ShouldWait)
    }
}

/// Serialization envelope written by `EndSerializeAndClose` and consumed by
/// `Deserialize`, per the discriminator-byte design note in §9.
pub struct SerializedDispatcher {
    pub type_tag: u8,
    pub payload: Vec<u8>,
    pub platform_handles: Vec<PlatformHandle>,
}

/// Upper bounds a dispatcher reports before it actually serializes, so the
/// caller can size its destination buffer (mirrors `StartSerialize`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializeSizes {
    pub max_bytes: usize,
    pub max_platform_handles: usize,
}

/// Implemented per concrete dispatcher type; `Core`'s transfer path calls
/// this only once a dispatcher's reference count has dropped to one (the
/// transport protocol in §4.5 guarantees that for anything actually sent).
pub trait Serializable: Dispatcher {
    fn start_serialize(&self) -> SerializeSizes;
    fn end_serialize_and_close(&self) -> IpcResult<SerializedDispatcher>;
}

/// `Deserialize` (§4.2 C10): reconstructs a dispatcher from a
/// `SerializedDispatcher`'s parts, keyed by the type tag `EndSerializeAndClose`
/// wrote. Dispatches to each concrete type's own decode logic.
pub fn deserialize(
    dispatcher_type_tag: u8,
    payload: &[u8],
    platform_handles: Vec<PlatformHandle>,
) -> IpcResult<Arc<dyn Dispatcher>> {
    let dispatcher_type = DispatcherType::from_type_tag(dispatcher_type_tag).ok_or(Status::InvalidArgument)?;
    match dispatcher_type {
        DispatcherType::SharedBuffer => crate::shared_buffer::deserialize(payload, platform_handles),
        DispatcherType::MessagePipe | DispatcherType::DataPipeProducer | DispatcherType::DataPipeConsumer => {
            // These types have no inline wire format of their own: the
            // equivalent dispatcher `EndSerializeAndClose` built is carried
            // through whole, the same way a handle-transfer's
            // `CreateEquivalentAndClose` output is carried through the
            // handle table rather than re-encoded.
            let mut handles = platform_handles.into_iter();
            match handles.next() {
                Some(PlatformHandle::Dispatcher(dispatcher)) => Ok(dispatcher),
                _ => Err(Status::InvalidArgument),
            }
        }
        DispatcherType::PlatformHandle => Err(Status::Unimplemented),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_channel_delivers_across_endpoints() {
        let (a, b) = LoopbackChannel::pair();
        a.send(b"hello".to_vec(), Vec::new()).unwrap();
        let (bytes, handles) = b.recv().unwrap();
        assert_eq!(bytes, b"hello");
        assert!(handles.is_empty());
        assert_eq!(b.recv().err(), Some(Status::ShouldWait));
    }

    #[test]
    fn deserialize_rejects_unknown_type_tag() {
        assert_eq!(deserialize(255, &[], Vec::new()).err(), Some(Status::InvalidArgument));
    }
}
