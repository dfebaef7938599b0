//! C7: `MessagePipe` and `MessagePipeDispatcher`. Grounded on Chromium
//! Mojo's `message_pipe_dispatcher.cc`: two endpoints, each either `Local`
//! (messages land in a queue immediately) or `Proxy` (stands in for an
//! endpoint that lives across a channel this crate doesn't implement — see
//! the Non-goals in §1). Only the local/local pairing is exercised here; the
//! proxy variant exists so the type models the full state machine §4.6
//! describes, even though no real channel backs it.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use crate::awakable::Awakable;
use crate::channel::{PlatformHandle, SerializeSizes, SerializedDispatcher, Serializable};
use crate::dispatcher::{
    Dispatcher, DispatcherType, Message, ReadMessage, ReadMessageFlags, RequiredSizes, Transport,
    TransportHandle, WriteMessageFlags,
};
use crate::error::{IpcResult, Status};
use crate::signals::{HandleSignalsState, Signals};

use parking_lot::Mutex;

/// Which side of the pipe a port is on. `Proxy` ports have no local queue:
/// writes to them would cross a channel, which this crate does not
/// implement, so they return `FailedPrecondition` (the peer cannot be
/// reached through this process).
#[derive(Clone, Copy, PartialEq, Eq)]
enum PortKind {
    Local,
    Proxy,
}

struct Port {
    kind: PortKind,
    queue: VecDeque<Message>,
    peer_closed: bool,
    awakables: crate::awakable::AwakableList,
}

impl Port {
    fn new(kind: PortKind) -> Port {
        Port { kind, queue: VecDeque::new(), peer_closed: false, awakables: crate::awakable::AwakableList::new() }
    }

    fn signals(&self) -> HandleSignalsState {
        let mut satisfied = Signals::WRITABLE;
        let mut satisfiable = Signals::READABLE | Signals::WRITABLE | Signals::PEER_CLOSED;
        if !self.queue.is_empty() {
            satisfied |= Signals::READABLE;
        }
        if self.peer_closed {
            satisfied |= Signals::PEER_CLOSED;
            satisfied.remove(Signals::WRITABLE);
            if self.queue.is_empty() {
                satisfiable.remove(Signals::READABLE);
            }
            satisfiable.remove(Signals::WRITABLE);
        }
        HandleSignalsState::new(satisfied, satisfiable)
    }
}

/// The secondary object shared by a message pipe pair. Each side has its own
/// `Port`: writing to side 0 enqueues on side 1's port (what side 1 reads
/// from) and vice versa.
pub struct MessagePipe {
    ports: Mutex<[Port; 2]>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Zero,
    One,
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::Zero => Side::One,
            Side::One => Side::Zero,
        }
    }

    fn index(self) -> usize {
        match self {
            Side::Zero => 0,
            Side::One => 1,
        }
    }
}

impl MessagePipe {
    fn new(kind0: PortKind, kind1: PortKind) -> Arc<MessagePipe> {
        Arc::new(MessagePipe { ports: Mutex::new([Port::new(kind0), Port::new(kind1)]) })
    }

    fn write_message(&self, side: Side, message: Message) -> IpcResult<()> {
        let mut ports = self.ports.lock();
        let other = side.other();
        if ports[side.index()].peer_closed {
            return Err(Status::FailedPrecondition);
        }
        if ports[other.index()].kind == PortKind::Proxy {
            return Err(Status::FailedPrecondition);
        }
        ports[other.index()].queue.push_back(message);
        let signals = ports[other.index()].signals();
        ports[other.index()].awakables.on_state_change(signals);
        trace!("message pipe: message delivered");
        Ok(())
    }

    /// An empty queue is always `ShouldWait`/`FailedPrecondition` regardless
    /// of flags; `MAY_DISCARD` only changes what happens when a message is
    /// present but doesn't fit the caller's buffers (pop-and-discard it
    /// instead of leaving it at the head for a retry).
    fn read_message(
        &self,
        side: Side,
        flags: ReadMessageFlags,
        max_bytes: Option<usize>,
        max_handles: Option<usize>,
        required_sizes: Option<&mut RequiredSizes>,
    ) -> IpcResult<ReadMessage> {
        let mut ports = self.ports.lock();
        let port = &mut ports[side.index()];
        let head = match port.queue.front() {
            Some(msg) => msg,
            None => {
                return if port.peer_closed { Err(Status::FailedPrecondition) } else { Err(Status::ShouldWait) };
            }
        };
        let sizes = RequiredSizes { num_bytes: head.bytes.len(), num_handles: head.handles.len() };
        let too_small =
            max_bytes.is_some_and(|cap| sizes.num_bytes > cap) || max_handles.is_some_and(|cap| sizes.num_handles > cap);
        if let Some(out) = required_sizes {
            *out = sizes;
        }
        if too_small {
            if flags.contains(ReadMessageFlags::MAY_DISCARD) {
                port.queue.pop_front();
            }
            return Err(Status::ResourceExhausted);
        }
        let msg = port.queue.pop_front().expect("front() returned Some above");
        Ok(ReadMessage { bytes: msg.bytes, handles: msg.handles })
    }

    fn close(&self, side: Side) {
        let mut ports = self.ports.lock();
        ports[side.index()].awakables.cancel_and_remove_all();
        let other = side.other();
        ports[other.index()].peer_closed = true;
        let signals = ports[other.index()].signals();
        ports[other.index()].awakables.on_state_change(signals);
    }

    fn signals(&self, side: Side) -> HandleSignalsState {
        self.ports.lock()[side.index()].signals()
    }

    fn add_awakable(
        &self,
        side: Side,
        awakable: Arc<dyn Awakable>,
        mask: Signals,
        context: u64,
        persistent: bool,
    ) -> IpcResult<HandleSignalsState> {
        let mut ports = self.ports.lock();
        let current = ports[side.index()].signals();
        if current.satisfies(mask) && !persistent {
            return Err(Status::AlreadyExists);
        }
        if !current.can_satisfy(mask) {
            return Err(Status::FailedPrecondition);
        }
        ports[side.index()].awakables.add(awakable, mask, context, persistent);
        Ok(current)
    }

    fn remove_awakable(&self, side: Side, awakable: &Arc<dyn Awakable>, context: u64) -> HandleSignalsState {
        let mut ports = self.ports.lock();
        ports[side.index()].awakables.remove(false, awakable, context);
        ports[side.index()].signals()
    }
}

/// Dispatcher wrapper for one side of a message pipe.
pub struct MessagePipeDispatcher {
    // The dispatcher's own (L2) lock: `None` once closed or transferred away.
    inner: Mutex<Option<(Arc<MessagePipe>, Side)>>,
}

impl MessagePipeDispatcher {
    fn new(pipe: Arc<MessagePipe>, side: Side) -> MessagePipeDispatcher {
        MessagePipeDispatcher { inner: Mutex::new(Some((pipe, side))) }
    }

    fn state(&self) -> IpcResult<(Arc<MessagePipe>, Side)> {
        self.inner.lock().clone().ok_or(Status::InvalidArgument)
    }
}

impl Dispatcher for MessagePipeDispatcher {
    fn dispatcher_type(&self) -> DispatcherType {
        DispatcherType::MessagePipe
    }

    fn close(&self) -> IpcResult<()> {
        let (pipe, side) = self.inner.lock().take().ok_or(Status::InvalidArgument)?;
        pipe.close(side);
        Ok(())
    }

    fn write_message(&self, bytes: Bytes, transports: Vec<Transport>, _flags: WriteMessageFlags) -> IpcResult<()> {
        let (pipe, side) = self.state()?;
        let mut handles = Vec::with_capacity(transports.len());
        for mut transport in transports {
            handles.push(transport.handle.create_equivalent_and_close()?);
        }
        pipe.write_message(side, Message { bytes, handles })
    }

    fn read_message(
        &self,
        flags: ReadMessageFlags,
        max_bytes: Option<usize>,
        max_handles: Option<usize>,
        required_sizes: Option<&mut RequiredSizes>,
    ) -> IpcResult<ReadMessage> {
        let (pipe, side) = self.state()?;
        pipe.read_message(side, flags, max_bytes, max_handles, required_sizes)
    }

    fn handle_signals_state(&self) -> HandleSignalsState {
        match self.state() {
            Ok((pipe, side)) => pipe.signals(side),
            Err(_) => HandleSignalsState::default(),
        }
    }

    fn add_awakable(
        &self,
        awakable: Arc<dyn Awakable>,
        mask: Signals,
        context: u64,
        persistent: bool,
    ) -> IpcResult<HandleSignalsState> {
        let (pipe, side) = self.state()?;
        pipe.add_awakable(side, awakable, mask, context, persistent)
    }

    fn remove_awakable(&self, awakable: &Arc<dyn Awakable>, context: u64) -> HandleSignalsState {
        match self.state() {
            Ok((pipe, side)) => pipe.remove_awakable(side, awakable, context),
            Err(_) => HandleSignalsState::default(),
        }
    }

    fn try_start_transport(&self) -> Option<Box<dyn TransportHandle>> {
        let guard = self.inner.try_lock()?;
        let (pipe, side) = guard.clone()?;
        Some(Box::new(MessagePipeTransport { pipe, side }))
    }
}

impl Serializable for MessagePipeDispatcher {
    fn start_serialize(&self) -> SerializeSizes {
        SerializeSizes { max_bytes: 0, max_platform_handles: 1 }
    }

    /// No inline payload of its own: the equivalent dispatcher `Core`'s
    /// transfer protocol already knows how to build
    /// (`try_start_transport`/`create_equivalent_and_close`) is carried
    /// through whole as the frame's one platform handle.
    fn end_serialize_and_close(&self) -> IpcResult<SerializedDispatcher> {
        let mut transport = self.try_start_transport().ok_or(Status::Busy)?;
        let equivalent = transport.create_equivalent_and_close()?;
        Ok(SerializedDispatcher {
            type_tag: DispatcherType::MessagePipe.type_tag(),
            payload: Vec::new(),
            platform_handles: vec![PlatformHandle::Dispatcher(equivalent)],
        })
    }
}

struct MessagePipeTransport {
    pipe: Arc<MessagePipe>,
    side: Side,
}

impl TransportHandle for MessagePipeTransport {
    fn create_equivalent_and_close(&mut self) -> IpcResult<Arc<dyn Dispatcher>> {
        // The underlying port (queue, peer-closed flag, awakables) carries
        // over untouched; only the dispatcher object handle changes.
        Ok(Arc::new(MessagePipeDispatcher::new(self.pipe.clone(), self.side)))
    }
}

/// Both endpoints live in this process: the common case exercised by the
/// test suite and by any two handles created via `Core::create_message_pipe`.
pub fn create_local_local() -> (Arc<dyn Dispatcher>, Arc<dyn Dispatcher>) {
    let pipe = MessagePipe::new(PortKind::Local, PortKind::Local);
    let d0: Arc<dyn Dispatcher> = Arc::new(MessagePipeDispatcher::new(pipe.clone(), Side::Zero));
    let d1: Arc<dyn Dispatcher> = Arc::new(MessagePipeDispatcher::new(pipe, Side::One));
    (d0, d1)
}

/// One endpoint stands in for a peer this process can't reach directly.
/// Modeled for completeness with §4.6's port state machine; this crate's
/// Non-goals exclude an actual cross-process channel, so the proxy side
/// always reports `FailedPrecondition` on use.
pub fn create_local_proxy() -> Arc<dyn Dispatcher> {
    let pipe = MessagePipe::new(PortKind::Local, PortKind::Proxy);
    Arc::new(MessagePipeDispatcher::new(pipe, Side::Zero))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::WriteMessageFlags;

    #[test]
    fn basic_write_then_read_roundtrips() {
        let (a, b) = create_local_local();
        a.write_message(Bytes::from_static(b"hello"), Vec::new(), WriteMessageFlags::NONE).unwrap();
        let msg = b.read_message(ReadMessageFlags::NONE, None, None, None).unwrap();
        assert_eq!(&msg.bytes[..], b"hello");
    }

    #[test]
    fn read_with_empty_queue_is_should_wait() {
        let (_a, b) = create_local_local();
        assert_eq!(b.read_message(ReadMessageFlags::NONE, None, None, None).err(), Some(Status::ShouldWait));
    }

    #[test]
    fn read_may_discard_on_empty_queue_is_still_should_wait() {
        // MAY_DISCARD only changes the too-small-buffer case; an empty queue
        // is ShouldWait/FailedPrecondition unconditionally.
        let (_a, b) = create_local_local();
        assert_eq!(
            b.read_message(ReadMessageFlags::MAY_DISCARD, None, None, None).err(),
            Some(Status::ShouldWait)
        );
    }

    #[test]
    fn read_too_small_buffer_reports_required_sizes_and_leaves_message_queued() {
        let (a, b) = create_local_local();
        a.write_message(Bytes::from_static(b"hello"), Vec::new(), WriteMessageFlags::NONE).unwrap();
        let mut sizes = RequiredSizes::default();
        let err = b.read_message(ReadMessageFlags::NONE, Some(1), None, Some(&mut sizes));
        assert_eq!(err.err(), Some(Status::ResourceExhausted));
        assert_eq!(sizes.num_bytes, 5);
        assert_eq!(sizes.num_handles, 0);
        // Without MAY_DISCARD the message stays at the head for a retry.
        let msg = b.read_message(ReadMessageFlags::NONE, None, None, None).unwrap();
        assert_eq!(&msg.bytes[..], b"hello");
    }

    #[test]
    fn read_too_small_buffer_with_may_discard_drops_the_message() {
        let (a, b) = create_local_local();
        a.write_message(Bytes::from_static(b"hello"), Vec::new(), WriteMessageFlags::NONE).unwrap();
        let err = b.read_message(ReadMessageFlags::MAY_DISCARD, Some(1), None, None);
        assert_eq!(err.err(), Some(Status::ResourceExhausted));
        assert_eq!(b.read_message(ReadMessageFlags::NONE, None, None, None).err(), Some(Status::ShouldWait));
    }

    #[test]
    fn serialize_then_deserialize_preserves_pipe_state() {
        use crate::channel::{deserialize, Channel, LoopbackChannel};

        let pipe = MessagePipe::new(PortKind::Local, PortKind::Local);
        let local: Arc<dyn Dispatcher> = Arc::new(MessagePipeDispatcher::new(pipe.clone(), Side::Zero));
        let remote = MessagePipeDispatcher::new(pipe, Side::One);

        let frame = remote.end_serialize_and_close().unwrap();
        assert_eq!(frame.type_tag, DispatcherType::MessagePipe.type_tag());

        let (a, b) = LoopbackChannel::pair();
        a.send(frame.payload, frame.platform_handles).unwrap();
        let (payload, platform_handles) = b.recv().unwrap();
        let restored = deserialize(frame.type_tag, &payload, platform_handles).unwrap();

        local.write_message(Bytes::from_static(b"ping"), Vec::new(), WriteMessageFlags::NONE).unwrap();
        let received = restored.read_message(ReadMessageFlags::NONE, None, None, None).unwrap();
        assert_eq!(&received.bytes[..], b"ping");
    }

    #[test]
    fn closing_peer_surfaces_peer_closed_signal() {
        let (a, b) = create_local_local();
        a.close().unwrap();
        let state = b.handle_signals_state();
        assert!(state.satisfies(Signals::PEER_CLOSED));
    }

    #[test]
    fn write_after_peer_closed_is_failed_precondition() {
        let (a, b) = create_local_local();
        b.close().unwrap();
        assert_eq!(
            a.write_message(Bytes::new(), Vec::new(), WriteMessageFlags::NONE),
            Err(Status::FailedPrecondition)
        );
    }

    #[test]
    fn message_pipe_handle_attachment_transfers_ownership() {
        let (inner_a, inner_b) = create_local_local();
        let (outer_a, outer_b) = create_local_local();
        let transport = inner_b.try_start_transport().unwrap();
        outer_a
            .write_message(
                Bytes::from_static(b"carrying a handle"),
                vec![Transport { rights: crate::handle::Rights::ALL, handle: transport }],
                WriteMessageFlags::NONE,
            )
            .unwrap();
        let received = outer_b.read_message(ReadMessageFlags::NONE, None, None, None).unwrap();
        assert_eq!(received.handles.len(), 1);
        received.handles[0].write_message(Bytes::from_static(b"ping"), Vec::new(), WriteMessageFlags::NONE).unwrap();
        let ping = inner_a.read_message(ReadMessageFlags::NONE, None, None, None).unwrap();
        assert_eq!(&ping.bytes[..], b"ping");
    }
}
