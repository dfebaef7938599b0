//! C8: `DataPipe`, the circular-buffer byte stream, and its two dispatcher
//! wrappers. Grounded on `data_pipe_producer_dispatcher.cc`/
//! `data_pipe_consumer_dispatcher.cc`'s `MOJO_GUARDED_BY(mutex())` split: the
//! pipe owns its own mutex (L3); each dispatcher owns a thinner mutex (L2)
//! that guards only whether it still holds a reference to the pipe.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::awakable::{Awakable, AwakableList};
use crate::channel::{PlatformHandle, SerializeSizes, SerializedDispatcher, Serializable};
use crate::dispatcher::{
    Dispatcher, DispatcherType, Mapping, ReadDataFlags, TransportHandle, WriteDataFlags,
};
use crate::error::{IpcResult, Status};
use crate::options::{DataPipeConsumerOptions, DataPipeProducerOptions};
use crate::signals::{HandleSignalsState, Signals};

#[derive(Clone, Copy)]
struct TwoPhaseRegion {
    start_pos: usize,
    reported_len: usize,
}

struct State {
    element_size: usize,
    capacity_bytes: usize,
    buffer: Vec<u8>,
    head: usize,
    count: usize,
    producer_open: bool,
    consumer_open: bool,
    producer_two_phase: Option<TwoPhaseRegion>,
    consumer_two_phase: Option<TwoPhaseRegion>,
    write_threshold_bytes: usize,
    read_threshold_bytes: usize,
    producer_awakables: AwakableList,
    consumer_awakables: AwakableList,
}

impl State {
    fn effective_write_threshold(&self) -> usize {
        if self.write_threshold_bytes == 0 { self.element_size } else { self.write_threshold_bytes }
    }

    fn effective_read_threshold(&self) -> usize {
        if self.read_threshold_bytes == 0 { self.element_size } else { self.read_threshold_bytes }
    }

    fn producer_signals(&self) -> HandleSignalsState {
        if !self.consumer_open {
            return HandleSignalsState::new(Signals::PEER_CLOSED, Signals::PEER_CLOSED);
        }
        let free = self.capacity_bytes - self.count;
        let mut satisfied = Signals::NONE;
        if self.producer_two_phase.is_none() && free >= self.element_size {
            satisfied |= Signals::WRITABLE;
        }
        if free >= self.effective_write_threshold() {
            satisfied |= Signals::WRITE_THRESHOLD;
        }
        let satisfiable = Signals::WRITABLE | Signals::WRITE_THRESHOLD | Signals::PEER_CLOSED;
        HandleSignalsState::new(satisfied, satisfiable)
    }

    fn consumer_signals(&self) -> HandleSignalsState {
        let mut satisfied = Signals::NONE;
        let mut satisfiable = Signals::READABLE | Signals::READ_THRESHOLD | Signals::PEER_CLOSED;
        if self.consumer_two_phase.is_none() && self.count >= self.element_size {
            satisfied |= Signals::READABLE;
        }
        if !self.producer_open {
            satisfied |= Signals::PEER_CLOSED;
            if self.count == 0 {
                satisfiable.remove(Signals::READABLE);
            }
        }
        if self.count >= self.effective_read_threshold() {
            satisfied |= Signals::READ_THRESHOLD;
        }
        HandleSignalsState::new(satisfied, satisfiable)
    }

    fn notify(&mut self) {
        let p = self.producer_signals();
        let c = self.consumer_signals();
        self.producer_awakables.on_state_change(p);
        self.consumer_awakables.on_state_change(c);
    }

    /// Contiguous free run available for a write starting at the current
    /// write position, capped by one wrap-around boundary.
    fn contiguous_free_run(&self) -> (usize, usize) {
        let free = self.capacity_bytes - self.count;
        let write_pos = (self.head + self.count) % self.capacity_bytes;
        let run = free.min(self.capacity_bytes - write_pos);
        (write_pos, run)
    }

    /// Contiguous occupied run available for a read starting at `head`.
    fn contiguous_occupied_run(&self) -> (usize, usize) {
        let run = self.count.min(self.capacity_bytes - self.head);
        (self.head, run)
    }
}

/// The secondary object shared by a data pipe's producer and consumer
/// dispatchers. Never references either dispatcher back (design note in
/// §9): notifications are raised against its own two `AwakableList`s only.
pub struct DataPipe {
    state: Mutex<State>,
}

impl DataPipe {
    pub fn create(element_size: usize, capacity_bytes: usize) -> Arc<DataPipe> {
        assert!(element_size >= 1);
        assert!(capacity_bytes % element_size == 0);
        Arc::new(DataPipe {
            state: Mutex::new(State {
                element_size,
                capacity_bytes,
                buffer: vec![0u8; capacity_bytes],
                head: 0,
                count: 0,
                producer_open: true,
                consumer_open: true,
                producer_two_phase: None,
                consumer_two_phase: None,
                write_threshold_bytes: 0,
                read_threshold_bytes: 0,
                producer_awakables: AwakableList::new(),
                consumer_awakables: AwakableList::new(),
            }),
        })
    }

    /// Convenience used by tests and by `Core::create_data_pipe`: build a
    /// fresh pipe and wrap both ends in their dispatchers immediately.
    pub fn into_dispatchers(self: Arc<Self>) -> (Arc<dyn Dispatcher>, Arc<dyn Dispatcher>) {
        let producer: Arc<dyn Dispatcher> = Arc::new(DataPipeProducerDispatcher::new(self.clone()));
        let consumer: Arc<dyn Dispatcher> = Arc::new(DataPipeConsumerDispatcher::new(self));
        (producer, consumer)
    }

    fn producer_close(&self) {
        let mut state = self.state.lock();
        if state.producer_open {
            state.producer_open = false;
            state.producer_two_phase = None;
            state.producer_awakables.cancel_and_remove_all();
            state.notify();
        }
    }

    fn consumer_close(&self) {
        let mut state = self.state.lock();
        if state.consumer_open {
            state.consumer_open = false;
            state.consumer_two_phase = None;
            state.consumer_awakables.cancel_and_remove_all();
            state.notify();
        }
    }

    fn producer_write_data(&self, bytes: &[u8], flags: WriteDataFlags) -> IpcResult<usize> {
        let mut state = self.state.lock();
        if !state.consumer_open {
            return Err(Status::FailedPrecondition);
        }
        if state.producer_two_phase.is_some() {
            return Err(Status::FailedPrecondition);
        }
        if bytes.len() % state.element_size != 0 {
            return Err(Status::InvalidArgument);
        }
        let free = state.capacity_bytes - state.count;
        let all_or_none = flags.contains(WriteDataFlags::ALL_OR_NONE);
        if all_or_none && bytes.len() > free {
            return Err(Status::OutOfRange);
        }
        let to_write = bytes.len().min(free);
        if to_write == 0 {
            return if bytes.is_empty() { Ok(0) } else { Err(Status::ShouldWait) };
        }
        let write_pos = (state.head + state.count) % state.capacity_bytes;
        let first_run = to_write.min(state.capacity_bytes - write_pos);
        state.buffer[write_pos..write_pos + first_run].copy_from_slice(&bytes[..first_run]);
        if first_run < to_write {
            let remaining = to_write - first_run;
            state.buffer[..remaining].copy_from_slice(&bytes[first_run..to_write]);
        }
        state.count += to_write;
        state.notify();
        Ok(to_write)
    }

    fn producer_begin_write_data(&self) -> IpcResult<Mapping> {
        let mut state = self.state.lock();
        if !state.consumer_open {
            return Err(Status::FailedPrecondition);
        }
        if state.producer_two_phase.is_some() {
            return Err(Status::FailedPrecondition);
        }
        let (start_pos, run) = state.contiguous_free_run();
        if run == 0 {
            return Err(Status::ShouldWait);
        }
        state.producer_two_phase = Some(TwoPhaseRegion { start_pos, reported_len: run });
        state.notify();
        // SAFETY: `buffer` is fixed-length for the pipe's lifetime, so this
        // pointer stays valid; `producer_two_phase` being `Some` blocks any
        // other write into `[start_pos, start_pos+run)` until `end_write_data`.
        let base = unsafe { state.buffer.as_mut_ptr().add(start_pos) };
        Ok(unsafe { Mapping::new(base, run) })
    }

    fn producer_end_write_data(&self, num_bytes_written: usize) -> IpcResult<()> {
        let mut state = self.state.lock();
        let region = match state.producer_two_phase.take() {
            Some(r) => r,
            None => return Err(Status::FailedPrecondition),
        };
        let result = if num_bytes_written > region.reported_len
            || num_bytes_written % state.element_size != 0
        {
            Err(Status::InvalidArgument)
        } else {
            state.count += num_bytes_written;
            Ok(())
        };
        state.notify();
        result
    }

    fn consumer_read_data(&self, buf: &mut [u8], flags: ReadDataFlags) -> IpcResult<usize> {
        let mut state = self.state.lock();
        let discard = flags.contains(ReadDataFlags::DISCARD);
        let query = flags.contains(ReadDataFlags::QUERY);
        let peek = flags.contains(ReadDataFlags::PEEK);
        if (discard as u8 + query as u8 + peek as u8) > 1 {
            return Err(Status::InvalidArgument);
        }
        if state.consumer_two_phase.is_some() {
            return Err(Status::FailedPrecondition);
        }
        if query {
            return Ok(state.count);
        }
        let requested = buf.len();
        if requested % state.element_size != 0 {
            return Err(Status::InvalidArgument);
        }
        let all_or_none = flags.contains(ReadDataFlags::ALL_OR_NONE);
        if all_or_none && requested > state.count {
            return Err(Status::OutOfRange);
        }
        let to_read = requested.min(state.count);
        if to_read == 0 {
            return if requested == 0 {
                Ok(0)
            } else if state.producer_open {
                Err(Status::ShouldWait)
            } else {
                Err(Status::FailedPrecondition)
            };
        }
        if !discard {
            let first_run = to_read.min(state.capacity_bytes - state.head);
            let head = state.head;
            buf[..first_run].copy_from_slice(&state.buffer[head..head + first_run]);
            if first_run < to_read {
                let remaining = to_read - first_run;
                buf[first_run..to_read].copy_from_slice(&state.buffer[..remaining]);
            }
        }
        if !peek {
            state.head = (state.head + to_read) % state.capacity_bytes;
            state.count -= to_read;
            state.notify();
        }
        Ok(to_read)
    }

    fn consumer_begin_read_data(&self) -> IpcResult<Mapping> {
        let mut state = self.state.lock();
        if state.consumer_two_phase.is_some() {
            return Err(Status::FailedPrecondition);
        }
        let (start_pos, run) = state.contiguous_occupied_run();
        if run == 0 {
            return if state.producer_open { Err(Status::ShouldWait) } else { Err(Status::FailedPrecondition) };
        }
        state.consumer_two_phase = Some(TwoPhaseRegion { start_pos, reported_len: run });
        state.notify();
        // SAFETY: see `producer_begin_write_data`; the occupied region is
        // disjoint from whatever the producer may concurrently be writing.
        let base = unsafe { state.buffer.as_mut_ptr().add(start_pos) };
        Ok(unsafe { Mapping::new(base, run) })
    }

    fn consumer_end_read_data(&self, num_bytes_read: usize) -> IpcResult<()> {
        let mut state = self.state.lock();
        let region = match state.consumer_two_phase.take() {
            Some(r) => r,
            None => return Err(Status::FailedPrecondition),
        };
        let result = if num_bytes_read > region.reported_len || num_bytes_read % state.element_size != 0 {
            Err(Status::InvalidArgument)
        } else {
            state.head = (region.start_pos + num_bytes_read) % state.capacity_bytes;
            state.count -= num_bytes_read;
            Ok(())
        };
        state.notify();
        result
    }
}

/// Dispatcher wrapper for the producer (write) end.
pub struct DataPipeProducerDispatcher {
    // `None` once closed — this is the dispatcher's own (L2) mutex, guarding
    // only the reference, not the pipe's contents (those live behind the
    // pipe's own L3 mutex).
    pipe: Mutex<Option<Arc<DataPipe>>>,
}

impl DataPipeProducerDispatcher {
    pub fn new(pipe: Arc<DataPipe>) -> DataPipeProducerDispatcher {
        DataPipeProducerDispatcher { pipe: Mutex::new(Some(pipe)) }
    }

    fn pipe(&self) -> IpcResult<Arc<DataPipe>> {
        self.pipe.lock().clone().ok_or(Status::InvalidArgument)
    }
}

impl Dispatcher for DataPipeProducerDispatcher {
    fn dispatcher_type(&self) -> DispatcherType {
        DispatcherType::DataPipeProducer
    }

    fn close(&self) -> IpcResult<()> {
        let pipe = self.pipe.lock().take().ok_or(Status::InvalidArgument)?;
        pipe.producer_close();
        trace!("data pipe producer closed");
        Ok(())
    }

    fn write_data(&self, bytes: &[u8], flags: WriteDataFlags) -> IpcResult<usize> {
        self.pipe()?.producer_write_data(bytes, flags)
    }

    fn begin_write_data(&self, _min_bytes: usize) -> IpcResult<Mapping> {
        self.pipe()?.producer_begin_write_data()
    }

    fn end_write_data(&self, num_bytes_written: usize) -> IpcResult<()> {
        self.pipe()?.producer_end_write_data(num_bytes_written)
    }

    fn set_data_pipe_producer_options(&self, options: DataPipeProducerOptions) -> IpcResult<()> {
        let pipe = self.pipe()?;
        let mut state = pipe.state.lock();
        state.write_threshold_bytes = options.write_threshold_num_bytes as usize;
        state.notify();
        Ok(())
    }

    fn get_data_pipe_producer_options(&self) -> IpcResult<DataPipeProducerOptions> {
        let pipe = self.pipe()?;
        let state = pipe.state.lock();
        Ok(DataPipeProducerOptions { write_threshold_num_bytes: state.write_threshold_bytes as u32 })
    }

    fn handle_signals_state(&self) -> HandleSignalsState {
        match self.pipe() {
            Ok(pipe) => pipe.state.lock().producer_signals(),
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
        let pipe = self.pipe()?;
        let mut state = pipe.state.lock();
        let current = state.producer_signals();
        if current.satisfies(mask) && !persistent {
            return Err(Status::AlreadyExists);
        }
        if !current.can_satisfy(mask) {
            return Err(Status::FailedPrecondition);
        }
        state.producer_awakables.add(awakable, mask, context, persistent);
        Ok(current)
    }

    fn remove_awakable(&self, awakable: &Arc<dyn Awakable>, context: u64) -> HandleSignalsState {
        match self.pipe() {
            Ok(pipe) => {
                let mut state = pipe.state.lock();
                state.producer_awakables.remove(false, awakable, context);
                state.producer_signals()
            }
            Err(_) => HandleSignalsState::default(),
        }
    }

    fn try_start_transport(&self) -> Option<Box<dyn TransportHandle>> {
        let guard = self.pipe.try_lock()?;
        let pipe = guard.clone()?;
        if pipe.state.lock().producer_two_phase.is_some() {
            return None;
        }
        Some(Box::new(ProducerTransport { pipe }))
    }
}

impl Serializable for DataPipeProducerDispatcher {
    fn start_serialize(&self) -> SerializeSizes {
        SerializeSizes { max_bytes: 0, max_platform_handles: 1 }
    }

    fn end_serialize_and_close(&self) -> IpcResult<SerializedDispatcher> {
        let mut transport = self.try_start_transport().ok_or(Status::Busy)?;
        let equivalent = transport.create_equivalent_and_close()?;
        Ok(SerializedDispatcher {
            type_tag: DispatcherType::DataPipeProducer.type_tag(),
            payload: Vec::new(),
            platform_handles: vec![PlatformHandle::Dispatcher(equivalent)],
        })
    }
}

/// Holds the producer's own (L2) lock for the duration of the transfer.
struct ProducerTransport {
    pipe: Arc<DataPipe>,
}

impl TransportHandle for ProducerTransport {
    fn create_equivalent_and_close(&mut self) -> IpcResult<Arc<dyn Dispatcher>> {
        self.pipe.state.lock().producer_awakables.cancel_and_remove_all();
        Ok(Arc::new(DataPipeProducerDispatcher::new(self.pipe.clone())))
    }
}

/// Dispatcher wrapper for the consumer (read) end.
pub struct DataPipeConsumerDispatcher {
    pipe: Mutex<Option<Arc<DataPipe>>>,
}

impl DataPipeConsumerDispatcher {
    pub fn new(pipe: Arc<DataPipe>) -> DataPipeConsumerDispatcher {
        DataPipeConsumerDispatcher { pipe: Mutex::new(Some(pipe)) }
    }

    fn pipe(&self) -> IpcResult<Arc<DataPipe>> {
        self.pipe.lock().clone().ok_or(Status::InvalidArgument)
    }
}

impl Dispatcher for DataPipeConsumerDispatcher {
    fn dispatcher_type(&self) -> DispatcherType {
        DispatcherType::DataPipeConsumer
    }

    fn close(&self) -> IpcResult<()> {
        let pipe = self.pipe.lock().take().ok_or(Status::InvalidArgument)?;
        pipe.consumer_close();
        trace!("data pipe consumer closed");
        Ok(())
    }

    fn read_data(&self, buf: &mut [u8], flags: ReadDataFlags) -> IpcResult<usize> {
        self.pipe()?.consumer_read_data(buf, flags)
    }

    fn begin_read_data(&self, _min_bytes: usize) -> IpcResult<Mapping> {
        self.pipe()?.consumer_begin_read_data()
    }

    fn end_read_data(&self, num_bytes_read: usize) -> IpcResult<()> {
        self.pipe()?.consumer_end_read_data(num_bytes_read)
    }

    fn set_data_pipe_consumer_options(&self, options: DataPipeConsumerOptions) -> IpcResult<()> {
        let pipe = self.pipe()?;
        let mut state = pipe.state.lock();
        state.read_threshold_bytes = options.read_threshold_num_bytes as usize;
        state.notify();
        Ok(())
    }

    fn get_data_pipe_consumer_options(&self) -> IpcResult<DataPipeConsumerOptions> {
        let pipe = self.pipe()?;
        let state = pipe.state.lock();
        Ok(DataPipeConsumerOptions { read_threshold_num_bytes: state.read_threshold_bytes as u32 })
    }

    fn handle_signals_state(&self) -> HandleSignalsState {
        match self.pipe() {
            Ok(pipe) => pipe.state.lock().consumer_signals(),
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
        let pipe = self.pipe()?;
        let mut state = pipe.state.lock();
        let current = state.consumer_signals();
        if current.satisfies(mask) && !persistent {
            return Err(Status::AlreadyExists);
        }
        if !current.can_satisfy(mask) {
            return Err(Status::FailedPrecondition);
        }
        state.consumer_awakables.add(awakable, mask, context, persistent);
        Ok(current)
    }

    fn remove_awakable(&self, awakable: &Arc<dyn Awakable>, context: u64) -> HandleSignalsState {
        match self.pipe() {
            Ok(pipe) => {
                let mut state = pipe.state.lock();
                state.consumer_awakables.remove(false, awakable, context);
                state.consumer_signals()
            }
            Err(_) => HandleSignalsState::default(),
        }
    }

    fn try_start_transport(&self) -> Option<Box<dyn TransportHandle>> {
        let guard = self.pipe.try_lock()?;
        let pipe = guard.clone()?;
        if pipe.state.lock().consumer_two_phase.is_some() {
            return None;
        }
        Some(Box::new(ConsumerTransport { pipe }))
    }
}

impl Serializable for DataPipeConsumerDispatcher {
    fn start_serialize(&self) -> SerializeSizes {
        SerializeSizes { max_bytes: 0, max_platform_handles: 1 }
    }

    fn end_serialize_and_close(&self) -> IpcResult<SerializedDispatcher> {
        let mut transport = self.try_start_transport().ok_or(Status::Busy)?;
        let equivalent = transport.create_equivalent_and_close()?;
        Ok(SerializedDispatcher {
            type_tag: DispatcherType::DataPipeConsumer.type_tag(),
            payload: Vec::new(),
            platform_handles: vec![PlatformHandle::Dispatcher(equivalent)],
        })
    }
}

struct ConsumerTransport {
    pipe: Arc<DataPipe>,
}

impl TransportHandle for ConsumerTransport {
    fn create_equivalent_and_close(&mut self) -> IpcResult<Arc<dyn Dispatcher>> {
        self.pipe.state.lock().consumer_awakables.cancel_and_remove_all();
        Ok(Arc::new(DataPipeConsumerDispatcher::new(self.pipe.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe(element_size: usize, capacity: usize) -> (Arc<dyn Dispatcher>, Arc<dyn Dispatcher>) {
        DataPipe::create(element_size, capacity).into_dispatchers()
    }

    #[test]
    fn circular_wrap_scenario() {
        let (producer, consumer) = pipe(1, 100);
        let first: Vec<u8> = (0..20).collect();
        assert_eq!(producer.write_data(&first, WriteDataFlags::NONE).unwrap(), 20);
        let mut buf = vec![0u8; 10];
        assert_eq!(consumer.read_data(&mut buf, ReadDataFlags::NONE).unwrap(), 10);
        assert_eq!(buf, (0..10).collect::<Vec<u8>>());
        let second: Vec<u8> = (20..110).collect();
        assert_eq!(producer.write_data(&second, WriteDataFlags::NONE).unwrap(), 90);
        let mut buf = vec![0u8; 100];
        assert_eq!(consumer.read_data(&mut buf, ReadDataFlags::NONE).unwrap(), 100);
        assert_eq!(buf, (10..110).collect::<Vec<u8>>());
    }

    #[test]
    fn all_or_none_scenario() {
        let (producer, consumer) = pipe(4, 40);
        let twenty_elems = vec![0u8; 80];
        assert_eq!(
            producer.write_data(&twenty_elems, WriteDataFlags::ALL_OR_NONE),
            Err(Status::OutOfRange)
        );
        assert_eq!(consumer.read_data(&mut [], ReadDataFlags::QUERY).unwrap(), 0);
        let five_elems = vec![7u8; 20];
        assert_eq!(producer.write_data(&five_elems, WriteDataFlags::NONE).unwrap(), 20);
        let six_elems = vec![0u8; 24];
        assert_eq!(
            producer.write_data(&six_elems, WriteDataFlags::ALL_OR_NONE),
            Err(Status::OutOfRange)
        );
        let mut buf = vec![0u8; 40];
        assert_eq!(
            consumer.read_data(&mut buf, ReadDataFlags::ALL_OR_NONE),
            Err(Status::OutOfRange)
        );
    }

    #[test]
    fn two_phase_write_then_consumer_close() {
        let (producer, consumer) = pipe(1, 16);
        let mapping = producer.begin_write_data(0).unwrap();
        assert!(mapping.len() >= 1);
        drop(mapping);
        consumer.close().unwrap();
        assert_eq!(producer.end_write_data(0), Ok(()));
        assert_eq!(producer.write_data(&[1], WriteDataFlags::NONE), Err(Status::FailedPrecondition));
    }

    #[test]
    fn peek_then_read_is_idempotent() {
        let (producer, consumer) = pipe(1, 16);
        producer.write_data(b"hello", WriteDataFlags::NONE).unwrap();
        let mut peeked = vec![0u8; 5];
        consumer.read_data(&mut peeked, ReadDataFlags::PEEK).unwrap();
        let mut read = vec![0u8; 5];
        consumer.read_data(&mut read, ReadDataFlags::NONE).unwrap();
        assert_eq!(peeked, read);
        assert_eq!(&read, b"hello");
    }

    #[test]
    fn producer_serialize_then_deserialize_preserves_pipe_state() {
        use crate::channel::{deserialize, Channel, LoopbackChannel};

        let data_pipe = DataPipe::create(1, 16);
        let producer = DataPipeProducerDispatcher::new(data_pipe.clone());
        let consumer: Arc<dyn Dispatcher> = Arc::new(DataPipeConsumerDispatcher::new(data_pipe));

        let frame = producer.end_serialize_and_close().unwrap();
        let (a, b) = LoopbackChannel::pair();
        a.send(frame.payload, frame.platform_handles).unwrap();
        let (payload, platform_handles) = b.recv().unwrap();
        let restored = deserialize(frame.type_tag, &payload, platform_handles).unwrap();

        restored.write_data(b"hi", WriteDataFlags::NONE).unwrap();
        let mut buf = vec![0u8; 2];
        consumer.read_data(&mut buf, ReadDataFlags::NONE).unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn round_trip_law() {
        let (producer, consumer) = pipe(1, 8);
        let written = producer.write_data(b"abcd", WriteDataFlags::NONE).unwrap();
        let mut out = vec![0u8; written];
        consumer.read_data(&mut out, ReadDataFlags::NONE).unwrap();
        assert_eq!(&out, b"abcd");
    }
}
