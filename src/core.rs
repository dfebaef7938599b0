//! C6: `Core`, the top-level facade. Owns the handle table and the mapping
//! table, and implements wait-many, close, the three `create_*` entry
//! points, and the handle-transfer orchestration of §4.5.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, instrument, trace, warn};

use crate::awakable::Waiter;
use crate::config::Config;
use crate::data_pipe::DataPipe;
use crate::dispatcher::{
    Dispatcher, MapBufferFlags, Mapping, ReadMessageFlags, RequiredSizes, Transport, WriteMessageFlags,
};
use crate::error::{IpcResult, Status};
use crate::handle::{HandleValue, Rights};
use crate::handle_table::HandleTable;
use crate::message_pipe;
use crate::options::{DataPipeCreateOptions, SharedBufferCreateOptions};
use crate::platform::PlatformSupport;
use crate::shared_buffer::SharedBufferDispatcher;
use crate::signals::Signals;

/// Outcome of `wait_many`: either a satisfied index, or `DEADLINE_EXCEEDED`
/// / `FAILED_PRECONDITION` for the whole call (§4.4 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitManyOutcome {
    pub index: usize,
}

pub struct Core {
    config: Config,
    handles: Mutex<HandleTable>,
    // L1': unordered w.r.t. the handle-table mutex, never taken together.
    mappings: Mutex<HashMap<usize, Mapping>>,
    platform: Arc<dyn PlatformSupport>,
}

impl Core {
    pub fn new(config: Config, platform: Arc<dyn PlatformSupport>) -> Core {
        let max_size = config.max_handle_table_size;
        Core {
            config,
            handles: Mutex::new(HandleTable::new(max_size)),
            mappings: Mutex::new(HashMap::new()),
            platform,
        }
    }

    #[instrument(skip(self))]
    pub fn close(&self, handle: HandleValue) -> IpcResult<()> {
        let (dispatcher, _rights) = self.handles.lock().get_and_remove(handle)?;
        dispatcher.close()?;
        debug!(handle = handle.0, "handle closed");
        Ok(())
    }

    pub fn create_message_pipe(&self) -> IpcResult<(HandleValue, HandleValue)> {
        let (d0, d1) = message_pipe::create_local_local();
        let mut handles = self.handles.lock();
        handles
            .add_pair(d0, Rights::ALL, d1, Rights::ALL)
            .ok_or(Status::ResourceExhausted)
    }

    pub fn create_data_pipe(&self, options: DataPipeCreateOptions) -> IpcResult<(HandleValue, HandleValue)> {
        let element_size = if options.element_num_bytes == 0 { 1 } else { options.element_num_bytes as usize };
        let capacity = if options.capacity_num_bytes == 0 {
            self.config.default_data_pipe_capacity_bytes
        } else {
            options.capacity_num_bytes as usize
        };
        if capacity % element_size != 0 {
            return Err(Status::InvalidArgument);
        }
        let (producer, consumer) = DataPipe::create(element_size, capacity).into_dispatchers();
        let mut handles = self.handles.lock();
        handles
            .add_pair(producer, Rights::WRITE | Rights::TRANSFER, consumer, Rights::READ | Rights::TRANSFER)
            .ok_or(Status::ResourceExhausted)
    }

    pub fn create_shared_buffer(&self, options: SharedBufferCreateOptions) -> IpcResult<HandleValue> {
        if options.num_bytes == 0 || options.num_bytes as usize > self.config.max_shared_memory_num_bytes {
            return Err(Status::InvalidArgument);
        }
        let buffer = self.platform.create_shared_buffer(options.num_bytes as usize)?;
        let dispatcher = SharedBufferDispatcher::new(buffer);
        let mut handles = self.handles.lock();
        let value = handles.add(dispatcher, Rights::ALL | Rights::DUPLICATE);
        if !value.is_valid() {
            return Err(Status::ResourceExhausted);
        }
        Ok(value)
    }

    pub fn write_message(
        &self,
        handle: HandleValue,
        bytes: Bytes,
        attached: &[HandleValue],
        flags: WriteMessageFlags,
    ) -> IpcResult<()> {
        if attached.len() > self.config.max_message_num_handles {
            return Err(Status::ResourceExhausted);
        }
        // §4.5 step 1, under L1.
        let transports = {
            let mut handles_guard = self.handles.lock();
            handles_guard.mark_busy_and_start_transport(handle, attached)?
        };
        // Step 2: L1 released above.
        let (dispatcher, _rights) = match self.handles.lock().get(handle) {
            Ok(v) => v,
            Err(status) => {
                self.restore(attached);
                return Err(status);
            }
        };
        // Step 3: forward to the message pipe while still holding every
        // attached dispatcher's own lock via its `Transport`.
        let write_result = dispatcher.write_message(bytes, transports, flags);
        // Step 4: transports drop here, releasing every dispatcher lock.
        // Step 5: reacquire L1 and commit or roll back.
        match write_result {
            Ok(()) => {
                self.handles.lock().remove_busy_handles(attached);
                trace!(handle = handle.0, attached = attached.len(), "message written");
                Ok(())
            }
            Err(status) => {
                self.restore(attached);
                Err(status)
            }
        }
    }

    fn restore(&self, attached: &[HandleValue]) {
        self.handles.lock().restore_busy_handles(attached);
    }

    /// `max_bytes`/`max_handles` cap the destination buffers; `None` means
    /// unbounded. On `RESOURCE_EXHAUSTED`, `required_sizes` (if given) is
    /// always written with the sizes the caller would need to retry.
    pub fn read_message(
        &self,
        handle: HandleValue,
        flags: ReadMessageFlags,
        max_bytes: Option<usize>,
        max_handles: Option<usize>,
        required_sizes: Option<&mut RequiredSizes>,
    ) -> IpcResult<(Bytes, Vec<HandleValue>)> {
        let (dispatcher, _rights) = self.handles.lock().get(handle)?;
        let message = dispatcher.read_message(flags, max_bytes, max_handles, required_sizes)?;
        let mut handles = self.handles.lock();
        let mut values = Vec::with_capacity(message.handles.len());
        for handle_dispatcher in message.handles {
            let value = handles.add(handle_dispatcher, Rights::ALL);
            if !value.is_valid() {
                warn!("handle table full while delivering attached handles");
                return Err(Status::ResourceExhausted);
            }
            values.push(value);
        }
        Ok((message.bytes, values))
    }

    pub fn write_data(&self, handle: HandleValue, bytes: &[u8], flags: crate::dispatcher::WriteDataFlags) -> IpcResult<usize> {
        let (dispatcher, _rights) = self.handles.lock().get(handle)?;
        dispatcher.write_data(bytes, flags)
    }

    pub fn begin_write_data(&self, handle: HandleValue, min_bytes: usize) -> IpcResult<Mapping> {
        let (dispatcher, _rights) = self.handles.lock().get(handle)?;
        dispatcher.begin_write_data(min_bytes)
    }

    pub fn end_write_data(&self, handle: HandleValue, num_bytes_written: usize) -> IpcResult<()> {
        let (dispatcher, _rights) = self.handles.lock().get(handle)?;
        dispatcher.end_write_data(num_bytes_written)
    }

    pub fn read_data(&self, handle: HandleValue, buf: &mut [u8], flags: crate::dispatcher::ReadDataFlags) -> IpcResult<usize> {
        let (dispatcher, _rights) = self.handles.lock().get(handle)?;
        dispatcher.read_data(buf, flags)
    }

    pub fn begin_read_data(&self, handle: HandleValue, min_bytes: usize) -> IpcResult<Mapping> {
        let (dispatcher, _rights) = self.handles.lock().get(handle)?;
        dispatcher.begin_read_data(min_bytes)
    }

    pub fn end_read_data(&self, handle: HandleValue, num_bytes_read: usize) -> IpcResult<()> {
        let (dispatcher, _rights) = self.handles.lock().get(handle)?;
        dispatcher.end_read_data(num_bytes_read)
    }

    pub fn set_data_pipe_producer_options(&self, handle: HandleValue, options: crate::options::DataPipeProducerOptions) -> IpcResult<()> {
        let (dispatcher, _rights) = self.handles.lock().get(handle)?;
        dispatcher.set_data_pipe_producer_options(options)
    }

    pub fn get_data_pipe_producer_options(&self, handle: HandleValue) -> IpcResult<crate::options::DataPipeProducerOptions> {
        let (dispatcher, _rights) = self.handles.lock().get(handle)?;
        dispatcher.get_data_pipe_producer_options()
    }

    pub fn set_data_pipe_consumer_options(&self, handle: HandleValue, options: crate::options::DataPipeConsumerOptions) -> IpcResult<()> {
        let (dispatcher, _rights) = self.handles.lock().get(handle)?;
        dispatcher.set_data_pipe_consumer_options(options)
    }

    pub fn get_data_pipe_consumer_options(&self, handle: HandleValue) -> IpcResult<crate::options::DataPipeConsumerOptions> {
        let (dispatcher, _rights) = self.handles.lock().get(handle)?;
        dispatcher.get_data_pipe_consumer_options()
    }

    pub fn duplicate_buffer_handle(&self, handle: HandleValue, options: SharedBufferCreateOptions) -> IpcResult<HandleValue> {
        let (dispatcher, rights) = self.handles.lock().get(handle)?;
        let duplicate = dispatcher.duplicate_buffer_handle(options)?;
        let mut handles = self.handles.lock();
        let value = handles.add(duplicate, rights);
        if !value.is_valid() {
            return Err(Status::ResourceExhausted);
        }
        Ok(value)
    }

    pub fn map_buffer(&self, handle: HandleValue, offset: usize, num_bytes: usize, flags: MapBufferFlags) -> IpcResult<usize> {
        let (dispatcher, _rights) = self.handles.lock().get(handle)?;
        let mapping = dispatcher.map_buffer(offset, num_bytes, flags)?;
        let base = mapping.as_slice().as_ptr() as usize;
        self.mappings.lock().insert(base, mapping);
        Ok(base)
    }

    pub fn unmap_buffer(&self, base: usize) -> IpcResult<()> {
        let mapping = self.mappings.lock().remove(&base).ok_or(Status::InvalidArgument)?;
        crate::platform::unmap(&mapping)
    }

    /// §4.4: block until any of `handles[i]` satisfies `signals[i]`, or
    /// `deadline` elapses.
    #[instrument(skip(self, handles, signals))]
    pub fn wait_many(&self, handles: &[HandleValue], signals: &[Signals], deadline: Option<Instant>) -> IpcResult<WaitManyOutcome> {
        if handles.len() != signals.len() {
            return Err(Status::InvalidArgument);
        }
        if handles.len() > self.config.max_wait_many_num_handles {
            return Err(Status::ResourceExhausted);
        }

        let mut dispatchers = Vec::with_capacity(handles.len());
        for &h in handles {
            let (d, _rights) = self.handles.lock().get(h)?;
            dispatchers.push(d);
        }

        let waiter = Waiter::new();
        let mut registered = Vec::with_capacity(dispatchers.len());
        let mut immediate: Option<IpcResult<usize>> = None;

        for (i, d) in dispatchers.iter().enumerate() {
            match d.add_awakable(waiter.clone(), signals[i], i as u64, false) {
                Ok(_state) => registered.push(i),
                Err(Status::AlreadyExists) => {
                    immediate = Some(Ok(i));
                    break;
                }
                Err(status) => {
                    immediate = Some(Err(status));
                    break;
                }
            }
        }

        let outcome = match immediate {
            Some(result) => result,
            None => waiter.wait(deadline).map(|ctx| ctx as usize),
        };

        for &i in &registered {
            dispatchers[i].remove_awakable(&(waiter.clone() as Arc<dyn crate::awakable::Awakable>), i as u64);
        }

        outcome.map(|index| WaitManyOutcome { index })
    }

    pub fn wait(&self, handle: HandleValue, signals: Signals, deadline: Option<Instant>) -> IpcResult<()> {
        self.wait_many(&[handle], &[signals], deadline).map(|_| ())
    }
}

/// Convenience used by tests wanting a short absolute deadline.
pub fn deadline_from_now(d: Duration) -> Instant {
    Instant::now() + d
}
