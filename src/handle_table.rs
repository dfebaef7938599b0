//! C5: `HandleTable` — the process-wide map from handle values to
//! dispatchers, grounded directly on Chromium Mojo's `handle_table.cc`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::dispatcher::{Dispatcher, Transport};
use crate::error::{IpcResult, Status};
use crate::handle::{HandleValue, Rights};

struct Entry {
    dispatcher: Arc<dyn Dispatcher>,
    rights: Rights,
    busy: bool,
}

/// Caller must hold the table's own mutex (L1) for the duration of any call
/// here — this type has no internal locking of its own, matching the
/// original's `AssertHeld()`-guarded methods.
pub struct HandleTable {
    entries: HashMap<HandleValue, Entry>,
    next_value: u32,
    max_size: usize,
}

impl HandleTable {
    pub fn new(max_size: usize) -> HandleTable {
        HandleTable { entries: HashMap::new(), next_value: 1, max_size }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Linear cursor search, skipping `INVALID` (0) and already-used values,
    /// bounded by `max_size`.
    fn next_free_value(&mut self) -> Option<HandleValue> {
        if self.entries.len() >= self.max_size {
            return None;
        }
        for _ in 0..=u32::MAX {
            let candidate = self.next_value;
            self.next_value = self.next_value.wrapping_add(1);
            if self.next_value == 0 {
                self.next_value = 1;
            }
            if candidate != 0 && !self.entries.contains_key(&HandleValue(candidate)) {
                return Some(HandleValue(candidate));
            }
        }
        None
    }

    pub fn add(&mut self, dispatcher: Arc<dyn Dispatcher>, rights: Rights) -> HandleValue {
        match self.next_free_value() {
            Some(value) => {
                self.entries.insert(value, Entry { dispatcher, rights, busy: false });
                trace!(handle = value.0, "handle table: added");
                value
            }
            None => HandleValue::INVALID,
        }
    }

    /// Atomic two-insert: both succeed or neither does.
    pub fn add_pair(
        &mut self,
        d0: Arc<dyn Dispatcher>,
        r0: Rights,
        d1: Arc<dyn Dispatcher>,
        r1: Rights,
    ) -> Option<(HandleValue, HandleValue)> {
        if self.entries.len() + 2 > self.max_size {
            return None;
        }
        let v0 = self.next_free_value()?;
        self.entries.insert(v0, Entry { dispatcher: d0, rights: r0, busy: false });
        let v1 = match self.next_free_value() {
            Some(v) => v,
            None => {
                self.entries.remove(&v0);
                return None;
            }
        };
        self.entries.insert(v1, Entry { dispatcher: d1, rights: r1, busy: false });
        Some((v0, v1))
    }

    /// All-or-nothing with respect to table capacity; a `None` dispatcher in
    /// `items` becomes `HandleValue::INVALID` in the output without failing
    /// the call (mirrors `AddHandleVector`'s handling of already-invalid
    /// handles it is merely asked to carry along).
    pub fn add_vector(
        &mut self,
        items: Vec<Option<(Arc<dyn Dispatcher>, Rights)>>,
    ) -> Option<Vec<HandleValue>> {
        let needed = items.iter().filter(|i| i.is_some()).count();
        if self.entries.len() + needed > self.max_size {
            return None;
        }
        let mut out = Vec::with_capacity(items.len());
        let mut inserted = Vec::with_capacity(items.len());
        for item in items {
            match item {
                None => out.push(HandleValue::INVALID),
                Some((dispatcher, rights)) => match self.next_free_value() {
                    Some(value) => {
                        self.entries.insert(value, Entry { dispatcher, rights, busy: false });
                        inserted.push(value);
                        out.push(value);
                    }
                    None => {
                        for v in inserted {
                            self.entries.remove(&v);
                        }
                        return None;
                    }
                },
            }
        }
        Some(out)
    }

    pub fn get(&self, value: HandleValue) -> IpcResult<(Arc<dyn Dispatcher>, Rights)> {
        match self.entries.get(&value) {
            None => Err(Status::InvalidArgument),
            Some(e) if e.busy => Err(Status::Busy),
            Some(e) => Ok((e.dispatcher.clone(), e.rights)),
        }
    }

    pub fn get_and_remove(&mut self, value: HandleValue) -> IpcResult<(Arc<dyn Dispatcher>, Rights)> {
        match self.entries.get(&value) {
            None => return Err(Status::InvalidArgument),
            Some(e) if e.busy => return Err(Status::Busy),
            Some(_) => {}
        }
        let entry = self.entries.remove(&value).expect("checked above");
        debug!(handle = value.0, "handle table: removed");
        Ok((entry.dispatcher, entry.rights))
    }

    /// §4.5 step 1: mark every handle in `handle_values` busy and obtain a
    /// locked `Transport` for each. All-or-nothing: any failure unwinds
    /// everything marked so far (unlocking and un-busying).
    pub fn mark_busy_and_start_transport(
        &mut self,
        forbidden_handle: HandleValue,
        handle_values: &[HandleValue],
    ) -> IpcResult<Vec<Transport>> {
        let mut transports = Vec::with_capacity(handle_values.len());
        let mut marked = Vec::with_capacity(handle_values.len());

        let result = (|| -> IpcResult<()> {
            for &value in handle_values {
                if value == forbidden_handle {
                    return Err(Status::Busy);
                }
                let entry = self.entries.get_mut(&value).ok_or(Status::InvalidArgument)?;
                if entry.busy {
                    return Err(Status::Busy);
                }
                let transport_handle = entry.dispatcher.try_start_transport().ok_or(Status::Busy)?;
                entry.busy = true;
                marked.push(value);
                transports.push(Transport { rights: entry.rights, handle: transport_handle });
            }
            Ok(())
        })();

        match result {
            Ok(()) => Ok(transports),
            Err(status) => {
                // Unwind: drop transports (releases their locks) and clear
                // the busy bit on everything we'd already marked.
                drop(transports);
                for value in marked {
                    if let Some(e) = self.entries.get_mut(&value) {
                        e.busy = false;
                    }
                }
                Err(status)
            }
        }
    }

    /// §4.5 step 5 (success path): delete the now-transferred entries.
    pub fn remove_busy_handles(&mut self, handle_values: &[HandleValue]) {
        for value in handle_values {
            self.entries.remove(value);
        }
    }

    /// §4.5 step 5 (failure path): the dispatchers are still open, just
    /// clear their busy bit.
    pub fn restore_busy_handles(&mut self, handle_values: &[HandleValue]) {
        for value in handle_values {
            if let Some(e) = self.entries.get_mut(value) {
                e.busy = false;
            }
        }
    }
}
