//! The "extensible options struct" wire convention (§6): every options
//! record begins with a `struct_size: u32`; fields beyond what `struct_size`
//! covers are absent on decode (defaulted) and zero-filled on encode, and
//! unrecognized `flags` bits are rejected with `Unimplemented` rather than
//! silently ignored.

use crate::error::{IpcResult, Status};

/// Reads the `struct_size` prefix and validates it per the convention.
pub fn read_struct_size(bytes: &[u8]) -> IpcResult<u32> {
    if bytes.len() < 4 {
        return Err(Status::InvalidArgument);
    }
    let struct_size = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if struct_size < 4 {
        return Err(Status::InvalidArgument);
    }
    Ok(struct_size)
}

/// True if the declared `struct_size` is large enough to cover a field at
/// `offset` of `size` bytes (mirrors `OPTIONS_STRUCT_HAS_MEMBER`).
pub fn struct_has_member(struct_size: u32, offset: usize, size: usize) -> bool {
    struct_size as usize >= offset + size
}

/// Rejects any bit in `flags` outside `known_mask`.
pub fn check_known_flags(flags: u32, known_mask: u32) -> IpcResult<()> {
    if flags & !known_mask != 0 {
        Err(Status::Unimplemented)
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataPipeCreateOptions {
    pub element_num_bytes: u32,
    pub capacity_num_bytes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataPipeProducerOptions {
    pub write_threshold_num_bytes: u32,
}

impl DataPipeProducerOptions {
    /// `offsetof(write_threshold_num_bytes) == 4` in the wire layout
    /// (immediately after `struct_size`).
    const WRITE_THRESHOLD_OFFSET: usize = 4;

    pub fn decode(bytes: &[u8]) -> IpcResult<DataPipeProducerOptions> {
        let struct_size = read_struct_size(bytes)?;
        let mut opts = DataPipeProducerOptions::default();
        if struct_has_member(struct_size, Self::WRITE_THRESHOLD_OFFSET, 4) {
            let start = Self::WRITE_THRESHOLD_OFFSET;
            opts.write_threshold_num_bytes =
                u32::from_le_bytes(bytes[start..start + 4].try_into().unwrap());
        }
        Ok(opts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataPipeConsumerOptions {
    pub read_threshold_num_bytes: u32,
}

impl DataPipeConsumerOptions {
    const READ_THRESHOLD_OFFSET: usize = 4;

    pub fn decode(bytes: &[u8]) -> IpcResult<DataPipeConsumerOptions> {
        let struct_size = read_struct_size(bytes)?;
        let mut opts = DataPipeConsumerOptions::default();
        if struct_has_member(struct_size, Self::READ_THRESHOLD_OFFSET, 4) {
            let start = Self::READ_THRESHOLD_OFFSET;
            opts.read_threshold_num_bytes =
                u32::from_le_bytes(bytes[start..start + 4].try_into().unwrap());
        }
        Ok(opts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SharedBufferCreateOptions {
    pub num_bytes: u64,
}
