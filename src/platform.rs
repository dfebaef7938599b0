//! `PlatformSupport` and friends (§6): the shared-memory primitives this
//! runtime consumes rather than implements itself. Grounded on the
//! `shm_open`/`mmap` sequence in the teacher's `shmempipe` crate, swapped
//! from a fixed ring layout to a plain sized region.

use std::ffi::CString;
use std::os::unix::io::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicU64, Ordering};

use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use tracing::trace;

use crate::dispatcher::Mapping;
use crate::error::{internal, IpcResult};

static NEXT_SHM_ID: AtomicU64 = AtomicU64::new(0);

/// A POSIX shared-memory segment, reference-counted via `Arc` at the call
/// site (the `SharedBufferDispatcher`, not here) since more than one
/// dispatcher may wrap the same segment via `DuplicateBufferHandle`.
pub struct PlatformSharedBuffer {
    fd: OwnedFd,
    num_bytes: usize,
    name: String,
}

impl PlatformSharedBuffer {
    pub fn num_bytes(&self) -> usize {
        self.num_bytes
    }

    /// Maps `[offset, offset+num_bytes)` of the segment. Bounds must already
    /// be validated by the caller (`SharedBufferDispatcher::map_buffer`).
    pub fn map(&self, offset: usize, num_bytes: usize) -> IpcResult<Mapping> {
        let page = page_size();
        let aligned_offset = (offset / page) * page;
        let skew = offset - aligned_offset;
        let map_len = num_bytes + skew;
        let addr = unsafe {
            mmap(
                None,
                std::num::NonZeroUsize::new(map_len).ok_or_else(|| internal("zero-length map"))?,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &self.fd,
                aligned_offset as i64,
            )
        }
        .map_err(|e| internal(format!("mmap failed: {e}")))?;
        trace!(num_bytes, offset, "shared buffer mapped");
        // SAFETY: `addr` was just mapped for `map_len` bytes by this call;
        // `skew` shifts the returned slice to the caller's requested
        // `offset`, still within the mapped range.
        Ok(unsafe { Mapping::new((addr.as_ptr() as *mut u8).add(skew), num_bytes) })
    }

    /// Duplicates the underlying fd so a second dispatcher can independently
    /// close/map it (`DuplicateBufferHandle`, §4.8).
    pub fn duplicate_handle(&self) -> IpcResult<PlatformSharedBuffer> {
        use std::os::unix::io::FromRawFd;
        let raw = nix::unistd::dup(self.fd.as_raw_fd())
            .map_err(|e| internal(format!("dup failed: {e}")))?;
        // SAFETY: `dup` just returned a freshly-owned, valid fd.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        Ok(PlatformSharedBuffer { fd, num_bytes: self.num_bytes, name: self.name.clone() })
    }
}

impl Drop for PlatformSharedBuffer {
    fn drop(&mut self) {
        let _ = shm_unlink(self.name.as_str());
    }
}

fn page_size() -> usize {
    nix::unistd::sysconf(nix::unistd::SysconfVar::PAGE_SIZE)
        .ok()
        .flatten()
        .filter(|&n| n > 0)
        .map(|n| n as usize)
        .unwrap_or(4096)
}

/// Factory for shared-memory backed buffers; the only creation path a
/// `SharedBufferDispatcher` calls into (§4.8, §6).
pub trait PlatformSupport: Send + Sync {
    fn create_shared_buffer(&self, num_bytes: usize) -> IpcResult<PlatformSharedBuffer>;
}

/// `shm_open`-backed implementation, good enough for in-process and test use
/// (the crate's Non-goals exclude real cross-process shared memory setup
/// beyond what POSIX gives for free within one machine).
#[derive(Default)]
pub struct PosixPlatformSupport;

impl PlatformSupport for PosixPlatformSupport {
    fn create_shared_buffer(&self, num_bytes: usize) -> IpcResult<PlatformSharedBuffer> {
        let id = NEXT_SHM_ID.fetch_add(1, Ordering::Relaxed);
        let name = format!("/ipc-core-{}-{}", std::process::id(), id);
        let cname = CString::new(name.clone()).map_err(|e| internal(e.to_string()))?;
        let fd = shm_open(
            cname.as_c_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(|e| internal(format!("shm_open failed: {e}")))?;
        ftruncate(&fd, num_bytes as i64).map_err(|e| {
            let _ = shm_unlink(cname.as_c_str());
            internal(format!("ftruncate failed: {e}"))
        })?;
        trace!(num_bytes, %name, "shared buffer created");
        Ok(PlatformSharedBuffer { fd, num_bytes, name })
    }
}

/// Releases a mapping obtained from [`PlatformSharedBuffer::map`]. Exposed
/// separately from `Mapping` itself since unmapping needs the original
/// length, which `Core`'s mapping table already tracks by base address.
pub fn unmap(mapping: &Mapping) -> IpcResult<()> {
    let len = mapping.len();
    if len == 0 {
        return Ok(());
    }
    let ptr = std::ptr::NonNull::new(mapping.as_raw_ptr() as *mut std::ffi::c_void)
        .ok_or_else(|| internal("null pointer in unmap"))?;
    unsafe { munmap(ptr, len) }.map_err(|e| internal(format!("munmap failed: {e}")))
}
