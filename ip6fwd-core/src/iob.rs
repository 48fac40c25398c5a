//! I/O buffer pool and chains: payload staging that never waits for memory.
//!
//! Every buffer is allocated when the pool is built. Segments are linked through
//! `next`, so taking one, appending it to a chain and giving a chain back only move
//! boxes between lists. A chain gives its segments back when dropped, so a chain that
//! fails half way through a copy is released by simply letting it go.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use crate::config::Capabilities;
use crate::error::ForwardError;

struct Iob {
    data: Box<[u8]>,
    len: usize,
    next: Option<Box<Iob>>,
}

struct FreeList {
    head: Option<Box<Iob>>,
    count: usize,
}

impl Drop for FreeList {
    fn drop(&mut self) {
        // Unlink one at a time; the default drop would recurse once per buffer.
        let mut cur = self.head.take();
        while let Some(mut seg) = cur {
            cur = seg.next.take();
        }
    }
}

struct PoolInner {
    nbuffers: usize,
    bufsize: usize,
    free: Mutex<FreeList>,
}

/// Fixed-size pool of I/O buffers. Cloning shares the pool.
#[derive(Clone)]
pub struct IobPool {
    inner: Arc<PoolInner>,
}

impl IobPool {
    /// Allocates all `nbuffers` buffers up front. `bufsize` of zero is bumped to one byte.
    pub fn new(nbuffers: usize, bufsize: usize) -> Self {
        let bufsize = bufsize.max(1);
        let mut head = None;
        for _ in 0..nbuffers {
            head = Some(Box::new(Iob {
                data: vec![0u8; bufsize].into_boxed_slice(),
                len: 0,
                next: head,
            }));
        }
        Self {
            inner: Arc::new(PoolInner {
                nbuffers,
                bufsize,
                free: Mutex::new(FreeList {
                    head,
                    count: nbuffers,
                }),
            }),
        }
    }

    pub fn from_caps(caps: &Capabilities) -> Self {
        Self::new(caps.iob_nbuffers, caps.iob_bufsize)
    }

    pub fn bufsize(&self) -> usize {
        self.inner.bufsize
    }

    pub fn nbuffers(&self) -> usize {
        self.inner.nbuffers
    }

    pub fn free(&self) -> usize {
        self.lock().count
    }

    /// Buffers currently held by live chains.
    pub fn outstanding(&self) -> usize {
        self.inner.nbuffers - self.free()
    }

    /// Allocate the head of a new chain. Returns `None` immediately when the pool is empty.
    pub fn try_alloc(&self) -> Option<IobChain> {
        let head = self.try_take()?;
        Some(IobChain {
            pool: self.clone(),
            head: Some(head),
            nsegs: 1,
        })
    }

    fn lock(&self) -> MutexGuard<'_, FreeList> {
        self.inner.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop a free buffer. A free list held by another thread counts as empty.
    fn try_take(&self) -> Option<Box<Iob>> {
        let mut free = match self.inner.free.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => {
                log::trace!("IOB free list busy");
                return None;
            }
        };
        let mut seg = free.head.take()?;
        free.head = seg.next.take();
        free.count -= 1;
        Some(seg)
    }

    /// Push every segment of `chain` back, zeroed, onto the free list.
    fn give_back(&self, mut chain: Option<Box<Iob>>) {
        let mut free = self.lock();
        while let Some(mut seg) = chain {
            chain = seg.next.take();
            let len = seg.len;
            seg.data[..len].fill(0);
            seg.len = 0;
            seg.next = free.head.take();
            free.head = Some(seg);
            free.count += 1;
        }
    }
}

impl std::fmt::Debug for IobPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IobPool")
            .field("nbuffers", &self.inner.nbuffers)
            .field("bufsize", &self.inner.bufsize)
            .field("free", &self.free())
            .finish()
    }
}

/// Ordered chain of pool buffers holding one logical byte stream.
/// Every segment but the last is full.
pub struct IobChain {
    pool: IobPool,
    head: Option<Box<Iob>>,
    nsegs: usize,
}

impl IobChain {
    fn iter(&self) -> impl Iterator<Item = &Iob> + '_ {
        std::iter::successors(self.head.as_deref(), |s| s.next.as_deref())
    }

    /// Total bytes held.
    pub fn len(&self) -> usize {
        self.iter().map(|s| s.len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pool buffers this chain holds.
    pub fn nsegments(&self) -> usize {
        self.nsegs
    }

    /// Filled part of each segment, in order.
    pub fn segments(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.iter().map(|s| &s.data[..s.len])
    }

    /// Copy `src` into the chain at `offset`, taking more buffers from the pool as needed.
    /// Any gap between the current end and `offset` is zero-filled. Never waits; fails with
    /// `BufferExhausted` if the pool runs dry or the end would overflow, in which case
    /// nothing is copied.
    pub fn try_copy_in(&mut self, src: &[u8], offset: usize) -> Result<(), ForwardError> {
        let end = offset
            .checked_add(src.len())
            .ok_or(ForwardError::BufferExhausted)?;
        self.try_grow(end)?;
        let bufsize = self.pool.bufsize();
        let mut base = 0;
        let mut pos = offset;
        let mut rest = src;
        let mut seg = self.head.as_deref_mut();
        while let Some(s) = seg {
            if rest.is_empty() {
                break;
            }
            if pos < base + bufsize {
                let off = pos - base;
                let n = rest.len().min(bufsize - off);
                s.data[off..off + n].copy_from_slice(&rest[..n]);
                pos += n;
                rest = &rest[n..];
            }
            base += bufsize;
            seg = s.next.as_deref_mut();
        }
        Ok(())
    }

    fn try_grow(&mut self, new_len: usize) -> Result<(), ForwardError> {
        let bufsize = self.pool.bufsize();
        let needed = new_len.div_ceil(bufsize).max(1);
        if self.nsegs < needed {
            let mut slot = &mut self.head;
            while let Some(seg) = slot {
                slot = &mut seg.next;
            }
            while self.nsegs < needed {
                let iob = self.pool.try_take().ok_or(ForwardError::BufferExhausted)?;
                let seg = slot.insert(iob);
                self.nsegs += 1;
                slot = &mut seg.next;
            }
        }
        let mut base = 0usize;
        let mut seg = self.head.as_deref_mut();
        while let Some(s) = seg {
            let want = new_len.saturating_sub(base).min(bufsize);
            s.len = s.len.max(want);
            base = base.saturating_add(bufsize);
            seg = s.next.as_deref_mut();
        }
        Ok(())
    }

    /// Copy bytes starting at `offset` into `dst`. Returns the number copied.
    pub fn copy_out(&self, offset: usize, dst: &mut [u8]) -> usize {
        let mut skip = offset;
        let mut written = 0;
        for seg in self.segments() {
            if skip >= seg.len() {
                skip -= seg.len();
                continue;
            }
            let avail = &seg[skip..];
            skip = 0;
            let n = avail.len().min(dst.len() - written);
            dst[written..written + n].copy_from_slice(&avail[..n]);
            written += n;
            if written == dst.len() {
                break;
            }
        }
        written
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for seg in self.segments() {
            out.extend_from_slice(seg);
        }
        out
    }
}

impl std::fmt::Debug for IobChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IobChain")
            .field("len", &self.len())
            .field("nsegs", &self.nsegs)
            .finish()
    }
}

impl Drop for IobChain {
    fn drop(&mut self) {
        self.pool.give_back(self.head.take());
    }
}

/// Copy the payload of `packet` (everything after `hdrsize`) into a fresh chain.
///
/// A zero-length payload yields `Ok(None)`. Ownership of the chain passes to the caller.
pub fn stage_payload(
    pool: &IobPool,
    packet: &[u8],
    hdrsize: usize,
) -> Result<Option<IobChain>, ForwardError> {
    let payload = packet.get(hdrsize..).ok_or(ForwardError::Truncated)?;
    if payload.is_empty() {
        return Ok(None);
    }
    log::trace!("staging {} payload bytes", payload.len());

    // Not a context where waiting for a buffer is acceptable.
    let mut iob = pool.try_alloc().ok_or_else(|| {
        log::warn!("no free IOB for {} byte payload", payload.len());
        ForwardError::BufferExhausted
    })?;
    iob.try_copy_in(payload, 0).map_err(|e| {
        log::warn!("IOB copy-in of {} bytes failed", payload.len());
        e
    })?;
    Ok(Some(iob))
}
