use crate::header::HEADER_SIZE;
use crate::sources::arena_source::ArenaSource;
use crate::sources::tracking_source::TrackingSource;
use crate::util::POINTER_WIDTH;

use self::format::{capturing_subscriber, LogSink};

use super::*;


const BLOCK_SIZE: usize = 4096;
const CONFIG: PoolConfig = PoolConfig::new().with_block_size(BLOCK_SIZE);

fn pool(object_size: usize) -> Pool {
    Pool::with_config(object_size, CONFIG, SystemSource).unwrap()
}

fn headers<S: BlockSource>(pool: &Pool<S>) -> Vec<BlockHeader> {
    pool.blocks
        .iter()
        .map(|block| unsafe { *block.as_ptr() })
        .collect()
}

fn assert_headers_consistent<S: BlockSource>(pool: &Pool<S>) {
    for h in headers(pool) {
        assert_eq!(h.cursor, h.entries - h.free_entries);
        assert_eq!(h.entries, pool.entries_per_block());
        assert_eq!(h.object_size, pool.object_size());
    }
}

#[test]
fn test_1() {
    // Creation succeeds iff the clamped object size fits the space after the header.
    let bound = BLOCK_SIZE - HEADER_SIZE;
    for object_size in [0, 1, POINTER_WIDTH, 16, 1000, bound - 1, bound] {
        let pool = Pool::with_config(object_size, CONFIG, SystemSource).unwrap();
        assert_eq!(pool.object_size(), object_size.max(POINTER_WIDTH));
        assert_eq!(pool.block_count(), 1);
    }
    for object_size in [bound + 1, BLOCK_SIZE, usize::MAX] {
        assert_eq!(
            Pool::with_config(object_size, CONFIG, SystemSource).unwrap_err(),
            PoolError::InvalidConfiguration {
                object_size,
                block_size: BLOCK_SIZE
            }
        );
    }
}

#[test]
fn test_2() {
    // No aliasing among fresh allocations, over several blocks.
    let mut pool = pool(24);
    let n = pool.entries_per_block() * 3 + 7;

    let slots: Vec<NonNull<u8>> = (0..n).map(|_| pool.allocate().unwrap()).collect();
    for (i, slot) in slots.iter().enumerate() {
        unsafe { slot.as_ptr().write_bytes(i as u8, 24) };
    }
    for (i, slot) in slots.iter().enumerate() {
        let bytes = unsafe { core::slice::from_raw_parts(slot.as_ptr(), 24) };
        assert!(bytes.iter().all(|&b| b == i as u8), "Slot {i} was overwritten.");
    }

    let mut addresses: Vec<usize> = slots.iter().map(|p| p.as_ptr() as usize).collect();
    addresses.sort_unstable();
    addresses.dedup();
    assert_eq!(addresses.len(), n);
    assert_eq!(pool.block_count(), 4);
    assert_headers_consistent(&pool);
}

#[test]
fn test_3() {
    // Recycled slots come back most recent first.
    let mut pool = pool(16);
    let slots: Vec<NonNull<u8>> = (0..10).map(|_| pool.allocate().unwrap()).collect();

    for slot in &slots {
        unsafe { pool.recycle(slot.as_ptr()) };
    }
    assert_eq!(pool.recycled_len(), 10);
    for slot in slots.iter().rev() {
        assert_eq!(pool.allocate().unwrap(), *slot);
    }
    assert_eq!(pool.recycled_len(), 0);

    // Recycling doesn't touch block bookkeeping.
    assert_eq!(headers(&pool)[0].cursor, 10);
}

#[test]
fn test_4() {
    let mut pool = pool(16);
    let entries = pool.entries_per_block();
    assert_eq!(entries, (BLOCK_SIZE - HEADER_SIZE) / 16);

    let first: Vec<NonNull<u8>> = (0..entries).map(|_| pool.allocate().unwrap()).collect();
    let block_0 = pool.block_slots(0).unwrap();
    for pair in first.windows(2) {
        assert!(pair[0] < pair[1]);
        assert_eq!(pair[1].as_ptr() as usize - pair[0].as_ptr() as usize, 16);
    }
    for slot in &first {
        assert!(block_0.contains(&(slot.as_ptr() as *const u8)));
    }
    assert_eq!(pool.block_count(), 1);
    assert_eq!(pool.current_block(), pool.head_block());

    let extra = pool.allocate().unwrap();
    assert!(!block_0.contains(&(extra.as_ptr() as *const u8)));
    assert!(pool
        .block_slots(1)
        .unwrap()
        .contains(&(extra.as_ptr() as *const u8)));
    assert_eq!(pool.block_count(), 2);
    assert_ne!(pool.current_block(), pool.head_block());

    let h = headers(&pool);
    assert_eq!(h[0].next, Some(1));
    assert_eq!(h[1].back, Some(0));
    assert_eq!(h[1].next, None);
}

#[test]
fn test_5() {
    let mut pool = pool(8);
    let a = pool.allocate().unwrap();
    let b = pool.allocate().unwrap();
    let c = pool.allocate().unwrap();

    unsafe { pool.recycle(b.as_ptr()) };
    assert_eq!(pool.allocate().unwrap(), b);

    let d = pool.allocate().unwrap();
    assert_ne!(d, a);
    assert_ne!(d, b);
    assert_ne!(d, c);
    assert_eq!(d.as_ptr() as usize - c.as_ptr() as usize, 8);
}

#[test]
fn test_6() {
    let mut pool = pool(16);
    let before: Vec<NonNull<u8>> = (0..5).map(|_| pool.allocate().unwrap()).collect();
    assert_eq!(pool.rollback(5), 5);
    let after: Vec<NonNull<u8>> = (0..5).map(|_| pool.allocate().unwrap()).collect();
    assert_eq!(before, after);
    assert_headers_consistent(&pool);
}

#[test]
fn test_7() {
    // Rollback across block boundaries reuses the blocks already in the chain.
    let mut pool = pool(32);
    let n = pool.entries_per_block() * 2 + 3;

    let before: Vec<NonNull<u8>> = (0..n).map(|_| pool.allocate().unwrap()).collect();
    assert_eq!(pool.block_count(), 3);
    assert_eq!(pool.current_block(), 2);

    assert_eq!(pool.rollback(n), n);
    assert_eq!(pool.current_block(), pool.head_block());
    for h in headers(&pool) {
        assert_eq!(h.cursor, 0);
        assert_eq!(h.free_entries, h.entries);
    }

    let after: Vec<NonNull<u8>> = (0..n).map(|_| pool.allocate().unwrap()).collect();
    assert_eq!(before, after);
    assert_eq!(pool.block_count(), 3, "No new block should have been acquired.");
    assert_headers_consistent(&pool);
}

#[test]
fn test_8() {
    // Partial rollback into the previous block.
    let mut pool = pool(64);
    let entries = pool.entries_per_block();
    let slots: Vec<NonNull<u8>> = (0..entries + 2).map(|_| pool.allocate().unwrap()).collect();

    assert_eq!(pool.rollback(4), 4);
    assert_eq!(pool.current_block(), 0);
    let h = headers(&pool);
    assert_eq!(h[0].cursor, entries - 2);
    assert_eq!(h[1].cursor, 0);

    for slot in &slots[entries - 2..] {
        assert_eq!(pool.allocate().unwrap(), *slot);
    }
    assert_eq!(pool.current_block(), 1);
    assert_headers_consistent(&pool);
}

#[test]
fn test_9() {
    // Rolling back more than was allocated stops at the chain head.
    let mut pool = pool(16);
    let first = pool.allocate().unwrap();
    pool.allocate().unwrap();
    pool.allocate().unwrap();

    assert_eq!(pool.rollback(10), 3);
    assert_eq!(pool.current_block(), pool.head_block());
    assert_eq!(headers(&pool)[0].cursor, 0);
    assert_eq!(pool.allocate().unwrap(), first);

    assert_eq!(pool.rollback(0), 0);
    assert_eq!(headers(&pool)[0].cursor, 1);
}

#[test]
fn test_10() {
    // Rollback leaves the recycle list alone.
    let mut pool = pool(16);
    let a = pool.allocate().unwrap();
    let b = pool.allocate().unwrap();
    let c = pool.allocate().unwrap();

    unsafe { pool.recycle(a.as_ptr()) };
    assert_eq!(pool.rollback(1), 1);
    assert_eq!(pool.recycled_len(), 1);

    assert_eq!(pool.allocate().unwrap(), a);
    assert_eq!(pool.allocate().unwrap(), c);
    let d = pool.allocate().unwrap();
    assert_ne!(d, b);
    assert_ne!(d, c);
}

#[test]
fn test_11() {
    // Null is ignored.
    let mut pool = pool(16);
    unsafe { pool.recycle(core::ptr::null_mut()) };
    assert_eq!(pool.recycled_len(), 0);
    let a = pool.allocate().unwrap();
    unsafe { pool.recycle(a.as_ptr()) };
    unsafe { pool.recycle(core::ptr::null_mut()) };
    assert_eq!(pool.recycled_len(), 1);
}

#[test]
fn test_12() {
    // Odd object sizes leave recycled slots unaligned.
    let mut pool = pool(13);
    assert_eq!(pool.object_size(), 13);
    let slots: Vec<NonNull<u8>> = (0..6).map(|_| pool.allocate().unwrap()).collect();
    for slot in slots.iter().step_by(2) {
        unsafe { pool.recycle(slot.as_ptr()) };
    }
    for slot in slots.iter().step_by(2).rev() {
        assert_eq!(pool.allocate().unwrap(), *slot);
    }
    assert_eq!(
        pool.allocate().unwrap().as_ptr() as usize,
        slots[5].as_ptr() as usize + 13
    );
}

#[test]
fn test_13() {
    // Every block acquired is released exactly once, whether destroyed or dropped.
    let mut source = TrackingSource::default();
    {
        let mut pool = Pool::with_config(48, CONFIG, &mut source).unwrap();
        let n = pool.entries_per_block() * 4 + 1;
        for _ in 0..n {
            pool.allocate().unwrap();
        }
        pool.rollback(n);
        for _ in 0..n {
            pool.allocate().unwrap();
        }
        assert_eq!(pool.block_count(), 5);
        pool.destroy();
    }
    assert_eq!(source.acquired, 5);
    assert_eq!(source.released, 5);
    assert!(source.live.is_empty());

    {
        let mut pool = Pool::with_config(48, CONFIG, &mut source).unwrap();
        for _ in 0..pool.entries_per_block() + 1 {
            pool.allocate().unwrap();
        }
    }
    assert_eq!(source.acquired, 7);
    assert_eq!(source.released, 7);
    assert!(source.live.is_empty());
}

#[test]
fn test_14() {
    #[repr(C, align(64))]
    struct Buf([u8; 2 * BLOCK_SIZE]);

    let mut buf = Buf([0; 2 * BLOCK_SIZE]);
    let source = ArenaSource::new(buf.0.as_mut_ptr(), 2 * BLOCK_SIZE);
    let mut pool = Pool::with_config(16, CONFIG, source).unwrap();
    let entries = pool.entries_per_block();

    let mut last = None;
    for _ in 0..2 * entries {
        last = Some(pool.allocate().unwrap());
    }
    assert_eq!(
        pool.allocate().unwrap_err(),
        PoolError::OutOfMemory {
            block_size: BLOCK_SIZE
        }
    );
    assert_eq!(pool.block_count(), 2);

    // The pool stays usable: recycled slots are still handed out.
    let last = last.unwrap();
    unsafe { pool.recycle(last.as_ptr()) };
    assert_eq!(pool.allocate().unwrap(), last);
    assert!(pool.allocate().is_err());
}

#[test]
fn test_15() {
    // The first block is acquired on creation.
    let mut source = TrackingSource::default();
    source.exhausted = true;
    assert_eq!(
        Pool::with_config(16, CONFIG, &mut source).unwrap_err(),
        PoolError::OutOfMemory {
            block_size: BLOCK_SIZE
        }
    );
    assert_eq!(source.acquired, 0);
}

#[test]
fn test_16() {
    let pool = pool(16);
    let outside = 0_u64;
    assert!(!pool.contains(&outside as *const u64 as *const u8));
    let slots = pool.block_slots(0).unwrap();
    assert!(pool.contains(slots.start));
    assert!(!pool.contains(slots.end));
    assert!(pool.block_slots(1).is_none());
    assert_eq!(slots.start as usize % CACHE_LINE_SIZE, 0);
}

#[cfg(unix)]
#[test]
fn test_17() {
    use crate::sources::MmapSource;

    let source = MmapSource::new();
    let config = PoolConfig::new().with_block_size(4 * source.page_size());
    let mut pool = Pool::with_config(40, config, source).unwrap();
    let n = pool.entries_per_block() * 2;

    let slots: Vec<NonNull<u8>> = (0..n).map(|_| pool.allocate().unwrap()).collect();
    for (i, slot) in slots.iter().enumerate() {
        unsafe { slot.as_ptr().cast::<u32>().write_unaligned(i as u32) };
    }
    for (i, slot) in slots.iter().enumerate() {
        assert_eq!(unsafe { slot.as_ptr().cast::<u32>().read_unaligned() }, i as u32);
    }
    assert_eq!(pool.block_count(), 2);
    pool.destroy();
}

#[test]
fn test_18() {
    // Chain growth and a truncated rollback are logged.
    let sink = LogSink::default();
    let subscriber = capturing_subscriber("block_pool=debug", sink.clone());

    tracing::subscriber::with_default(subscriber, || {
        let mut pool = pool(16);
        for _ in 0..pool.entries_per_block() + 1 {
            pool.allocate().unwrap();
        }
        pool.rollback(usize::MAX);
        pool.destroy();
    });

    let logs = sink.contents();
    assert!(logs.contains("Acquired a new block."), "{logs}");
    assert!(logs.contains("grow"), "{logs}");
    assert!(logs.contains("Rollback reached the chain head."), "{logs}");
    assert!(logs.contains("Released all blocks."), "{logs}");
    assert!(logs.contains("Enter."), "{logs}");
}

#[test]
fn test_19() {
    // Blocks are walked forward again after a rollback, without going back to the source.
    let mut source = TrackingSource::default();
    let mut pool = Pool::with_config(8, CONFIG, &mut source).unwrap();
    let entries = pool.entries_per_block();

    for _ in 0..3 * entries {
        pool.allocate().unwrap();
    }
    for round in 0..5 {
        assert_eq!(pool.rollback(2 * entries + round), 2 * entries + round);
        for _ in 0..2 * entries + round {
            pool.allocate().unwrap();
        }
        assert_headers_consistent(&pool);
    }
    assert_eq!(pool.block_count(), 3);
    drop(pool);
    assert_eq!(source.acquired, 3);
}
