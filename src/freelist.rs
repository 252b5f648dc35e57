//! Defines the [`RecycleList`] struct and associated constants and functions.

use core::mem::size_of;
use core::ptr::{null_mut, NonNull};

use static_assertions::const_assert;

use crate::util::POINTER_WIDTH;

pub const NODE_SIZE: usize = size_of::<Node>();

// A recycled slot is reinterpreted as a node, so a node must fit the smallest slot.
const_assert!(NODE_SIZE <= POINTER_WIDTH);

#[repr(C)]
pub struct Node {
    pub next: *mut Node,
}

/// An intrusive singly-linked list threaded through recycled slots.
/// Pushing and popping never allocate, the links live in the slots themselves.
#[derive(Debug)]
#[repr(C)]
pub struct RecycleList {
    head: *mut Node,
}

impl RecycleList {
    /// Creates an empty list.
    #[inline]
    pub const fn new() -> Self {
        RecycleList { head: null_mut() }
    }

    /// Turns the slot pointed by `p` into a node and puts it in front of the list.
    /// This operation has a time complexity of *O*(1).
    ///
    /// # Safety
    /// This function is unsafe since it assumes that `p` points to at least [`NODE_SIZE`]
    /// writable bytes which are not in use and not already part of the list.
    #[inline(always)]
    pub unsafe fn push_front(&mut self, p: NonNull<u8>) {
        let node: *mut Node = p.as_ptr().cast();
        // Slots of odd object sizes are not necessarily pointer aligned.
        node.write_unaligned(Node { next: self.head });
        self.head = node;
    }

    /// Unlinks the first node and returns it as a raw slot pointer,
    /// or `None` if the list is empty.
    /// This operation has a time complexity of *O*(1).
    ///
    /// # Safety
    /// This function is unsafe since it assumes that every node in the list is still
    /// backed by live memory.
    #[inline(always)]
    pub unsafe fn pop_front(&mut self) -> Option<NonNull<u8>> {
        let head = NonNull::new(self.head)?;
        self.head = head.as_ptr().read_unaligned().next;
        Some(head.cast())
    }

    /// Returns whether the list is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Counts the nodes of the list by walking it.
    /// This operation has a time complexity of *O*(n).
    ///
    /// # Safety
    /// Same as [`pop_front`](RecycleList::pop_front).
    pub unsafe fn len(&self) -> usize {
        let mut count = 0;
        let mut p = self.head;
        while !p.is_null() {
            count += 1;
            p = p.read_unaligned().next;
        }
        count
    }

    /// Forgets every node. The memory behind them is left untouched.
    #[inline]
    pub fn clear(&mut self) {
        self.head = null_mut();
    }
}
