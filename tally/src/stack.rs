use std::{marker::PhantomData, ptr::NonNull};

use log::debug;
use tally_memory::{BlockAllocator, MemoryResource, TrackingAllocator};

use crate::{Iter, IterMut};

pub(crate) type Link<T> = Option<NonNull<Node<T>>>;

pub(crate) struct Node<T> {
    pub(crate) value: T,
    pub(crate) next: Link<T>,
}

/// LIFO stack over a singly linked list.
///
/// Every node is allocated from, and returned to, the memory resource passed
/// to [`Stack::new`]; nothing else is used for storage. The stack only
/// borrows the resource, so the resource outlives the stack and can be
/// shared by any number of stacks at once.
///
/// ```
/// use tally::{Stack, TrackingAllocator};
///
/// let allocator = TrackingAllocator::new();
///
/// {
///     let mut stack = Stack::new(&allocator);
///     stack.push(1);
///     stack.push(2);
///     stack.push(3);
///
///     assert_eq!(*stack.top(), 3);
///     assert_eq!(stack.iter().copied().collect::<Vec<_>>(), [3, 2, 1]);
///     assert_eq!(allocator.allocated_count(), 3);
/// }
///
/// assert_eq!(allocator.allocated_count(), 0);
/// ```
pub struct Stack<'r, T, R: MemoryResource + ?Sized = TrackingAllocator> {
    blocks: BlockAllocator<'r, Node<T>, R>,
    head: Link<T>,
    len: usize,
    _owns: PhantomData<Node<T>>,
}

impl<'r, T, R: MemoryResource + ?Sized> Stack<'r, T, R> {
    pub fn new(resource: &'r R) -> Self {
        Self {
            blocks: BlockAllocator::new(resource),
            head: None,
            len: 0,
            _owns: PhantomData,
        }
    }

    #[inline(always)]
    pub fn resource(&self) -> &'r R {
        self.blocks.resource()
    }

    #[inline(always)]
    pub fn empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.empty()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn push(&mut self, value: T) {
        let node = self.blocks.allocate(1);

        // SAFETY: `node` is fresh, uninitialized storage sized and aligned
        // for one `Node<T>`.
        unsafe {
            node.as_ptr().write(Node {
                value,
                next: self.head,
            })
        };

        self.head = Some(node);
        self.len += 1;
    }

    /// Removes and drops the top value. Does nothing on an empty stack.
    ///
    /// The node's storage goes back to the resource before the value is
    /// dropped, so a panicking `Drop` cannot leak it.
    pub fn pop(&mut self) {
        drop(self.pop_value());
    }

    /// Removes the top value and hands it back instead of dropping it.
    pub fn pop_value(&mut self) -> Option<T> {
        let node = self.head?;

        // SAFETY: `node` is the live head, allocated by `push` through this
        // stack's resource with a count of one. It is unlinked and its value
        // moved out before the storage is returned, so it is never reachable
        // or dropped again.
        let Node { value, next } = unsafe { node.as_ptr().read() };
        self.head = next;
        self.len -= 1;
        unsafe { self.blocks.deallocate(node, 1) };

        Some(value)
    }

    /// The most recently pushed value.
    ///
    /// # Panics
    ///
    /// Panics if the stack is empty; check [`Stack::empty`] first or use
    /// [`Stack::peek`].
    pub fn top(&self) -> &T {
        match self.peek() {
            Some(value) => value,
            None => panic!("top() called on an empty stack"),
        }
    }

    /// # Panics
    ///
    /// Panics if the stack is empty.
    pub fn top_mut(&mut self) -> &mut T {
        match self.peek_mut() {
            Some(value) => value,
            None => panic!("top_mut() called on an empty stack"),
        }
    }

    pub fn peek(&self) -> Option<&T> {
        // SAFETY: the head is live for as long as `self` is borrowed.
        self.head.map(|node| unsafe { &(*node.as_ptr()).value })
    }

    pub fn peek_mut(&mut self) -> Option<&mut T> {
        // SAFETY: the head is live and exclusively borrowed through `self`.
        self.head.map(|node| unsafe { &mut (*node.as_ptr()).value })
    }

    /// Pops until empty, returning every node to the resource.
    pub fn clear(&mut self) {
        #[cfg(feature = "tracy")]
        let _span = tracy_client::span!("Stack::clear");

        let released = self.len;

        while let Some(value) = self.pop_value() {
            let guard = DrainOnUnwind(self);
            drop(value);
            std::mem::forget(guard);
        }

        if released > 0 {
            debug!("Cleared stack, released {released} node(s)");
        }
    }

    /// Traverses the values from the most to the least recently pushed.
    ///
    /// Each call starts over from the current top. The stack stays borrowed
    /// while the iterator lives, so it cannot be modified mid-traversal:
    ///
    /// ```compile_fail
    /// use tally::{Stack, TrackingAllocator};
    ///
    /// let allocator = TrackingAllocator::new();
    /// let mut stack = Stack::new(&allocator);
    /// stack.push(1);
    ///
    /// let mut iter = stack.iter();
    /// stack.pop();
    /// iter.next();
    /// ```
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self.head, self.len)
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut::new(self.head, self.len)
    }
}

/// Keeps draining a stack if dropping one of its values panics.
struct DrainOnUnwind<'s, 'r, T, R: MemoryResource + ?Sized>(&'s mut Stack<'r, T, R>);

impl<T, R: MemoryResource + ?Sized> Drop for DrainOnUnwind<'_, '_, T, R> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

impl<T, R: MemoryResource + ?Sized> Drop for Stack<'_, T, R> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T, R: MemoryResource + ?Sized> Extend<T> for Stack<'_, T, R> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl<'a, T, R: MemoryResource + ?Sized> IntoIterator for &'a Stack<'_, T, R> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, R: MemoryResource + ?Sized> IntoIterator for &'a mut Stack<'_, T, R> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T: std::fmt::Debug, R: MemoryResource + ?Sized> std::fmt::Debug for Stack<'_, T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
