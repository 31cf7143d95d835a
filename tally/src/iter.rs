use std::{iter::FusedIterator, marker::PhantomData};

use crate::stack::Link;

/// Shared traversal of a [`Stack`](crate::Stack), top to bottom.
pub struct Iter<'a, T> {
    next: Link<T>,
    len: usize,
    _marker: PhantomData<&'a T>,
}

impl<'a, T> Iter<'a, T> {
    pub(crate) fn new(head: Link<T>, len: usize) -> Self {
        Self {
            next: head,
            len,
            _marker: PhantomData,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;

        // SAFETY: the stack is borrowed for 'a, so every node reachable from
        // its head stays allocated and unmodified while this iterator lives.
        let node = unsafe { &*node.as_ptr() };
        self.next = node.next;
        self.len -= 1;

        Some(&node.value)
    }

    #[inline(always)]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            next: self.next,
            len: self.len,
            _marker: PhantomData,
        }
    }
}

/// Exclusive traversal of a [`Stack`](crate::Stack), top to bottom.
pub struct IterMut<'a, T> {
    next: Link<T>,
    len: usize,
    _marker: PhantomData<&'a mut T>,
}

impl<'a, T> IterMut<'a, T> {
    pub(crate) fn new(head: Link<T>, len: usize) -> Self {
        Self {
            next: head,
            len,
            _marker: PhantomData,
        }
    }
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;

        // SAFETY: the stack is borrowed mutably for 'a and each node is
        // yielded at most once, so the returned references never alias.
        let node = unsafe { &mut *node.as_ptr() };
        self.next = node.next;
        self.len -= 1;

        Some(&mut node.value)
    }

    #[inline(always)]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

impl<T> FusedIterator for IterMut<'_, T> {}
