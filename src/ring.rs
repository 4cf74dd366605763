use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fixed-capacity buffer; pushing onto a full ring drops the oldest item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring<T, const N: usize> {
    items: VecDeque<T>,
}

impl<T, const N: usize> Default for Ring<T, N> {
    fn default() -> Self {
        Self {
            items: VecDeque::with_capacity(N),
        }
    }
}

impl<T, const N: usize> Ring<T, N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) {
        if N == 0 {
            return;
        }
        if self.items.len() == N {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }

    /// The last `n` items, oldest first.
    pub fn last_n(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrites_oldest_when_full() {
        let mut r: Ring<u32, 3> = Ring::new();
        for i in 1..=5 {
            r.push(i);
        }
        assert_eq!(r.len(), 3);
        assert_eq!(r.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(r.newest(), Some(&5));
    }

    #[test]
    fn last_n_clamps_to_len() {
        let mut r: Ring<u32, 5> = Ring::new();
        r.push(1);
        r.push(2);
        assert_eq!(r.last_n(3).copied().collect::<Vec<_>>(), vec![1, 2]);
        r.push(3);
        r.push(4);
        assert_eq!(r.last_n(3).copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }
}
