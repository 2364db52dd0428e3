//! Bucket priority queue for quality-guided region growing
//!
//! Priorities are discrete edge weights (0-255). Higher priority is popped
//! first; items sharing a priority come out in insertion order, so ties are
//! resolved in favour of edges discovered earlier (closer to the seed).

use std::collections::VecDeque;

pub struct BucketQueue<T> {
    bins: Vec<VecDeque<T>>,
    current_priority: isize,  // -1 when nothing has been pushed
    count: usize,
    n_bins: usize,
}

impl<T> BucketQueue<T> {
    pub fn new(n_bins: usize) -> Self {
        let n_bins = n_bins.max(1);
        BucketQueue {
            bins: (0..n_bins).map(|_| VecDeque::new()).collect(),
            current_priority: -1,
            count: 0,
            n_bins,
        }
    }

    #[allow(dead_code)]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Priorities above the highest bin are clamped into it
    #[inline]
    pub fn push(&mut self, priority: usize, item: T) {
        let priority = priority.min(self.n_bins - 1);
        self.bins[priority].push_back(item);
        self.count += 1;
        if (priority as isize) > self.current_priority {
            self.current_priority = priority as isize;
        }
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }

        while self.current_priority >= 0 && self.bins[self.current_priority as usize].is_empty() {
            self.current_priority -= 1;
        }

        if self.current_priority < 0 {
            return None;
        }

        self.count -= 1;
        self.bins[self.current_priority as usize].pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_queue_order() {
        let mut queue: BucketQueue<(usize, usize)> = BucketQueue::new(256);
        assert!(queue.is_empty());

        queue.push(100, (1, 2));
        queue.push(50, (4, 5));
        queue.push(200, (7, 8));
        assert!(!queue.is_empty());

        assert_eq!(queue.pop(), Some((7, 8)));
        assert_eq!(queue.pop(), Some((1, 2)));
        assert_eq!(queue.pop(), Some((4, 5)));
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_bucket_queue_ties_are_fifo() {
        let mut queue = BucketQueue::new(8);
        queue.push(3, 'a');
        queue.push(3, 'b');
        queue.push(3, 'c');
        assert_eq!(queue.pop(), Some('a'));
        assert_eq!(queue.pop(), Some('b'));
        assert_eq!(queue.pop(), Some('c'));
    }

    #[test]
    fn test_bucket_queue_push_after_pop() {
        let mut queue = BucketQueue::new(4);
        queue.push(1, 'a');
        assert_eq!(queue.pop(), Some('a'));
        queue.push(3, 'b');
        queue.push(0, 'c');
        assert_eq!(queue.pop(), Some('b'));
        assert_eq!(queue.pop(), Some('c'));
    }

    #[test]
    fn test_bucket_queue_clamps_priority() {
        let mut queue = BucketQueue::new(4);
        queue.push(1000, 'x');
        queue.push(2, 'y');
        assert_eq!(queue.pop(), Some('x'));
        assert_eq!(queue.pop(), Some('y'));
    }
}
