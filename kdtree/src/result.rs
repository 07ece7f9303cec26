use std::{cmp::Ordering, collections::BinaryHeap};

use nalgebra::RealField;

/// A candidate ordered by distance, then by index.
#[derive(Debug, Copy, Clone)]
struct Entry<T> {
    key: T,
    value: usize,
}

impl<T: PartialEq> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.value == other.value
    }
}

impl<T: PartialEq> Eq for Entry<T> {}

impl<T: PartialOrd> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: PartialOrd> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        { self.key.partial_cmp(&other.key) }
            .unwrap_or(Ordering::Equal)
            .then(self.value.cmp(&other.value))
    }
}

pub trait ResultSet<T> {
    fn push(&mut self, key: T, value: usize);

    /// The largest squared distance a candidate may have to be accepted,
    /// `None` if any candidate is accepted.
    fn worst(&self) -> Option<T>;

    fn into_sorted_vec(self) -> Vec<(usize, T)>;
}

pub struct KnnResultSet<T> {
    data: BinaryHeap<Entry<T>>,
    num: usize,
}

impl<T: RealField + Copy> KnnResultSet<T> {
    pub fn new(num: usize) -> Self {
        KnnResultSet {
            data: BinaryHeap::with_capacity(num.min(1024)),
            num,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.num
    }
}

impl<T: RealField + Copy> ResultSet<T> for KnnResultSet<T> {
    fn push(&mut self, key: T, value: usize) {
        if self.num == 0 {
            return;
        }
        let entry = Entry { key, value };
        if self.is_full() {
            match self.data.peek() {
                Some(max) if entry < *max => {
                    self.data.pop();
                }
                _ => return,
            }
        }
        self.data.push(entry);
    }

    fn worst(&self) -> Option<T> {
        if self.is_full() {
            self.data.peek().map(|entry| entry.key)
        } else {
            None
        }
    }

    fn into_sorted_vec(self) -> Vec<(usize, T)> {
        { self.data.into_sorted_vec().into_iter() }
            .map(|entry| (entry.value, entry.key))
            .collect()
    }
}

/// Collects every candidate within a squared radius, boundary included.
pub struct RadiusResultSet<T> {
    data: Vec<Entry<T>>,
    radius_squared: T,
}

impl<T: RealField + Copy> RadiusResultSet<T> {
    pub fn new(radius: T) -> Self {
        RadiusResultSet {
            data: Vec::with_capacity(64),
            radius_squared: radius * radius,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T: RealField + Copy> ResultSet<T> for RadiusResultSet<T> {
    fn push(&mut self, key: T, value: usize) {
        if key <= self.radius_squared {
            self.data.push(Entry { key, value });
        }
    }

    fn worst(&self) -> Option<T> {
        Some(self.radius_squared)
    }

    fn into_sorted_vec(mut self) -> Vec<(usize, T)> {
        self.data.sort_unstable();
        { self.data.into_iter() }
            .map(|entry| (entry.value, entry.key))
            .collect()
    }
}
