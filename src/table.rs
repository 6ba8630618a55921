use std::ops::Index;

use log::trace;

use crate::utils::{spread, MyHash};

#[derive(Clone)]
struct Entry<T> {
    value: T,
    next: usize,
}

/// Hash-consing table: every distinct value is stored exactly once.
///
/// Values live in a flat vector and are chained into buckets through `next` indices.
/// Index `0` is a sentry and is never handed out. The table grows by doubling its bucket
/// array once the average chain length exceeds two.
pub struct Table<T> {
    data: Vec<Entry<T>>,
    buckets: Vec<usize>,
    bitmask: u64,
}

impl<T> Table<T>
where
    T: Default,
{
    /// Create a new table with `2^bits` buckets.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Table bits should be in the range 0..=31");

        let buckets_size = 1 << bits;
        let mut data = Vec::with_capacity(buckets_size);
        data.push(Entry {
            value: T::default(),
            next: 0,
        });

        Self {
            data,
            buckets: vec![0; buckets_size],
            bitmask: (buckets_size - 1) as u64,
        }
    }
}

impl<T> Table<T> {
    /// Number of buckets.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }
    /// Number of stored values.
    pub fn size(&self) -> usize {
        self.data.len() - 1
    }

    /// Get the reference to the value at the given index.
    pub fn value(&self, index: usize) -> &T {
        assert_ne!(index, 0, "Index is 0");
        &self.data[index].value
    }

    /// Get the index of the next cell in the same bucket.
    pub fn next(&self, index: usize) -> usize {
        assert_ne!(index, 0, "Index is 0");
        self.data[index].next
    }

    /// Append a value without hash-consing it and return its index.
    pub fn add(&mut self, value: T) -> usize {
        self.data.push(Entry { value, next: 0 });
        self.data.len() - 1
    }
}

impl<T> Table<T>
where
    T: MyHash,
{
    fn bucket_index(&self, value: &T) -> usize {
        (spread(value.hash()) & self.bitmask) as usize
    }

    /// Put a value into the table and return its index.
    ///
    /// If an equal value is already stored, its index is returned instead.
    pub fn put(&mut self, value: T) -> usize
    where
        T: Eq,
    {
        let bucket_index = self.bucket_index(&value);
        let mut index = self.buckets[bucket_index];

        while index != 0 {
            if &value == self.value(index) {
                return index;
            }
            index = self.next(index);
        }

        let i = self.add(value);
        self.data[i].next = self.buckets[bucket_index];
        self.buckets[bucket_index] = i;

        if self.size() > 2 * self.capacity() {
            self.grow();
        }

        i
    }

    fn grow(&mut self) {
        let new_size = self.buckets.len() * 2;
        trace!("table: growing to {} buckets", new_size);

        self.buckets = vec![0; new_size];
        self.bitmask = (new_size - 1) as u64;
        for index in 1..self.data.len() {
            let bucket_index = self.bucket_index(&self.data[index].value);
            self.data[index].next = self.buckets[bucket_index];
            self.buckets[bucket_index] = index;
        }
    }
}

impl<T> Index<usize> for Table<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        self.value(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
    struct Item(i32);

    impl MyHash for Item {
        fn hash(&self) -> u64 {
            self.0.unsigned_abs() as u64
        }
    }

    #[test]
    fn test_add() {
        let mut table = Table::<Item>::new(2);
        assert_eq!(table.add(Item(42)), 1);
        assert_eq!(table.add(Item(42)), 2);
        assert_eq!(table[1], Item(42));
        assert_eq!(table.size(), 2);
    }

    #[test]
    fn test_put_dedup() {
        let mut table = Table::new(2);
        let index1 = table.put(Item(5));
        let index2 = table.put(Item(-5));
        assert_ne!(index1, index2);
        assert_eq!(table.put(Item(5)), index1);
        assert_eq!(table.put(Item(-5)), index2);
        assert_eq!(table[index1], Item(5));
        assert_eq!(table[index2], Item(-5));
    }

    #[test]
    fn test_grow_keeps_values() {
        let mut table = Table::new(1);
        let indices: Vec<usize> = (0..100).map(|i| table.put(Item(i))).collect();
        assert!(table.capacity() > 2);
        for (i, &index) in indices.iter().enumerate() {
            assert_eq!(table.put(Item(i as i32)), index);
        }
        assert_eq!(table.size(), 100);
    }
}
