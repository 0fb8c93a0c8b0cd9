//! Bucket membership tables and category resolution.
//!
//! Buckets 1-4 are configured by category membership and sit behind a gate.
//! Bucket 5 is the overflow bucket at the end of the conveyor and has no gate.

use std::collections::HashSet;
use std::fmt;

use crate::error::ProtocolError;

/// Number of buckets reachable through a gate.
pub const GATED_BUCKETS: usize = 4;
/// Total number of buckets, including overflow.
pub const BUCKET_COUNT: usize = 5;

/// A physical bucket, always in `1..=5`. Each bucket owns one IR drop sensor
/// with the same number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bucket(u8);

impl Bucket {
    pub const OVERFLOW: Bucket = Bucket(5);

    pub fn new(number: u8) -> Result<Self, ProtocolError> {
        if (1..=BUCKET_COUNT as u8).contains(&number) {
            Ok(Bucket(number))
        } else {
            Err(ProtocolError::InvalidIndex {
                kind: "bucket",
                value: number,
            })
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// Zero-based index, for table lookups.
    pub fn index(self) -> usize {
        self.0 as usize - 1
    }

    /// The gate that diverts objects into this bucket, if any.
    pub fn gate(self) -> Option<Gate> {
        Gate::new(self.0).ok()
    }

    pub fn all() -> impl Iterator<Item = Bucket> {
        (1..=BUCKET_COUNT as u8).map(Bucket)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A gate actuator, always in `1..=4`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Gate(u8);

impl Gate {
    pub fn new(number: u8) -> Result<Self, ProtocolError> {
        if (1..=GATED_BUCKETS as u8).contains(&number) {
            Ok(Gate(number))
        } else {
            Err(ProtocolError::InvalidIndex {
                kind: "gate",
                value: number,
            })
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize - 1
    }

    pub fn bucket(self) -> Bucket {
        Bucket(self.0)
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category membership for the four gated buckets. Immutable once loaded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BucketTable {
    buckets: [HashSet<String>; GATED_BUCKETS],
}

impl BucketTable {
    pub fn new<I, S>(contents: [I; GATED_BUCKETS]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            buckets: contents.map(|items| items.into_iter().map(Into::into).collect()),
        }
    }

    /// Map a category to its bucket. Buckets are scanned 1 through 4 and the
    /// first match wins, so a category listed twice lands in the lower bucket.
    pub fn resolve(&self, category: &str) -> Bucket {
        self.buckets
            .iter()
            .position(|members| members.contains(category))
            .map(|idx| Bucket(idx as u8 + 1))
            .unwrap_or(Bucket::OVERFLOW)
    }

    /// Members of a gated bucket. The overflow bucket has no explicit members.
    pub fn members(&self, bucket: Bucket) -> Option<&HashSet<String>> {
        self.buckets.get(bucket.index())
    }

    /// Categories that appear in more than one bucket, with every bucket they
    /// appear in.
    pub fn overlaps(&self) -> Vec<(String, Vec<Bucket>)> {
        let mut seen: Vec<(String, Vec<Bucket>)> = Vec::new();
        for (idx, members) in self.buckets.iter().enumerate() {
            let mut sorted: Vec<&String> = members.iter().collect();
            sorted.sort();
            for category in sorted {
                let bucket = Bucket(idx as u8 + 1);
                match seen.iter_mut().find(|(c, _)| c == category) {
                    Some((_, buckets)) => buckets.push(bucket),
                    None => seen.push((category.clone(), vec![bucket])),
                }
            }
        }
        seen.retain(|(_, buckets)| buckets.len() > 1);
        seen
    }
}

/// Free-function form of [`BucketTable::resolve`].
pub fn resolve(category: &str, table: &BucketTable) -> Bucket {
    table.resolve(category)
}
