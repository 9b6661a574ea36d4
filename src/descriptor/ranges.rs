//! Ordered range sets and name sets carried by message and enum
//! descriptors: extension ranges, reserved numbers, reserved names.
//!
//! Each set keeps its declaration order and lazily publishes a sorted form
//! the first time membership is queried.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::OnceCell;

use crate::error::DescriptorError;
use crate::wire::{MAX_FIELD_NUMBER, MAX_MESSAGE_SET_NUMBER, MIN_FIELD_NUMBER};

/// A set of field-number ranges, each `[start, end)`.
#[derive(Debug, Default)]
pub struct FieldRanges {
    list: Vec<[u32; 2]>,
    sorted: OnceCell<Vec<[u32; 2]>>,
}

impl FieldRanges {
    pub fn new(list: Vec<[u32; 2]>) -> Self {
        FieldRanges {
            list,
            sorted: OnceCell::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// The `i`th range in declaration order.
    pub fn get(&self, i: usize) -> [u32; 2] {
        self.list[i]
    }

    fn sorted(&self) -> &[[u32; 2]] {
        self.sorted.get_or_init(|| {
            let mut sorted = self.list.clone();
            sorted.sort_unstable_by_key(|r| r[0]);
            sorted
        })
    }

    /// Reports whether any range contains `n`.
    pub fn has(&self, n: u32) -> bool {
        let mut ls = self.sorted();
        while !ls.is_empty() {
            let i = ls.len() / 2;
            let r = FieldRange(ls[i]);
            if n < r.start() {
                ls = &ls[..i];
            } else if n > r.end() {
                ls = &ls[i + 1..];
            } else {
                return true;
            }
        }
        false
    }

    /// Reports any errors with the set of ranges with a message that
    /// completes the sentence: "ranges is invalid because it has ..."
    pub fn check_valid(&self, is_message_set: bool) -> Result<(), DescriptorError> {
        let mut prev = FieldRange([0, 0]);
        for (i, &raw) in self.sorted().iter().enumerate() {
            let r = FieldRange(raw);
            if !is_valid_field_number(r.start(), is_message_set) {
                return Err(DescriptorError::new(format!(
                    "invalid field number: {}",
                    r.start()
                )));
            }
            if !is_valid_field_number(r.end(), is_message_set) {
                return Err(DescriptorError::new(format!(
                    "invalid field number: {}",
                    r.end()
                )));
            }
            if r.start() > r.end() {
                return Err(DescriptorError::new(format!("invalid range: {r}")));
            }
            if i > 0 && prev.end() >= r.start() {
                return Err(DescriptorError::new(format!(
                    "overlapping ranges: {prev} with {r}"
                )));
            }
            prev = r;
        }
        Ok(())
    }

    /// Reports an error if `self` and `other` overlap.
    pub fn check_overlap(&self, other: &FieldRanges) -> Result<(), DescriptorError> {
        let rps = self.sorted();
        let rqs = other.sorted();
        let (mut pi, mut qi) = (0, 0);
        while pi < rps.len() && qi < rqs.len() {
            let rp = FieldRange(rps[pi]);
            let rq = FieldRange(rqs[qi]);
            if !(rp.end() < rq.start() || rq.end() < rp.start()) {
                return Err(DescriptorError::new(format!(
                    "overlapping ranges: {rp} with {rq}"
                )));
            }
            if rp.start() < rq.start() {
                pi += 1;
            } else {
                qi += 1;
            }
        }
        Ok(())
    }
}

impl Clone for FieldRanges {
    fn clone(&self) -> Self {
        FieldRanges::new(self.list.clone())
    }
}

/// Reports whether `n` is usable as a field number. Unlike the key grammar,
/// ranges may cover the protobuf-reserved numbers, and message-set messages
/// may extend past the normal ceiling.
fn is_valid_field_number(n: u32, is_message_set: bool) -> bool {
    let max = if is_message_set {
        MAX_MESSAGE_SET_NUMBER
    } else {
        MAX_FIELD_NUMBER
    };
    (MIN_FIELD_NUMBER..=max).contains(&n)
}

/// Half-open storage, inclusive view: `end()` is `bound - 1`.
#[derive(Copy, Clone)]
struct FieldRange([u32; 2]);

impl FieldRange {
    fn start(self) -> u32 {
        self.0[0]
    }

    fn end(self) -> u32 {
        self.0[1].wrapping_sub(1)
    }
}

impl fmt::Display for FieldRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start() == self.end() {
            write!(f, "{}", self.start())
        } else {
            write!(f, "{} to {}", self.start(), self.end())
        }
    }
}

/// A set of enum-number ranges, each `[start, end]` inclusive on both sides.
#[derive(Debug, Default)]
pub struct EnumRanges {
    list: Vec<[i32; 2]>,
    sorted: OnceCell<Vec<[i32; 2]>>,
}

impl EnumRanges {
    pub fn new(list: Vec<[i32; 2]>) -> Self {
        EnumRanges {
            list,
            sorted: OnceCell::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, i: usize) -> [i32; 2] {
        self.list[i]
    }

    fn sorted(&self) -> &[[i32; 2]] {
        self.sorted.get_or_init(|| {
            let mut sorted = self.list.clone();
            sorted.sort_unstable_by_key(|r| r[0]);
            sorted
        })
    }

    /// Reports whether any range contains `n`.
    pub fn has(&self, n: i32) -> bool {
        let mut ls = self.sorted();
        while !ls.is_empty() {
            let i = ls.len() / 2;
            let [start, end] = ls[i];
            if n < start {
                ls = &ls[..i];
            } else if n > end {
                ls = &ls[i + 1..];
            } else {
                return true;
            }
        }
        false
    }

    /// Reports any errors with the set of ranges.
    pub fn check_valid(&self) -> Result<(), DescriptorError> {
        let mut prev: Option<[i32; 2]> = None;
        for &r in self.sorted() {
            let [start, end] = r;
            if start > end {
                return Err(DescriptorError::new(format!(
                    "invalid range: {start} to {end}"
                )));
            }
            if let Some([pstart, pend]) = prev {
                if pend >= start {
                    return Err(DescriptorError::new(format!(
                        "overlapping ranges: {pstart} to {pend} with {start} to {end}"
                    )));
                }
            }
            prev = Some(r);
        }
        Ok(())
    }
}

impl Clone for EnumRanges {
    fn clone(&self) -> Self {
        EnumRanges::new(self.list.clone())
    }
}

/// A set of reserved names with lazy membership lookup.
#[derive(Debug, Default)]
pub struct Names {
    list: Vec<String>,
    has: OnceCell<HashMap<String, usize>>,
}

impl Names {
    pub fn new(list: Vec<String>) -> Self {
        Names {
            list,
            has: OnceCell::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, i: usize) -> &str {
        &self.list[i]
    }

    pub fn has(&self, name: &str) -> bool {
        self.counts().get(name).copied().unwrap_or(0) > 0
    }

    fn counts(&self) -> &HashMap<String, usize> {
        self.has.get_or_init(|| {
            let mut has = HashMap::with_capacity(self.list.len());
            for name in &self.list {
                *has.entry(name.clone()).or_insert(0) += 1;
            }
            has
        })
    }

    /// Reports duplicate names.
    ///
    /// Identifier syntax is deliberately not validated here; the C++
    /// implementation skips the check and we follow it.
    pub fn check_valid(&self) -> Result<(), DescriptorError> {
        for (name, &n) in self.counts() {
            if n > 1 {
                return Err(DescriptorError::new(format!("duplicate name: {name:?}")));
            }
        }
        Ok(())
    }
}

impl Clone for Names {
    fn clone(&self) -> Self {
        Names::new(self.list.clone())
    }
}
