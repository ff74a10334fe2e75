//! Multi-field composite ordering over records.

use std::cmp::Ordering;

use crate::errors::{RollupError, RollupResult};
use crate::record::Record;
use crate::value::Value;

/// Compares records by an ordered list of field names, most significant first.
///
/// The comparator is stateless: one instance can be shared across any number
/// of comparisons. Every configured field must be exposed by both records;
/// a missing field fails the comparison rather than being skipped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenericComparator {
    fields: Vec<String>,
}

impl GenericComparator {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// The record's field values in configured order.
    pub fn key<R: Record + ?Sized>(&self, record: &R) -> RollupResult<Vec<Value>> {
        self.fields
            .iter()
            .map(|field| {
                record.field(field).ok_or_else(|| RollupError::MissingField {
                    field: field.clone(),
                    record: std::any::type_name::<R>().to_string(),
                })
            })
            .collect()
    }

    /// Lexicographic comparison of the two keys; the first differing field decides.
    pub fn compare<A, B>(&self, a: &A, b: &B) -> RollupResult<Ordering>
    where
        A: Record + ?Sized,
        B: Record + ?Sized,
    {
        Ok(self.key(a)?.cmp(&self.key(b)?))
    }

    pub fn equal<A: Record + ?Sized, B: Record + ?Sized>(&self, a: &A, b: &B) -> RollupResult<bool> {
        Ok(self.compare(a, b)? == Ordering::Equal)
    }

    pub fn not_equal<A: Record + ?Sized, B: Record + ?Sized>(&self, a: &A, b: &B) -> RollupResult<bool> {
        Ok(self.compare(a, b)? != Ordering::Equal)
    }

    pub fn less_than<A: Record + ?Sized, B: Record + ?Sized>(&self, a: &A, b: &B) -> RollupResult<bool> {
        Ok(self.compare(a, b)? == Ordering::Less)
    }

    pub fn greater_than<A: Record + ?Sized, B: Record + ?Sized>(&self, a: &A, b: &B) -> RollupResult<bool> {
        Ok(self.compare(a, b)? == Ordering::Greater)
    }

    /// Positions of `records` in stable sorted order: entry `n` is the index
    /// of the record that sorts `n`th.
    pub fn sorted_indices<R: Record>(&self, records: &[R]) -> RollupResult<Vec<usize>> {
        let keys = records
            .iter()
            .map(|r| self.key(r))
            .collect::<RollupResult<Vec<_>>>()?;
        let mut order: Vec<usize> = (0..records.len()).collect();
        order.sort_by(|a, b| keys[*a].cmp(&keys[*b]));
        Ok(order)
    }

    /// Stable sort by this comparator.
    ///
    /// Keys are extracted once up front, so a missing field is reported
    /// before anything is reordered.
    pub fn sort<R: Record>(&self, records: &mut Vec<R>) -> RollupResult<()> {
        let order = self.sorted_indices(records)?;
        let mut slots: Vec<Option<R>> = records.drain(..).map(Some).collect();
        records.extend(order.into_iter().filter_map(|i| slots[i].take()));
        Ok(())
    }
}
