//! Field reducers for combining values from multiple fonts
//!
//! A reducer gets one entry per input instance, in font order, with `None`
//! for instances that lack the field, and returns the merged value or `None`
//! to leave the field out of the result.

use indexmap::IndexMap;

use crate::{
    MergeError, Result, context::MergeContext, object_merger::merge_objects, value::Value,
};

/// Seconds between the TrueType epoch (1904-01-01) and the Unix epoch
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

/// Procedure receiving the per-font values of one field
pub type CustomReducer = fn(&mut MergeContext, Vec<Option<Value>>) -> Result<Option<Value>>;

#[derive(Clone, Copy, Debug)]
pub enum Reducer {
    /// All present values must be identical
    Equal,
    /// The first instance's value, even when that instance lacks the field
    First,
    Min,
    Max,
    Sum,
    /// Floor of the integer mean
    AvgInt,
    BitwiseAnd,
    BitwiseOr,
    /// Concatenate lists
    SumLists,
    /// Union of per-glyph dictionaries, later keys overwrite
    SumDicts,
    /// Computed again when the table is written
    Recalculate,
    CurrentTime,
    Constant(i64),
    /// Recurse into nested objects with their own merge map
    MergeObjects,
    MergeBits(&'static BitMap),
    /// Drop absent entries before applying the inner reducer
    OnlyExisting(&'static Reducer),
    Custom(CustomReducer),
    /// Leave the field out of the result
    Drop,
}

impl Reducer {
    pub fn apply(
        &self,
        cx: &mut MergeContext,
        class: &str,
        field: &str,
        values: Vec<Option<Value>>,
    ) -> Result<Option<Value>> {
        let mismatch = || MergeError::TypeMismatch { class: class.into(), field: field.into() };
        match self {
            Reducer::Equal => equal(class, field, values),
            Reducer::First => Ok(values.into_iter().next().flatten()),
            Reducer::Min => fold_ints(&values, i64::min).ok_or_else(mismatch),
            Reducer::Max => fold_ints(&values, i64::max).ok_or_else(mismatch),
            Reducer::Sum => fold_ints(&values, |a, b| a + b).ok_or_else(mismatch),
            Reducer::BitwiseAnd => fold_ints(&values, |a, b| a & b).ok_or_else(mismatch),
            Reducer::BitwiseOr => fold_ints(&values, |a, b| a | b).ok_or_else(mismatch),
            Reducer::AvgInt => {
                let ints = ints(&values).ok_or_else(mismatch)?;
                Ok((!ints.is_empty())
                    .then(|| Value::Int(ints.iter().sum::<i64>().div_euclid(ints.len() as i64))))
            }
            Reducer::SumLists => {
                let mut out = Vec::new();
                for value in values.into_iter().flatten() {
                    match value {
                        Value::List(items) => out.extend(items),
                        _ => return Err(mismatch()),
                    }
                }
                Ok(Some(Value::List(out)))
            }
            Reducer::SumDicts => {
                let mut out = IndexMap::new();
                for value in values.into_iter().flatten() {
                    match value {
                        Value::Dict(map) => out.extend(map),
                        _ => return Err(mismatch()),
                    }
                }
                Ok(Some(Value::Dict(out)))
            }
            Reducer::Recalculate | Reducer::Drop => Ok(None),
            Reducer::CurrentTime => Ok(Some(Value::Int(current_time()))),
            Reducer::Constant(v) => Ok(Some(Value::Int(*v))),
            Reducer::MergeObjects => merge_objects(cx, values),
            Reducer::MergeBits(map) => {
                let ints = ints(&values).ok_or_else(mismatch)?;
                if ints.is_empty() {
                    return Ok(None);
                }
                map.merge(&ints).map(|v| Some(Value::Int(v)))
            }
            Reducer::OnlyExisting(inner) => {
                let present: Vec<_> = values.into_iter().filter(Option::is_some).collect();
                if present.is_empty() {
                    return Ok(None);
                }
                inner.apply(cx, class, field, present)
            }
            Reducer::Custom(procedure) => procedure(cx, values),
        }
    }
}

fn equal(class: &str, field: &str, values: Vec<Option<Value>>) -> Result<Option<Value>> {
    let present: Vec<Value> = values.into_iter().flatten().collect();
    let Some((first, rest)) = present.split_first() else {
        return Ok(None);
    };
    if rest.iter().all(|v| v == first) {
        return Ok(Some(first.clone()));
    }
    let values = present.iter().map(Value::to_string).collect::<Vec<_>>().join(", ");
    Err(MergeError::NotEqual { class: class.into(), field: field.into(), values })
}

/// Present integers, or `None` if some present value is not an integer
fn ints(values: &[Option<Value>]) -> Option<Vec<i64>> {
    values.iter().flatten().map(Value::as_int).collect()
}

/// Outer `None` is a type error; an all-absent input folds to `Some(None)`
fn fold_ints(values: &[Option<Value>], op: fn(i64, i64) -> i64) -> Option<Option<Value>> {
    let ints = ints(values)?;
    Some(ints.into_iter().reduce(op).map(Value::Int))
}

/// Now, in seconds since 1904-01-01 00:00 UTC
pub fn current_time() -> i64 {
    chrono::Utc::now().timestamp() + MAC_EPOCH_OFFSET
}

/// How a single bit of a flags field combines across fonts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitRule {
    Or,
    And,
    Zero,
}

impl BitRule {
    fn merge(self, bits: impl Iterator<Item = bool>) -> bool {
        match self {
            BitRule::Or => bits.fold(false, |a, b| a || b),
            BitRule::And => bits.fold(true, |a, b| a && b),
            BitRule::Zero => false,
        }
    }
}

/// Per-bit rules for a flags field
#[derive(Debug)]
pub struct BitMap {
    pub name: &'static str,
    pub size: u32,
    pub default: Option<BitRule>,
    pub bits: &'static [(u32, BitRule)],
}

impl BitMap {
    fn rule(&self, bit: u32) -> Result<BitRule> {
        self.bits
            .iter()
            .find(|(b, _)| *b == bit)
            .map(|(_, rule)| *rule)
            .or(self.default)
            .ok_or(MergeError::UnknownBit { field: self.name, bit })
    }

    pub fn merge(&self, values: &[i64]) -> Result<i64> {
        (0..self.size).try_fold(0i64, |acc, bit| {
            let mask = 1i64 << bit;
            let set = self.rule(bit)?.merge(values.iter().map(|v| v & mask != 0));
            Ok(if set { acc | mask } else { acc })
        })
    }
}
