//! Field-by-field merging of structured objects

use indexmap::IndexSet;

use crate::{
    MergeError, Result,
    context::MergeContext,
    registry::merge_map,
    strategies::Reducer,
    value::{Object, Value},
};

/// Merge N instances of one class into a fresh instance
///
/// Absent instances are ignored. Every field that appears in any instance is
/// reduced with the rule from the class's merge map; a field whose reducer
/// yields nothing is left out of the result.
pub fn merge_objects(cx: &mut MergeContext, values: Vec<Option<Value>>) -> Result<Option<Value>> {
    let mut objects = Vec::with_capacity(values.len());
    for value in values.into_iter().flatten() {
        match value {
            Value::Object(obj) => objects.push(obj),
            other => {
                return Err(MergeError::TypeMismatch {
                    class: other.kind().to_string(),
                    field: String::new(),
                });
            }
        }
    }
    let Some(class) = objects.first().map(Object::class) else {
        return Ok(None);
    };
    if let Some(stranger) = objects.iter().find(|obj| obj.class() != class) {
        return Err(MergeError::TypeMismatch {
            class: class.to_string(),
            field: stranger.class().to_string(),
        });
    }
    let map = merge_map(class).ok_or_else(|| MergeError::UnknownClass { class: class.into() })?;

    let fields: IndexSet<&'static str> =
        objects.iter().flat_map(Object::field_names).collect();

    let mut merged = Object::new(class);
    for field in fields {
        let reducer = map.rule(field).ok_or_else(|| MergeError::UnknownField {
            class: class.into(),
            field: field.into(),
        })?;
        if matches!(reducer, Reducer::Drop) {
            continue;
        }
        let column = objects.iter_mut().map(|obj| obj.remove(field)).collect();
        if let Some(value) = reducer.apply(cx, class, field, column)? {
            merged.set(field, value);
        }
    }
    Ok(Some(Value::Object(merged)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::empty_context;

    fn head(units_per_em: i64, x_min: i64) -> Option<Value> {
        Some(
            Object::new("head")
                .with("unitsPerEm", units_per_em)
                .with("xMin", x_min)
                .into(),
        )
    }

    #[test]
    fn test_fields_reduced_and_absent_instances_ignored() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let merged = merge_objects(&mut cx, vec![head(1000, 10), None, head(1000, -5)])
            .unwrap()
            .and_then(Value::into_object)
            .unwrap();
        assert_eq!(merged.int("unitsPerEm"), Some(1000));
        assert_eq!(merged.int("xMin"), Some(-5));
    }

    #[test]
    fn test_equal_mismatch_names_field() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let err = merge_objects(&mut cx, vec![head(1000, 0), head(2048, 0)]).unwrap_err();
        assert!(matches!(err, MergeError::NotEqual { ref field, .. } if field == "unitsPerEm"));
        assert!(err.to_string().contains("unitsPerEm"));
    }

    #[test]
    fn test_unknown_field_without_default() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let odd = Some(Object::new("head").with("mystery", 1).into());
        let err = merge_objects(&mut cx, vec![head(1000, 0), odd]).unwrap_err();
        assert!(matches!(err, MergeError::UnknownField { ref field, .. } if field == "mystery"));
    }

    #[test]
    fn test_fields_present_in_some_instances() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let v1 = Object::new("OS/2").with("version", 1);
        let v4 = Object::new("OS/2").with("version", 4).with("sxHeight", 500);
        let merged = merge_objects(&mut cx, vec![Some(v1.into()), Some(v4.into())])
            .unwrap()
            .and_then(Value::into_object)
            .unwrap();
        assert_eq!(merged.int("version"), Some(4));
        assert_eq!(merged.int("sxHeight"), Some(500));
    }

    #[test]
    fn test_dropped_field_and_unknown_class() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let list = Object::new("ScriptList").with("ScriptCount", 3);
        let merged = merge_objects(&mut cx, vec![Some(list.into())])
            .unwrap()
            .and_then(Value::into_object)
            .unwrap();
        assert!(!merged.has("ScriptCount"));

        let strange = Object::new("Strange").with("x", 1);
        assert!(matches!(
            merge_objects(&mut cx, vec![Some(strange.into())]),
            Err(MergeError::UnknownClass { .. })
        ));
        assert_eq!(merge_objects(&mut cx, vec![None, None]).unwrap(), None);
    }
}
