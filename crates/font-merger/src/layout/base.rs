//! BASE lifting, lowering and the two list merges it needs
//!
//! Baseline coordinates keep their glyph reference by name. Format 3
//! coordinates lose their device table and are written as format 1.

use std::collections::HashSet;

use read_fonts::{ReadError, TableProvider, tables::base as read_base, types::Tag};
use write_fonts::tables::base::{
    Axis, Base, BaseCoord, BaseLangSysRecord, BaseScript, BaseScriptList, BaseScriptRecord,
    BaseTagList, BaseValues, FeatMinMaxRecord, MinMax,
};

use super::lift::version;
use crate::{
    MergeError, Result,
    context::{MergeContext, SourceFont},
    value::{Object, Value},
};

type ReadResult<T> = std::result::Result<T, ReadError>;

pub fn lift_base(src: &SourceFont) -> Result<Option<Value>> {
    let Ok(base) = src.font.base() else {
        return Ok(None);
    };
    let horiz = base.horiz_axis().transpose()?;
    let vert = base.vert_axis().transpose()?;
    let obj = Object::new("BASE")
        .with("tableTag", Tag::new(b"BASE"))
        .with("Version", version(base.version()))
        .with_opt("HorizAxis", horiz.map(|axis| lift_axis(src, &axis)).transpose()?)
        .with_opt("VertAxis", vert.map(|axis| lift_axis(src, &axis)).transpose()?);
    Ok(Some(obj.into()))
}

fn lift_axis(src: &SourceFont, axis: &read_base::Axis) -> Result<Object> {
    let tag_list = axis.base_tag_list().transpose()?.map(|list| {
        let tags: Vec<Value> = list.baseline_tags().iter().map(|t| Value::Tag(t.get())).collect();
        Object::new("BaseTagList")
            .with("BaseTagCount", tags.len() as i64)
            .with("BaselineTag", Value::List(tags))
    });

    let script_list = axis.base_script_list()?;
    let records = script_list
        .base_script_records()
        .iter()
        .map(|record| {
            let script = record.base_script(script_list.offset_data())?;
            Ok(Object::new("BaseScriptRecord")
                .with("BaseScriptTag", record.base_script_tag())
                .with("BaseScript", lift_base_script(src, &script)?)
                .into())
        })
        .collect::<Result<Vec<Value>>>()?;

    Ok(Object::new("Axis").with_opt("BaseTagList", tag_list).with(
        "BaseScriptList",
        Object::new("BaseScriptList")
            .with("BaseScriptCount", records.len() as i64)
            .with("BaseScriptRecord", Value::List(records)),
    ))
}

fn lift_base_script(src: &SourceFont, script: &read_base::BaseScript) -> Result<Object> {
    let values = script
        .base_values()
        .transpose()?
        .map(|values| -> Result<Object> {
            let coords = values
                .base_coords()
                .iter()
                .map(|coord| lift_coord(src, &coord?))
                .collect::<Result<Vec<_>>>()?;
            Ok(Object::new("BaseValues")
                .with("DefaultBaselineIndex", values.default_baseline_index() as i64)
                .with("BaseCoord", Value::List(coords)))
        })
        .transpose()?;
    let default_min_max = script
        .default_min_max()
        .transpose()?
        .map(|min_max| lift_min_max(src, &min_max))
        .transpose()?;
    let lang_sys_records = script
        .base_lang_sys_records()
        .iter()
        .map(|record| {
            let min_max = record.min_max(script.offset_data())?;
            Ok(Object::new("BaseLangSysRecord")
                .with("BaseLangSysTag", record.base_lang_sys_tag())
                .with("MinMax", lift_min_max(src, &min_max)?)
                .into())
        })
        .collect::<Result<Vec<Value>>>()?;
    Ok(Object::new("BaseScript")
        .with_opt("BaseValues", values)
        .with_opt("DefaultMinMax", default_min_max)
        .with("BaseLangSysRecord", Value::List(lang_sys_records)))
}

fn lift_min_max(src: &SourceFont, min_max: &read_base::MinMax) -> Result<Object> {
    let coord = |coord: Option<ReadResult<read_base::BaseCoord>>| -> Result<Option<Value>> {
        coord.transpose()?.map(|c| lift_coord(src, &c)).transpose()
    };
    let features = min_max
        .feat_min_max_records()
        .iter()
        .map(|record| {
            Ok(Object::new("FeatMinMaxRecord")
                .with("FeatureTableTag", record.feature_table_tag())
                .with_opt("MinCoord", coord(record.min_coord(min_max.offset_data()))?)
                .with_opt("MaxCoord", coord(record.max_coord(min_max.offset_data()))?)
                .into())
        })
        .collect::<Result<Vec<Value>>>()?;
    Ok(Object::new("MinMax")
        .with_opt("MinCoord", coord(min_max.min_coord())?)
        .with_opt("MaxCoord", coord(min_max.max_coord())?)
        .with("FeatMinMaxRecord", Value::List(features)))
}

fn lift_coord(src: &SourceFont, coord: &read_base::BaseCoord) -> Result<Value> {
    let obj = match coord {
        read_base::BaseCoord::Format1(c) => {
            Object::new("BaseCoord").with("Format", 1).with("Coordinate", c.coordinate() as i64)
        }
        read_base::BaseCoord::Format2(c) => Object::new("BaseCoord")
            .with("Format", 2)
            .with("Coordinate", c.coordinate() as i64)
            .with("ReferenceGlyph", src.require_name(c.reference_glyph() as u32)?)
            .with("BaseCoordPoint", c.base_coord_point() as i64),
        read_base::BaseCoord::Format3(c) => {
            Object::new("BaseCoord").with("Format", 1).with("Coordinate", c.coordinate() as i64)
        }
    };
    Ok(obj.into())
}

/// Baseline tags: kept when every font agrees, concatenated otherwise
pub fn merge_baseline_tags(
    _cx: &mut MergeContext,
    values: Vec<Option<Value>>,
) -> Result<Option<Value>> {
    let present: Vec<Value> = values.into_iter().flatten().collect();
    let Some((first, rest)) = present.split_first() else {
        return Ok(None);
    };
    if rest.iter().all(|tags| tags == first) {
        return Ok(Some(first.clone()));
    }
    log::warn!("BASE baseline tags differ between fonts; concatenating them");
    let mut tags = Vec::new();
    for value in present {
        match value {
            Value::List(items) => tags.extend(items),
            other => {
                return Err(MergeError::TypeMismatch {
                    class: "BaseTagList".into(),
                    field: other.kind().into(),
                });
            }
        }
    }
    Ok(Some(Value::List(tags)))
}

/// Base script records sorted by tag; the first font to define a script wins
pub fn merge_base_script_records(
    _cx: &mut MergeContext,
    values: Vec<Option<Value>>,
) -> Result<Option<Value>> {
    let mismatch = || MergeError::TypeMismatch {
        class: "BaseScriptList".into(),
        field: "BaseScriptRecord".into(),
    };
    let mut records = Vec::new();
    for value in values.into_iter().flatten() {
        match value {
            Value::List(items) => records.extend(items),
            _ => return Err(mismatch()),
        }
    }
    let mut tagged = records
        .into_iter()
        .map(|record| {
            let tag = record
                .as_object()
                .and_then(|r| r.tag("BaseScriptTag"))
                .ok_or_else(mismatch)?;
            Ok((tag, record))
        })
        .collect::<Result<Vec<_>>>()?;
    tagged.sort_by_key(|(tag, _)| *tag);
    let mut seen = HashSet::new();
    tagged.retain(|(tag, _)| seen.insert(*tag));
    Ok(Some(Value::List(tagged.into_iter().map(|(_, record)| record).collect())))
}

pub fn lower_base(cx: &MergeContext, obj: &Object) -> Result<Base> {
    let axis = |field| obj.object(field).map(|axis| lower_axis(cx, axis)).transpose();
    Ok(Base::new(axis("HorizAxis")?, axis("VertAxis")?))
}

fn objects<'a>(obj: &'a Object, field: &str) -> Result<Vec<&'a Object>> {
    obj.list(field)
        .unwrap_or_default()
        .iter()
        .map(|v| v.as_object().ok_or_else(|| obj.type_mismatch(field)))
        .collect()
}

fn lower_axis(cx: &MergeContext, axis: &Object) -> Result<Axis> {
    let tag_list = axis
        .object("BaseTagList")
        .map(|list| {
            list.list("BaselineTag")
                .unwrap_or_default()
                .iter()
                .map(|tag| tag.as_tag().ok_or_else(|| list.type_mismatch("BaselineTag")))
                .collect::<Result<Vec<_>>>()
                .map(BaseTagList::new)
        })
        .transpose()?;
    let script_list = axis
        .object("BaseScriptList")
        .ok_or_else(|| axis.type_mismatch("BaseScriptList"))?;
    let records = objects(script_list, "BaseScriptRecord")?
        .into_iter()
        .map(|record| {
            let tag = record
                .tag("BaseScriptTag")
                .ok_or_else(|| record.type_mismatch("BaseScriptTag"))?;
            let script = record
                .object("BaseScript")
                .ok_or_else(|| record.type_mismatch("BaseScript"))?;
            Ok(BaseScriptRecord::new(tag, lower_base_script(cx, script)?))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Axis::new(tag_list, BaseScriptList::new(records)))
}

fn lower_base_script(cx: &MergeContext, script: &Object) -> Result<BaseScript> {
    let values = script
        .object("BaseValues")
        .map(|values| -> Result<BaseValues> {
            let coords = objects(values, "BaseCoord")?
                .into_iter()
                .map(|coord| lower_coord(cx, coord))
                .collect::<Result<Vec<_>>>()?;
            Ok(BaseValues::new(values.require("DefaultBaselineIndex")?, coords))
        })
        .transpose()?;
    let default_min_max = script
        .object("DefaultMinMax")
        .map(|min_max| lower_min_max(cx, min_max))
        .transpose()?;
    let lang_sys_records = objects(script, "BaseLangSysRecord")?
        .into_iter()
        .map(|record| {
            let tag = record
                .tag("BaseLangSysTag")
                .ok_or_else(|| record.type_mismatch("BaseLangSysTag"))?;
            let min_max = record.object("MinMax").ok_or_else(|| record.type_mismatch("MinMax"))?;
            Ok(BaseLangSysRecord::new(tag, lower_min_max(cx, min_max)?))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(BaseScript::new(values, default_min_max, lang_sys_records))
}

fn lower_min_max(cx: &MergeContext, min_max: &Object) -> Result<MinMax> {
    let coord = |obj: &Object, field| obj.object(field).map(|c| lower_coord(cx, c)).transpose();
    let features = objects(min_max, "FeatMinMaxRecord")?
        .into_iter()
        .map(|record| {
            let tag = record
                .tag("FeatureTableTag")
                .ok_or_else(|| record.type_mismatch("FeatureTableTag"))?;
            Ok(FeatMinMaxRecord::new(tag, coord(record, "MinCoord")?, coord(record, "MaxCoord")?))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(MinMax::new(coord(min_max, "MinCoord")?, coord(min_max, "MaxCoord")?, features))
}

fn lower_coord(cx: &MergeContext, coord: &Object) -> Result<BaseCoord> {
    let coordinate = coord.require("Coordinate")?;
    match coord.get("ReferenceGlyph").and_then(Value::as_glyph) {
        Some(glyph) if coord.int("Format") == Some(2) => Ok(BaseCoord::format_2(
            coordinate,
            cx.require_mega_id(glyph)?.to_u16(),
            coord.require("BaseCoordPoint")?,
        )),
        _ => Ok(BaseCoord::format_1(coordinate)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::empty_context;

    fn tags(tags: &[&[u8; 4]]) -> Option<Value> {
        Some(Value::List(tags.iter().map(|t| Value::Tag(Tag::new(t))).collect()))
    }

    fn record(tag: &[u8; 4], index: i64) -> Value {
        Object::new("BaseScriptRecord")
            .with("BaseScriptTag", Tag::new(tag))
            .with(
                "BaseScript",
                Object::new("BaseScript").with(
                    "BaseValues",
                    Object::new("BaseValues")
                        .with("DefaultBaselineIndex", index)
                        .with("BaseCoord", Value::List(vec![])),
                ),
            )
            .into()
    }

    #[test]
    fn test_matching_baseline_tags_are_kept() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let ideo_romn = || tags(&[b"ideo", b"romn"]);
        let merged = merge_baseline_tags(&mut cx, vec![ideo_romn(), None, ideo_romn()]).unwrap();
        assert_eq!(merged, ideo_romn());
    }

    #[test]
    fn test_differing_baseline_tags_concatenate() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let merged = merge_baseline_tags(&mut cx, vec![tags(&[b"romn"]), tags(&[b"hang"])]).unwrap();
        assert_eq!(merged, tags(&[b"romn", b"hang"]));
    }

    #[test]
    fn test_base_scripts_sorted_first_wins() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let merged = merge_base_script_records(
            &mut cx,
            vec![
                Some(Value::List(vec![record(b"latn", 0), record(b"cyrl", 0)])),
                Some(Value::List(vec![record(b"latn", 1), record(b"arab", 1)])),
            ],
        )
        .unwrap()
        .unwrap();
        let records = merged.as_list().unwrap();
        let order: Vec<Tag> = records
            .iter()
            .filter_map(|r| r.as_object()?.tag("BaseScriptTag"))
            .collect();
        assert_eq!(order, [Tag::new(b"arab"), Tag::new(b"cyrl"), Tag::new(b"latn")]);
        assert_eq!(records[2], record(b"latn", 0));
    }

    #[test]
    fn test_lower_axis() {
        let options = Default::default();
        let cx = empty_context(&options);
        let axis = Object::new("Axis")
            .with(
                "BaseTagList",
                Object::new("BaseTagList").with("BaselineTag", tags(&[b"romn"]).unwrap()),
            )
            .with(
                "BaseScriptList",
                Object::new("BaseScriptList")
                    .with("BaseScriptRecord", Value::List(vec![record(b"latn", 0)])),
            );
        let lowered = lower_axis(&cx, &axis).unwrap();
        assert_eq!(lowered.base_script_list.base_script_records.len(), 1);
        assert!(lowered.base_tag_list.is_some());
    }
}
