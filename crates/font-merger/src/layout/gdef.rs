//! GDEF lifting and lowering
//!
//! Coverage tables become lists of glyph names and class definitions become
//! name-keyed dictionaries, so the generic list and dict reducers can merge
//! them. Data parallel to a coverage (attach points, ligature carets) is
//! lifted in coverage order.

use indexmap::IndexMap;
use read_fonts::{
    TableProvider,
    tables::{gdef as read_gdef, layout as read_layout},
    types::Tag,
};
use write_fonts::tables::{
    gdef::{
        AttachList, AttachPoint, CaretValue, Gdef, LigCaretList, LigGlyph, MarkGlyphSets,
    },
    layout::{ClassDef, CoverageTable},
};

use super::lift::version;
use crate::{
    Result,
    context::{MergeContext, SourceFont},
    glyph_order::GlyphName,
    value::{Object, Value},
};

pub fn lift_gdef(src: &SourceFont) -> Result<Option<Value>> {
    let Ok(gdef) = src.font.gdef() else {
        return Ok(None);
    };
    let glyph_class_def = gdef.glyph_class_def().transpose()?;
    let attach_list = gdef.attach_list().transpose()?;
    let lig_caret_list = gdef.lig_caret_list().transpose()?;
    let mark_attach_class_def = gdef.mark_attach_class_def().transpose()?;
    let mark_glyph_sets = gdef.mark_glyph_sets_def().transpose()?;
    if gdef.item_var_store().is_some() {
        log::debug!("{}: GDEF variation store is not carried over", src.index);
    }

    let obj = Object::new("GDEF")
        .with("tableTag", Tag::new(b"GDEF"))
        .with("Version", version(gdef.version()))
        .with_opt("GlyphClassDef", glyph_class_def.map(|cd| lift_class_def(src, &cd)).transpose()?)
        .with_opt("AttachList", attach_list.map(|al| lift_attach_list(src, &al)).transpose()?)
        .with_opt("LigCaretList", lig_caret_list.map(|lc| lift_lig_carets(src, &lc)).transpose()?)
        .with_opt(
            "MarkAttachClassDef",
            mark_attach_class_def.map(|cd| lift_class_def(src, &cd)).transpose()?,
        )
        .with_opt(
            "MarkGlyphSetsDef",
            mark_glyph_sets.map(|sets| lift_mark_glyph_sets(src, &sets)).transpose()?,
        );
    Ok(Some(obj.into()))
}

pub fn lift_coverage(src: &SourceFont, coverage: &read_layout::CoverageTable) -> Result<Object> {
    let format = match coverage {
        read_layout::CoverageTable::Format1(_) => 1,
        read_layout::CoverageTable::Format2(_) => 2,
    };
    let glyphs = coverage
        .iter()
        .map(|gid| Ok(Value::Glyph(src.require_name(gid.to_u32())?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(coverage_object(format, glyphs))
}

fn coverage_object(format: i64, glyphs: Vec<Value>) -> Object {
    Object::new("Coverage").with("Format", format).with("glyphs", Value::List(glyphs))
}

pub fn lift_class_def(src: &SourceFont, class_def: &read_layout::ClassDef) -> Result<Object> {
    let format = match class_def {
        read_layout::ClassDef::Format1(_) => 1,
        read_layout::ClassDef::Format2(_) => 2,
    };
    let classes = class_def
        .iter()
        .map(|(gid, class)| Ok((src.require_name(gid.to_u32())?, Value::Int(class as i64))))
        .collect::<Result<IndexMap<_, _>>>()?;
    Ok(Object::new("ClassDef").with("Format", format).with("classDefs", Value::Dict(classes)))
}

/// Coverage glyphs sorted by glyph id, each with the index of its data
fn sorted_coverage(coverage: &read_layout::CoverageTable) -> Vec<(u32, usize)> {
    let mut glyphs: Vec<_> = coverage.iter().map(|gid| gid.to_u32()).zip(0..).collect();
    glyphs.sort_by_key(|(gid, _)| *gid);
    glyphs
}

fn lift_attach_list(src: &SourceFont, list: &read_gdef::AttachList) -> Result<Object> {
    let coverage = list.coverage()?;
    let points = list.attach_points();
    let mut glyphs = Vec::new();
    let mut attach_points = Vec::new();
    for (gid, index) in sorted_coverage(&coverage) {
        let point = points.get(index)?;
        let indices = point.point_indices().iter().map(|p| Value::Int(p.get() as i64));
        glyphs.push(Value::Glyph(src.require_name(gid)?));
        attach_points.push(Value::List(indices.collect()));
    }
    Ok(Object::new("AttachList")
        .with("Coverage", coverage_object(1, glyphs))
        .with("GlyphCount", attach_points.len() as i64)
        .with("AttachPoint", Value::List(attach_points)))
}

fn lift_lig_carets(src: &SourceFont, list: &read_gdef::LigCaretList) -> Result<Object> {
    let coverage = list.coverage()?;
    let lig_glyphs = list.lig_glyphs();
    let mut glyphs = Vec::new();
    let mut carets = Vec::new();
    for (gid, index) in sorted_coverage(&coverage) {
        let lig_glyph = lig_glyphs.get(index)?;
        let values = lig_glyph
            .caret_values()
            .iter()
            .map(|caret| Ok(lift_caret(&caret?)))
            .collect::<Result<Vec<_>>>()?;
        glyphs.push(Value::Glyph(src.require_name(gid)?));
        carets.push(Value::List(values));
    }
    Ok(Object::new("LigCaretList")
        .with("Coverage", coverage_object(1, glyphs))
        .with("LigGlyphCount", carets.len() as i64)
        .with("LigGlyph", Value::List(carets)))
}

fn lift_caret(caret: &read_gdef::CaretValue) -> Value {
    let obj = match caret {
        read_gdef::CaretValue::Format1(c) => {
            Object::new("CaretValue").with("Format", 1).with("Coordinate", c.coordinate() as i64)
        }
        read_gdef::CaretValue::Format2(c) => Object::new("CaretValue")
            .with("Format", 2)
            .with("CaretValuePoint", c.caret_value_point_index() as i64),
        // written back as format 1, the device table is lost
        read_gdef::CaretValue::Format3(c) => {
            Object::new("CaretValue").with("Format", 1).with("Coordinate", c.coordinate() as i64)
        }
    };
    obj.into()
}

fn lift_mark_glyph_sets(src: &SourceFont, sets: &read_gdef::MarkGlyphSets) -> Result<Object> {
    let coverages = sets
        .coverages()
        .iter()
        .map(|coverage| Ok(lift_coverage(src, &coverage?)?.into()))
        .collect::<Result<Vec<Value>>>()?;
    Ok(Object::new("MarkGlyphSetsDef")
        .with("MarkSetTableFormat", sets.format() as i64)
        .with("MarkSetCount", coverages.len() as i64)
        .with("Coverage", Value::List(coverages)))
}

pub fn lower_gdef(cx: &MergeContext, obj: &Object) -> Result<Gdef> {
    let class_def = |field| obj.object(field).map(|cd| lower_class_def(cx, cd)).transpose();
    let mut gdef = Gdef::new(
        class_def("GlyphClassDef")?,
        obj.object("AttachList").map(|al| lower_attach_list(cx, al)).transpose()?,
        obj.object("LigCaretList").map(|lc| lower_lig_carets(cx, lc)).transpose()?,
        class_def("MarkAttachClassDef")?,
    );
    if let Some(sets) = obj.object("MarkGlyphSetsDef") {
        let coverages = objects(sets, "Coverage")?
            .into_iter()
            .map(|coverage| lower_coverage(cx, coverage))
            .collect::<Result<Vec<_>>>()?;
        gdef.mark_glyph_sets_def = Some(MarkGlyphSets::new(coverages)).into();
    }
    Ok(gdef)
}

fn objects<'a>(obj: &'a Object, field: &str) -> Result<Vec<&'a Object>> {
    obj.list(field)
        .unwrap_or_default()
        .iter()
        .map(|v| v.as_object().ok_or_else(|| obj.type_mismatch(field)))
        .collect()
}

fn glyph_names<'a>(obj: &'a Object, field: &str) -> Result<Vec<&'a GlyphName>> {
    obj.list(field)
        .unwrap_or_default()
        .iter()
        .map(|v| v.as_glyph().ok_or_else(|| obj.type_mismatch(field)))
        .collect()
}

/// Coverage glyphs in merged order, kept in the list's order
pub fn lower_coverage(cx: &MergeContext, coverage: &Object) -> Result<CoverageTable> {
    let glyphs = glyph_names(coverage, "glyphs")?
        .into_iter()
        .map(|name| Ok(cx.require_mega_id(name)?.to_glyph_id16()))
        .collect::<Result<Vec<_>>>()?;
    Ok(CoverageTable::format_1(glyphs))
}

pub fn lower_class_def(cx: &MergeContext, class_def: &Object) -> Result<ClassDef> {
    let Some(Value::Dict(classes)) = class_def.get("classDefs") else {
        return Ok(ClassDef::from_iter(Vec::new()));
    };
    let mappings = classes
        .iter()
        .map(|(name, class)| {
            let class = class
                .as_int()
                .and_then(|c| u16::try_from(c).ok())
                .ok_or_else(|| class_def.type_mismatch("classDefs"))?;
            Ok((cx.require_mega_id(name)?.to_glyph_id16(), class))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ClassDef::from_iter(mappings))
}

fn ints<T: TryFrom<i64>>(obj: &Object, value: &Value, field: &str) -> Result<Vec<T>> {
    value
        .as_list()
        .ok_or_else(|| obj.type_mismatch(field))?
        .iter()
        .map(|v| {
            v.as_int()
                .and_then(|v| T::try_from(v).ok())
                .ok_or_else(|| obj.type_mismatch(field))
        })
        .collect()
}

fn lower_attach_list(cx: &MergeContext, list: &Object) -> Result<AttachList> {
    let coverage = list.object("Coverage").ok_or_else(|| list.type_mismatch("Coverage"))?;
    let points = list
        .list("AttachPoint")
        .unwrap_or_default()
        .iter()
        .map(|point| Ok(AttachPoint::new(ints(list, point, "AttachPoint")?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(AttachList::new(lower_coverage(cx, coverage)?, points))
}

fn lower_lig_carets(cx: &MergeContext, list: &Object) -> Result<LigCaretList> {
    let coverage = list.object("Coverage").ok_or_else(|| list.type_mismatch("Coverage"))?;
    let lig_glyphs = list
        .list("LigGlyph")
        .unwrap_or_default()
        .iter()
        .map(|carets| {
            let carets = carets
                .as_list()
                .ok_or_else(|| list.type_mismatch("LigGlyph"))?
                .iter()
                .map(|caret| {
                    let caret = caret.as_object().ok_or_else(|| list.type_mismatch("LigGlyph"))?;
                    Ok(match caret.require_int("Format")? {
                        2 => CaretValue::format_2(caret.require("CaretValuePoint")?),
                        _ => CaretValue::format_1(caret.require("Coordinate")?),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(LigGlyph::new(carets))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LigCaretList::new(lower_coverage(cx, coverage)?, lig_glyphs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::tests::empty_context, object_merger::merge_objects};

    fn coverage(names: &[&str]) -> Object {
        coverage_object(1, names.iter().map(|n| Value::Glyph((*n).into())).collect())
    }

    fn attach_list(names: &[&str], points: &[&[i64]]) -> Value {
        let points = points
            .iter()
            .map(|p| Value::List(p.iter().map(|v| Value::Int(*v)).collect()))
            .collect::<Vec<_>>();
        Object::new("AttachList")
            .with("Coverage", coverage(names))
            .with("GlyphCount", points.len() as i64)
            .with("AttachPoint", Value::List(points))
            .into()
    }

    #[test]
    fn test_attach_lists_concatenate_in_step() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let merged = merge_objects(
            &mut cx,
            vec![
                Some(attach_list(&["a", "b"], &[&[1], &[2, 3]])),
                None,
                Some(attach_list(&["c"], &[&[4]])),
            ],
        )
        .unwrap()
        .and_then(Value::into_object)
        .unwrap();
        assert_eq!(merged.int("GlyphCount"), Some(3));
        let glyphs = merged.object("Coverage").and_then(|c| c.list("glyphs")).unwrap();
        assert_eq!(glyphs.len(), 3);
        assert_eq!(glyphs[2], Value::Glyph("c".into()));
        assert_eq!(merged.list("AttachPoint").unwrap()[2], Value::List(vec![Value::Int(4)]));
    }

    #[test]
    fn test_class_defs_union() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let class_def = |name: &str, class: i64| -> Option<Value> {
            Some(
                Object::new("ClassDef")
                    .with("Format", 2)
                    .with("classDefs", Value::Dict(IndexMap::from([(name.into(), Value::Int(class))])))
                    .into(),
            )
        };
        let merged = merge_objects(&mut cx, vec![class_def("a", 1), class_def("b#1", 3)])
            .unwrap()
            .and_then(Value::into_object)
            .unwrap();
        let classes = merged.dict("classDefs").unwrap();
        assert_eq!(classes.len(), 2);
        assert_eq!(classes.get("b#1"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_caret_format_3_lowers_as_format_1() {
        let caret = Object::new("CaretValue").with("Format", 1).with("Coordinate", 250);
        let list = Object::new("LigCaretList")
            .with("Coverage", coverage(&[]))
            .with("LigGlyph", Value::List(vec![Value::List(vec![caret.into()])]));
        let options = Default::default();
        let cx = empty_context(&options);
        let lowered = lower_lig_carets(&cx, &list).unwrap();
        assert_eq!(lowered.lig_glyphs.len(), 1);
        assert_eq!(lowered.lig_glyphs[0].caret_values.len(), 1);
    }

    #[test]
    fn test_unknown_glyph_is_an_error() {
        let options = Default::default();
        let cx = empty_context(&options);
        assert!(lower_coverage(&cx, &coverage(&["nowhere"])).is_err());
    }
}
