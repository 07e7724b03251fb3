//! Cross-font merging of script and feature lists, and `locl` synthesis
//!
//! By the time these run every feature and lookup reference is an arena
//! handle, so lists from different fonts can simply be concatenated or
//! regrouped.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use read_fonts::types::Tag;

use super::{
    FeatureEntry, FeatureId, FeatureRef, GSUB, LayoutArena, LookupEntry, LookupId, LookupRef,
    LookupSource, NO_REQUIRED_FEATURE, script_lang_syses_mut,
};
use crate::{
    MergeError, Result,
    context::{DuplicateGlyphMap, MergeContext},
    object_merger::merge_objects,
    types::FontIndex,
    value::{Object, Value},
};

const LOCL: Tag = Tag::new(b"locl");
const DFLT: Tag = Tag::new(b"DFLT");

fn mismatch(class: &str, field: &str) -> MergeError {
    MergeError::TypeMismatch { class: class.into(), field: field.into() }
}

fn current_table(cx: &MergeContext) -> Tag {
    cx.table.unwrap_or(GSUB)
}

fn feature_handle(cx: &MergeContext, value: &Value) -> Result<FeatureId> {
    match value {
        Value::Feature(FeatureRef::Handle(id)) => Ok(*id),
        Value::Feature(FeatureRef::Index(i)) => Err(MergeError::DanglingReference {
            table: current_table(cx),
            kind: "feature",
            index: *i as usize,
        }),
        _ => Err(mismatch("LangSys", "FeatureIndex")),
    }
}

/// Concatenate a list-valued field across fonts
fn concat(class: &str, field: &str, values: Vec<Option<Value>>) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    for value in values.into_iter().flatten() {
        match value {
            Value::List(items) => out.extend(items),
            _ => return Err(mismatch(class, field)),
        }
    }
    Ok(out)
}

/// Group ScriptRecords by tag; scripts present in several fonts are merged
pub fn merge_script_records(
    cx: &mut MergeContext,
    values: Vec<Option<Value>>,
) -> Result<Option<Value>> {
    let mut by_tag: BTreeMap<Tag, Vec<Object>> = BTreeMap::new();
    for record in concat("ScriptList", "ScriptRecord", values)? {
        let mut record = record.into_object().ok_or_else(|| mismatch("ScriptList", "ScriptRecord"))?;
        let tag = record.tag("ScriptTag").ok_or_else(|| record.type_mismatch("ScriptTag"))?;
        let script = record
            .remove("Script")
            .and_then(Value::into_object)
            .ok_or_else(|| record.type_mismatch("Script"))?;
        by_tag.entry(tag).or_default().push(script);
    }

    let mut records = Vec::with_capacity(by_tag.len());
    for (tag, mut scripts) in by_tag {
        let script = match scripts.len() {
            1 => scripts.pop(),
            _ => Some(merge_scripts(cx, scripts)?),
        };
        records.push(
            Object::new("ScriptRecord")
                .with("ScriptTag", tag)
                .with_opt("Script", script)
                .into(),
        );
    }
    Ok(Some(Value::List(records)))
}

fn merge_scripts(cx: &mut MergeContext, scripts: Vec<Object>) -> Result<Object> {
    let mut defaults = Vec::new();
    let mut by_tag: BTreeMap<Tag, Vec<Object>> = BTreeMap::new();
    for mut script in scripts {
        if let Some(default) = script.remove("DefaultLangSys").and_then(Value::into_object) {
            defaults.push(default);
        }
        let records = match script.remove("LangSysRecord") {
            Some(Value::List(records)) => records,
            Some(_) => return Err(script.type_mismatch("LangSysRecord")),
            None => Vec::new(),
        };
        for record in records {
            let mut record =
                record.into_object().ok_or_else(|| script.type_mismatch("LangSysRecord"))?;
            let tag = record.tag("LangSysTag").ok_or_else(|| record.type_mismatch("LangSysTag"))?;
            let lang_sys = record
                .remove("LangSys")
                .and_then(Value::into_object)
                .ok_or_else(|| record.type_mismatch("LangSys"))?;
            by_tag.entry(tag).or_default().push(lang_sys);
        }
    }

    let default =
        if defaults.is_empty() { None } else { Some(merge_lang_syses(cx, defaults)?) };
    let records = by_tag
        .into_iter()
        .map(|(tag, lang_syses)| {
            Ok(Object::new("LangSysRecord")
                .with("LangSysTag", tag)
                .with("LangSys", merge_lang_syses(cx, lang_syses)?)
                .into())
        })
        .collect::<Result<Vec<Value>>>()?;

    Ok(Object::new("Script")
        .with_opt("DefaultLangSys", default)
        .with("LangSysRecord", Value::List(records)))
}

/// One LangSys whose features are fresh records, one per feature tag
fn merge_lang_syses(cx: &mut MergeContext, lang_syses: Vec<Object>) -> Result<Object> {
    let mut by_tag: BTreeMap<Tag, Vec<FeatureId>> = BTreeMap::new();
    for lang_sys in &lang_syses {
        if lang_sys.int("ReqFeatureIndex").unwrap_or(NO_REQUIRED_FEATURE) != NO_REQUIRED_FEATURE {
            return Err(MergeError::RequiredFeature { table: current_table(cx) });
        }
        for value in lang_sys.list("FeatureIndex").unwrap_or_default() {
            let id = feature_handle(cx, value)?;
            by_tag.entry(cx.arena.feature(id).tag).or_default().push(id);
        }
    }

    let features = by_tag
        .into_iter()
        .map(|(tag, ids)| {
            let lookups: Vec<LookupRef> =
                ids.iter().flat_map(|id| cx.arena.feature(*id).lookups.iter().copied()).collect();
            let id = cx.arena.add_feature(FeatureEntry { tag, lookups });
            Value::Feature(FeatureRef::Handle(id))
        })
        .collect();

    Ok(Object::new("LangSys")
        .with("ReqFeatureIndex", NO_REQUIRED_FEATURE)
        .with("FeatureIndex", Value::List(features)))
}

/// Concatenate feature records, then stable-sort them by tag
pub fn merge_feature_records(
    cx: &mut MergeContext,
    values: Vec<Option<Value>>,
) -> Result<Option<Value>> {
    let mut records = concat("FeatureList", "FeatureRecord", values)?
        .iter()
        .map(|value| feature_handle(cx, value).map(|id| (cx.arena.feature(id).tag, id)))
        .collect::<Result<Vec<_>>>()?;
    records.sort_by_key(|(tag, _)| *tag);
    Ok(Some(Value::List(
        records
            .into_iter()
            .map(|(_, id)| Value::Feature(FeatureRef::Handle(id)))
            .collect(),
    )))
}

/// GSUB: resolve the cmap duplicates with `locl` lookups, then merge as usual
pub fn merge_gsub(cx: &mut MergeContext, mut tables: Vec<Option<Value>>) -> Result<Option<Value>> {
    let duplicates = cx.duplicates.clone();
    for (i, dups) in duplicates.iter().enumerate() {
        if dups.is_empty() {
            continue;
        }
        let Some(Value::Object(table)) = tables.get_mut(i).and_then(Option::as_mut) else {
            return Err(MergeError::MissingGsub { font: FontIndex::new(i), count: dups.len() });
        };
        synthesize_locl(&mut cx.arena, table, dups);
    }
    merge_objects(cx, tables)
}

fn feature_tag(arena: &LayoutArena, value: &Value) -> Tag {
    match value {
        Value::Feature(FeatureRef::Handle(id)) => arena.feature(*id).tag,
        _ => Tag::new(&[0; 4]),
    }
}

/// Make every non-default script of one font's GSUB pick that font's glyphs
///
/// One feature and one lookup are synthesized per font and shared by all of
/// its language systems. The lookup goes first in the `locl` feature so it
/// runs before anything else the font does there.
fn synthesize_locl(arena: &mut LayoutArena, table: &mut Object, dups: &DuplicateGlyphMap) {
    let mut synth_feature: Option<FeatureId> = None;
    let mut synth_lookup: Option<LookupId> = None;

    let scripts = table
        .object_mut("ScriptList")
        .and_then(|list| list.list_mut("ScriptRecord"))
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
        .filter(|record| record.tag("ScriptTag") != Some(DFLT))
        .filter_map(|record| record.object_mut("Script"));

    for script in scripts {
        for lang_sys in script_lang_syses_mut(script) {
            if lang_sys.list("FeatureIndex").is_none() {
                lang_sys.set("FeatureIndex", Value::List(Vec::new()));
            }
            let Some(features) = lang_sys.list_mut("FeatureIndex") else {
                continue;
            };
            let existing = features.iter().find_map(|value| match value {
                Value::Feature(FeatureRef::Handle(id)) if arena.feature(*id).tag == LOCL => {
                    Some(*id)
                }
                _ => None,
            });
            let feature = match existing {
                Some(id) => id,
                None => {
                    let id = *synth_feature.get_or_insert_with(|| {
                        arena.add_feature(FeatureEntry { tag: LOCL, lookups: Vec::new() })
                    });
                    features.push(Value::Feature(FeatureRef::Handle(id)));
                    features.sort_by_key(|value| feature_tag(arena, value));
                    id
                }
            };

            let lookup = *synth_lookup.get_or_insert_with(|| {
                let pairs = dups.iter().map(|(winner, own)| (winner.clone(), own.clone())).collect();
                arena.add_lookup(LookupEntry {
                    table: GSUB,
                    source: LookupSource::Synthesized(pairs),
                    links: IndexMap::new(),
                })
            });
            let entry = arena.feature_mut(feature);
            if entry.lookups.first() != Some(&LookupRef::Handle(lookup)) {
                entry.lookups.insert(0, LookupRef::Handle(lookup));
            }
        }
    }

    if let Some(id) = synth_feature {
        let record = Value::Feature(FeatureRef::Handle(id));
        append(table, "FeatureList", "FeatureCount", "FeatureRecord", record);
    }
    if let Some(id) = synth_lookup {
        append(table, "LookupList", "LookupCount", "Lookup", Value::Lookup(LookupRef::Handle(id)));
    }
}

/// Push onto a counted list of a table, creating the list if needed
fn append(
    table: &mut Object,
    class: &'static str,
    count: &'static str,
    field: &'static str,
    item: Value,
) {
    if table.object(class).is_none() {
        table.set(
            class,
            Object::new(class).with(count, 0).with(field, Value::List(Vec::new())),
        );
    }
    let Some(list) = table.object_mut(class) else {
        return;
    };
    let n = list.int(count).unwrap_or_default();
    list.set(count, n + 1);
    match list.list_mut(field) {
        Some(items) => items.push(item),
        None => list.set(field, Value::List(vec![item])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::tests::empty_context, glyph_order::GlyphName, options::Options};

    fn feature(arena: &mut LayoutArena, tag: &[u8; 4], lookups: &[LookupId]) -> Value {
        let id = arena.add_feature(FeatureEntry {
            tag: Tag::new(tag),
            lookups: lookups.iter().map(|id| LookupRef::Handle(*id)).collect(),
        });
        Value::Feature(FeatureRef::Handle(id))
    }

    fn lookup(arena: &mut LayoutArena, index: u16) -> LookupId {
        arena.add_lookup(LookupEntry {
            table: GSUB,
            source: LookupSource::Font { font: FontIndex::new(0), index },
            links: IndexMap::new(),
        })
    }

    fn lang_sys(features: Vec<Value>) -> Object {
        Object::new("LangSys")
            .with("ReqFeatureIndex", NO_REQUIRED_FEATURE)
            .with("FeatureIndex", Value::List(features))
    }

    fn script_record(tag: &[u8; 4], default: Option<Object>, langs: Vec<(&[u8; 4], Object)>) -> Value {
        let records = langs
            .into_iter()
            .map(|(tag, ls)| {
                Object::new("LangSysRecord").with("LangSysTag", Tag::new(tag)).with("LangSys", ls).into()
            })
            .collect();
        Object::new("ScriptRecord")
            .with("ScriptTag", Tag::new(tag))
            .with(
                "Script",
                Object::new("Script")
                    .with_opt("DefaultLangSys", default)
                    .with("LangSysRecord", Value::List(records)),
            )
            .into()
    }

    fn tags(arena: &LayoutArena, features: &[Value]) -> Vec<Tag> {
        features.iter().map(|v| feature_tag(arena, v)).collect()
    }

    fn default_features(record: &Value) -> &[Value] {
        let script = record.as_object().unwrap().object("Script").unwrap();
        script.object("DefaultLangSys").unwrap().list("FeatureIndex").unwrap()
    }

    #[test]
    fn test_script_records_grouped_and_sorted() {
        let options = Options::default();
        let mut cx = empty_context(&options);
        let l0 = lookup(&mut cx.arena, 0);
        let l1 = lookup(&mut cx.arena, 1);
        let l2 = lookup(&mut cx.arena, 2);
        let liga_a = feature(&mut cx.arena, b"liga", &[l0]);
        let kern_b = feature(&mut cx.arena, b"kern", &[l1]);
        let liga_b = feature(&mut cx.arena, b"liga", &[l2]);

        let font_a = Value::List(vec![script_record(b"latn", Some(lang_sys(vec![liga_a])), vec![])]);
        let font_b = Value::List(vec![
            script_record(b"latn", Some(lang_sys(vec![liga_b, kern_b])), vec![]),
            script_record(b"cyrl", Some(lang_sys(vec![])), vec![]),
        ]);

        let merged = merge_script_records(&mut cx, vec![Some(font_a), None, Some(font_b)])
            .unwrap()
            .unwrap();
        let records = merged.as_list().unwrap();
        let script_tags: Vec<_> =
            records.iter().map(|r| r.as_object().unwrap().tag("ScriptTag").unwrap()).collect();
        assert_eq!(script_tags, [Tag::new(b"cyrl"), Tag::new(b"latn")]);

        let latn = default_features(&records[1]);
        assert_eq!(tags(&cx.arena, latn), [Tag::new(b"kern"), Tag::new(b"liga")]);
        let Value::Feature(FeatureRef::Handle(liga)) = latn[1] else { panic!() };
        assert_eq!(
            cx.arena.feature(liga).lookups,
            [LookupRef::Handle(l0), LookupRef::Handle(l2)]
        );
    }

    #[test]
    fn test_required_feature_rejected_when_merging() {
        let options = Options::default();
        let mut cx = empty_context(&options);
        let required = lang_sys(vec![]).with("ReqFeatureIndex", 0);
        let a = Value::List(vec![script_record(b"latn", Some(required), vec![])]);
        let b = Value::List(vec![script_record(b"latn", Some(lang_sys(vec![])), vec![])]);
        assert!(matches!(
            merge_script_records(&mut cx, vec![Some(a), Some(b)]),
            Err(MergeError::RequiredFeature { .. })
        ));
    }

    #[test]
    fn test_feature_records_sorted_stably() {
        let options = Options::default();
        let mut cx = empty_context(&options);
        let liga_a = feature(&mut cx.arena, b"liga", &[]);
        let ccmp = feature(&mut cx.arena, b"ccmp", &[]);
        let liga_b = feature(&mut cx.arena, b"liga", &[]);
        let merged = merge_feature_records(
            &mut cx,
            vec![
                Some(Value::List(vec![liga_a.clone()])),
                Some(Value::List(vec![liga_b.clone(), ccmp.clone()])),
            ],
        )
        .unwrap()
        .unwrap();
        assert_eq!(merged, Value::List(vec![ccmp, liga_a, liga_b]));
    }

    fn gsub(records: Vec<Value>, features: Vec<Value>) -> Object {
        Object::new("GSUB")
            .with("tableTag", GSUB)
            .with("Version", 0x10000)
            .with(
                "ScriptList",
                Object::new("ScriptList").with("ScriptRecord", Value::List(records)),
            )
            .with(
                "FeatureList",
                Object::new("FeatureList")
                    .with("FeatureCount", features.len() as i64)
                    .with("FeatureRecord", Value::List(features)),
            )
            .with(
                "LookupList",
                Object::new("LookupList").with("LookupCount", 0).with("Lookup", Value::List(vec![])),
            )
    }

    fn dups() -> DuplicateGlyphMap {
        IndexMap::from([(GlyphName::new("parenleft"), GlyphName::new("parenleft#1"))])
    }

    #[test]
    fn test_locl_synthesized_for_non_default_scripts() {
        let options = Options::default();
        let mut cx = empty_context(&options);
        let liga = feature(&mut cx.arena, b"liga", &[]);
        let font_b = gsub(
            vec![
                script_record(b"DFLT", Some(lang_sys(vec![])), vec![]),
                script_record(
                    b"latn",
                    Some(lang_sys(vec![liga.clone()])),
                    vec![(b"TRK ", lang_sys(vec![]))],
                ),
            ],
            vec![liga],
        );
        cx.duplicates = vec![DuplicateGlyphMap::new(), dups()];

        let merged = merge_gsub(&mut cx, vec![None, Some(font_b.into())])
            .unwrap()
            .and_then(Value::into_object)
            .unwrap();

        let records = merged.object("ScriptList").unwrap().list("ScriptRecord").unwrap();
        // DFLT is left alone
        assert!(default_features(&records[0]).is_empty());

        let latn = default_features(&records[1]);
        assert_eq!(tags(&cx.arena, latn), [Tag::new(b"liga"), Tag::new(b"locl")]);
        let Value::Feature(FeatureRef::Handle(locl)) = latn[1] else { panic!() };
        let Some(LookupRef::Handle(synth)) = cx.arena.feature(locl).lookups.first().copied() else {
            panic!()
        };
        assert_eq!(
            cx.arena.lookup(synth).source,
            LookupSource::Synthesized(vec![(
                GlyphName::new("parenleft"),
                GlyphName::new("parenleft#1")
            )])
        );
        assert_eq!(cx.arena.feature(locl).lookups.len(), 1);

        // the TRK language system shares the same feature
        let script = records[1].as_object().unwrap().object("Script").unwrap();
        let trk = script.list("LangSysRecord").unwrap()[0].as_object().unwrap();
        assert_eq!(trk.object("LangSys").unwrap().list("FeatureIndex").unwrap(), &latn[1..]);

        let lookups = merged.object("LookupList").unwrap().list("Lookup").unwrap();
        assert_eq!(lookups, [Value::Lookup(LookupRef::Handle(synth))]);
        let feature_list = merged.object("FeatureList").unwrap();
        assert_eq!(feature_list.int("FeatureCount"), Some(2));
    }

    #[test]
    fn test_existing_locl_gets_lookup_in_front() {
        let options = Options::default();
        let mut cx = empty_context(&options);
        let own = lookup(&mut cx.arena, 0);
        let locl = feature(&mut cx.arena, b"locl", &[own]);
        let font = gsub(
            vec![script_record(b"latn", Some(lang_sys(vec![locl.clone()])), vec![])],
            vec![locl.clone()],
        );
        cx.duplicates = vec![dups()];

        merge_gsub(&mut cx, vec![Some(font.into())]).unwrap();
        let Value::Feature(FeatureRef::Handle(id)) = locl else { panic!() };
        let lookups = &cx.arena.feature(id).lookups;
        assert_eq!(lookups.len(), 2);
        assert_eq!(lookups[1], LookupRef::Handle(own));
    }

    #[test]
    fn test_duplicates_without_gsub() {
        let options = Options::default();
        let mut cx = empty_context(&options);
        cx.duplicates = vec![DuplicateGlyphMap::new(), dups()];
        let font_a = gsub(vec![], vec![]);
        assert!(matches!(
            merge_gsub(&mut cx, vec![Some(font_a.into()), None]),
            Err(MergeError::MissingGsub { count: 1, .. })
        ));
    }
}
