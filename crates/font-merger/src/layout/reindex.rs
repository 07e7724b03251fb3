//! Switching GSUB/GPOS references between indices and arena handles
//!
//! Before merging, every feature and lookup index in a font's table is
//! resolved to the handle it points at. After merging, the reachable
//! entries are collected, everything else is pruned, and the surviving
//! entries get fresh dense indices.

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use read_fonts::types::Tag;

use super::{
    FeatureId, FeatureRef, LayoutArena, LookupId, LookupRef, NO_REQUIRED_FEATURE,
    script_lang_syses_mut,
};
use crate::{
    MergeError, Result,
    value::{Object, Value},
};

fn dangling(table: Tag, kind: &'static str, index: usize) -> MergeError {
    MergeError::DanglingReference { table, kind, index }
}

fn feature_handles(table: Tag, obj: &Object) -> Result<Vec<FeatureId>> {
    let Some(list) = obj.object("FeatureList") else {
        return Ok(Vec::new());
    };
    let records = list.list("FeatureRecord").unwrap_or_default();
    records
        .iter()
        .enumerate()
        .map(|(i, value)| match value {
            Value::Feature(FeatureRef::Handle(id)) => Ok(*id),
            _ => Err(dangling(table, "feature record", i)),
        })
        .collect()
}

fn lookup_handles(table: Tag, obj: &Object) -> Result<Vec<LookupId>> {
    let Some(list) = obj.object("LookupList") else {
        return Ok(Vec::new());
    };
    let lookups = list.list("Lookup").unwrap_or_default();
    lookups
        .iter()
        .enumerate()
        .map(|(i, value)| match value {
            Value::Lookup(LookupRef::Handle(id)) => Ok(*id),
            _ => Err(dangling(table, "lookup", i)),
        })
        .collect()
}

/// Every LangSys of a ScriptList, default first within each script
fn lang_syses_mut(obj: &mut Object) -> Vec<&mut Object> {
    let Some(records) = obj.object_mut("ScriptList").and_then(|l| l.list_mut("ScriptRecord"))
    else {
        return Vec::new();
    };
    records
        .iter_mut()
        .filter_map(Value::as_object_mut)
        .filter_map(|record| record.object_mut("Script"))
        .flat_map(script_lang_syses_mut)
        .collect()
}

/// Replace integer references in one font's GSUB/GPOS with arena handles
///
/// Fails on an index outside the font's lists, and on a required feature.
pub fn dereference(table: Tag, obj: &mut Object, arena: &mut LayoutArena) -> Result<()> {
    let features = feature_handles(table, obj)?;
    let lookups = lookup_handles(table, obj)?;

    let resolve_lookup = |r: &mut LookupRef| -> Result<()> {
        if let LookupRef::Index(i) = *r {
            let id = lookups.get(i as usize).ok_or_else(|| dangling(table, "lookup", i as usize))?;
            *r = LookupRef::Handle(*id);
        }
        Ok(())
    };

    for &id in &features {
        for r in arena.feature_mut(id).lookups.iter_mut() {
            resolve_lookup(r)?;
        }
    }
    for &id in &lookups {
        for r in arena.lookup_mut(id).links.values_mut() {
            resolve_lookup(r)?;
        }
    }

    for lang_sys in lang_syses_mut(obj) {
        if lang_sys.int("ReqFeatureIndex").is_some_and(|v| v != NO_REQUIRED_FEATURE) {
            return Err(MergeError::RequiredFeature { table });
        }
        for value in lang_sys.list_mut("FeatureIndex").into_iter().flatten() {
            if let Value::Feature(FeatureRef::Index(i)) = *value {
                let id = features
                    .get(i as usize)
                    .ok_or_else(|| dangling(table, "feature", i as usize))?;
                *value = Value::Feature(FeatureRef::Handle(*id));
            }
        }
    }
    Ok(())
}

fn feature_id(table: Tag, value: &Value) -> Result<FeatureId> {
    match value {
        Value::Feature(FeatureRef::Handle(id)) => Ok(*id),
        Value::Feature(FeatureRef::Index(i)) => Err(dangling(table, "feature", *i as usize)),
        _ => Err(dangling(table, "feature", usize::MAX)),
    }
}

fn lookup_id(table: Tag, r: &LookupRef) -> Result<LookupId> {
    match r {
        LookupRef::Handle(id) => Ok(*id),
        LookupRef::Index(i) => Err(dangling(table, "lookup", *i as usize)),
    }
}

/// Prune unreachable features and lookups and write indices back
///
/// Features referenced from the ScriptList but missing from the FeatureList
/// (such as synthesized ones) are appended first; lookups likewise.
pub fn reindex(table: Tag, obj: &mut Object, arena: &mut LayoutArena) -> Result<()> {
    let feature_list = reindex_features(table, obj)?;
    reindex_lookups(table, obj, arena, &feature_list)
}

fn reindex_features(table: Tag, obj: &mut Object) -> Result<Vec<FeatureId>> {
    let mut list: IndexSet<FeatureId> = feature_handles(table, obj)?.into_iter().collect();

    let mut used = HashSet::new();
    for lang_sys in lang_syses_mut(obj) {
        for value in lang_sys.list("FeatureIndex").unwrap_or_default() {
            let id = feature_id(table, value)?;
            list.insert(id);
            used.insert(id);
        }
    }
    let before = list.len();
    list.retain(|id| used.contains(id));
    log::debug!("{table}: pruned {} unused features", before - list.len());

    let index: HashMap<FeatureId, u16> =
        list.iter().enumerate().map(|(i, id)| (*id, i as u16)).collect();
    for lang_sys in lang_syses_mut(obj) {
        for value in lang_sys.list_mut("FeatureIndex").into_iter().flatten() {
            let id = feature_id(table, value)?;
            *value = Value::Feature(FeatureRef::Index(index[&id]));
        }
    }

    let records: Vec<Value> = list.iter().map(|id| Value::Feature(FeatureRef::Handle(*id))).collect();
    let count = records.len() as i64;
    let feature_list = obj.object_mut("FeatureList");
    match feature_list {
        Some(feature_list) => {
            feature_list.set("FeatureCount", count);
            feature_list.set("FeatureRecord", Value::List(records));
        }
        None => obj.set(
            "FeatureList",
            Object::new("FeatureList")
                .with("FeatureCount", count)
                .with("FeatureRecord", Value::List(records)),
        ),
    }
    Ok(list.into_iter().collect())
}

fn reindex_lookups(
    table: Tag,
    obj: &mut Object,
    arena: &mut LayoutArena,
    features: &[FeatureId],
) -> Result<()> {
    let mut list: IndexSet<LookupId> = lookup_handles(table, obj)?.into_iter().collect();

    // Lookups reachable from the surviving features, directly or through
    // contextual rules
    let mut used: IndexSet<LookupId> = IndexSet::new();
    let mut pending: Vec<LookupId> = Vec::new();
    for &feature in features {
        for r in &arena.feature(feature).lookups {
            pending.push(lookup_id(table, r)?);
        }
    }
    while let Some(id) = pending.pop() {
        if used.insert(id) {
            for r in arena.lookup(id).links.values() {
                pending.push(lookup_id(table, r)?);
            }
        }
    }

    // Welcome strangers in the order they were first referenced
    for &feature in features {
        for r in &arena.feature(feature).lookups {
            list.insert(lookup_id(table, r)?);
        }
    }
    let mut i = 0;
    while i < list.len() {
        let id = list[i];
        for r in arena.lookup(id).links.values() {
            list.insert(lookup_id(table, r)?);
        }
        i += 1;
    }

    let before = list.len();
    list.retain(|id| used.contains(id));
    log::debug!("{table}: pruned {} unused lookups", before - list.len());

    let index: HashMap<LookupId, u16> =
        list.iter().enumerate().map(|(i, id)| (*id, i as u16)).collect();
    let rewrite = |r: &mut LookupRef| -> Result<()> {
        let id = lookup_id(table, r)?;
        let new = index.get(&id).ok_or_else(|| dangling(table, "lookup", usize::MAX))?;
        *r = LookupRef::Index(*new);
        Ok(())
    };
    for &feature in features {
        for r in arena.feature_mut(feature).lookups.iter_mut() {
            rewrite(r)?;
        }
    }
    for &id in &list {
        for r in arena.lookup_mut(id).links.values_mut() {
            rewrite(r)?;
        }
    }

    let lookups: Vec<Value> = list.iter().map(|id| Value::Lookup(LookupRef::Handle(*id))).collect();
    let count = lookups.len() as i64;
    match obj.object_mut("LookupList") {
        Some(lookup_list) => {
            lookup_list.set("LookupCount", count);
            lookup_list.set("Lookup", Value::List(lookups));
        }
        None => obj.set(
            "LookupList",
            Object::new("LookupList").with("LookupCount", count).with("Lookup", Value::List(lookups)),
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::{
        layout::{FeatureEntry, GSUB, LookupEntry, LookupSource},
        types::FontIndex,
    };

    fn lang_sys(features: &[u16]) -> Object {
        Object::new("LangSys")
            .with("ReqFeatureIndex", NO_REQUIRED_FEATURE)
            .with(
                "FeatureIndex",
                Value::List(
                    features.iter().map(|i| Value::Feature(FeatureRef::Index(*i))).collect(),
                ),
            )
    }

    /// A lifted table: `features[i]` lists lookup indices, `links[i]` the
    /// nested indices of lookup `i`
    fn lifted(
        arena: &mut LayoutArena,
        script_features: &[u16],
        features: &[&[u16]],
        links: &[&[u16]],
    ) -> Object {
        let records = features
            .iter()
            .map(|lookups| {
                let id = arena.add_feature(FeatureEntry {
                    tag: Tag::new(b"liga"),
                    lookups: lookups.iter().map(|i| LookupRef::Index(*i)).collect(),
                });
                Value::Feature(FeatureRef::Handle(id))
            })
            .collect();
        let lookups = links
            .iter()
            .enumerate()
            .map(|(index, nested)| {
                let id = arena.add_lookup(LookupEntry {
                    table: GSUB,
                    source: LookupSource::Font { font: FontIndex::new(0), index: index as u16 },
                    links: nested.iter().map(|i| (*i, LookupRef::Index(*i))).collect::<IndexMap<_, _>>(),
                });
                Value::Lookup(LookupRef::Handle(id))
            })
            .collect();
        let script = Object::new("Script")
            .with("DefaultLangSys", lang_sys(script_features))
            .with("LangSysRecord", Value::List(vec![]));
        Object::new("GSUB")
            .with(
                "ScriptList",
                Object::new("ScriptList").with(
                    "ScriptRecord",
                    Value::List(vec![
                        Object::new("ScriptRecord")
                            .with("ScriptTag", Tag::new(b"latn"))
                            .with("Script", script)
                            .into(),
                    ]),
                ),
            )
            .with("FeatureList", Object::new("FeatureList").with("FeatureRecord", Value::List(records)))
            .with("LookupList", Object::new("LookupList").with("Lookup", Value::List(lookups)))
    }

    fn script_feature_indices(obj: &Object) -> Vec<Value> {
        let record = &obj.object("ScriptList").unwrap().list("ScriptRecord").unwrap()[0];
        let script = record.as_object().unwrap().object("Script").unwrap();
        script.object("DefaultLangSys").unwrap().list("FeatureIndex").unwrap().to_vec()
    }

    fn feature_lookup_indices(arena: &LayoutArena, obj: &Object) -> Vec<Vec<LookupRef>> {
        feature_handles(GSUB, obj)
            .unwrap()
            .into_iter()
            .map(|id| arena.feature(id).lookups.clone())
            .collect()
    }

    #[test]
    fn test_round_trip_restores_indices() {
        let mut arena = LayoutArena::default();
        let mut obj = lifted(&mut arena, &[0, 1], &[&[0], &[1, 2]], &[&[], &[2], &[]]);
        dereference(GSUB, &mut obj, &mut arena).unwrap();
        assert!(matches!(script_feature_indices(&obj)[0], Value::Feature(FeatureRef::Handle(_))));

        reindex(GSUB, &mut obj, &mut arena).unwrap();
        assert_eq!(
            script_feature_indices(&obj),
            [Value::Feature(FeatureRef::Index(0)), Value::Feature(FeatureRef::Index(1))]
        );
        assert_eq!(
            feature_lookup_indices(&arena, &obj),
            [vec![LookupRef::Index(0)], vec![LookupRef::Index(1), LookupRef::Index(2)]]
        );
        let lookups = lookup_handles(GSUB, &obj).unwrap();
        assert_eq!(arena.lookup(lookups[1]).links[&2], LookupRef::Index(2));
        assert_eq!(obj.object("LookupList").unwrap().int("LookupCount"), Some(3));
    }

    #[test]
    fn test_unused_entries_are_pruned() {
        let mut arena = LayoutArena::default();
        // feature 0 is unused, so lookup 0 goes; lookup 3 is only reachable
        // through lookup 2
        let mut obj = lifted(&mut arena, &[1], &[&[0], &[2]], &[&[], &[], &[3], &[]]);
        dereference(GSUB, &mut obj, &mut arena).unwrap();
        reindex(GSUB, &mut obj, &mut arena).unwrap();

        assert_eq!(script_feature_indices(&obj), [Value::Feature(FeatureRef::Index(0))]);
        assert_eq!(obj.object("FeatureList").unwrap().int("FeatureCount"), Some(1));
        assert_eq!(feature_lookup_indices(&arena, &obj), [vec![LookupRef::Index(0)]]);

        let lookups = lookup_handles(GSUB, &obj).unwrap();
        assert_eq!(lookups.len(), 2);
        assert_eq!(arena.lookup(lookups[0]).links[&3], LookupRef::Index(1));
    }

    #[test]
    fn test_dangling_index_is_an_error() {
        let mut arena = LayoutArena::default();
        let mut obj = lifted(&mut arena, &[5], &[&[0]], &[&[]]);
        assert!(matches!(
            dereference(GSUB, &mut obj, &mut arena),
            Err(MergeError::DanglingReference { kind: "feature", index: 5, .. })
        ));

        let mut arena = LayoutArena::default();
        let mut obj = lifted(&mut arena, &[0], &[&[4]], &[&[]]);
        assert!(matches!(
            dereference(GSUB, &mut obj, &mut arena),
            Err(MergeError::DanglingReference { kind: "lookup", index: 4, .. })
        ));
    }

    #[test]
    fn test_required_feature_is_rejected() {
        let mut arena = LayoutArena::default();
        let mut obj = lifted(&mut arena, &[0], &[&[0]], &[&[]]);
        for lang_sys in lang_syses_mut(&mut obj) {
            lang_sys.set("ReqFeatureIndex", 0);
        }
        assert!(matches!(
            dereference(GSUB, &mut obj, &mut arena),
            Err(MergeError::RequiredFeature { .. })
        ));
    }

    #[test]
    fn test_strangers_are_welcomed() {
        let mut arena = LayoutArena::default();
        let mut obj = lifted(&mut arena, &[0], &[&[0]], &[&[]]);
        dereference(GSUB, &mut obj, &mut arena).unwrap();

        // a feature and lookup referenced only from the script list
        let synth_lookup = arena.add_lookup(LookupEntry {
            table: GSUB,
            source: LookupSource::Synthesized(vec![]),
            links: IndexMap::new(),
        });
        let synth = arena.add_feature(FeatureEntry {
            tag: Tag::new(b"locl"),
            lookups: vec![LookupRef::Handle(synth_lookup)],
        });
        for lang_sys in lang_syses_mut(&mut obj) {
            lang_sys
                .list_mut("FeatureIndex")
                .unwrap()
                .push(Value::Feature(FeatureRef::Handle(synth)));
        }

        reindex(GSUB, &mut obj, &mut arena).unwrap();
        assert_eq!(obj.object("FeatureList").unwrap().int("FeatureCount"), Some(2));
        assert_eq!(obj.object("LookupList").unwrap().int("LookupCount"), Some(2));
        assert_eq!(arena.feature(synth).lookups, [LookupRef::Index(1)]);
    }
}
