//! Building write-fonts GSUB and GPOS from merged, reindexed objects

use read_fonts::{TableProvider, types::Tag};
use write_fonts::tables::{
    gpos::{Gpos, PositionLookup, PositionLookupList},
    gsub::{Gsub, SubstitutionLookup, SubstitutionLookupList},
    layout::{
        Feature, FeatureList, FeatureRecord, LangSys, LangSysRecord, Script, ScriptList,
        ScriptRecord,
    },
};

use super::{
    FeatureRef, GPOS, GSUB, LookupEntry, LookupRef, LookupSource,
    convert::{LookupRemap, synthesized_lookup},
};
use crate::{
    MergeError, Result,
    context::MergeContext,
    value::{Object, Value},
};

fn dangling(table: Tag, kind: &'static str, index: usize) -> MergeError {
    MergeError::DanglingReference { table, kind, index }
}

fn objects<'a>(obj: &'a Object, field: &str) -> Result<Vec<&'a Object>> {
    obj.list(field)
        .unwrap_or_default()
        .iter()
        .map(|v| v.as_object().ok_or_else(|| obj.type_mismatch(field)))
        .collect()
}

fn lower_lang_sys(table: Tag, lang_sys: &Object) -> Result<LangSys> {
    let features = lang_sys
        .list("FeatureIndex")
        .unwrap_or_default()
        .iter()
        .map(|value| match value {
            Value::Feature(FeatureRef::Index(i)) => Ok(*i),
            _ => Err(dangling(table, "feature", usize::MAX)),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LangSys::new(features))
}

fn lower_script_list(table: Tag, obj: &Object) -> Result<ScriptList> {
    let Some(list) = obj.object("ScriptList") else {
        return Ok(ScriptList::default());
    };
    let records = objects(list, "ScriptRecord")?
        .into_iter()
        .map(|record| {
            let tag = record.tag("ScriptTag").ok_or_else(|| record.type_mismatch("ScriptTag"))?;
            let script = record.object("Script").ok_or_else(|| record.type_mismatch("Script"))?;
            let default = script
                .object("DefaultLangSys")
                .map(|ls| lower_lang_sys(table, ls))
                .transpose()?;
            let lang_sys_records = objects(script, "LangSysRecord")?
                .into_iter()
                .map(|lang_record| {
                    let lang_tag = lang_record
                        .tag("LangSysTag")
                        .ok_or_else(|| lang_record.type_mismatch("LangSysTag"))?;
                    let lang_sys = lang_record
                        .object("LangSys")
                        .ok_or_else(|| lang_record.type_mismatch("LangSys"))?;
                    Ok(LangSysRecord::new(lang_tag, lower_lang_sys(table, lang_sys)?))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(ScriptRecord::new(tag, Script::new(default, lang_sys_records)))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ScriptList::new(records))
}

fn lower_feature_list(cx: &MergeContext, table: Tag, obj: &Object) -> Result<FeatureList> {
    let records = obj
        .object("FeatureList")
        .and_then(|list| list.list("FeatureRecord"))
        .unwrap_or_default();
    let records = records
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let Value::Feature(FeatureRef::Handle(id)) = value else {
                return Err(dangling(table, "feature record", i));
            };
            let entry = cx.arena.feature(*id);
            let lookups = entry
                .lookups
                .iter()
                .map(|r| match r {
                    LookupRef::Index(i) => Ok(*i),
                    LookupRef::Handle(_) => Err(dangling(table, "lookup", usize::MAX)),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(FeatureRecord::new(entry.tag, Feature::new(None, lookups)))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(FeatureList::new(records))
}

/// The arena entries of the LookupList, in order
fn lookup_entries<'a>(
    cx: &'a MergeContext,
    table: Tag,
    obj: &Object,
) -> Result<Vec<&'a LookupEntry>> {
    let lookups = obj
        .object("LookupList")
        .and_then(|list| list.list("Lookup"))
        .unwrap_or_default();
    lookups
        .iter()
        .enumerate()
        .map(|(i, value)| match value {
            Value::Lookup(LookupRef::Handle(id)) => Ok(cx.arena.lookup(*id)),
            _ => Err(dangling(table, "lookup", i)),
        })
        .collect()
}

fn lower_gsub_lookup(cx: &MergeContext, entry: &LookupEntry) -> Result<SubstitutionLookup> {
    match &entry.source {
        LookupSource::Font { font, index } => {
            let src = cx.font(*font);
            let lookup = src.font.gsub()?.lookup_list()?.lookups().get(*index as usize)?;
            LookupRemap::new(GSUB, src, &entry.links).gsub_lookup(&lookup)
        }
        LookupSource::Synthesized(pairs) => {
            let pairs = pairs
                .iter()
                .map(|(from, to)| Ok((cx.require_mega_id(from)?, cx.require_mega_id(to)?)))
                .collect::<Result<Vec<_>>>()?;
            Ok(synthesized_lookup(pairs))
        }
    }
}

fn lower_gpos_lookup(cx: &MergeContext, entry: &LookupEntry) -> Result<PositionLookup> {
    match &entry.source {
        LookupSource::Font { font, index } => {
            let src = cx.font(*font);
            let lookup = src.font.gpos()?.lookup_list()?.lookups().get(*index as usize)?;
            LookupRemap::new(GPOS, src, &entry.links).gpos_lookup(&lookup)
        }
        LookupSource::Synthesized(_) => Err(dangling(GPOS, "synthesized lookup", usize::MAX)),
    }
}

pub fn lower_gsub(cx: &MergeContext, obj: &Object) -> Result<Gsub> {
    let lookups = lookup_entries(cx, GSUB, obj)?
        .into_iter()
        .map(|entry| lower_gsub_lookup(cx, entry))
        .collect::<Result<Vec<_>>>()?;
    Ok(Gsub::new(
        lower_script_list(GSUB, obj)?,
        lower_feature_list(cx, GSUB, obj)?,
        SubstitutionLookupList::new(lookups),
    ))
}

pub fn lower_gpos(cx: &MergeContext, obj: &Object) -> Result<Gpos> {
    let lookups = lookup_entries(cx, GPOS, obj)?
        .into_iter()
        .map(|entry| lower_gpos_lookup(cx, entry))
        .collect::<Result<Vec<_>>>()?;
    Ok(Gpos::new(
        lower_script_list(GPOS, obj)?,
        lower_feature_list(cx, GPOS, obj)?,
        PositionLookupList::new(lookups),
    ))
}
