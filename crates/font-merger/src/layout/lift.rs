//! Reading GSUB and GPOS into mergeable objects
//!
//! Feature records and lookups move into the arena; script and feature
//! references to them stay integer indices until [`super::reindex::dereference`].

use read_fonts::{
    TableProvider,
    tables::{
        gpos::{Gpos, PositionSubtables},
        gsub::{Gsub, SubstitutionSubtables},
        layout::{ChainedSequenceContext, FeatureList, LangSys, ScriptList, SequenceContext},
    },
    types::{MajorMinor, Tag},
};

use super::{
    FeatureEntry, FeatureRef, GPOS, GSUB, LayoutArena, LookupEntry, LookupRef, LookupSource,
};
use crate::{
    Result,
    context::SourceFont,
    value::{Object, Value},
};

pub fn version(version: MajorMinor) -> i64 {
    ((version.major as i64) << 16) | version.minor as i64
}

/// Lift a font's GSUB or GPOS, `None` if the font lacks it
pub fn lift_layout(src: &SourceFont, arena: &mut LayoutArena, table: Tag) -> Result<Option<Value>> {
    let (version, script_list, feature_list, links) = if table == GSUB {
        let Ok(gsub) = src.font.gsub() else {
            return Ok(None);
        };
        (version(gsub.version()), gsub.script_list()?, gsub.feature_list()?, gsub_links(&gsub)?)
    } else if table == GPOS {
        let Ok(gpos) = src.font.gpos() else {
            return Ok(None);
        };
        (version(gpos.version()), gpos.script_list()?, gpos.feature_list()?, gpos_links(&gpos)?)
    } else {
        return Ok(None);
    };

    let lookups: Vec<Value> = links
        .into_iter()
        .enumerate()
        .map(|(index, nested)| {
            let id = arena.add_lookup(LookupEntry {
                table,
                source: LookupSource::Font { font: src.index, index: index as u16 },
                links: nested.into_iter().map(|i| (i, LookupRef::Index(i))).collect(),
            });
            Value::Lookup(LookupRef::Handle(id))
        })
        .collect();

    let obj = Object::new(if table == GSUB { "GSUB" } else { "GPOS" })
        .with("tableTag", table)
        .with("Version", version)
        .with("ScriptList", lift_script_list(&script_list)?)
        .with("FeatureList", lift_feature_list(&feature_list, arena)?)
        .with(
            "LookupList",
            Object::new("LookupList")
                .with("LookupCount", lookups.len() as i64)
                .with("Lookup", Value::List(lookups)),
        );
    Ok(Some(obj.into()))
}

fn lift_script_list(list: &ScriptList) -> Result<Object> {
    let records = list
        .script_records()
        .iter()
        .map(|record| {
            let script = record.script(list.offset_data())?;
            let default = script.default_lang_sys().transpose()?.map(|ls| lift_lang_sys(&ls));
            let lang_sys_records = script
                .lang_sys_records()
                .iter()
                .map(|lang_record| {
                    let lang_sys = lang_record.lang_sys(script.offset_data())?;
                    Ok(Object::new("LangSysRecord")
                        .with("LangSysTag", lang_record.lang_sys_tag())
                        .with("LangSys", lift_lang_sys(&lang_sys))
                        .into())
                })
                .collect::<Result<Vec<Value>>>()?;
            let script = Object::new("Script")
                .with_opt("DefaultLangSys", default)
                .with("LangSysRecord", Value::List(lang_sys_records));
            Ok(Object::new("ScriptRecord")
                .with("ScriptTag", record.script_tag())
                .with("Script", script)
                .into())
        })
        .collect::<Result<Vec<Value>>>()?;

    Ok(Object::new("ScriptList")
        .with("ScriptCount", records.len() as i64)
        .with("ScriptRecord", Value::List(records)))
}

fn lift_lang_sys(lang_sys: &LangSys) -> Object {
    let features = lang_sys
        .feature_indices()
        .iter()
        .map(|idx| Value::Feature(FeatureRef::Index(idx.get())))
        .collect();
    Object::new("LangSys")
        .with("ReqFeatureIndex", lang_sys.required_feature_index() as i64)
        .with("FeatureIndex", Value::List(features))
}

fn lift_feature_list(list: &FeatureList, arena: &mut LayoutArena) -> Result<Object> {
    let records = list
        .feature_records()
        .iter()
        .map(|record| {
            let feature = record.feature(list.offset_data())?;
            let id = arena.add_feature(FeatureEntry {
                tag: record.feature_tag(),
                lookups: feature
                    .lookup_list_indices()
                    .iter()
                    .map(|idx| LookupRef::Index(idx.get()))
                    .collect(),
            });
            Ok(Value::Feature(FeatureRef::Handle(id)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Object::new("FeatureList")
        .with("FeatureCount", records.len() as i64)
        .with("FeatureRecord", Value::List(records)))
}

/// Nested lookup indices of every GSUB lookup, in lookup list order
fn gsub_links(gsub: &Gsub) -> Result<Vec<Vec<u16>>> {
    let list = gsub.lookup_list()?;
    list.lookups()
        .iter()
        .map(|lookup| {
            let mut links = Vec::new();
            match lookup?.subtables()? {
                SubstitutionSubtables::Contextual(subtables) => {
                    for subtable in subtables.iter() {
                        sequence_links(&subtable?, &mut links)?;
                    }
                }
                SubstitutionSubtables::ChainContextual(subtables) => {
                    for subtable in subtables.iter() {
                        chain_links(&subtable?, &mut links)?;
                    }
                }
                _ => (),
            }
            Ok(links)
        })
        .collect()
}

/// Nested lookup indices of every GPOS lookup, in lookup list order
fn gpos_links(gpos: &Gpos) -> Result<Vec<Vec<u16>>> {
    let list = gpos.lookup_list()?;
    list.lookups()
        .iter()
        .map(|lookup| {
            let mut links = Vec::new();
            match lookup?.subtables()? {
                PositionSubtables::Contextual(subtables) => {
                    for subtable in subtables.iter() {
                        sequence_links(&subtable?, &mut links)?;
                    }
                }
                PositionSubtables::ChainContextual(subtables) => {
                    for subtable in subtables.iter() {
                        chain_links(&subtable?, &mut links)?;
                    }
                }
                _ => (),
            }
            Ok(links)
        })
        .collect()
}

fn push_link(links: &mut Vec<u16>, index: u16) {
    if !links.contains(&index) {
        links.push(index);
    }
}

fn sequence_links(context: &SequenceContext, links: &mut Vec<u16>) -> Result<()> {
    match context {
        SequenceContext::Format1(f1) => {
            for rule_set in f1.seq_rule_sets().iter().flatten() {
                for rule in rule_set?.seq_rules().iter() {
                    for record in rule?.seq_lookup_records() {
                        push_link(links, record.lookup_list_index());
                    }
                }
            }
        }
        SequenceContext::Format2(f2) => {
            for rule_set in f2.class_seq_rule_sets().iter().flatten() {
                for rule in rule_set?.class_seq_rules().iter() {
                    for record in rule?.seq_lookup_records() {
                        push_link(links, record.lookup_list_index());
                    }
                }
            }
        }
        SequenceContext::Format3(f3) => {
            for record in f3.seq_lookup_records() {
                push_link(links, record.lookup_list_index());
            }
        }
    }
    Ok(())
}

fn chain_links(context: &ChainedSequenceContext, links: &mut Vec<u16>) -> Result<()> {
    match context {
        ChainedSequenceContext::Format1(f1) => {
            for rule_set in f1.chained_seq_rule_sets().iter().flatten() {
                for rule in rule_set?.chained_seq_rules().iter() {
                    for record in rule?.seq_lookup_records() {
                        push_link(links, record.lookup_list_index());
                    }
                }
            }
        }
        ChainedSequenceContext::Format2(f2) => {
            for rule_set in f2.chained_class_seq_rule_sets().iter().flatten() {
                for rule in rule_set?.chained_class_seq_rules().iter() {
                    for record in rule?.seq_lookup_records() {
                        push_link(links, record.lookup_list_index());
                    }
                }
            }
        }
        ChainedSequenceContext::Format3(f3) => {
            for record in f3.seq_lookup_records() {
                push_link(links, record.lookup_list_index());
            }
        }
    }
    Ok(())
}

/// JSTF and MATH: only the version header survives lifting
pub fn lift_header_only(src: &SourceFont, tag: Tag, class: &'static str) -> Result<Option<Value>> {
    let Some(data) = src.font.table_data(tag) else {
        return Ok(None);
    };
    let version = data.read_at::<u32>(0)?;
    Ok(Some(
        Object::new(class)
            .with("tableTag", tag)
            .with("Version", version as i64)
            .into(),
    ))
}
