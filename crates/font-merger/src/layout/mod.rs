//! OpenType layout tables: GSUB, GPOS, GDEF, BASE, JSTF and MATH
//!
//! GSUB and GPOS reference features and lookups by position in flat lists.
//! Those lists are owned by a [`LayoutArena`] for the duration of a merge and
//! addressed by handles, so that merging does not need per-font index
//! arithmetic:
//!
//! 1. [`lift`] reads a font's table into an object whose feature and lookup
//!    lists hold handles, while every reference *to* them is still an index
//! 2. [`reindex::dereference`] resolves those indices into handles
//! 3. the tables are merged ([`merge`])
//! 4. [`reindex::reindex`] prunes unreachable entries and writes fresh indices
//! 5. [`lower`] converts the lookups (kept as references into the source
//!    fonts until now) and builds the write-fonts tables

pub mod base;
pub mod convert;
pub mod gdef;
pub mod lift;
pub mod lower;
pub mod merge;
pub mod reindex;

use indexmap::IndexMap;
use read_fonts::types::Tag;

use crate::{
    glyph_order::GlyphName,
    types::FontIndex,
    value::{Object, Value},
};

pub const GSUB: Tag = Tag::new(b"GSUB");
pub const GPOS: Tag = Tag::new(b"GPOS");

/// Sentinel for "no required feature"
pub const NO_REQUIRED_FEATURE: i64 = 0xFFFF;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LookupId(u32);

/// A reference to a feature record, serialized or resolved
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FeatureRef {
    Index(u16),
    Handle(FeatureId),
}

/// A reference to a lookup, serialized or resolved
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LookupRef {
    Index(u16),
    Handle(LookupId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FeatureEntry {
    pub tag: Tag,
    pub lookups: Vec<LookupRef>,
}

/// Where a lookup's body comes from
#[derive(Clone, Debug, PartialEq)]
pub enum LookupSource {
    /// Lookup `index` of the font's GSUB or GPOS lookup list
    Font { font: FontIndex, index: u16 },
    /// A single substitution built during the merge
    Synthesized(Vec<(GlyphName, GlyphName)>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct LookupEntry {
    pub table: Tag,
    pub source: LookupSource,
    /// Nested lookup indices used by contextual rules, keyed by the index
    /// as written in the source lookup
    pub links: IndexMap<u16, LookupRef>,
}

/// Owner of every feature record and lookup seen during a merge
#[derive(Debug, Default)]
pub struct LayoutArena {
    features: Vec<FeatureEntry>,
    lookups: Vec<LookupEntry>,
}

impl LayoutArena {
    pub fn add_feature(&mut self, entry: FeatureEntry) -> FeatureId {
        self.features.push(entry);
        FeatureId(self.features.len() as u32 - 1)
    }

    pub fn add_lookup(&mut self, entry: LookupEntry) -> LookupId {
        self.lookups.push(entry);
        LookupId(self.lookups.len() as u32 - 1)
    }

    pub fn feature(&self, id: FeatureId) -> &FeatureEntry {
        &self.features[id.0 as usize]
    }

    pub fn feature_mut(&mut self, id: FeatureId) -> &mut FeatureEntry {
        &mut self.features[id.0 as usize]
    }

    pub fn lookup(&self, id: LookupId) -> &LookupEntry {
        &self.lookups[id.0 as usize]
    }

    pub fn lookup_mut(&mut self, id: LookupId) -> &mut LookupEntry {
        &mut self.lookups[id.0 as usize]
    }
}

/// The default LangSys of a Script followed by those of its LangSysRecords
pub fn script_lang_syses_mut(script: &mut Object) -> Vec<&mut Object> {
    let mut out = Vec::new();
    for (name, value) in script.fields_mut() {
        match (name, value) {
            ("DefaultLangSys", Value::Object(lang_sys)) => out.push(lang_sys),
            ("LangSysRecord", Value::List(records)) => out.extend(
                records
                    .iter_mut()
                    .filter_map(Value::as_object_mut)
                    .filter_map(|record| record.object_mut("LangSys")),
            ),
            _ => (),
        }
    }
    out
}
