//! Converting source-font lookups into write-fonts lookups of the merged font
//!
//! Glyph ids move by the font's offset in the merged glyph order, nested
//! lookup indices go through the arena links, and mark filtering sets move
//! by the number of sets in earlier fonts. Extension lookups come out as
//! their concrete type.

use font_types::{BigEndian, GlyphId16};
use indexmap::IndexMap;
use read_fonts::{
    tables::{
        gpos::{self as read_gpos, PositionSubtables},
        gsub::{self as read_gsub, SubstitutionSubtables},
        layout as read_layout,
    },
    types::Tag,
};
use write_fonts::tables::{
    gpos::{
        AnchorFormat1, AnchorFormat2, AnchorFormat3, AnchorTable, BaseArray, BaseRecord,
        Class1Record, Class2Record, ComponentRecord, CursivePosFormat1, EntryExitRecord,
        LigatureArray, LigatureAttach, Mark2Array, Mark2Record, MarkArray, MarkBasePosFormat1,
        MarkLigPosFormat1, MarkMarkPosFormat1, MarkRecord, PairPos, PairPosFormat1,
        PairPosFormat2, PairSet, PairValueRecord, PositionChainContext, PositionLookup,
        PositionSequenceContext, SinglePos, SinglePosFormat1, SinglePosFormat2, ValueRecord,
    },
    gsub::{
        AlternateSet, AlternateSubstFormat1, Ligature, LigatureSet, LigatureSubstFormat1,
        MultipleSubstFormat1, ReverseChainSingleSubstFormat1, Sequence, SingleSubst,
        SubstitutionChainContext, SubstitutionLookup, SubstitutionSequenceContext,
    },
    layout::{
        ChainedClassSequenceRule, ChainedClassSequenceRuleSet, ChainedSequenceContext,
        ChainedSequenceContextFormat1, ChainedSequenceContextFormat2,
        ChainedSequenceContextFormat3, ChainedSequenceRule, ChainedSequenceRuleSet, ClassDef,
        ClassSequenceRule, ClassSequenceRuleSet, CoverageTable, Lookup, LookupFlag,
        SequenceContext, SequenceContextFormat1, SequenceContextFormat2, SequenceContextFormat3,
        SequenceLookupRecord, SequenceRule, SequenceRuleSet,
    },
};

use super::LookupRef;
use crate::{MergeError, Result, context::SourceFont, types::MegaGlyphId};

type ReadResult<T> = std::result::Result<T, read_fonts::ReadError>;

/// Convert a read-fonts type to its write-fonts equivalent
pub trait ToWrite {
    type Output;
    fn to_write(&self) -> Self::Output;
}

impl ToWrite for read_gpos::ValueRecord {
    type Output = ValueRecord;

    fn to_write(&self) -> ValueRecord {
        let mut result = ValueRecord::new();
        if let Some(v) = self.x_placement {
            result = result.with_x_placement(v.get());
        }
        if let Some(v) = self.y_placement {
            result = result.with_y_placement(v.get());
        }
        if let Some(v) = self.x_advance {
            result = result.with_x_advance(v.get());
        }
        if let Some(v) = self.y_advance {
            result = result.with_y_advance(v.get());
        }
        result
    }
}

impl ToWrite for read_gpos::AnchorTable<'_> {
    type Output = AnchorTable;

    fn to_write(&self) -> AnchorTable {
        match self {
            read_gpos::AnchorTable::Format1(a) => {
                AnchorTable::Format1(AnchorFormat1::new(a.x_coordinate(), a.y_coordinate()))
            }
            read_gpos::AnchorTable::Format2(a) => AnchorTable::Format2(AnchorFormat2::new(
                a.x_coordinate(),
                a.y_coordinate(),
                a.anchor_point(),
            )),
            // device tables are not carried over
            read_gpos::AnchorTable::Format3(a) => AnchorTable::Format3(AnchorFormat3::new(
                a.x_coordinate(),
                a.y_coordinate(),
                None,
                None,
            )),
        }
    }
}

/// Extension trait for converting MarkArray
pub trait MarkArrayExt {
    fn to_write(&self) -> Result<MarkArray>;
}

impl MarkArrayExt for read_gpos::MarkArray<'_> {
    fn to_write(&self) -> Result<MarkArray> {
        let mark_records = self
            .mark_records()
            .iter()
            .map(|record| {
                let anchor = record.mark_anchor(self.offset_data())?.to_write();
                Ok(MarkRecord::new(record.mark_class(), anchor))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MarkArray::new(mark_records))
    }
}

fn anchors<'a>(
    iter: impl Iterator<Item = Option<ReadResult<read_gpos::AnchorTable<'a>>>>,
) -> Result<Vec<Option<AnchorTable>>> {
    iter.map(|anchor| Ok(anchor.transpose()?.map(|a| a.to_write()))).collect()
}

fn with_mark_set<T>(mut lookup: Lookup<T>, mark_filtering_set: Option<u16>) -> Lookup<T> {
    lookup.mark_filtering_set = mark_filtering_set;
    lookup
}

/// Everything needed to move one source lookup into the merged font
pub struct LookupRemap<'a> {
    table: Tag,
    glyph_offset: u16,
    num_glyphs: u16,
    mark_set_offset: u16,
    links: &'a IndexMap<u16, LookupRef>,
}

impl<'a> LookupRemap<'a> {
    pub fn new(table: Tag, src: &SourceFont, links: &'a IndexMap<u16, LookupRef>) -> Self {
        Self {
            table,
            glyph_offset: src.glyph_offset,
            num_glyphs: src.num_glyphs(),
            mark_set_offset: src.mark_set_offset,
            links,
        }
    }

    /// Merged id of a source glyph, `None` for ids outside the font
    fn gid(&self, gid: u32) -> Option<GlyphId16> {
        (gid < self.num_glyphs as u32).then(|| GlyphId16::new(self.glyph_offset + gid as u16))
    }

    fn glyphs(&self, glyphs: &[BigEndian<GlyphId16>]) -> Option<Vec<GlyphId16>> {
        glyphs.iter().map(|g| self.gid(g.get().to_u32())).collect()
    }

    fn coverage(&self, coverage: &read_layout::CoverageTable) -> CoverageTable {
        CoverageTable::format_1(coverage.iter().filter_map(|gid| self.gid(gid.to_u32())).collect())
    }

    /// A coverage and the records indexed by it, dropping glyphs outside the
    /// font together with their records
    fn covered<T>(
        &self,
        coverage: &read_layout::CoverageTable,
        records: Vec<T>,
    ) -> (CoverageTable, Vec<T>) {
        let (glyphs, records): (Vec<_>, Vec<_>) = coverage
            .iter()
            .zip(records)
            .filter_map(|(gid, record)| Some((self.gid(gid.to_u32())?, record)))
            .unzip();
        (CoverageTable::format_1(glyphs), records)
    }

    fn marks(
        &self,
        coverage: &read_layout::CoverageTable,
        array: &read_gpos::MarkArray,
    ) -> Result<(CoverageTable, MarkArray)> {
        let (coverage, records) = self.covered(coverage, array.to_write()?.mark_records);
        Ok((coverage, MarkArray::new(records)))
    }

    fn class_def(&self, class_def: &read_layout::ClassDef) -> ClassDef {
        ClassDef::from_iter(
            class_def
                .iter()
                .filter_map(|(gid, class)| self.gid(gid.to_u32()).map(|gid| (gid, class))),
        )
    }

    fn coverages<'b>(
        &self,
        coverages: impl Iterator<Item = ReadResult<read_layout::CoverageTable<'b>>>,
    ) -> Result<Vec<CoverageTable>> {
        coverages.map(|c| Ok(self.coverage(&c?))).collect()
    }

    fn mark_filtering_set(&self, set: Option<u16>) -> Option<u16> {
        set.map(|set| set + self.mark_set_offset)
    }

    fn seq_lookup_records(
        &self,
        records: &[read_layout::SequenceLookupRecord],
    ) -> Result<Vec<SequenceLookupRecord>> {
        records
            .iter()
            .map(|record| {
                let index = record.lookup_list_index();
                match self.links.get(&index) {
                    Some(LookupRef::Index(new)) => {
                        Ok(SequenceLookupRecord::new(record.sequence_index(), *new))
                    }
                    _ => Err(MergeError::DanglingReference {
                        table: self.table,
                        kind: "nested lookup",
                        index: index as usize,
                    }),
                }
            })
            .collect()
    }

    pub fn gsub_lookup(&self, lookup: &read_gsub::SubstitutionLookup) -> Result<SubstitutionLookup> {
        let flag = lookup.lookup_flag();
        let mark_set = self.mark_filtering_set(lookup.mark_filtering_set());
        Ok(match lookup.subtables()? {
            SubstitutionSubtables::Single(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| self.single_subst(&s?))
                    .collect::<Result<Vec<_>>>()?;
                SubstitutionLookup::Single(with_mark_set(Lookup::new(flag, subtables), mark_set))
            }
            SubstitutionSubtables::Multiple(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| self.multiple_subst(&s?))
                    .collect::<Result<Vec<_>>>()?;
                SubstitutionLookup::Multiple(with_mark_set(Lookup::new(flag, subtables), mark_set))
            }
            SubstitutionSubtables::Alternate(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| self.alternate_subst(&s?))
                    .collect::<Result<Vec<_>>>()?;
                SubstitutionLookup::Alternate(with_mark_set(Lookup::new(flag, subtables), mark_set))
            }
            SubstitutionSubtables::Ligature(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| self.ligature_subst(&s?))
                    .collect::<Result<Vec<_>>>()?;
                SubstitutionLookup::Ligature(with_mark_set(Lookup::new(flag, subtables), mark_set))
            }
            SubstitutionSubtables::Contextual(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| Ok(SubstitutionSequenceContext::from(self.sequence_context(&s?)?)))
                    .collect::<Result<Vec<_>>>()?;
                SubstitutionLookup::Contextual(with_mark_set(Lookup::new(flag, subtables), mark_set))
            }
            SubstitutionSubtables::ChainContextual(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| Ok(SubstitutionChainContext::from(self.chained_context(&s?)?)))
                    .collect::<Result<Vec<_>>>()?;
                SubstitutionLookup::ChainContextual(with_mark_set(
                    Lookup::new(flag, subtables),
                    mark_set,
                ))
            }
            SubstitutionSubtables::Reverse(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| self.reverse_subst(&s?))
                    .collect::<Result<Vec<_>>>()?;
                SubstitutionLookup::Reverse(with_mark_set(Lookup::new(flag, subtables), mark_set))
            }
        })
    }

    fn single_subst(&self, subtable: &read_gsub::SingleSubst) -> Result<SingleSubst> {
        let (coverage, substitutes): (_, Vec<u32>) = match subtable {
            read_gsub::SingleSubst::Format1(f1) => {
                // the delta is applied modulo 65536
                let delta = f1.delta_glyph_id() as u16;
                let coverage = f1.coverage()?;
                let substitutes = coverage
                    .iter()
                    .map(|gid| gid.to_u16().wrapping_add(delta) as u32)
                    .collect();
                (coverage, substitutes)
            }
            read_gsub::SingleSubst::Format2(f2) => {
                let substitutes = f2.substitute_glyph_ids().iter().map(|g| g.get().to_u32()).collect();
                (f2.coverage()?, substitutes)
            }
        };
        // Only keep pairs where both glyphs can be remapped
        let (glyphs, substitutes): (Vec<_>, Vec<_>) = coverage
            .iter()
            .zip(substitutes)
            .filter_map(|(gid, sub)| Some((self.gid(gid.to_u32())?, self.gid(sub)?)))
            .unzip();
        Ok(SingleSubst::format_2(CoverageTable::format_1(glyphs), substitutes))
    }

    fn multiple_subst(&self, subtable: &read_gsub::MultipleSubstFormat1) -> Result<MultipleSubstFormat1> {
        let coverage = subtable.coverage()?;
        let mut glyphs = Vec::new();
        let mut sequences = Vec::new();
        for (gid, sequence) in coverage.iter().zip(subtable.sequences().iter()) {
            let sequence = sequence?;
            if let (Some(gid), Some(substitutes)) =
                (self.gid(gid.to_u32()), self.glyphs(sequence.substitute_glyph_ids()))
            {
                glyphs.push(gid);
                sequences.push(Sequence::new(substitutes));
            }
        }
        Ok(MultipleSubstFormat1::new(CoverageTable::format_1(glyphs), sequences))
    }

    fn alternate_subst(
        &self,
        subtable: &read_gsub::AlternateSubstFormat1,
    ) -> Result<AlternateSubstFormat1> {
        let coverage = subtable.coverage()?;
        let mut glyphs = Vec::new();
        let mut sets = Vec::new();
        for (gid, set) in coverage.iter().zip(subtable.alternate_sets().iter()) {
            let set = set?;
            if let (Some(gid), Some(alternates)) =
                (self.gid(gid.to_u32()), self.glyphs(set.alternate_glyph_ids()))
            {
                glyphs.push(gid);
                sets.push(AlternateSet::new(alternates));
            }
        }
        Ok(AlternateSubstFormat1::new(CoverageTable::format_1(glyphs), sets))
    }

    fn ligature_subst(
        &self,
        subtable: &read_gsub::LigatureSubstFormat1,
    ) -> Result<LigatureSubstFormat1> {
        let coverage = subtable.coverage()?;
        let mut glyphs = Vec::new();
        let mut sets = Vec::new();
        for (gid, set) in coverage.iter().zip(subtable.ligature_sets().iter()) {
            let set = set?;
            let Some(gid) = self.gid(gid.to_u32()) else {
                continue;
            };
            let mut ligatures = Vec::new();
            for ligature in set.ligatures().iter() {
                let ligature = ligature?;
                if let (Some(glyph), Some(components)) = (
                    self.gid(ligature.ligature_glyph().to_u32()),
                    self.glyphs(ligature.component_glyph_ids()),
                ) {
                    ligatures.push(Ligature::new(glyph, components));
                }
            }
            glyphs.push(gid);
            sets.push(LigatureSet::new(ligatures));
        }
        Ok(LigatureSubstFormat1::new(CoverageTable::format_1(glyphs), sets))
    }

    fn reverse_subst(
        &self,
        subtable: &read_gsub::ReverseChainSingleSubstFormat1,
    ) -> Result<ReverseChainSingleSubstFormat1> {
        let (glyphs, substitutes): (Vec<_>, Vec<_>) = subtable
            .coverage()?
            .iter()
            .zip(subtable.substitute_glyph_ids())
            .filter_map(|(gid, sub)| {
                Some((self.gid(gid.to_u32())?, self.gid(sub.get().to_u32())?))
            })
            .unzip();
        Ok(ReverseChainSingleSubstFormat1::new(
            CoverageTable::format_1(glyphs),
            self.coverages(subtable.backtrack_coverages().iter())?,
            self.coverages(subtable.lookahead_coverages().iter())?,
            substitutes,
        ))
    }

    pub fn gpos_lookup(&self, lookup: &read_gpos::PositionLookup) -> Result<PositionLookup> {
        let flag = lookup.lookup_flag();
        let mark_set = self.mark_filtering_set(lookup.mark_filtering_set());
        Ok(match lookup.subtables()? {
            PositionSubtables::Single(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| self.single_pos(&s?))
                    .collect::<Result<Vec<_>>>()?;
                PositionLookup::Single(with_mark_set(Lookup::new(flag, subtables), mark_set))
            }
            PositionSubtables::Pair(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| self.pair_pos(&s?))
                    .collect::<Result<Vec<_>>>()?;
                PositionLookup::Pair(with_mark_set(Lookup::new(flag, subtables), mark_set))
            }
            PositionSubtables::Cursive(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| self.cursive_pos(&s?))
                    .collect::<Result<Vec<_>>>()?;
                PositionLookup::Cursive(with_mark_set(Lookup::new(flag, subtables), mark_set))
            }
            PositionSubtables::MarkToBase(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| self.mark_base_pos(&s?))
                    .collect::<Result<Vec<_>>>()?;
                PositionLookup::MarkToBase(with_mark_set(Lookup::new(flag, subtables), mark_set))
            }
            PositionSubtables::MarkToLig(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| self.mark_lig_pos(&s?))
                    .collect::<Result<Vec<_>>>()?;
                PositionLookup::MarkToLig(with_mark_set(Lookup::new(flag, subtables), mark_set))
            }
            PositionSubtables::MarkToMark(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| self.mark_mark_pos(&s?))
                    .collect::<Result<Vec<_>>>()?;
                PositionLookup::MarkToMark(with_mark_set(Lookup::new(flag, subtables), mark_set))
            }
            PositionSubtables::Contextual(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| Ok(PositionSequenceContext::from(self.sequence_context(&s?)?)))
                    .collect::<Result<Vec<_>>>()?;
                PositionLookup::Contextual(with_mark_set(Lookup::new(flag, subtables), mark_set))
            }
            PositionSubtables::ChainContextual(subtables) => {
                let subtables = subtables
                    .iter()
                    .map(|s| Ok(PositionChainContext::from(self.chained_context(&s?)?)))
                    .collect::<Result<Vec<_>>>()?;
                PositionLookup::ChainContextual(with_mark_set(
                    Lookup::new(flag, subtables),
                    mark_set,
                ))
            }
        })
    }

    fn single_pos(&self, subtable: &read_gpos::SinglePos) -> Result<SinglePos> {
        Ok(match subtable {
            read_gpos::SinglePos::Format1(f1) => SinglePos::Format1(SinglePosFormat1::new(
                self.coverage(&f1.coverage()?),
                f1.value_record().to_write(),
            )),
            read_gpos::SinglePos::Format2(f2) => {
                let records = f2
                    .value_records()
                    .iter()
                    .map(|record| Ok(record?.to_write()))
                    .collect::<Result<Vec<_>>>()?;
                let (coverage, records) = self.covered(&f2.coverage()?, records);
                SinglePos::Format2(SinglePosFormat2::new(coverage, records))
            }
        })
    }

    fn pair_pos(&self, subtable: &read_gpos::PairPos) -> Result<PairPos> {
        Ok(match subtable {
            read_gpos::PairPos::Format1(f1) => {
                let pair_sets = f1
                    .pair_sets()
                    .iter()
                    .map(|set| {
                        let mut records = Vec::new();
                        for record in set?.pair_value_records().iter() {
                            let record = record?;
                            // Only keep records where the second glyph can be remapped
                            if let Some(second) = self.gid(record.second_glyph().to_u32()) {
                                records.push(PairValueRecord::new(
                                    second,
                                    record.value_record1().to_write(),
                                    record.value_record2().to_write(),
                                ));
                            }
                        }
                        Ok(PairSet::new(records))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let (coverage, pair_sets) = self.covered(&f1.coverage()?, pair_sets);
                PairPos::Format1(PairPosFormat1::new(coverage, pair_sets))
            }
            read_gpos::PairPos::Format2(f2) => {
                let class1_records = f2
                    .class1_records()
                    .iter()
                    .map(|class1| {
                        let class2_records = class1?
                            .class2_records()
                            .iter()
                            .map(|class2| {
                                let class2 = class2?;
                                Ok(Class2Record::new(
                                    class2.value_record1().to_write(),
                                    class2.value_record2().to_write(),
                                ))
                            })
                            .collect::<Result<Vec<_>>>()?;
                        Ok(Class1Record::new(class2_records))
                    })
                    .collect::<Result<Vec<_>>>()?;
                PairPos::Format2(PairPosFormat2::new(
                    self.coverage(&f2.coverage()?),
                    self.class_def(&f2.class_def1()?),
                    self.class_def(&f2.class_def2()?),
                    class1_records,
                ))
            }
        })
    }

    fn cursive_pos(&self, subtable: &read_gpos::CursivePosFormat1) -> Result<CursivePosFormat1> {
        let records = subtable
            .entry_exit_record()
            .iter()
            .map(|record| {
                let entry = record.entry_anchor(subtable.offset_data()).transpose()?;
                let exit = record.exit_anchor(subtable.offset_data()).transpose()?;
                Ok(EntryExitRecord::new(
                    entry.map(|a| a.to_write()),
                    exit.map(|a| a.to_write()),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let (coverage, records) = self.covered(&subtable.coverage()?, records);
        Ok(CursivePosFormat1::new(coverage, records))
    }

    fn mark_base_pos(&self, subtable: &read_gpos::MarkBasePosFormat1) -> Result<MarkBasePosFormat1> {
        let base_array = subtable.base_array()?;
        let base_records = base_array
            .base_records()
            .iter()
            .map(|record| {
                let record = record?;
                Ok(BaseRecord::new(anchors(
                    record.base_anchors(base_array.offset_data()).iter(),
                )?))
            })
            .collect::<Result<Vec<_>>>()?;
        let (marks, mark_array) = self.marks(&subtable.mark_coverage()?, &subtable.mark_array()?)?;
        let (bases, base_records) = self.covered(&subtable.base_coverage()?, base_records);
        Ok(MarkBasePosFormat1::new(marks, bases, mark_array, BaseArray::new(base_records)))
    }

    fn mark_lig_pos(&self, subtable: &read_gpos::MarkLigPosFormat1) -> Result<MarkLigPosFormat1> {
        let ligature_array = subtable.ligature_array()?;
        let attaches = ligature_array
            .ligature_attaches()
            .iter()
            .map(|attach| {
                let attach = attach?;
                let components = attach
                    .component_records()
                    .iter()
                    .map(|record| {
                        let record = record?;
                        Ok(ComponentRecord::new(anchors(
                            record.ligature_anchors(attach.offset_data()).iter(),
                        )?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(LigatureAttach::new(components))
            })
            .collect::<Result<Vec<_>>>()?;
        let (marks, mark_array) = self.marks(&subtable.mark_coverage()?, &subtable.mark_array()?)?;
        let (ligatures, attaches) = self.covered(&subtable.ligature_coverage()?, attaches);
        Ok(MarkLigPosFormat1::new(marks, ligatures, mark_array, LigatureArray::new(attaches)))
    }

    fn mark_mark_pos(&self, subtable: &read_gpos::MarkMarkPosFormat1) -> Result<MarkMarkPosFormat1> {
        let mark2_array = subtable.mark2_array()?;
        let records = mark2_array
            .mark2_records()
            .iter()
            .map(|record| {
                let record = record?;
                Ok(Mark2Record::new(anchors(
                    record.mark2_anchors(mark2_array.offset_data()).iter(),
                )?))
            })
            .collect::<Result<Vec<_>>>()?;
        let (marks, mark_array) =
            self.marks(&subtable.mark1_coverage()?, &subtable.mark1_array()?)?;
        let (marks2, records) = self.covered(&subtable.mark2_coverage()?, records);
        Ok(MarkMarkPosFormat1::new(marks, marks2, mark_array, Mark2Array::new(records)))
    }

    /// Contextual rules, shared by GSUB type 5 and GPOS type 7
    fn sequence_context(&self, subtable: &read_layout::SequenceContext) -> Result<SequenceContext> {
        Ok(match subtable {
            read_layout::SequenceContext::Format1(f1) => {
                let rule_sets = f1
                    .seq_rule_sets()
                    .iter()
                    .map(|set| {
                        let Some(set) = set.transpose()? else {
                            return Ok(None);
                        };
                        let mut rules = Vec::new();
                        for rule in set.seq_rules().iter() {
                            let rule = rule?;
                            // Rules naming a glyph outside the font are dropped
                            if let Some(input) = self.glyphs(rule.input_sequence()) {
                                let lookups = self.seq_lookup_records(rule.seq_lookup_records())?;
                                rules.push(SequenceRule::new(input, lookups));
                            }
                        }
                        Ok(Some(SequenceRuleSet::new(rules)))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let (coverage, rule_sets) = self.covered(&f1.coverage()?, rule_sets);
                SequenceContext::Format1(SequenceContextFormat1::new(coverage, rule_sets))
            }
            read_layout::SequenceContext::Format2(f2) => {
                let rule_sets = f2
                    .class_seq_rule_sets()
                    .iter()
                    .map(|set| {
                        let Some(set) = set.transpose()? else {
                            return Ok(None);
                        };
                        let rules = set
                            .class_seq_rules()
                            .iter()
                            .map(|rule| {
                                let rule = rule?;
                                let input = rule.input_sequence().iter().map(|c| c.get()).collect();
                                let lookups = self.seq_lookup_records(rule.seq_lookup_records())?;
                                Ok(ClassSequenceRule::new(input, lookups))
                            })
                            .collect::<Result<Vec<_>>>()?;
                        Ok(Some(ClassSequenceRuleSet::new(rules)))
                    })
                    .collect::<Result<Vec<_>>>()?;
                SequenceContext::Format2(SequenceContextFormat2::new(
                    self.coverage(&f2.coverage()?),
                    self.class_def(&f2.class_def()?),
                    rule_sets,
                ))
            }
            read_layout::SequenceContext::Format3(f3) => {
                SequenceContext::Format3(SequenceContextFormat3::new(
                    self.coverages(f3.coverages().iter())?,
                    self.seq_lookup_records(f3.seq_lookup_records())?,
                ))
            }
        })
    }

    /// Chained contextual rules, shared by GSUB type 6 and GPOS type 8
    fn chained_context(
        &self,
        subtable: &read_layout::ChainedSequenceContext,
    ) -> Result<ChainedSequenceContext> {
        Ok(match subtable {
            read_layout::ChainedSequenceContext::Format1(f1) => {
                let rule_sets = f1
                    .chained_seq_rule_sets()
                    .iter()
                    .map(|set| {
                        let Some(set) = set.transpose()? else {
                            return Ok(None);
                        };
                        let mut rules = Vec::new();
                        for rule in set.chained_seq_rules().iter() {
                            let rule = rule?;
                            if let (Some(backtrack), Some(input), Some(lookahead)) = (
                                self.glyphs(rule.backtrack_sequence()),
                                self.glyphs(rule.input_sequence()),
                                self.glyphs(rule.lookahead_sequence()),
                            ) {
                                let lookups = self.seq_lookup_records(rule.seq_lookup_records())?;
                                rules.push(ChainedSequenceRule::new(
                                    backtrack, input, lookahead, lookups,
                                ));
                            }
                        }
                        Ok(Some(ChainedSequenceRuleSet::new(rules)))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let (coverage, rule_sets) = self.covered(&f1.coverage()?, rule_sets);
                ChainedSequenceContext::Format1(ChainedSequenceContextFormat1::new(
                    coverage, rule_sets,
                ))
            }
            read_layout::ChainedSequenceContext::Format2(f2) => {
                let classes = |seq: &[BigEndian<u16>]| seq.iter().map(|c| c.get()).collect();
                let rule_sets = f2
                    .chained_class_seq_rule_sets()
                    .iter()
                    .map(|set| {
                        let Some(set) = set.transpose()? else {
                            return Ok(None);
                        };
                        let rules = set
                            .chained_class_seq_rules()
                            .iter()
                            .map(|rule| {
                                let rule = rule?;
                                Ok(ChainedClassSequenceRule::new(
                                    classes(rule.backtrack_sequence()),
                                    classes(rule.input_sequence()),
                                    classes(rule.lookahead_sequence()),
                                    self.seq_lookup_records(rule.seq_lookup_records())?,
                                ))
                            })
                            .collect::<Result<Vec<_>>>()?;
                        Ok(Some(ChainedClassSequenceRuleSet::new(rules)))
                    })
                    .collect::<Result<Vec<_>>>()?;
                ChainedSequenceContext::Format2(ChainedSequenceContextFormat2::new(
                    self.coverage(&f2.coverage()?),
                    self.class_def(&f2.backtrack_class_def()?),
                    self.class_def(&f2.input_class_def()?),
                    self.class_def(&f2.lookahead_class_def()?),
                    rule_sets,
                ))
            }
            read_layout::ChainedSequenceContext::Format3(f3) => {
                ChainedSequenceContext::Format3(ChainedSequenceContextFormat3::new(
                    self.coverages(f3.backtrack_coverages().iter())?,
                    self.coverages(f3.input_coverages().iter())?,
                    self.coverages(f3.lookahead_coverages().iter())?,
                    self.seq_lookup_records(f3.seq_lookup_records())?,
                ))
            }
        })
    }
}

/// The single substitution built for a font's `locl` feature
///
/// `pairs` holds (glyph chosen by cmap, glyph to use instead), already in
/// merged glyph ids.
pub fn synthesized_lookup(mut pairs: Vec<(MegaGlyphId, MegaGlyphId)>) -> SubstitutionLookup {
    pairs.sort_by_key(|(from, _)| *from);
    pairs.dedup_by_key(|(from, _)| *from);
    let (from, to): (Vec<_>, Vec<_>) =
        pairs.into_iter().map(|(a, b)| (a.to_glyph_id16(), b.to_glyph_id16())).unzip();
    let subtable = SingleSubst::format_2(CoverageTable::format_1(from), to);
    SubstitutionLookup::Single(Lookup::new(LookupFlag::empty(), vec![subtable]))
}

#[cfg(test)]
mod tests {
    use read_fonts::{FontData, FontRead};
    use write_fonts::tables::gsub::SingleSubstFormat1;

    use super::*;

    fn remap(links: &IndexMap<u16, LookupRef>) -> LookupRemap<'_> {
        LookupRemap {
            table: Tag::new(b"GSUB"),
            glyph_offset: 10,
            num_glyphs: 5,
            mark_set_offset: 2,
            links,
        }
    }

    #[test]
    fn test_glyphs_shift_by_font_offset() {
        let links = IndexMap::new();
        let remap = remap(&links);
        assert_eq!(remap.gid(0), Some(GlyphId16::new(10)));
        assert_eq!(remap.gid(4), Some(GlyphId16::new(14)));
        assert_eq!(remap.gid(5), None);
    }

    #[test]
    fn test_mark_filtering_set_shifts() {
        let links = IndexMap::new();
        let remap = remap(&links);
        assert_eq!(remap.mark_filtering_set(Some(1)), Some(3));
        assert_eq!(remap.mark_filtering_set(None), None);
    }

    #[test]
    fn test_coverage_drops_glyphs_outside_font() {
        let links = IndexMap::new();
        let remap = remap(&links);
        let bytes = write_fonts::dump_table(&CoverageTable::format_1(vec![
            GlyphId16::new(1),
            GlyphId16::new(3),
            GlyphId16::new(7),
        ]))
        .unwrap();
        let coverage = read_layout::CoverageTable::read(FontData::new(&bytes)).unwrap();
        let remapped = remap.coverage(&coverage);
        let bytes = write_fonts::dump_table(&remapped).unwrap();
        let coverage = read_layout::CoverageTable::read(FontData::new(&bytes)).unwrap();
        assert_eq!(
            coverage.iter().map(|g| g.to_u32()).collect::<Vec<_>>(),
            [11, 13]
        );
    }

    #[test]
    fn test_class_def_keeps_classes() {
        let links = IndexMap::new();
        let remap = remap(&links);
        let class_def = ClassDef::from_iter([(GlyphId16::new(0), 1), (GlyphId16::new(2), 2)]);
        let bytes = write_fonts::dump_table(&class_def).unwrap();
        let class_def = read_layout::ClassDef::read(FontData::new(&bytes)).unwrap();
        let bytes = write_fonts::dump_table(&remap.class_def(&class_def)).unwrap();
        let class_def = read_layout::ClassDef::read(FontData::new(&bytes)).unwrap();
        let mut classes = class_def.iter().map(|(g, c)| (g.to_u32(), c)).collect::<Vec<_>>();
        classes.sort();
        assert_eq!(classes, [(10, 1), (12, 2)]);
    }

    #[test]
    fn test_synthesized_lookup_is_sorted() {
        let lookup = synthesized_lookup(vec![
            (MegaGlyphId::new(9), MegaGlyphId::new(20)),
            (MegaGlyphId::new(3), MegaGlyphId::new(21)),
        ]);
        let SubstitutionLookup::Single(lookup) = lookup else { panic!("expected single subst") };
        assert_eq!(lookup.subtables.len(), 1);
        assert_eq!(lookup.mark_filtering_set, None);
    }

    #[test]
    fn test_value_record_trait_exists() {
        fn assert_impl<T: ToWrite>() {}
        assert_impl::<read_gpos::ValueRecord>();
    }

    #[test]
    fn test_single_subst_delta_wraps() {
        let links = IndexMap::new();
        let remap = LookupRemap {
            table: Tag::new(b"GSUB"),
            glyph_offset: 0,
            num_glyphs: u16::MAX,
            mark_set_offset: 0,
            links: &links,
        };
        let subtable = SingleSubst::Format1(SingleSubstFormat1::new(
            CoverageTable::format_1(vec![GlyphId16::new(40000)]),
            30000,
        ));
        let bytes = write_fonts::dump_table(&subtable).unwrap();
        let subtable = read_gsub::SingleSubst::read(FontData::new(&bytes)).unwrap();

        let bytes = write_fonts::dump_table(&remap.single_subst(&subtable).unwrap()).unwrap();
        let read_gsub::SingleSubst::Format2(converted) =
            read_gsub::SingleSubst::read(FontData::new(&bytes)).unwrap()
        else {
            panic!("expected format 2");
        };
        let glyphs: Vec<_> = converted.coverage().unwrap().iter().map(|g| g.to_u16()).collect();
        assert_eq!(glyphs, [40000]);
        let substitutes: Vec<_> =
            converted.substitute_glyph_ids().iter().map(|g| g.get().to_u16()).collect();
        // (40000 + 30000) mod 65536
        assert_eq!(substitutes, [4464]);
    }

    /// Format 1 coverage of glyphs 1, 7, 3, in that order
    const UNSORTED_COVERAGE: [u8; 10] = [0, 1, 0, 3, 0, 1, 0, 7, 0, 3];

    #[test]
    fn test_covered_keeps_records_aligned() {
        let links = IndexMap::new();
        let remap = remap(&links);
        let coverage = read_layout::CoverageTable::read(FontData::new(&UNSORTED_COVERAGE)).unwrap();
        let (coverage, records) = remap.covered(&coverage, vec!['a', 'b', 'c']);
        assert_eq!(coverage, CoverageTable::format_1(vec![GlyphId16::new(11), GlyphId16::new(13)]));
        assert_eq!(records, ['a', 'c']);
    }

    #[test]
    fn test_single_pos_values_follow_coverage() {
        let links = IndexMap::new();
        let remap = remap(&links);
        // format 2, coverage at 14, x advance only, three values
        let mut bytes = vec![0, 2, 0, 14, 0, 4, 0, 3, 0, 10, 0, 20, 0, 30];
        bytes.extend(UNSORTED_COVERAGE);
        let subtable = read_gpos::SinglePos::read(FontData::new(&bytes)).unwrap();

        let bytes = write_fonts::dump_table(&remap.single_pos(&subtable).unwrap()).unwrap();
        let read_gpos::SinglePos::Format2(converted) =
            read_gpos::SinglePos::read(FontData::new(&bytes)).unwrap()
        else {
            panic!("expected format 2");
        };
        let glyphs: Vec<_> = converted.coverage().unwrap().iter().map(|g| g.to_u16()).collect();
        assert_eq!(glyphs, [11, 13]);
        let advances: Vec<_> = converted
            .value_records()
            .iter()
            .map(|record| record.unwrap().x_advance.map(|v| v.get()))
            .collect();
        assert_eq!(advances, [Some(10), Some(30)]);
    }
}
