//! Declarative merge rules, keyed by table tag and object class
//!
//! Most tables are merged field by field through a [`MergeMap`]. A handful
//! need a procedure that sees all instances at once; those are listed in
//! [`table_rule`].

use read_fonts::types::Tag;

use crate::{
    layout::{base, merge as layout_merge},
    strategies::{BitMap, BitRule, CustomReducer, Reducer},
    tables::{cmap, glyf, os2},
};

/// Field name to reducer table for one object class
#[derive(Debug)]
pub struct MergeMap {
    pub fields: &'static [(&'static str, Reducer)],
    /// Rule for fields not listed in `fields`
    pub default: Option<Reducer>,
}

impl MergeMap {
    pub fn rule(&self, field: &str) -> Option<Reducer> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, reducer)| *reducer)
            .or(self.default)
    }
}

/// How a whole table is merged
#[derive(Clone, Copy, Debug)]
pub enum TableRule {
    /// Field by field through the class's merge map
    Map,
    /// A procedure that takes over the whole table
    Custom(CustomReducer),
}

/// Look up the rule for a table; `None` means the table is dropped
pub fn table_rule(tag: Tag) -> Option<TableRule> {
    match &tag.to_be_bytes() {
        b"cmap" => Some(TableRule::Custom(cmap::merge_cmap)),
        b"glyf" => Some(TableRule::Custom(glyf::merge_glyf)),
        b"OS/2" => Some(TableRule::Custom(os2::merge_os2)),
        b"GSUB" => Some(TableRule::Custom(layout_merge::merge_gsub)),
        bytes => std::str::from_utf8(bytes)
            .ok()
            .and_then(merge_map)
            .map(|_| TableRule::Map),
    }
}

pub static HEAD_FLAGS: BitMap = BitMap {
    name: "flags",
    size: 16,
    default: Some(BitRule::Or),
    bits: &[
        (1, BitRule::And),
        (2, BitRule::And),
        (3, BitRule::And),
        (5, BitRule::And),
        (6, BitRule::Zero),
        (11, BitRule::And),
        (13, BitRule::And),
        (14, BitRule::And),
        (15, BitRule::Zero),
    ],
};

/// Applied after the embedding permissions have been normalized
pub static OS2_FS_TYPE: BitMap = BitMap {
    name: "fsType",
    size: 16,
    default: Some(BitRule::Zero),
    bits: &[
        (1, BitRule::Or),
        (2, BitRule::And),
        (3, BitRule::And),
        (8, BitRule::Or),
        (9, BitRule::Or),
    ],
};

static BITWISE_OR: Reducer = Reducer::BitwiseOr;
static MIN: Reducer = Reducer::Min;
static MAX: Reducer = Reducer::Max;
static FIRST: Reducer = Reducer::First;

static HEAD: MergeMap = MergeMap {
    fields: &[
        ("tableTag", Reducer::Equal),
        ("tableVersion", Reducer::Max),
        ("fontRevision", Reducer::Max),
        ("checkSumAdjustment", Reducer::Constant(0)),
        ("magicNumber", Reducer::Equal),
        ("flags", Reducer::MergeBits(&HEAD_FLAGS)),
        ("unitsPerEm", Reducer::Equal),
        ("created", Reducer::CurrentTime),
        ("modified", Reducer::CurrentTime),
        ("xMin", Reducer::Min),
        ("yMin", Reducer::Min),
        ("xMax", Reducer::Max),
        ("yMax", Reducer::Max),
        ("macStyle", Reducer::First),
        ("lowestRecPPEM", Reducer::Max),
        ("fontDirectionHint", Reducer::Constant(2)),
        ("indexToLocFormat", Reducer::Recalculate),
        ("glyphDataFormat", Reducer::Equal),
    ],
    default: None,
};

static HHEA: MergeMap = MergeMap {
    fields: &[
        ("tableTag", Reducer::Equal),
        ("tableVersion", Reducer::Max),
        ("ascent", Reducer::Max),
        ("descent", Reducer::Min),
        ("lineGap", Reducer::Max),
        ("advanceWidthMax", Reducer::Max),
        ("minLeftSideBearing", Reducer::Min),
        ("minRightSideBearing", Reducer::Min),
        ("xMaxExtent", Reducer::Max),
        ("caretSlopeRise", Reducer::First),
        ("caretSlopeRun", Reducer::First),
        ("caretOffset", Reducer::First),
        ("numberOfHMetrics", Reducer::Recalculate),
    ],
    default: Some(Reducer::Equal),
};

static VHEA: MergeMap = MergeMap {
    fields: &[
        ("tableTag", Reducer::Equal),
        ("tableVersion", Reducer::Max),
        ("ascent", Reducer::Max),
        ("descent", Reducer::Min),
        ("lineGap", Reducer::Max),
        ("advanceHeightMax", Reducer::Max),
        ("minTopSideBearing", Reducer::Min),
        ("minBottomSideBearing", Reducer::Min),
        ("yMaxExtent", Reducer::Max),
        ("caretSlopeRise", Reducer::First),
        ("caretSlopeRun", Reducer::First),
        ("caretOffset", Reducer::First),
        ("numberOfVMetrics", Reducer::Recalculate),
    ],
    default: Some(Reducer::Equal),
};

static MAXP: MergeMap = MergeMap {
    fields: &[
        ("tableTag", Reducer::Equal),
        ("tableVersion", Reducer::Equal),
        ("numGlyphs", Reducer::Sum),
        ("maxStorage", Reducer::First),
        ("maxFunctionDefs", Reducer::First),
        ("maxInstructionDefs", Reducer::First),
    ],
    default: Some(Reducer::Max),
};

static OS2: MergeMap = MergeMap {
    fields: &[
        ("tableTag", Reducer::Equal),
        ("version", Reducer::Max),
        ("xAvgCharWidth", Reducer::AvgInt),
        ("fsType", Reducer::Custom(os2::merge_fs_type)),
        ("panose", Reducer::First),
        ("ulUnicodeRange1", Reducer::BitwiseOr),
        ("ulUnicodeRange2", Reducer::BitwiseOr),
        ("ulUnicodeRange3", Reducer::BitwiseOr),
        ("ulUnicodeRange4", Reducer::BitwiseOr),
        ("fsFirstCharIndex", Reducer::Min),
        ("fsLastCharIndex", Reducer::Max),
        ("sTypoAscender", Reducer::Max),
        ("sTypoDescender", Reducer::Min),
        ("sTypoLineGap", Reducer::Max),
        ("usWinAscent", Reducer::Max),
        ("usWinDescent", Reducer::Max),
        // version 1
        ("ulCodePageRange1", Reducer::OnlyExisting(&BITWISE_OR)),
        ("ulCodePageRange2", Reducer::OnlyExisting(&BITWISE_OR)),
        // versions 2 to 4
        ("sxHeight", Reducer::OnlyExisting(&MAX)),
        ("sCapHeight", Reducer::OnlyExisting(&MAX)),
        ("usDefaultChar", Reducer::OnlyExisting(&FIRST)),
        ("usBreakChar", Reducer::OnlyExisting(&FIRST)),
        ("usMaxContext", Reducer::OnlyExisting(&MAX)),
        // version 5
        ("usLowerOpticalPointSize", Reducer::OnlyExisting(&MIN)),
        ("usUpperOpticalPointSize", Reducer::OnlyExisting(&MAX)),
    ],
    default: Some(Reducer::First),
};

static POST: MergeMap = MergeMap {
    fields: &[
        ("tableTag", Reducer::Equal),
        ("formatType", Reducer::Max),
        ("isFixedPitch", Reducer::Min),
        ("minMemType42", Reducer::Max),
        ("maxMemType42", Reducer::Constant(0)),
        ("minMemType1", Reducer::Max),
        ("maxMemType1", Reducer::Constant(0)),
    ],
    default: Some(Reducer::First),
};

static METRICS: MergeMap = MergeMap {
    fields: &[("tableTag", Reducer::Equal), ("metrics", Reducer::SumDicts)],
    default: None,
};

static NAME: MergeMap = MergeMap {
    fields: &[("tableTag", Reducer::Equal), ("names", Reducer::First)],
    default: None,
};

static LOCA: MergeMap = MergeMap {
    fields: &[("tableTag", Reducer::Equal)],
    default: Some(Reducer::Recalculate),
};

static GLYF: MergeMap = MergeMap {
    fields: &[
        ("tableTag", Reducer::Equal),
        ("glyphs", Reducer::SumDicts),
        ("glyphOrder", Reducer::SumLists),
    ],
    default: None,
};

/// Hinting programs and grid-fitting tables are taken whole from the first font
static WHOLE_TABLE: MergeMap = MergeMap {
    fields: &[("tableTag", Reducer::Equal), ("data", Reducer::First)],
    default: None,
};

static GDEF: MergeMap = MergeMap {
    fields: &[("tableTag", Reducer::Equal), ("Version", Reducer::Max)],
    default: Some(Reducer::MergeObjects),
};

static GSUB_GPOS: MergeMap = MergeMap {
    fields: &[
        ("tableTag", Reducer::Equal),
        ("Version", Reducer::Max),
        ("ScriptList", Reducer::MergeObjects),
        ("FeatureList", Reducer::MergeObjects),
        ("LookupList", Reducer::MergeObjects),
    ],
    default: None,
};

static BASE: MergeMap = MergeMap {
    fields: &[("tableTag", Reducer::Equal), ("Version", Reducer::Max)],
    default: Some(Reducer::MergeObjects),
};

/// JSTF and MATH carry no lifted payload beyond their header
static HEADER_ONLY: MergeMap = MergeMap {
    fields: &[("tableTag", Reducer::Equal), ("Version", Reducer::Max)],
    default: None,
};

static SCRIPT_LIST: MergeMap = MergeMap {
    fields: &[
        ("ScriptCount", Reducer::Drop),
        ("ScriptRecord", Reducer::Custom(layout_merge::merge_script_records)),
    ],
    default: None,
};

static FEATURE_LIST: MergeMap = MergeMap {
    fields: &[
        ("FeatureCount", Reducer::Sum),
        ("FeatureRecord", Reducer::Custom(layout_merge::merge_feature_records)),
    ],
    default: None,
};

static LOOKUP_LIST: MergeMap = MergeMap {
    fields: &[("LookupCount", Reducer::Sum), ("Lookup", Reducer::SumLists)],
    default: None,
};

static COVERAGE: MergeMap = MergeMap {
    fields: &[("Format", Reducer::Min), ("glyphs", Reducer::SumLists)],
    default: None,
};

static CLASS_DEF: MergeMap = MergeMap {
    fields: &[("Format", Reducer::Min), ("classDefs", Reducer::SumDicts)],
    default: None,
};

static ATTACH_LIST: MergeMap = MergeMap {
    fields: &[
        ("Coverage", Reducer::MergeObjects),
        ("GlyphCount", Reducer::Sum),
        ("AttachPoint", Reducer::SumLists),
    ],
    default: None,
};

static LIG_CARET_LIST: MergeMap = MergeMap {
    fields: &[
        ("Coverage", Reducer::MergeObjects),
        ("LigGlyphCount", Reducer::Sum),
        ("LigGlyph", Reducer::SumLists),
    ],
    default: None,
};

static MARK_GLYPH_SETS_DEF: MergeMap = MergeMap {
    fields: &[
        ("MarkSetTableFormat", Reducer::Equal),
        ("MarkSetCount", Reducer::Sum),
        ("Coverage", Reducer::SumLists),
    ],
    default: None,
};

static AXIS: MergeMap = MergeMap { fields: &[], default: Some(Reducer::MergeObjects) };

static BASE_TAG_LIST: MergeMap = MergeMap {
    fields: &[
        ("BaseTagCount", Reducer::Sum),
        ("BaselineTag", Reducer::Custom(base::merge_baseline_tags)),
    ],
    default: None,
};

static BASE_SCRIPT_LIST: MergeMap = MergeMap {
    fields: &[
        ("BaseScriptCount", Reducer::Drop),
        ("BaseScriptRecord", Reducer::Custom(base::merge_base_script_records)),
    ],
    default: None,
};

/// The merge map for an object class
pub fn merge_map(class: &str) -> Option<&'static MergeMap> {
    Some(match class {
        "head" => &HEAD,
        "hhea" => &HHEA,
        "vhea" => &VHEA,
        "maxp" => &MAXP,
        "OS/2" => &OS2,
        "post" => &POST,
        "hmtx" | "vmtx" => &METRICS,
        "name" => &NAME,
        "loca" => &LOCA,
        "glyf" => &GLYF,
        "fpgm" | "prep" | "cvt " | "gasp" => &WHOLE_TABLE,
        "GDEF" => &GDEF,
        "GSUB" | "GPOS" => &GSUB_GPOS,
        "BASE" => &BASE,
        "JSTF" | "MATH" => &HEADER_ONLY,
        "ScriptList" => &SCRIPT_LIST,
        "FeatureList" => &FEATURE_LIST,
        "LookupList" => &LOOKUP_LIST,
        "Coverage" => &COVERAGE,
        "ClassDef" => &CLASS_DEF,
        "AttachList" => &ATTACH_LIST,
        "LigCaretList" => &LIG_CARET_LIST,
        "MarkGlyphSetsDef" => &MARK_GLYPH_SETS_DEF,
        "Axis" => &AXIS,
        "BaseTagList" => &BASE_TAG_LIST,
        "BaseScriptList" => &BASE_SCRIPT_LIST,
        _ => return None,
    })
}
