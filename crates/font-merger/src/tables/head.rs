//! head table

use font_types::{Fixed, LongDateTime};
use read_fonts::{TableProvider, types::Tag};
use write_fonts::tables::{
    head::{Flags, Head, MacStyle},
    loca::LocaFormat,
};

use super::Lowering;
use crate::{
    Result,
    context::SourceFont,
    layout::lift::version,
    value::{Object, Value},
};

pub const TAG: Tag = Tag::new(b"head");

pub fn lift_head(src: &SourceFont) -> Result<Option<Value>> {
    let Ok(head) = src.font.head() else {
        return Ok(None);
    };
    let obj = Object::new("head")
        .with("tableTag", TAG)
        .with("tableVersion", version(head.version()))
        .with("fontRevision", head.font_revision().to_bits() as i64)
        .with("checkSumAdjustment", head.checksum_adjustment() as i64)
        .with("magicNumber", head.magic_number() as i64)
        .with("flags", head.flags().bits() as i64)
        .with("unitsPerEm", head.units_per_em() as i64)
        .with("created", head.created().as_secs())
        .with("modified", head.modified().as_secs())
        .with("xMin", head.x_min() as i64)
        .with("yMin", head.y_min() as i64)
        .with("xMax", head.x_max() as i64)
        .with("yMax", head.y_max() as i64)
        .with("macStyle", head.mac_style().bits() as i64)
        .with("lowestRecPPEM", head.lowest_rec_ppem() as i64)
        .with("fontDirectionHint", head.font_direction_hint() as i64)
        .with("indexToLocFormat", head.index_to_loc_format() as i64)
        .with("glyphDataFormat", head.glyph_data_format() as i64);
    Ok(Some(obj.into()))
}

/// `indexToLocFormat` comes from the rebuilt loca when there is one
pub fn lower_head(obj: &Object, lowering: &Lowering) -> Result<Head> {
    let index_to_loc_format = match lowering.loca_format {
        Some(LocaFormat::Short) => 0,
        Some(LocaFormat::Long) => 1,
        None => obj.optional::<i16>("indexToLocFormat")?.unwrap_or_default(),
    };
    Ok(Head {
        font_revision: Fixed::from_bits(obj.require("fontRevision")?),
        checksum_adjustment: 0,
        magic_number: obj.require("magicNumber")?,
        flags: Flags::from_bits_truncate(obj.require("flags")?),
        units_per_em: obj.require("unitsPerEm")?,
        created: LongDateTime::new(obj.require_int("created")?),
        modified: LongDateTime::new(obj.require_int("modified")?),
        x_min: obj.require("xMin")?,
        y_min: obj.require("yMin")?,
        x_max: obj.require("xMax")?,
        y_max: obj.require("yMax")?,
        mac_style: MacStyle::from_bits_truncate(obj.require("macStyle")?),
        lowest_rec_ppem: obj.require("lowestRecPPEM")?,
        font_direction_hint: obj.require("fontDirectionHint")?,
        index_to_loc_format,
    })
}
