//! OS/2 table
//!
//! Merged through the generic map, with a dedicated reducer for the
//! embedding permissions in `fsType` and two fixups once every field has
//! been reduced.

use read_fonts::{TableProvider, types::Tag};
use write_fonts::tables::os2::{Os2, SelectionFlags};

use crate::{
    Result,
    context::{MergeContext, SourceFont},
    object_merger::merge_objects,
    registry::OS2_FS_TYPE,
    value::{Object, Value},
};

pub const TAG: Tag = Tag::new(b"OS/2");

/// Installable embedding: no restriction bits at all
const FS_TYPE_INSTALLABLE: i64 = 0x0000;
const FS_TYPE_RESTRICTED: i64 = 0x0002;
const FS_TYPE_PREVIEW_AND_PRINT: i64 = 0x0004;
const FS_TYPE_EDITABLE: i64 = 0x0008;
/// Bits 8 and 9, reserved before version 2
const FS_TYPE_V2_BITS: i64 = 0x0300;

pub fn lift_os2(src: &SourceFont) -> Result<Option<Value>> {
    let Ok(os2) = src.font.os2() else {
        return Ok(None);
    };
    let int = |v: Option<u16>| v.map(i64::from);
    let obj = Object::new("OS/2")
        .with("tableTag", TAG)
        .with("version", os2.version() as i64)
        .with("xAvgCharWidth", os2.x_avg_char_width() as i64)
        .with("usWeightClass", os2.us_weight_class() as i64)
        .with("usWidthClass", os2.us_width_class() as i64)
        .with("fsType", os2.fs_type() as i64)
        .with("ySubscriptXSize", os2.y_subscript_x_size() as i64)
        .with("ySubscriptYSize", os2.y_subscript_y_size() as i64)
        .with("ySubscriptXOffset", os2.y_subscript_x_offset() as i64)
        .with("ySubscriptYOffset", os2.y_subscript_y_offset() as i64)
        .with("ySuperscriptXSize", os2.y_superscript_x_size() as i64)
        .with("ySuperscriptYSize", os2.y_superscript_y_size() as i64)
        .with("ySuperscriptXOffset", os2.y_superscript_x_offset() as i64)
        .with("ySuperscriptYOffset", os2.y_superscript_y_offset() as i64)
        .with("yStrikeoutSize", os2.y_strikeout_size() as i64)
        .with("yStrikeoutPosition", os2.y_strikeout_position() as i64)
        .with("sFamilyClass", os2.s_family_class() as i64)
        .with("panose", Value::Bytes(os2.panose_10().to_vec()))
        .with("ulUnicodeRange1", os2.ul_unicode_range_1() as i64)
        .with("ulUnicodeRange2", os2.ul_unicode_range_2() as i64)
        .with("ulUnicodeRange3", os2.ul_unicode_range_3() as i64)
        .with("ulUnicodeRange4", os2.ul_unicode_range_4() as i64)
        .with("achVendID", os2.ach_vend_id())
        .with("fsSelection", os2.fs_selection().bits() as i64)
        .with("fsFirstCharIndex", os2.us_first_char_index() as i64)
        .with("fsLastCharIndex", os2.us_last_char_index() as i64)
        .with("sTypoAscender", os2.s_typo_ascender() as i64)
        .with("sTypoDescender", os2.s_typo_descender() as i64)
        .with("sTypoLineGap", os2.s_typo_line_gap() as i64)
        .with("usWinAscent", os2.us_win_ascent() as i64)
        .with("usWinDescent", os2.us_win_descent() as i64)
        .with_opt("ulCodePageRange1", os2.ul_code_page_range_1().map(i64::from))
        .with_opt("ulCodePageRange2", os2.ul_code_page_range_2().map(i64::from))
        .with_opt("sxHeight", os2.sx_height().map(i64::from))
        .with_opt("sCapHeight", os2.s_cap_height().map(i64::from))
        .with_opt("usDefaultChar", int(os2.us_default_char()))
        .with_opt("usBreakChar", int(os2.us_break_char()))
        .with_opt("usMaxContext", int(os2.us_max_context()))
        .with_opt("usLowerOpticalPointSize", int(os2.us_lower_optical_point_size()))
        .with_opt("usUpperOpticalPointSize", int(os2.us_upper_optical_point_size()));
    Ok(Some(obj.into()))
}

/// Least restrictive embedding permission of all fonts
///
/// Each value is normalized first: a font that allows preview or editing
/// is not restricted, and an installable font allows both. The normalized
/// values are then combined bit by bit, and restricted embedding wins over
/// everything else.
pub fn merge_fs_type(_cx: &mut MergeContext, values: Vec<Option<Value>>) -> Result<Option<Value>> {
    let values: Vec<i64> = values.iter().flatten().filter_map(Value::as_int).collect();
    if values.is_empty() {
        return Ok(None);
    }
    if values.iter().all(|v| *v == FS_TYPE_INSTALLABLE) {
        return Ok(Some(Value::Int(FS_TYPE_INSTALLABLE)));
    }
    let permissive = FS_TYPE_PREVIEW_AND_PRINT | FS_TYPE_EDITABLE;
    let normalized: Vec<i64> = values
        .into_iter()
        .map(|v| {
            if v & permissive != 0 {
                v & !FS_TYPE_RESTRICTED
            } else if v == FS_TYPE_INSTALLABLE {
                permissive
            } else {
                v
            }
        })
        .collect();
    let mut fs_type = OS2_FS_TYPE.merge(&normalized)?;
    if fs_type & FS_TYPE_RESTRICTED != 0 {
        fs_type &= !permissive;
    }
    Ok(Some(Value::Int(fs_type)))
}

/// Generic merge, then the version-dependent fsType fixups
pub fn merge_os2(cx: &mut MergeContext, tables: Vec<Option<Value>>) -> Result<Option<Value>> {
    let Some(Value::Object(mut os2)) = merge_objects(cx, tables)? else {
        return Ok(None);
    };
    if let (Some(version), Some(mut fs_type)) = (os2.int("version"), os2.int("fsType")) {
        if version < 2 {
            fs_type &= !FS_TYPE_V2_BITS;
        }
        // only one of the permission bits may be set
        if version >= 3 && fs_type & FS_TYPE_EDITABLE != 0 {
            fs_type &= !FS_TYPE_PREVIEW_AND_PRINT;
        }
        os2.set("fsType", fs_type);
    }
    Ok(Some(os2.into()))
}

pub fn lower_os2(obj: &Object) -> Result<Os2> {
    let panose_10 = match obj.get("panose") {
        Some(Value::Bytes(bytes)) => {
            bytes.as_slice().try_into().map_err(|_| obj.type_mismatch("panose"))?
        }
        _ => return Err(obj.type_mismatch("panose")),
    };
    Ok(Os2 {
        x_avg_char_width: obj.require("xAvgCharWidth")?,
        us_weight_class: obj.require("usWeightClass")?,
        us_width_class: obj.require("usWidthClass")?,
        fs_type: obj.require("fsType")?,
        y_subscript_x_size: obj.require("ySubscriptXSize")?,
        y_subscript_y_size: obj.require("ySubscriptYSize")?,
        y_subscript_x_offset: obj.require("ySubscriptXOffset")?,
        y_subscript_y_offset: obj.require("ySubscriptYOffset")?,
        y_superscript_x_size: obj.require("ySuperscriptXSize")?,
        y_superscript_y_size: obj.require("ySuperscriptYSize")?,
        y_superscript_x_offset: obj.require("ySuperscriptXOffset")?,
        y_superscript_y_offset: obj.require("ySuperscriptYOffset")?,
        y_strikeout_size: obj.require("yStrikeoutSize")?,
        y_strikeout_position: obj.require("yStrikeoutPosition")?,
        s_family_class: obj.require("sFamilyClass")?,
        panose_10,
        ul_unicode_range_1: obj.require("ulUnicodeRange1")?,
        ul_unicode_range_2: obj.require("ulUnicodeRange2")?,
        ul_unicode_range_3: obj.require("ulUnicodeRange3")?,
        ul_unicode_range_4: obj.require("ulUnicodeRange4")?,
        ach_vend_id: obj.tag("achVendID").ok_or_else(|| obj.type_mismatch("achVendID"))?,
        fs_selection: SelectionFlags::from_bits_truncate(obj.require("fsSelection")?),
        us_first_char_index: obj.require("fsFirstCharIndex")?,
        us_last_char_index: obj.require("fsLastCharIndex")?,
        s_typo_ascender: obj.require("sTypoAscender")?,
        s_typo_descender: obj.require("sTypoDescender")?,
        s_typo_line_gap: obj.require("sTypoLineGap")?,
        us_win_ascent: obj.require("usWinAscent")?,
        us_win_descent: obj.require("usWinDescent")?,
        ul_code_page_range_1: obj.optional("ulCodePageRange1")?,
        ul_code_page_range_2: obj.optional("ulCodePageRange2")?,
        sx_height: obj.optional("sxHeight")?,
        s_cap_height: obj.optional("sCapHeight")?,
        us_default_char: obj.optional("usDefaultChar")?,
        us_break_char: obj.optional("usBreakChar")?,
        us_max_context: obj.optional("usMaxContext")?,
        us_lower_optical_point_size: obj.optional("usLowerOpticalPointSize")?,
        us_upper_optical_point_size: obj.optional("usUpperOpticalPointSize")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::empty_context;

    fn fs_type(values: &[i64]) -> i64 {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let values = values.iter().map(|v| Some(Value::Int(*v))).collect();
        merge_fs_type(&mut cx, values).unwrap().and_then(|v| v.as_int()).unwrap()
    }

    fn os2(version: i64, fs_type: i64) -> Object {
        Object::new("OS/2")
            .with("tableTag", TAG)
            .with("version", version)
            .with("xAvgCharWidth", 500)
            .with("usWeightClass", 400)
            .with("usWidthClass", 5)
            .with("fsType", fs_type)
            .with("ySubscriptXSize", 650)
            .with("ySubscriptYSize", 600)
            .with("ySubscriptXOffset", 0)
            .with("ySubscriptYOffset", 75)
            .with("ySuperscriptXSize", 650)
            .with("ySuperscriptYSize", 600)
            .with("ySuperscriptXOffset", 0)
            .with("ySuperscriptYOffset", 350)
            .with("yStrikeoutSize", 50)
            .with("yStrikeoutPosition", 300)
            .with("sFamilyClass", 0)
            .with("panose", Value::Bytes(vec![0; 10]))
            .with("ulUnicodeRange1", 1)
            .with("ulUnicodeRange2", 0)
            .with("ulUnicodeRange3", 0)
            .with("ulUnicodeRange4", 0)
            .with("achVendID", Tag::new(b"NONE"))
            .with("fsSelection", 0x40)
            .with("fsFirstCharIndex", 0x20)
            .with("fsLastCharIndex", 0x7E)
            .with("sTypoAscender", 800)
            .with("sTypoDescender", -200)
            .with("sTypoLineGap", 0)
            .with("usWinAscent", 900)
            .with("usWinDescent", 250)
    }

    #[test]
    fn test_fs_type_all_installable() {
        assert_eq!(fs_type(&[0, 0, 0]), 0);
    }

    #[test]
    fn test_fs_type_installable_and_editable() {
        // installable normalizes to preview+editable, AND with editable
        assert_eq!(fs_type(&[0, 0x8]), 0x8);
    }

    #[test]
    fn test_fs_type_restricted_wins() {
        assert_eq!(fs_type(&[0x2, 0]), 0x2);
        assert_eq!(fs_type(&[0x2, 0x8]), 0x0);
    }

    #[test]
    fn test_fs_type_preview_clears_restricted() {
        // 0x6 normalizes to 0x4
        assert_eq!(fs_type(&[0x6, 0x4]), 0x4);
    }

    #[test]
    fn test_fs_type_subsetting_bits_or() {
        assert_eq!(fs_type(&[0x100, 0x4]), 0x100);
        assert_eq!(fs_type(&[0x208, 0x8]), 0x208);
    }

    #[test]
    fn test_fs_type_skips_absent() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        assert_eq!(merge_fs_type(&mut cx, vec![None, None]).unwrap(), None);
        let merged = merge_fs_type(&mut cx, vec![None, Some(Value::Int(0x8))]).unwrap();
        assert_eq!(merged, Some(Value::Int(0x8)));
    }

    #[test]
    fn test_old_versions_clear_reserved_bits() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let merged = merge_os2(&mut cx, vec![Some(os2(1, 0x108).into()), Some(os2(1, 0x8).into())])
            .unwrap()
            .and_then(Value::into_object)
            .unwrap();
        assert_eq!(merged.int("fsType"), Some(0x8));
    }

    #[test]
    fn test_editable_clears_preview_from_version_3() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let merged = merge_os2(&mut cx, vec![Some(os2(3, 0xC).into())])
            .unwrap()
            .and_then(Value::into_object)
            .unwrap();
        assert_eq!(merged.int("fsType"), Some(0x8));
    }

    #[test]
    fn test_merge_and_lower() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let v4 = os2(4, 0)
            .with("ulCodePageRange1", 1)
            .with("ulCodePageRange2", 0)
            .with("sxHeight", 500)
            .with("sCapHeight", 700)
            .with("usDefaultChar", 0)
            .with("usBreakChar", 32)
            .with("usMaxContext", 2)
            .with("sTypoDescender", -300)
            .with("ulUnicodeRange1", 2);
        let merged = merge_os2(&mut cx, vec![Some(os2(1, 0).into()), Some(v4.into())])
            .unwrap()
            .and_then(Value::into_object)
            .unwrap();
        assert_eq!(merged.int("version"), Some(4));
        assert_eq!(merged.int("ulUnicodeRange1"), Some(3));
        assert_eq!(merged.int("sxHeight"), Some(500));

        let lowered = lower_os2(&merged).unwrap();
        assert_eq!(lowered.s_typo_descender, -300);
        assert_eq!(lowered.sx_height, Some(500));
        assert_eq!(lowered.us_lower_optical_point_size, None);
        assert_eq!(lowered.ach_vend_id, Tag::new(b"NONE"));
    }
}
