//! Tables carried over as opaque bytes
//!
//! `name` and the TrueType hinting tables (`fpgm`, `prep`, `cvt `, `gasp`)
//! are not merged field by field. The first font that has one supplies it.

use read_fonts::types::Tag;

use crate::{
    Result,
    context::SourceFont,
    value::{Object, Value},
};

pub const NAME: Tag = Tag::new(b"name");

/// Class name and payload field for a raw table tag
pub fn raw_class(tag: Tag) -> Option<(&'static str, &'static str)> {
    Some(match &tag.to_be_bytes() {
        b"name" => ("name", "names"),
        b"fpgm" => ("fpgm", "data"),
        b"prep" => ("prep", "data"),
        b"cvt " => ("cvt ", "data"),
        b"gasp" => ("gasp", "data"),
        _ => return None,
    })
}

pub fn lift_raw(src: &SourceFont, tag: Tag) -> Result<Option<Value>> {
    let (Some((class, field)), Some(data)) = (raw_class(tag), src.font.table_data(tag)) else {
        return Ok(None);
    };
    let obj = Object::new(class)
        .with("tableTag", tag)
        .with(field, Value::Bytes(data.as_bytes().to_vec()));
    Ok(Some(obj.into()))
}

/// The payload of a merged raw table, `None` when no font had one
pub fn lower_raw(tag: Tag, obj: &Object) -> Option<Vec<u8>> {
    let (_, field) = raw_class(tag)?;
    match obj.get(field) {
        Some(Value::Bytes(bytes)) => Some(bytes.clone()),
        _ => None,
    }
}
