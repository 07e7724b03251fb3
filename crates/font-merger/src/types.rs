//! Newtypes for the different index spaces involved in a merge
//!
//! Glyph ids from a source font and glyph ids in the merged font are both
//! `u16` on disk; keeping them apart in the type system catches the common
//! mistake of writing a source id into a merged table.

use std::{
    fmt,
    fmt::{Display, Formatter, Result},
};

use font_types::GlyphId16;
use read_fonts::types::Tag;

macro_rules! u16_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u16);

        impl $name {
            pub const fn new(id: u16) -> Self {
                Self(id)
            }

            pub const fn to_u16(self) -> u16 {
                self.0
            }

            pub const fn to_u32(self) -> u32 {
                self.0 as u32
            }

            pub fn to_glyph_id16(self) -> GlyphId16 {
                GlyphId16::new(self.0)
            }
        }

        impl From<u16> for $name {
            fn from(id: u16) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u16 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $label, self.0)
            }
        }
    };
}

/// Position of an input font in the list being merged
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontIndex(pub usize);

impl FontIndex {
    pub const fn new(idx: usize) -> Self {
        Self(idx)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Whether this is the first font, whose hinting and raw tables win
    pub const fn is_first(self) -> bool {
        self.0 == 0
    }
}

impl From<usize> for FontIndex {
    fn from(idx: usize) -> Self {
        Self(idx)
    }
}

impl Display for FontIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "font[{}]", self.0)
    }
}

u16_id!(
    /// A glyph id in one of the input fonts
    GlyphId,
    "GID"
);

u16_id!(
    /// A glyph id in the merged glyph order
    MegaGlyphId,
    "MGID"
);

/// A Unicode codepoint
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Codepoint(pub u32);

impl Codepoint {
    pub const fn new(cp: u32) -> Self {
        Self(cp)
    }

    pub const fn to_u32(self) -> u32 {
        self.0
    }

    pub const fn is_bmp(self) -> bool {
        self.0 <= 0xFFFF
    }

    /// Convert to a Rust char, `None` for surrogates and out of range values
    pub fn to_char(self) -> Option<char> {
        char::from_u32(self.0)
    }
}

impl From<u32> for Codepoint {
    fn from(cp: u32) -> Self {
        Self(cp)
    }
}

impl Display for Codepoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "U+{:04X}", self.0)
    }
}

/// A font table tag
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableTag(Tag);

impl TableTag {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Self(Tag::new(bytes))
    }

    /// Parse a tag from a string, padding short tags with spaces
    ///
    /// Returns `None` for empty strings and strings longer than four bytes.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        (!bytes.is_empty() && bytes.len() <= 4).then(|| {
            let mut arr = [b' '; 4];
            arr[..bytes.len()].copy_from_slice(bytes);
            Self(Tag::new(&arr))
        })
    }

    pub fn tag(self) -> Tag {
        self.0
    }
}

impl From<Tag> for TableTag {
    fn from(tag: Tag) -> Self {
        Self(tag)
    }
}

impl From<TableTag> for Tag {
    fn from(tt: TableTag) -> Self {
        tt.0
    }
}

impl Display for TableTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.0)
    }
}
