use std::{io, result};

use read_fonts::{ReadError, types::Tag};
use thiserror::Error;
use write_fonts::{BuilderError, error, tables::cmap};

use crate::types::FontIndex;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("failed to read font: {0}")]
    ReadError(#[from] ReadError),

    #[error("failed to write font: {0}")]
    WriteError(#[from] error::Error),

    #[error("failed to build font: {0}")]
    BuilderError(#[from] BuilderError),

    #[error("failed to build cmap: {0}")]
    CmapConflict(#[from] cmap::CmapConflict),

    #[error("no fonts provided for merging")]
    NoFonts,

    #[error("failed to load {index}: {source}")]
    Load { index: FontIndex, source: ReadError },

    #[error("values must be equal for '{class}' field '{field}': {values}")]
    NotEqual { class: String, field: String, values: String },

    #[error("don't know how to merge key '{field}' of class '{class}'")]
    UnknownField { class: String, field: String },

    #[error("don't know how to merge objects of class '{class}'")]
    UnknownClass { class: String },

    #[error("don't know how to merge bit {bit} of '{field}'")]
    UnknownBit { field: &'static str, bit: u32 },

    #[error("unexpected value for '{class}' field '{field}'")]
    TypeMismatch { class: String, field: String },

    #[error("{table}: required feature index is not supported")]
    RequiredFeature { table: Tag },

    #[error("{table}: dangling {kind} reference {index}")]
    DanglingReference { table: Tag, kind: &'static str, index: usize },

    #[error("have {count} duplicate glyphs to resolve for {font} but no GSUB")]
    MissingGsub { font: FontIndex, count: usize },

    #[error("glyph '{0}' is not in the merged glyph order")]
    UnknownGlyph(String),

    #[error("merged font needs {0} glyphs, more than a font can hold")]
    TooManyGlyphs(usize),

    #[error("failed to draw glyph '{glyph}': {reason}")]
    Outline { glyph: String, reason: String },

    #[error("unknown option '{0}'")]
    UnknownOption(String),

    #[error("invalid value '{value}' for option '{key}'")]
    InvalidOptionValue { key: String, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = result::Result<T, MergeError>;
