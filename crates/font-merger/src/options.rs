//! Options for font merging

use read_fonts::types::Tag;

use crate::{MergeError, Result, types::TableTag};

/// Options for font merging
///
/// None of these change how tables are merged; they only control logging
/// and which tables end up in the output.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Tables to drop from the merged font
    pub drop_tables: Vec<TableTag>,

    /// Whether to enable verbose logging
    pub verbose: bool,

    /// Whether to log elapsed time per table
    pub timing: bool,
}

/// Which unknown options [`Options::parse_opts`] passes through
#[derive(Debug, Clone, Copy, Default)]
pub enum IgnoreUnknown<'a> {
    #[default]
    No,
    All,
    /// Only these option names, spelled as on the command line
    Keys(&'a [&'a str]),
}

impl IgnoreUnknown<'_> {
    fn ignores(&self, key: &str) -> bool {
        match self {
            IgnoreUnknown::No => false,
            IgnoreUnknown::All => true,
            IgnoreUnknown::Keys(keys) => keys.contains(&key),
        }
    }
}

/// One parsed `--key...` argument
#[derive(Debug, Clone, Copy, PartialEq)]
enum Arg<'a> {
    /// `--key` or `--no-key`
    Flag(bool),
    Assign(&'a str),
    /// `--key+=a,b`
    Extend(&'a str),
    /// `--key-=a`
    Remove(&'a str),
}

impl<'a> Arg<'a> {
    fn parse(opt: &'a str) -> (&'a str, Self) {
        let Some((key, value)) = opt.split_once('=') else {
            return match opt.strip_prefix("no-") {
                Some(key) => (key, Arg::Flag(false)),
                None => (opt, Arg::Flag(true)),
            };
        };
        if let Some(key) = key.strip_suffix('+') {
            (key, Arg::Extend(value))
        } else if let Some(key) = key.strip_suffix('-') {
            (key, Arg::Remove(value))
        } else {
            (key, Arg::Assign(value))
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add tables to drop (accepts any iterable of string-like values)
    pub fn drop_tables(mut self, tables: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.drop_tables = tables
            .into_iter()
            .filter_map(|s| TableTag::parse(s.as_ref()))
            .collect();
        self
    }

    /// Add a single table to drop
    pub fn drop_table(mut self, table: impl AsRef<str>) -> Self {
        if let Some(tag) = TableTag::parse(table.as_ref()) {
            self.drop_tables.push(tag);
        }
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn timing(mut self, timing: bool) -> Self {
        self.timing = timing;
        self
    }

    /// Check if a table should be dropped
    pub fn should_drop(&self, tag: &TableTag) -> bool {
        self.drop_tables.contains(tag)
    }

    /// Check if a table should be dropped (by Tag)
    pub fn should_drop_tag(&self, tag: Tag) -> bool {
        self.should_drop(&tag.into())
    }

    /// Assign one option by name
    ///
    /// Dashes in `key` count as underscores. Boolean options are true for
    /// any non-empty value; list options take a comma-separated value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key.replace('-', "_").as_str() {
            "verbose" => self.verbose = !value.is_empty(),
            "timing" => self.timing = !value.is_empty(),
            "drop_tables" => self.drop_tables = parse_tags(key, value)?,
            _ => return Err(MergeError::UnknownOption(key.to_string())),
        }
        Ok(())
    }

    /// Apply `--key=value` style arguments, returning the other arguments
    ///
    /// Understands `--key`, `--no-key`, `--key=value`, and for list options
    /// `--key+=a,b` and `--key-=a`. Unknown options are an error unless
    /// `ignore_unknown` covers them, in which case they are returned with the
    /// positional arguments.
    pub fn parse_opts(
        &mut self,
        args: impl IntoIterator<Item = impl AsRef<str>>,
        ignore_unknown: IgnoreUnknown,
    ) -> Result<Vec<String>> {
        let mut rest = Vec::new();
        for arg in args {
            let arg = arg.as_ref();
            let Some(opt) = arg.strip_prefix("--") else {
                rest.push(arg.to_string());
                continue;
            };

            let (key, parsed) = Arg::parse(opt);
            let invalid = |value: &str| MergeError::InvalidOptionValue {
                key: key.to_string(),
                value: value.to_string(),
            };
            match (key.replace('-', "_").as_str(), parsed) {
                ("verbose" | "timing", Arg::Flag(on)) => self.set(key, if on { "1" } else { "" })?,
                ("verbose" | "timing", Arg::Assign(value)) => self.set(key, value)?,
                ("verbose" | "timing", Arg::Extend(value) | Arg::Remove(value)) => {
                    return Err(invalid(value));
                }
                ("drop_tables", Arg::Flag(true)) => return Err(invalid("")),
                ("drop_tables", Arg::Flag(false)) => self.drop_tables.clear(),
                ("drop_tables", Arg::Assign(value)) => self.drop_tables = parse_tags(key, value)?,
                ("drop_tables", Arg::Extend(value)) => {
                    self.drop_tables.extend(parse_tags(key, value)?);
                }
                ("drop_tables", Arg::Remove(value)) => {
                    let removed = parse_tags(key, value)?;
                    self.drop_tables.retain(|tag| !removed.contains(tag));
                }
                _ if ignore_unknown.ignores(key) => rest.push(arg.to_string()),
                _ => return Err(MergeError::UnknownOption(opt.to_string())),
            }
        }
        Ok(rest)
    }
}

/// Comma-separated table tags; an empty value is an empty list
fn parse_tags(key: &str, value: &str) -> Result<Vec<TableTag>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    value
        .split(',')
        .map(|s| {
            TableTag::parse(s).ok_or_else(|| MergeError::InvalidOptionValue {
                key: key.to_string(),
                value: s.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = Options::new().verbose(true).timing(true).drop_tables(["DSIG", "hdmx"]);
        assert!(options.verbose);
        assert!(options.timing);
        assert!(options.should_drop_tag(Tag::new(b"DSIG")));
        assert!(!options.should_drop_tag(Tag::new(b"GSUB")));
    }

    #[test]
    fn test_set() {
        let mut options = Options::new();
        options.set("drop-tables", "DSIG,prep").unwrap();
        assert_eq!(options.drop_tables.len(), 2);
        options.set("verbose", "yes").unwrap();
        assert!(options.verbose);
        options.set("verbose", "").unwrap();
        assert!(!options.verbose);
        assert!(matches!(options.set("colour", "1"), Err(MergeError::UnknownOption(_))));
    }

    #[test]
    fn test_parse_opts() {
        let mut options = Options::new();
        let rest = options
            .parse_opts(
                ["a.ttf", "--verbose", "--drop-tables=DSIG", "--drop-tables+=hdmx,prep", "b.ttf"],
                IgnoreUnknown::No,
            )
            .unwrap();
        assert_eq!(rest, vec!["a.ttf", "b.ttf"]);
        assert!(options.verbose);
        assert_eq!(options.drop_tables.len(), 3);

        options
            .parse_opts(["--drop-tables-=hdmx", "--no-verbose", "--timing=0"], IgnoreUnknown::No)
            .unwrap();
        assert!(!options.verbose);
        // any non-empty value is true
        assert!(options.timing);
        assert!(!options.should_drop_tag(Tag::new(b"hdmx")));
        assert!(options.should_drop_tag(Tag::new(b"prep")));

        options.parse_opts(["--drop-tables="], IgnoreUnknown::No).unwrap();
        assert!(options.drop_tables.is_empty());
    }

    #[test]
    fn test_parse_opts_unknown() {
        let mut options = Options::new();
        assert!(matches!(
            options.parse_opts(["--output-file=x.ttf"], IgnoreUnknown::No),
            Err(MergeError::UnknownOption(_))
        ));
        let err = options
            .parse_opts(
                ["--output-file=x.ttf", "--import-file=y"],
                IgnoreUnknown::Keys(&["output-file"]),
            )
            .unwrap_err();
        assert!(matches!(err, MergeError::UnknownOption(_)));
        let rest = options
            .parse_opts(["--output-file=x.ttf", "f.ttf"], IgnoreUnknown::All)
            .unwrap();
        assert_eq!(rest, vec!["--output-file=x.ttf", "f.ttf"]);
    }

    #[test]
    fn test_invalid_tag() {
        let mut options = Options::new();
        assert!(matches!(
            options.parse_opts(["--drop-tables=TOOLONG"], IgnoreUnknown::No),
            Err(MergeError::InvalidOptionValue { .. })
        ));
    }
}
