//! `FileCnt` listing payloads for `List` and `tree`.
//!
//! ```text
//! FileCnt : 3 --a.txt 10 --sub 4096 [ --b.txt 5 ]
//! ```
//!
//! The count covers every entry at every depth. A directory walked by
//! `tree` is followed by its children between `[` and `]`.

use std::fmt::Write as _;

use crate::error::ShelfError;

const PREFIX: &str = "FileCnt :";

/// One visible entry of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub size: u64,
    /// Nested entries when the listing is recursive and this is a directory.
    pub children: Option<Vec<ListingEntry>>,
}

impl ListingEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            children: None,
        }
    }

    pub fn directory(name: impl Into<String>, size: u64, children: Vec<ListingEntry>) -> Self {
        Self {
            name: name.into(),
            size,
            children: Some(children),
        }
    }

    /// This entry plus all of its descendants.
    pub fn total(&self) -> usize {
        1 + self
            .children
            .as_deref()
            .map(|c| c.iter().map(ListingEntry::total).sum())
            .unwrap_or(0)
    }

    fn render(&self, out: &mut String) {
        let _ = write!(out, " --{} {}", self.name, self.size);
        if let Some(children) = &self.children {
            out.push_str(" [");
            for child in children {
                child.render(out);
            }
            out.push_str(" ]");
        }
    }
}

/// A parsed or to-be-sent `FileCnt` message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Listing {
    pub entries: Vec<ListingEntry>,
}

impl Listing {
    pub fn new(entries: Vec<ListingEntry>) -> Self {
        Self { entries }
    }

    /// Number of entries at every depth.
    pub fn count(&self) -> usize {
        self.entries.iter().map(ListingEntry::total).sum()
    }

    /// Names of the top-level entries.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn to_message(&self) -> String {
        let mut out = format!("{PREFIX} {}", self.count());
        for entry in &self.entries {
            entry.render(&mut out);
        }
        out
    }

    /// Parse a `FileCnt` message.
    ///
    /// Names may contain spaces: a name runs up to the first number that is
    /// followed by the next entry, a bracket or the end of the message. Runs
    /// of whitespace inside a name come back as a single space.
    pub fn parse(message: &str) -> Result<Self, ShelfError> {
        let body = message
            .trim()
            .strip_prefix(PREFIX)
            .ok_or_else(|| ShelfError::UnexpectedReply(message.trim().to_string()))?;

        let tokens: Vec<&str> = body.split_whitespace().collect();
        let count: usize = tokens
            .first()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| ShelfError::UnexpectedReply(message.trim().to_string()))?;

        let mut cursor = Cursor {
            tokens: &tokens[1..],
            pos: 0,
        };
        let entries = cursor.entries(false)?;
        let listing = Listing { entries };
        if listing.count() != count {
            return Err(ShelfError::Other(format!(
                "listing announces {count} entries but carries {}",
                listing.count()
            )));
        }
        Ok(listing)
    }
}

struct Cursor<'a> {
    tokens: &'a [&'a str],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn next(&mut self) -> Option<&'a str> {
        let token = self.tokens.get(self.pos).copied();
        self.pos += 1;
        token
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    /// Whether the upcoming token closes the current entry.
    fn at_boundary(&self) -> bool {
        match self.peek() {
            None => true,
            Some(t) => t == "[" || t == "]" || t.starts_with("--"),
        }
    }

    fn entries(&mut self, nested: bool) -> Result<Vec<ListingEntry>, ShelfError> {
        let mut entries = Vec::new();
        loop {
            let token = match self.next() {
                Some(t) => t,
                None if nested => return Err("unterminated nested listing".into()),
                None => return Ok(entries),
            };

            if token == "]" {
                if nested {
                    return Ok(entries);
                }
                return Err("unbalanced ']' in listing".into());
            }

            let first = token
                .strip_prefix("--")
                .ok_or_else(|| ShelfError::Other(format!("expected '--name', found {token:?}")))?;
            let mut name = first.to_string();
            let size = loop {
                let token = self
                    .next()
                    .ok_or_else(|| ShelfError::Other(format!("missing size for {name:?}")))?;
                if let Ok(size) = token.parse::<u64>() {
                    if self.at_boundary() {
                        break size;
                    }
                }
                name.push(' ');
                name.push_str(token);
            };

            let children = if self.peek() == Some("[") {
                self.next();
                Some(self.entries(true)?)
            } else {
                None
            };

            entries.push(ListingEntry {
                name,
                size,
                children,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_listing_message() {
        let listing = Listing::new(vec![
            ListingEntry::file("a.txt", 10),
            ListingEntry::file("sub", 4096),
        ]);
        assert_eq!(listing.to_message(), "FileCnt : 2 --a.txt 10 --sub 4096");
    }

    #[test]
    fn empty_listing() {
        assert_eq!(Listing::default().to_message(), "FileCnt : 0");
        assert!(Listing::parse("FileCnt : 0\n").unwrap().entries.is_empty());
    }

    #[test]
    fn nested_listing_counts_every_depth() {
        let listing = Listing::new(vec![
            ListingEntry::file("a.txt", 10),
            ListingEntry::directory(
                "sub",
                4096,
                vec![
                    ListingEntry::file("b.txt", 5),
                    ListingEntry::directory("deep", 4096, vec![]),
                ],
            ),
        ]);
        let message = listing.to_message();
        assert_eq!(
            message,
            "FileCnt : 4 --a.txt 10 --sub 4096 [ --b.txt 5 --deep 4096 [ ] ]"
        );
        assert_eq!(Listing::parse(&message).unwrap(), listing);
    }

    #[test]
    fn rejects_foreign_replies() {
        assert!(matches!(
            Listing::parse("FileUnknown"),
            Err(ShelfError::UnexpectedReply(_))
        ));
        assert!(Listing::parse("FileCnt : 3 --a 1").is_err());
        assert!(Listing::parse("FileCnt : 1 --a 1 [").is_err());
    }

    #[test]
    fn names_with_spaces() {
        let listing = Listing::new(vec![
            ListingEntry::file("my notes.txt", 12),
            ListingEntry::file("v 2 draft.txt", 7),
            ListingEntry::directory("old files", 4096, vec![ListingEntry::file("a b", 1)]),
        ]);
        let message = listing.to_message();
        assert_eq!(
            message,
            "FileCnt : 4 --my notes.txt 12 --v 2 draft.txt 7 --old files 4096 [ --a b 1 ]"
        );
        assert_eq!(Listing::parse(&message).unwrap(), listing);
    }
}
