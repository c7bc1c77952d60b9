//! Metadata extraction from document headers.
//!
//! A document starts with a title line (`= Title`), followed by attribute
//! lines of the form `:key: v1, v2` up to the end-of-header sentinel. Only
//! the title is mandatory.

use std::fmt::Write;

use serde::ser::{Serialize, Serializer, SerializeMap};

use crate::error::Result;

/// The line that closes a document header.
pub const END_OF_HEADER: &str = "// END-OF-HEADER. DO NOT MODIFY OR DELETE THIS LINE";

/// The attribute key under which the title line is recorded.
pub const TITLE: &str = "Title";

/// An insertion-ordered mapping from attribute keys to their values.
/// Inserting an existing key replaces its values in place.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, Vec<String>)>,
}

impl Attributes {
    pub fn insert<K: Into<String>>(&mut self, key: K, values: Vec<String>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((key, values)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn title(&self) -> Option<&str> {
        self.get(TITLE)?.first().map(|s| s.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, values) in &self.entries {
            map.serialize_entry(key, values)?;
        }

        map.end()
    }
}

/// The parsed header of a document.
#[derive(Debug, Clone)]
pub struct Header {
    pub title: String,
    pub attributes: Attributes,
    /// The document text with every attribute line rewritten in canonical
    /// form. Content fingerprints are taken over this text.
    pub canonical: String,
    /// Whether the end-of-header sentinel was found.
    pub terminated: bool,
}

/// Splits an attribute line into its key and trimmed, non-empty values.
fn parse_attribute(line: &str) -> Option<(&str, Vec<String>)> {
    let rest = line.strip_prefix(':')?;
    let (key, values) = rest.split_once(':')?;
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }

    let values = values.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect();

    Some((key, values))
}

/// Extracts the title and attributes of `text`.
///
/// Fails when the document has no non-empty first line or the title is empty
/// after stripping its `=` marker. Attributes whose values are all empty are
/// omitted. A repeated key keeps the values of its last occurrence.
pub fn extract(text: &str) -> Result<Header> {
    let mut lines = text.split_inclusive('\n');
    let mut canonical = String::with_capacity(text.len());

    let title = loop {
        let Some(line) = lines.next() else {
            return err!(kind: Document; "document has no title line");
        };

        canonical.push_str(line);
        if !line.trim().is_empty() {
            break line.trim().trim_start_matches('=').trim().to_string();
        }
    };

    if title.is_empty() {
        return err!(kind: Document; "document title is empty");
    }

    let mut attributes = Attributes::default();
    attributes.insert(TITLE, vec![title.clone()]);

    let mut terminated = false;
    for line in lines.by_ref() {
        let content = line.trim_end_matches(['\n', '\r']);
        if content.trim_end() == END_OF_HEADER {
            canonical.push_str(line);
            terminated = true;
            break;
        }

        match parse_attribute(content) {
            Some((key, values)) => {
                let _ = write!(canonical, ":{key}:");
                if !values.is_empty() {
                    let _ = write!(canonical, " {}", values.join(", "));
                }

                canonical.push_str(&line[content.len()..]);
                if !values.is_empty() && key != TITLE {
                    attributes.insert(key, values);
                }
            }
            None => canonical.push_str(line),
        }
    }

    canonical.extend(lines);
    Ok(Header { title, attributes, canonical, terminated })
}

/// Replaces the first end-of-header sentinel line in `text` with `section`.
/// Text without a sentinel is returned unchanged.
pub fn replace_header_mark(text: &str, section: &str) -> String {
    text.replacen(END_OF_HEADER, section, 1)
}
