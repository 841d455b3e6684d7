//! The decoded element table: an insertion-ordered mapping
//! from attribute tags to element records.
//!
//! The table is the output of [`decode`](crate::decode::decode) and the
//! authoritative index for [`patch`](crate::patch::patch). Its iteration
//! order always matches the byte order of the elements in the source
//! buffer, which is semantically meaningful for display.

use crate::header::{Tag, VR};
use crate::text::SpecificCharacterSet;
use std::collections::HashMap;

/// A decoded data element, tracking where its value payload
/// lives in the source buffer.
///
/// `value` is `Some` exactly when the value representation is textual
/// (see [`VR::is_textual`]) and the payload was decoded as text.
/// Elements of any other representation keep their offset and length
/// recorded, but are treated as opaque binary data.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRecord {
    /// The attribute tag.
    pub tag: Tag,
    /// The value representation.
    pub vr: VR,
    /// Byte offset into the source buffer where the value payload begins.
    pub data_offset: usize,
    /// Byte length of the value payload.
    pub length: usize,
    /// The decoded text value, with trailing padding removed,
    /// for textual representations only.
    pub value: Option<String>,
}

impl ElementRecord {
    /// Whether this element holds an editable text value.
    #[inline]
    pub fn is_textual(&self) -> bool {
        self.vr.is_textual()
    }
}

/// An ordered table of decoded data elements, indexed by tag.
///
/// Iteration yields the elements in the order they were encountered
/// in the source buffer. Lookup by tag is constant time.
#[derive(Debug, Clone, Default)]
pub struct ElementTable {
    records: Vec<ElementRecord>,
    by_tag: HashMap<Tag, usize>,
    charset: SpecificCharacterSet,
}

impl ElementTable {
    /// Create an empty element table.
    pub fn new() -> Self {
        ElementTable::default()
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        ElementTable {
            records: Vec::with_capacity(capacity),
            by_tag: HashMap::with_capacity(capacity),
            charset: SpecificCharacterSet::Default,
        }
    }

    /// Append a record, rejecting duplicate tags.
    /// On rejection the record is handed back to the caller.
    pub(crate) fn insert(&mut self, record: ElementRecord) -> Result<(), ElementRecord> {
        use std::collections::hash_map::Entry;
        match self.by_tag.entry(record.tag) {
            Entry::Occupied(_) => Err(record),
            Entry::Vacant(e) => {
                e.insert(self.records.len());
                self.records.push(record);
                Ok(())
            }
        }
    }

    pub(crate) fn set_charset(&mut self, charset: SpecificCharacterSet) {
        self.charset = charset;
    }

    /// The character set in effect for this data set,
    /// as announced by *Specific Character Set (0008,0005)*
    /// (or the default repertoire if absent).
    ///
    /// Edited values are re-encoded with this same character set.
    #[inline]
    pub fn charset(&self) -> SpecificCharacterSet {
        self.charset
    }

    /// Look up an element record by its tag.
    pub fn get(&self, tag: Tag) -> Option<&ElementRecord> {
        self.by_tag.get(&tag).map(|&i| &self.records[i])
    }

    /// Iterate over the records in source byte order.
    pub fn iter(&self) -> std::slice::Iter<'_, ElementRecord> {
        self.records.iter()
    }

    /// The number of elements in the table.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no elements.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a ElementTable {
    type Item = &'a ElementRecord;
    type IntoIter = std::slice::Iter<'a, ElementRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: Tag, offset: usize) -> ElementRecord {
        ElementRecord {
            tag,
            vr: VR::LO,
            data_offset: offset,
            length: 4,
            value: Some("TEST".to_string()),
        }
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut table = ElementTable::new();
        // deliberately out of ascending tag order
        table.insert(record(Tag(0x0010, 0x0020), 8)).unwrap();
        table.insert(record(Tag(0x0008, 0x0060), 20)).unwrap();
        table.insert(record(Tag(0x0010, 0x0010), 32)).unwrap();

        let tags: Vec<Tag> = table.iter().map(|r| r.tag).collect();
        assert_eq!(
            tags,
            vec![
                Tag(0x0010, 0x0020),
                Tag(0x0008, 0x0060),
                Tag(0x0010, 0x0010)
            ]
        );
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(Tag(0x0008, 0x0060)).unwrap().data_offset, 20);
        assert!(table.get(Tag(0x0008, 0x0061)).is_none());
    }

    #[test]
    fn duplicate_tags_are_rejected() {
        let mut table = ElementTable::new();
        table.insert(record(Tag(0x0010, 0x0010), 8)).unwrap();
        let rejected = table.insert(record(Tag(0x0010, 0x0010), 24));
        assert!(rejected.is_err());
        assert_eq!(table.len(), 1);
        // the original record is untouched
        assert_eq!(table.get(Tag(0x0010, 0x0010)).unwrap().data_offset, 8);
    }
}
