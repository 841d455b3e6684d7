//! In-place patching of textual element values in a DICOM byte buffer.
//!
//! [`patch`] never changes the container layout: every edited value is
//! written into the exact payload region recorded at decode time, so
//! the output buffer has the same length as the input and all other
//! element offsets remain valid.
//!
//! # Fixed-length policy
//!
//! A new value whose encoded form is *shorter* than the element's
//! declared length is padded to that length with the representation's
//! padding byte (NUL for UI, space otherwise). A new value whose
//! encoded form is *longer* is rejected with
//! [`PatchError::LengthMismatch`]; writing past the element boundary
//! would corrupt the following element and is never done.

use crate::dataset::ElementTable;
use crate::header::{Tag, VR};
use crate::text::{EncodeTextError, SpecificCharacterSet, TextCodec};
use snafu::{Backtrace, ResultExt, Snafu};

/// A single requested change to a textual element value.
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    /// The tag of the element to overwrite.
    pub tag: Tag,
    /// The new text value.
    pub value: String,
}

impl Edit {
    /// Create an edit from a tag and its replacement text.
    pub fn new<T, V>(tag: T, value: V) -> Self
    where
        T: Into<Tag>,
        V: Into<String>,
    {
        Edit {
            tag: tag.into(),
            value: value.into(),
        }
    }
}

/// An error which occurred while validating or applying an edit batch.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub))]
pub enum PatchError {
    /// The edit references a tag which is not in the element table,
    /// typically a stale reference across a reload.
    #[snafu(display("Unknown element tag {}", tag))]
    UnknownTag { tag: Tag, backtrace: Backtrace },

    /// The edit targets an element whose value representation
    /// is not textual.
    #[snafu(display("Element {} holds binary data (VR {})", tag, vr))]
    BinaryElement {
        tag: Tag,
        vr: VR,
        backtrace: Backtrace,
    },

    /// The new value does not fit the element's declared length.
    #[snafu(display(
        "New value for {} is {} bytes, exceeding the declared length of {}",
        tag,
        actual,
        declared
    ))]
    LengthMismatch {
        tag: Tag,
        declared: usize,
        actual: usize,
        backtrace: Backtrace,
    },

    /// The new value cannot be represented in the data set's
    /// character set.
    #[snafu(display("Could not encode new value for {}: {}", tag, source))]
    EncodeText { tag: Tag, source: EncodeTextError },
}

pub type Result<T, E = PatchError> = std::result::Result<T, E>;

/// Apply a batch of textual edits to a copy of the original buffer.
///
/// The whole batch is validated before any byte is written, so a
/// failure yields no buffer and the caller's input is always left
/// untouched (all-or-nothing). Edits are applied in order; if two
/// edits name the same tag, the later one wins.
///
/// An empty batch returns a byte-identical copy of the input.
///
/// The returned buffer is independent of the input; the element
/// table and its offsets remain valid for both, since the container
/// layout is never altered.
pub fn patch(buffer: &[u8], elements: &ElementTable, edits: &[Edit]) -> Result<Vec<u8>> {
    let mut pending = Vec::with_capacity(edits.len());

    for edit in edits {
        let record = elements
            .get(edit.tag)
            .ok_or_else(|| UnknownTagSnafu { tag: edit.tag }.build())?;
        if !record.is_textual() {
            return BinaryElementSnafu {
                tag: edit.tag,
                vr: record.vr,
            }
            .fail();
        }

        // the file meta group is always in the default repertoire,
        // regardless of Specific Character Set
        let charset = if edit.tag.group() == 0x0002 {
            SpecificCharacterSet::Default
        } else {
            elements.charset()
        };
        let mut encoded = charset
            .encode(&edit.value)
            .context(EncodeTextSnafu { tag: edit.tag })?;

        if encoded.len() > record.length {
            return LengthMismatchSnafu {
                tag: edit.tag,
                declared: record.length,
                actual: encoded.len(),
            }
            .fail();
        }
        encoded.resize(record.length, record.vr.padding());
        pending.push((record.data_offset, encoded));
    }

    let mut patched = buffer.to_vec();
    for (offset, bytes) in pending {
        patched[offset..offset + bytes.len()].copy_from_slice(&bytes);
    }
    Ok(patched)
}
