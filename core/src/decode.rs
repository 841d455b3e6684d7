//! Decoding of a DICOM byte buffer into an ordered element table.
//!
//! The decoder walks the optional 128-byte preamble and `DICM` magic
//! code, the file meta group (always Explicit VR Little Endian), and
//! the main data set in the value representation convention announced
//! by *Transfer Syntax UID (0002,0010)*. Streams without the magic
//! code are parsed as a raw data set from offset 0, sniffing the
//! convention from the first element.
//!
//! Decoding is permissive where the standard allows vendors to be
//! creative: unrecognized VR codes become [`VR::UN`] and their declared
//! length is still honored, and whole sequences are passed over as
//! opaque spans. Structural damage (a truncated header, a length that
//! crosses the end of the buffer, a sequence with no delimiter) fails
//! the decode with no partial table.

use crate::dataset::{ElementRecord, ElementTable};
use crate::header::{DataElementHeader, Length, Tag, VR};
use crate::text::{DecodeTextError, SpecificCharacterSet, TextCodec};
use byteordered::byteorder::{ByteOrder, LittleEndian};
use snafu::{Backtrace, ResultExt, Snafu};
use tracing::{debug, warn};

const DICM_MAGIC_CODE: [u8; 4] = [b'D', b'I', b'C', b'M'];

const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002, 0x0010);
const SPECIFIC_CHARACTER_SET: Tag = Tag(0x0008, 0x0005);

const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";
const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";

/// An error which occurred while decoding a DICOM byte buffer.
///
/// All variants describe a condition under which no element table
/// can be produced for the given input.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum DecodeError {
    /// A tag, header field or value payload would cross
    /// the end of the buffer.
    #[snafu(display(
        "Unexpected end of data at offset {} ({} more bytes needed)",
        offset,
        needed
    ))]
    UnexpectedEndOfData {
        offset: usize,
        needed: usize,
        backtrace: Backtrace,
    },

    /// An undefined-length element was not terminated
    /// by the expected item or delimitation tag.
    #[snafu(display(
        "Missing delimiter for undefined-length element {} starting at offset {}",
        tag,
        offset
    ))]
    MissingDelimiter {
        tag: Tag,
        offset: usize,
        backtrace: Backtrace,
    },

    /// The same tag appeared twice in one data set.
    #[snafu(display("Duplicate element tag {} at offset {}", tag, offset))]
    DuplicateTag {
        tag: Tag,
        offset: usize,
        backtrace: Backtrace,
    },

    /// The data set is encoded in a transfer syntax
    /// which this crate does not read.
    #[snafu(display("Unsupported transfer syntax `{}`", uid))]
    UnsupportedTransferSyntax { uid: String, backtrace: Backtrace },

    /// A textual value could not be decoded with the character set
    /// in effect.
    #[snafu(display("Could not decode text value of {}: {}", tag, source))]
    DecodeText { tag: Tag, source: DecodeTextError },
}

pub type Result<T, E = DecodeError> = std::result::Result<T, E>;

/// The value representation convention of a data set.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum VrConvention {
    /// Explicit VR Little Endian, also used for encapsulated syntaxes.
    ExplicitLe,
    /// Implicit VR Little Endian.
    ImplicitLe,
}

/// Decode a DICOM byte buffer into an ordered element table.
///
/// The element iteration order of the resulting table matches the byte
/// order of the buffer. Every element's payload offset and length are
/// recorded; textual values (see [`VR::is_textual`]) are additionally
/// decoded with the character set announced by the data set itself.
///
/// The input is borrowed and never modified, and the decoder keeps no
/// state between calls, so concurrent decodes of different buffers are
/// safe by construction.
pub fn decode(data: &[u8]) -> Result<ElementTable> {
    let mut table = ElementTable::with_capacity(32);
    let mut charset = SpecificCharacterSet::Default;
    let mut pos;
    let convention;

    if data.len() >= 132 && data[128..132] == DICM_MAGIC_CODE {
        pos = 132;
    } else if data.len() >= 4 && data[0..4] == DICM_MAGIC_CODE {
        // magic code without a preamble
        pos = 4;
    } else {
        debug!("no DICM magic code, parsing as a raw data set");
        convention = sniff_convention(data, 0);
        read_data_set(data, 0, convention, &mut charset, &mut table)?;
        table.set_charset(charset);
        return Ok(table);
    }

    // file meta group, always Explicit VR LE
    let mut transfer_syntax: Option<String> = None;
    while pos < data.len() {
        if read_u16(data, pos)? != 0x0002 {
            break;
        }
        let (record, next) = read_element(data, pos, VrConvention::ExplicitLe, charset)?;
        pos = next;
        if record.tag == TRANSFER_SYNTAX_UID {
            transfer_syntax = record.value.clone();
        }
        insert(&mut table, record)?;
    }

    convention = match transfer_syntax {
        Some(uid) => convention_for(&uid)?,
        None => {
            warn!("file meta group carries no transfer syntax UID");
            sniff_convention(data, pos)
        }
    };

    read_data_set(data, pos, convention, &mut charset, &mut table)?;
    table.set_charset(charset);
    Ok(table)
}

/// Map a transfer syntax UID to the data set convention it implies.
///
/// Encapsulated (compressed) syntaxes keep their data set in Explicit
/// VR LE, so any unlisted UID falls back to that convention; the
/// pixel data itself is then an opaque undefined-length element.
fn convention_for(uid: &str) -> Result<VrConvention> {
    match uid.trim_end_matches(|c| c == ' ' || c == '\0') {
        IMPLICIT_VR_LITTLE_ENDIAN => Ok(VrConvention::ImplicitLe),
        EXPLICIT_VR_LITTLE_ENDIAN => Ok(VrConvention::ExplicitLe),
        EXPLICIT_VR_BIG_ENDIAN | DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN => {
            UnsupportedTransferSyntaxSnafu { uid }.fail()
        }
        other => {
            debug!("transfer syntax {} treated as Explicit VR LE", other);
            Ok(VrConvention::ExplicitLe)
        }
    }
}

/// Guess the convention of a headerless stream by checking whether
/// the bytes right after the first tag form a known VR code.
fn sniff_convention(data: &[u8], pos: usize) -> VrConvention {
    match data.get(pos + 4..pos + 6) {
        Some(&[a, b]) if VR::from_binary([a, b]).is_some() => VrConvention::ExplicitLe,
        _ => VrConvention::ImplicitLe,
    }
}

fn read_data_set(
    data: &[u8],
    mut pos: usize,
    convention: VrConvention,
    charset: &mut SpecificCharacterSet,
    table: &mut ElementTable,
) -> Result<()> {
    while pos < data.len() {
        let (record, next) = read_element(data, pos, convention, *charset)?;
        pos = next;
        if record.tag.group() == 0xFFFE {
            // stray item or delimitation tag outside of a sequence
            warn!("ignoring stray delimitation tag {}", record.tag);
            continue;
        }
        if record.tag == SPECIFIC_CHARACTER_SET {
            if let Some(code) = record.value.as_deref() {
                match SpecificCharacterSet::from_code(code) {
                    Some(cs) => *charset = cs,
                    None => warn!("unsupported character set `{}`, keeping {}", code, charset.name()),
                }
            }
        }
        insert(table, record)?;
    }
    Ok(())
}

fn insert(table: &mut ElementTable, record: ElementRecord) -> Result<()> {
    table.insert(record).map_err(|record| {
        DuplicateTagSnafu {
            tag: record.tag,
            offset: record.data_offset,
        }
        .build()
    })
}

/// Decode a single element at `pos`, returning its record and the
/// offset of the next element.
fn read_element(
    data: &[u8],
    pos: usize,
    convention: VrConvention,
    charset: SpecificCharacterSet,
) -> Result<(ElementRecord, usize)> {
    let (header, header_len) = decode_header(data, pos, convention)?;
    let data_offset = pos + header_len;

    if header.len.is_undefined() {
        let (length, next) = skip_undefined_length(data, header.tag, data_offset, convention)?;
        debug!(
            "element {} has undefined length, passing over {} bytes",
            header.tag, length
        );
        let record = ElementRecord {
            tag: header.tag,
            vr: header.vr,
            data_offset,
            length,
            value: None,
        };
        return Ok((record, next));
    }

    let length = header.len.0 as usize;
    require(data, data_offset, length)?;
    let payload = &data[data_offset..data_offset + length];

    let value = if header.vr.is_textual() {
        let text = charset
            .decode(payload)
            .context(DecodeTextSnafu { tag: header.tag })?;
        Some(text.trim_end_matches(|c| c == ' ' || c == '\0').to_string())
    } else {
        None
    };

    let record = ElementRecord {
        tag: header.tag,
        vr: header.vr,
        data_offset,
        length,
        value,
    };
    Ok((record, data_offset + length))
}

/// Decode an element header, returning it together with its
/// encoded size in bytes.
fn decode_header(
    data: &[u8],
    pos: usize,
    convention: VrConvention,
) -> Result<(DataElementHeader, usize)> {
    let tag = read_tag(data, pos)?;

    // item and delimitation tags have no VR in either convention
    if convention == VrConvention::ImplicitLe || tag.group() == 0xFFFE {
        let len = read_u32(data, pos + 4)?;
        return Ok((DataElementHeader::new(tag, VR::UN, Length(len)), 8));
    }

    require(data, pos + 4, 2)?;
    let vr = match VR::from_binary([data[pos + 4], data[pos + 5]]) {
        Some(vr) => vr,
        None => {
            warn!(
                "unrecognized VR code {:02X?} in element {}, treating as UN",
                &data[pos + 4..pos + 6],
                tag
            );
            VR::UN
        }
    };

    // PS3.5 7.1.2:
    // for VRs of AE, AS, AT, CS, DA, DS, DT, FL, FD, IS, LO, LT, PN,
    // SH, SL, SS, ST, TM, UI, UL and US the Value Length Field is the
    // 16-bit unsigned integer following the two byte VR Field;
    // for all other VRs, two reserved bytes are followed by a 32-bit
    // unsigned integer Value Length Field.
    let (len, header_len) = match vr {
        VR::AE
        | VR::AS
        | VR::AT
        | VR::CS
        | VR::DA
        | VR::DS
        | VR::DT
        | VR::FL
        | VR::FD
        | VR::IS
        | VR::LO
        | VR::LT
        | VR::PN
        | VR::SH
        | VR::SL
        | VR::SS
        | VR::ST
        | VR::TM
        | VR::UI
        | VR::UL
        | VR::US => (u32::from(read_u16(data, pos + 6)?), 8),
        _ => (read_u32(data, pos + 8)?, 12),
    };

    Ok((DataElementHeader::new(tag, vr, Length(len)), header_len))
}

/// Pass over the content of an undefined-length element, looking for
/// its Sequence Delimitation Item. Returns the content's byte length
/// (delimiter excluded) and the offset of the next element.
fn skip_undefined_length(
    data: &[u8],
    tag: Tag,
    data_offset: usize,
    convention: VrConvention,
) -> Result<(usize, usize)> {
    let mut pos = data_offset;
    loop {
        let item_tag = read_tag(data, pos)?;
        let item_len = Length(read_u32(data, pos + 4)?);
        match item_tag {
            Tag(0xFFFE, 0xE0DD) => return Ok((pos - data_offset, pos + 8)),
            Tag(0xFFFE, 0xE000) => {
                pos += 8;
                if item_len.is_undefined() {
                    pos = skip_undefined_item(data, pos, convention)?;
                } else {
                    let len = item_len.0 as usize;
                    require(data, pos, len)?;
                    pos += len;
                }
            }
            _ => {
                return MissingDelimiterSnafu {
                    tag,
                    offset: data_offset,
                }
                .fail()
            }
        }
    }
}

/// Pass over the elements of an undefined-length item until its
/// Item Delimitation Item. Returns the offset of the next item.
fn skip_undefined_item(data: &[u8], mut pos: usize, convention: VrConvention) -> Result<usize> {
    loop {
        let (header, header_len) = decode_header(data, pos, convention)?;
        pos += header_len;
        if header.tag == Tag(0xFFFE, 0xE00D) {
            return Ok(pos);
        }
        if header.len.is_undefined() {
            let (_, next) = skip_undefined_length(data, header.tag, pos, convention)?;
            pos = next;
        } else {
            let len = header.len.0 as usize;
            require(data, pos, len)?;
            pos += len;
        }
    }
}

fn require(data: &[u8], offset: usize, needed: usize) -> Result<()> {
    let available = data.len().saturating_sub(offset);
    if available < needed {
        UnexpectedEndOfDataSnafu {
            offset: data.len(),
            needed: needed - available,
        }
        .fail()
    } else {
        Ok(())
    }
}

fn read_u16(data: &[u8], pos: usize) -> Result<u16> {
    require(data, pos, 2)?;
    Ok(LittleEndian::read_u16(&data[pos..]))
}

fn read_u32(data: &[u8], pos: usize) -> Result<u32> {
    require(data, pos, 4)?;
    Ok(LittleEndian::read_u32(&data[pos..]))
}

fn read_tag(data: &[u8], pos: usize) -> Result<Tag> {
    Ok(Tag(read_u16(data, pos)?, read_u16(data, pos + 2)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    // manually crafted data set, Explicit VR LE, no preamble
    #[rustfmt::skip]
    const RAW: &[u8] = &[
        0x08, 0x00, 0x60, 0x00,     // (0008,0060) Modality
            b'C', b'S',             // VR: CS
            0x02, 0x00,             // Length: 2
                b'C', b'T',
        0x10, 0x00, 0x10, 0x00,     // (0010,0010) Patient's Name
            b'P', b'N',             // VR: PN
            0x08, 0x00,             // Length: 8
                b'D', b'O', b'E', b'^', b'J', b'O', b'H', b'N',
        0x10, 0x00, 0x20, 0x00,     // (0010,0020) Patient ID
            b'L', b'O',             // VR: LO
            0x06, 0x00,             // Length: 6
                b'P', b'1', b'2', b'3', b'4',
                b' ',               // padding to even length
        0x28, 0x00, 0x10, 0x00,     // (0028,0010) Rows
            b'U', b'S',             // VR: US
            0x02, 0x00,             // Length: 2
                0x00, 0x02,
        0xE0, 0x7F, 0x10, 0x00,     // (7FE0,0010) Pixel Data
            b'O', b'W',             // VR: OW
            0x00, 0x00,             // reserved
            0x04, 0x00, 0x00, 0x00, // Length: 4
                0xAB, 0xCD, 0xEF, 0x01,
    ];

    #[test]
    fn decode_explicit_data_set() {
        let table = decode(RAW).expect("should decode");
        assert_eq!(table.len(), 5);

        let tags: Vec<Tag> = table.iter().map(|r| r.tag).collect();
        assert_eq!(
            tags,
            vec![
                Tag(0x0008, 0x0060),
                Tag(0x0010, 0x0010),
                Tag(0x0010, 0x0020),
                Tag(0x0028, 0x0010),
                Tag(0x7FE0, 0x0010),
            ]
        );

        let name = table.get(Tag(0x0010, 0x0010)).unwrap();
        assert_eq!(name.vr, VR::PN);
        assert_eq!(name.data_offset, 18);
        assert_eq!(name.length, 8);
        assert_eq!(name.value.as_deref(), Some("DOE^JOHN"));
        assert_eq!(&RAW[name.data_offset..name.data_offset + name.length], b"DOE^JOHN");

        // padding is trimmed from the decoded value only
        let id = table.get(Tag(0x0010, 0x0020)).unwrap();
        assert_eq!(id.length, 6);
        assert_eq!(id.value.as_deref(), Some("P1234"));

        // binary elements carry no decoded value
        let rows = table.get(Tag(0x0028, 0x0010)).unwrap();
        assert_eq!(rows.vr, VR::US);
        assert_eq!(rows.value, None);

        // long form header (reserved + 32-bit length)
        let pixels = table.get(Tag(0x7FE0, 0x0010)).unwrap();
        assert_eq!(pixels.vr, VR::OW);
        assert_eq!(pixels.length, 4);
        assert_eq!(pixels.data_offset, RAW.len() - 4);

        // offset invariant
        for record in &table {
            assert!(record.data_offset + record.length <= RAW.len());
        }
    }

    #[test]
    fn decode_implicit_data_set() {
        // same patient name element, Implicit VR LE
        #[rustfmt::skip]
        let raw: &[u8] = &[
            0x10, 0x00, 0x10, 0x00,     // (0010,0010)
            0x08, 0x00, 0x00, 0x00,     // Length: 8
                b'D', b'O', b'E', b'^', b'J', b'O', b'H', b'N',
        ];
        let table = decode(raw).expect("should decode");
        assert_eq!(table.len(), 1);
        let name = table.get(Tag(0x0010, 0x0010)).unwrap();
        // no data dictionary: VR is unknown and the element is not editable
        assert_eq!(name.vr, VR::UN);
        assert_eq!(name.data_offset, 8);
        assert_eq!(name.length, 8);
        assert_eq!(name.value, None);
    }

    #[test]
    fn unknown_vr_is_binary_not_fatal() {
        #[rustfmt::skip]
        let raw: &[u8] = &[
            0x10, 0x00, 0x40, 0x00,     // (0010,0040) Patient Sex
                b'C', b'S',
                0x02, 0x00,
                    b'F', b' ',
            0x09, 0x00, 0x01, 0x10,     // (0009,1001), private
                b'Z', b'Z',             // bogus VR code
                0x00, 0x00,             // reserved (long form assumed)
                0x02, 0x00, 0x00, 0x00, // Length: 2
                    0x01, 0x02,
        ];
        let table = decode(raw).expect("should decode");
        assert_eq!(table.len(), 2);
        let private = table.get(Tag(0x0009, 0x1001)).unwrap();
        assert_eq!(private.vr, VR::UN);
        assert_eq!(private.value, None);
        let sex = table.get(Tag(0x0010, 0x0040)).unwrap();
        assert_eq!(sex.value.as_deref(), Some("F"));
    }

    #[test]
    fn sequence_is_passed_over_as_binary() {
        #[rustfmt::skip]
        let raw: &[u8] = &[
            0x08, 0x00, 0x3F, 0x10,     // (0008,103F) sequence
                b'S', b'Q',
                0x00, 0x00,             // reserved
                0xFF, 0xFF, 0xFF, 0xFF, // undefined length
                // item, defined length 4
                0xFE, 0xFF, 0x00, 0xE0, 0x04, 0x00, 0x00, 0x00,
                    0xDE, 0xAD, 0xBE, 0xEF,
                // sequence delimitation item
                0xFE, 0xFF, 0xDD, 0xE0, 0x00, 0x00, 0x00, 0x00,
            0x10, 0x00, 0x40, 0x00,     // (0010,0040) Patient Sex
                b'C', b'S',
                0x02, 0x00,
                    b'M', b' ',
        ];
        let table = decode(raw).expect("should decode");
        assert_eq!(table.len(), 2);
        let seq = table.get(Tag(0x0008, 0x103F)).unwrap();
        assert_eq!(seq.vr, VR::SQ);
        assert_eq!(seq.data_offset, 12);
        // content span covers the item, not the trailing delimiter
        assert_eq!(seq.length, 12);
        assert_eq!(seq.value, None);
        assert_eq!(
            table.get(Tag(0x0010, 0x0040)).unwrap().value.as_deref(),
            Some("M")
        );
    }

    #[test]
    fn truncated_value_fails_without_partial_table() {
        #[rustfmt::skip]
        let raw: &[u8] = &[
            0x10, 0x00, 0x10, 0x00,     // (0010,0010)
                b'P', b'N',
                0x08, 0x00,             // declares 8 bytes...
                    b'D', b'O', b'E',   // ...but only 3 remain
        ];
        let err = decode(raw).expect_err("should fail");
        assert!(matches!(err, DecodeError::UnexpectedEndOfData { .. }));
    }

    #[test]
    fn truncated_header_fails() {
        let raw: &[u8] = &[0x10, 0x00, 0x10];
        let err = decode(raw).expect_err("should fail");
        assert!(matches!(err, DecodeError::UnexpectedEndOfData { .. }));
    }

    #[test]
    fn missing_sequence_delimiter_fails() {
        #[rustfmt::skip]
        let raw: &[u8] = &[
            0x08, 0x00, 0x3F, 0x10,
                b'S', b'Q',
                0x00, 0x00,
                0xFF, 0xFF, 0xFF, 0xFF, // undefined length
                // garbage where an item tag should be
                0x10, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let err = decode(raw).expect_err("should fail");
        assert!(matches!(err, DecodeError::MissingDelimiter { .. }));
    }

    #[test]
    fn duplicate_tag_fails() {
        #[rustfmt::skip]
        let raw: &[u8] = &[
            0x10, 0x00, 0x40, 0x00, b'C', b'S', 0x02, 0x00, b'M', b' ',
            0x10, 0x00, 0x40, 0x00, b'C', b'S', 0x02, 0x00, b'F', b' ',
        ];
        let err = decode(raw).expect_err("should fail");
        assert!(matches!(err, DecodeError::DuplicateTag { .. }));
    }

    #[test]
    fn specific_character_set_switches_codec() {
        let name = "Иванков^Андрей";
        let name_bytes = name.as_bytes();
        assert_eq!(name_bytes.len(), 27);
        #[rustfmt::skip]
        let mut raw: Vec<u8> = vec![
            0x08, 0x00, 0x05, 0x00,     // (0008,0005) Specific Character Set
                b'C', b'S',
                0x0A, 0x00,             // Length: 10
                    b'I', b'S', b'O', b'_', b'I', b'R', b' ', b'1', b'9', b'2',
            0x10, 0x00, 0x10, 0x00,     // (0010,0010) Patient's Name
                b'P', b'N',
                0x1C, 0x00,             // Length: 28 (27 + padding)
        ];
        raw.extend_from_slice(name_bytes);
        raw.push(b' ');
        let table = decode(&raw).expect("should decode");
        assert_eq!(
            table.get(Tag(0x0010, 0x0010)).unwrap().value.as_deref(),
            Some(name)
        );
        assert_eq!(table.charset(), SpecificCharacterSet::IsoIr192);
    }

    #[test]
    fn empty_buffer_yields_empty_table() {
        let table = decode(&[]).expect("should decode");
        assert!(table.is_empty());
    }
}
