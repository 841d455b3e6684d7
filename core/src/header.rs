//! Basic types for interpreting DICOM data elements:
//! the attribute tag, the value representation,
//! the value length and the element header.

use snafu::Snafu;
use std::fmt;
use std::str::{from_utf8, FromStr};

/// Idiomatic alias for a tag's group number.
pub type GroupNumber = u16;
/// Idiomatic alias for a tag's element number.
pub type ElementNumber = u16;

/// The data type for DICOM data element tags.
///
/// Tags are a (group, element) pair of 16-bit numbers.
/// Both `(u16, u16)` and `[u16; 2]` can be efficiently
/// converted to this type.
#[derive(PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Copy)]
pub struct Tag(pub GroupNumber, pub ElementNumber);

impl Tag {
    /// Getter for the tag's group value.
    #[inline]
    pub fn group(self) -> GroupNumber {
        self.0
    }

    /// Getter for the tag's element value.
    #[inline]
    pub fn element(self) -> ElementNumber {
        self.1
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Tag({:#06X?}, {:#06X?})", self.0, self.1)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

impl From<(u16, u16)> for Tag {
    #[inline]
    fn from(value: (u16, u16)) -> Tag {
        Tag(value.0, value.1)
    }
}

impl From<[u16; 2]> for Tag {
    #[inline]
    fn from(value: [u16; 2]) -> Tag {
        Tag(value[0], value[1])
    }
}

/// Error returned when parsing a textual form of a tag.
#[derive(Debug, Snafu)]
#[snafu(display("Invalid tag `{}`", text))]
pub struct InvalidTagError {
    text: String,
}

/// Parse a tag from its textual form.
///
/// The accepted forms are 8 contiguous hexadecimal digits (`00100010`),
/// a comma-separated group and element (`0010,0010`),
/// and the conventional rendering with parentheses (`(0010,0010)`).
impl FromStr for Tag {
    type Err = InvalidTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTagSnafu { text: s }.build();

        let inner = s
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(s);

        let (group, element) = match inner.split_once(',') {
            Some((g, e)) => (g, e),
            None if inner.len() == 8 => inner.split_at(4),
            None => return Err(invalid()),
        };

        if group.len() != 4 || element.len() != 4 {
            return Err(invalid());
        }
        let group = u16::from_str_radix(group, 16).map_err(|_| invalid())?;
        let element = u16::from_str_radix(element, 16).map_err(|_| invalid())?;
        Ok(Tag(group, element))
    }
}

/// An enum type for a DICOM value representation.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, Ord, PartialOrd)]
pub enum VR {
    /// Application Entity
    AE,
    /// Age String
    AS,
    /// Attribute Tag
    AT,
    /// Code String
    CS,
    /// Date
    DA,
    /// Decimal String
    DS,
    /// Date Time
    DT,
    /// Floating Point Single
    FL,
    /// Floating Point Double
    FD,
    /// Integer String
    IS,
    /// Long String
    LO,
    /// Long Text
    LT,
    /// Other Byte
    OB,
    /// Other Double
    OD,
    /// Other Float
    OF,
    /// Other Long
    OL,
    /// Other Very Long
    OV,
    /// Other Word
    OW,
    /// Person Name
    PN,
    /// Short String
    SH,
    /// Signed Long
    SL,
    /// Sequence of Items
    SQ,
    /// Signed Short
    SS,
    /// Short Text
    ST,
    /// Signed Very Long
    SV,
    /// Time
    TM,
    /// Unlimited Characters
    UC,
    /// Unique Identifier (UID)
    UI,
    /// Unsigned Long
    UL,
    /// Unknown
    UN,
    /// Universal Resource Identifier or Universal Resource Locator (URI/URL)
    UR,
    /// Unsigned Short
    US,
    /// Unlimited Text
    UT,
    /// Unsigned Very Long
    UV,
}

impl VR {
    /// Obtain the value representation corresponding to the given two bytes.
    /// Each byte should represent an alphabetic character in upper case.
    pub fn from_binary(chars: [u8; 2]) -> Option<Self> {
        from_utf8(chars.as_ref())
            .ok()
            .and_then(|s| VR::from_str(s).ok())
    }

    /// Retrieve a string representation of this VR.
    pub fn to_string(self) -> &'static str {
        use VR::*;
        match self {
            AE => "AE",
            AS => "AS",
            AT => "AT",
            CS => "CS",
            DA => "DA",
            DS => "DS",
            DT => "DT",
            FL => "FL",
            FD => "FD",
            IS => "IS",
            LO => "LO",
            LT => "LT",
            OB => "OB",
            OD => "OD",
            OF => "OF",
            OL => "OL",
            OV => "OV",
            OW => "OW",
            PN => "PN",
            SH => "SH",
            SL => "SL",
            SQ => "SQ",
            SS => "SS",
            ST => "ST",
            SV => "SV",
            TM => "TM",
            UC => "UC",
            UI => "UI",
            UL => "UL",
            UN => "UN",
            UR => "UR",
            US => "US",
            UT => "UT",
            UV => "UV",
        }
    }

    /// Whether values of this representation are textual
    /// and therefore eligible for in-place text editing.
    ///
    /// The textual set comprises unique identifiers, short and long
    /// strings, short text, person names, code strings, dates, and
    /// decimal and integer strings. Values of any other representation
    /// are treated as opaque binary data.
    #[inline]
    pub fn is_textual(self) -> bool {
        use VR::*;
        matches!(self, UI | SH | LO | ST | PN | CS | DA | DS | IS)
    }

    /// The byte used to pad an encoded value of this representation
    /// to its declared (even) length.
    ///
    /// UID values are padded with NUL, all other textual values with
    /// the space character.
    #[inline]
    pub fn padding(self) -> u8 {
        match self {
            VR::UI => b'\0',
            _ => b' ',
        }
    }
}

/// Obtain the value representation corresponding to the given string.
/// The string should hold exactly two UTF-8 encoded alphabetic characters
/// in upper case, otherwise no match is made.
impl FromStr for VR {
    type Err = &'static str;

    fn from_str(string: &str) -> std::result::Result<Self, Self::Err> {
        use VR::*;
        match string {
            "AE" => Ok(AE),
            "AS" => Ok(AS),
            "AT" => Ok(AT),
            "CS" => Ok(CS),
            "DA" => Ok(DA),
            "DS" => Ok(DS),
            "DT" => Ok(DT),
            "FL" => Ok(FL),
            "FD" => Ok(FD),
            "IS" => Ok(IS),
            "LO" => Ok(LO),
            "LT" => Ok(LT),
            "OB" => Ok(OB),
            "OD" => Ok(OD),
            "OF" => Ok(OF),
            "OL" => Ok(OL),
            "OV" => Ok(OV),
            "OW" => Ok(OW),
            "PN" => Ok(PN),
            "SH" => Ok(SH),
            "SL" => Ok(SL),
            "SQ" => Ok(SQ),
            "SS" => Ok(SS),
            "ST" => Ok(ST),
            "SV" => Ok(SV),
            "TM" => Ok(TM),
            "UC" => Ok(UC),
            "UI" => Ok(UI),
            "UL" => Ok(UL),
            "UN" => Ok(UN),
            "UR" => Ok(UR),
            "US" => Ok(US),
            "UT" => Ok(UT),
            "UV" => Ok(UV),
            _ => Err("no such value representation"),
        }
    }
}

impl fmt::Display for VR {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(VR::to_string(*self))
    }
}

const UNDEFINED_LEN: u32 = 0xFFFF_FFFF;

/// A type for representing data element value length, in bytes.
/// An internal value of `0xFFFF_FFFF` represents an undefined
/// (unspecified) length, which has to be determined with a
/// traversal based on the content's encoding.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Length(pub u32);

impl Length {
    /// A length that is undefined.
    pub const UNDEFINED: Self = Length(UNDEFINED_LEN);

    /// Create a new length value from its internal representation.
    /// This is identical to `Length(len)`.
    #[inline]
    pub fn new(len: u32) -> Self {
        Length(len)
    }

    /// Check whether this length is undefined (unknown).
    #[inline]
    pub fn is_undefined(self) -> bool {
        self.0 == UNDEFINED_LEN
    }

    /// Check whether this length is well defined (not undefined).
    #[inline]
    pub fn is_defined(self) -> bool {
        !self.is_undefined()
    }

    /// Fetch the concrete length value, if defined.
    #[inline]
    pub fn get(self) -> Option<u32> {
        if self.is_undefined() {
            None
        } else {
            Some(self.0)
        }
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_undefined() {
            f.write_str("U/L")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A data structure for a data element header, containing
/// a tag, value representation and specified length.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct DataElementHeader {
    /// DICOM tag
    pub tag: Tag,
    /// Value Representation
    pub vr: VR,
    /// Element length
    pub len: Length,
}

impl DataElementHeader {
    /// Create a new data element header with the given properties.
    /// This is just a trivial constructor.
    #[inline]
    pub fn new<T: Into<Tag>>(tag: T, vr: VR, len: Length) -> DataElementHeader {
        DataElementHeader {
            tag: tag.into(),
            vr,
            len,
        }
    }

    /// Retrieve the element's tag.
    #[inline]
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Retrieve the element's value representation.
    #[inline]
    pub fn vr(&self) -> VR {
        self.vr
    }

    /// Retrieve the element's value length.
    #[inline]
    pub fn length(&self) -> Length {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_from_str() {
        assert_eq!("00100010".parse::<Tag>().unwrap(), Tag(0x0010, 0x0010));
        assert_eq!("0002,0010".parse::<Tag>().unwrap(), Tag(0x0002, 0x0010));
        assert_eq!("(7FE0,0010)".parse::<Tag>().unwrap(), Tag(0x7FE0, 0x0010));
        assert_eq!("(fffe,e0dd)".parse::<Tag>().unwrap(), Tag(0xFFFE, 0xE0DD));

        assert!("".parse::<Tag>().is_err());
        assert!("0010".parse::<Tag>().is_err());
        assert!("0010-0010".parse::<Tag>().is_err());
        assert!("(0010,0010".parse::<Tag>().is_err());
        assert!("zzzz0010".parse::<Tag>().is_err());
    }

    #[test]
    fn tag_display() {
        assert_eq!(Tag(0x0010, 0x0010).to_string(), "(0010,0010)");
        assert_eq!(Tag(0x7FE0, 0x0010).to_string(), "(7FE0,0010)");
    }

    #[test]
    fn vr_textual_set() {
        use super::VR::*;
        for vr in [UI, SH, LO, ST, PN, CS, DA, DS, IS] {
            assert!(vr.is_textual(), "{} should be textual", vr);
        }
        for vr in [AE, AT, FL, FD, OB, OW, SQ, UN, US, UT] {
            assert!(!vr.is_textual(), "{} should not be textual", vr);
        }
    }

    #[test]
    fn vr_from_binary() {
        assert_eq!(VR::from_binary([b'P', b'N']), Some(VR::PN));
        assert_eq!(VR::from_binary([b'U', b'I']), Some(VR::UI));
        assert_eq!(VR::from_binary([b'z', b'z']), None);
        assert_eq!(VR::from_binary([0x00, 0x01]), None);
    }

    #[test]
    fn length_undefined() {
        assert!(Length(0xFFFF_FFFF).is_undefined());
        assert_eq!(Length::UNDEFINED.get(), None);
        assert_eq!(Length(8).get(), Some(8));
        assert_eq!(Length(8).to_string(), "8");
        assert_eq!(Length::UNDEFINED.to_string(), "U/L");
    }
}
