//! Parsing and in-place patching of DICOM data set elements.
//!
//! This crate is the codec behind a DICOM tag inspection and editing
//! tool. It offers a pair of pure functions over in-memory byte
//! buffers:
//!
//! - [`decode`] walks a DICOM stream (with or without the preamble and
//!   file meta group) and produces an [`ElementTable`]: an ordered
//!   mapping from tag to element record, tracking each value's byte
//!   offset and length and decoding textual values;
//! - [`patch`] takes the original buffer, the table, and a batch of
//!   [`Edit`]s, and produces a new buffer with only the edited payload
//!   regions overwritten, byte-exact everywhere else.
//!
//! Neither function retains state or mutates its inputs, so both are
//! reentrant and safe to call concurrently on different buffers.
//!
//! # Example
//!
//! ```no_run
//! use dcmedit_core::{decode, patch, Edit};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("path/to/file.dcm")?;
//! let table = decode(&bytes)?;
//!
//! for element in &table {
//!     println!("{} {} {:?}", element.tag, element.vr, element.value);
//! }
//!
//! let edits = [Edit::new((0x0010, 0x0010), "SMITH^JANE")];
//! let patched = patch(&bytes, &table, &edits)?;
//! std::fs::write("modified.dcm", patched)?;
//! # Ok(())
//! # }
//! ```

pub mod dataset;
pub mod decode;
pub mod header;
pub mod patch;
pub mod text;

pub use crate::dataset::{ElementRecord, ElementTable};
pub use crate::decode::{decode, DecodeError};
pub use crate::header::{DataElementHeader, Length, Tag, VR};
pub use crate::patch::{patch, Edit, PatchError};
