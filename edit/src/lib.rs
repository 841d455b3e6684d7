//! Presentation and session layer for DICOM tag editing.
//!
//! This library sits between a user interface (the bundled CLI, or any
//! other front end) and the [`dcmedit_core`] codec. It provides:
//!
//! - [`TagRow`]: a display projection of a decoded element, with the
//!   `"Binary data"` sentinel for values that cannot be edited;
//! - [`Session`]: the per-file editing session, holding the loaded
//!   buffer, its element table and an ordered edit log which is only
//!   applied to the bytes at export time;
//! - [`DumpOptions`]: a configurable plain-text printer for tag rows.

use dcmedit_core::patch::{BinaryElementSnafu, UnknownTagSnafu};
use dcmedit_core::{
    decode, patch, DecodeError, Edit, ElementRecord, ElementTable, PatchError, Tag, VR,
};
use owo_colors::{OwoColorize, Stream};
use snafu::{Backtrace, Snafu};
use std::fmt::Display;
use std::io::{stdout, Result as IoResult, Write};
use std::str::FromStr;

/// The literal shown in place of a value which is not textual.
///
/// This is a presentation sentinel, not part of the data model;
/// editing affordances are gated on [`TagRow::is_editable`],
/// which is derived from the value representation.
pub const BINARY_DATA: &str = "Binary data";

/// A presentation row for one data element.
///
/// Rows are projected one-to-one from element records and are never
/// the source of truth; edits are keyed by [`tag`](TagRow::tag),
/// never by row position.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRow {
    /// The element tag, displayed as `(GGGG,EEEE)`.
    pub tag: Tag,
    /// The value representation.
    pub vr: VR,
    /// The text value, or [`BINARY_DATA`] for non-textual elements.
    pub value: String,
}

impl TagRow {
    fn from_record(record: &ElementRecord) -> Self {
        TagRow {
            tag: record.tag,
            vr: record.vr,
            value: record
                .value
                .clone()
                .unwrap_or_else(|| BINARY_DATA.to_string()),
        }
    }

    /// Whether this row's element accepts a new text value.
    #[inline]
    pub fn is_editable(&self) -> bool {
        self.vr.is_textual()
    }
}

/// An error raised by a [`Session`] operation.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum SessionError {
    /// The session holds no data set.
    #[snafu(display("No data set loaded"))]
    NotLoaded { backtrace: Backtrace },

    /// The underlying patch operation failed.
    #[snafu(context(false))]
    Patch {
        #[snafu(backtrace)]
        source: PatchError,
    },
}

type Result<T, E = SessionError> = std::result::Result<T, E>;

struct LoadedState {
    buffer: Vec<u8>,
    table: ElementTable,
    rows: Vec<TagRow>,
    edits: Vec<Edit>,
}

/// A reusable editing session over one DICOM file at a time.
///
/// A session starts out empty. Loading a buffer decodes it and builds
/// the working row set; edits only touch that row set and the edit
/// log, leaving the buffer untouched until [`export`](Session::export)
/// applies the whole log functionally through [`patch`]. Loading a new
/// buffer discards all prior state, including pending edits.
#[derive(Default)]
pub struct Session {
    state: Option<LoadedState>,
}

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        Session::default()
    }

    /// Whether the session currently holds a decoded data set.
    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    /// Load a new byte buffer into the session, discarding any
    /// previously loaded data set and pending edits.
    ///
    /// On failure the session is left empty; a buffer that does not
    /// decode yields no rows at all.
    pub fn load(&mut self, buffer: Vec<u8>) -> std::result::Result<(), DecodeError> {
        self.state = None;
        let table = decode(&buffer)?;
        let rows = table.iter().map(TagRow::from_record).collect();
        self.state = Some(LoadedState {
            buffer,
            table,
            rows,
            edits: Vec::new(),
        });
        Ok(())
    }

    /// The working row set, in source byte order.
    /// Empty when no data set is loaded.
    pub fn rows(&self) -> &[TagRow] {
        self.state.as_ref().map(|s| s.rows.as_slice()).unwrap_or(&[])
    }

    /// The element table of the loaded data set, if any.
    pub fn table(&self) -> Option<&ElementTable> {
        self.state.as_ref().map(|s| &s.table)
    }

    /// Record a new text value for the given element.
    ///
    /// The value is validated against the element table (the tag must
    /// exist and be textual) and stored in the working row set and the
    /// edit log; the loaded bytes themselves are not modified. Editing
    /// the same tag again replaces the pending value.
    pub fn edit<V>(&mut self, tag: Tag, value: V) -> Result<()>
    where
        V: Into<String>,
    {
        let state = self.state.as_mut().ok_or_else(|| NotLoadedSnafu.build())?;
        let record = state
            .table
            .get(tag)
            .ok_or_else(|| UnknownTagSnafu { tag }.build())?;
        if !record.is_textual() {
            return Err(BinaryElementSnafu { tag, vr: record.vr }.build().into());
        }

        let value = value.into();
        if let Some(row) = state.rows.iter_mut().find(|row| row.tag == tag) {
            row.value = value.clone();
        }
        match state.edits.iter_mut().find(|edit| edit.tag == tag) {
            Some(edit) => edit.value = value,
            None => state.edits.push(Edit { tag, value }),
        }
        Ok(())
    }

    /// Apply the pending edit log to a copy of the loaded buffer and
    /// return the new bytes, suitable for writing out as a file.
    ///
    /// The session stays loaded and further edits remain possible;
    /// with an empty edit log the output is byte-identical to the
    /// loaded buffer.
    pub fn export(&self) -> Result<Vec<u8>> {
        let state = self.state.as_ref().ok_or_else(|| NotLoadedSnafu.build())?;
        Ok(patch(&state.buffer, &state.table, &state.edits)?)
    }
}

/// The column width of a rendered tag, `(GGGG,EEEE)`.
const TAG_WIDTH: usize = 11;

/// Options and flags to configure how tag rows are printed.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct DumpOptions {
    /// the maximum output width in characters
    pub width: u32,
    /// whether to print whole values regardless of width
    pub no_text_limit: bool,
    /// whether to produce colored output
    pub color: ColorMode,
}

impl Default for DumpOptions {
    fn default() -> Self {
        DumpOptions {
            width: 120,
            no_text_limit: false,
            color: ColorMode::Auto,
        }
    }
}

impl DumpOptions {
    /// Create a new options value with the defaults:
    /// 120 column width, values limited, automatic color.
    pub fn new() -> Self {
        DumpOptions::default()
    }

    /// Set the maximum output width in characters.
    pub fn width(&mut self, width: u32) -> &mut Self {
        self.width = width;
        self
    }

    /// Print whole values regardless of the output width.
    pub fn no_text_limit(&mut self, no_text_limit: bool) -> &mut Self {
        self.no_text_limit = no_text_limit;
        self
    }

    /// Set the color mode for standard output.
    pub fn color_mode(&mut self, color: ColorMode) -> &mut Self {
        self.color = color;
        self
    }

    /// Print the given rows to standard output.
    pub fn dump_rows(&self, rows: &[TagRow]) -> IoResult<()> {
        let out = stdout();
        self.dump_rows_to(rows, &mut out.lock())
    }

    /// Print the given rows to the given writer, one line per row:
    /// tag, VR and value.
    pub fn dump_rows_to<W>(&self, rows: &[TagRow], to: &mut W) -> IoResult<()>
    where
        W: ?Sized + Write,
    {
        match self.color {
            ColorMode::Never => owo_colors::set_override(false),
            ColorMode::Always => owo_colors::set_override(true),
            ColorMode::Auto => owo_colors::unset_override(),
        }
        // tag + space + VR + space
        let reserved = TAG_WIDTH + 1 + 2 + 1;
        let value_width = (self.width as usize).saturating_sub(reserved).max(16);
        for row in rows {
            let value = if self.no_text_limit {
                row.value.as_str().into()
            } else {
                cut_str(&row.value, value_width)
            };
            if row.is_editable() {
                writeln!(
                    to,
                    "{} {} {}",
                    row.tag.if_supports_color(Stream::Stdout, |v| v.cyan()),
                    row.vr,
                    value,
                )?;
            } else {
                writeln!(
                    to,
                    "{} {} {}",
                    row.tag.if_supports_color(Stream::Stdout, |v| v.cyan()),
                    row.vr,
                    value.if_supports_color(Stream::Stdout, |v| v.dimmed()),
                )?;
            }
        }
        Ok(())
    }
}

/// Limit a string to at most `limit` characters,
/// marking the cut with an ellipsis.
fn cut_str(s: &str, limit: usize) -> std::borrow::Cow<'_, str> {
    let count = s.chars().count();
    if count <= limit {
        s.into()
    } else {
        let cut: String = s.chars().take(limit.saturating_sub(1)).collect();
        format!("{}…", cut).into()
    }
}

/// The color mode for terminal output.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq, Default)]
pub enum ColorMode {
    /// Produce colored output if supported by the destination
    /// (namely, if the destination is a terminal).
    ///
    /// This is the default behavior.
    #[default]
    Auto,
    /// Never produce colored output.
    Never,
    /// Always produce colored output.
    Always,
}

impl Display for ColorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorMode::Auto => f.write_str("auto"),
            ColorMode::Never => f.write_str("never"),
            ColorMode::Always => f.write_str("always"),
        }
    }
}

impl FromStr for ColorMode {
    type Err = ColorModeError;
    fn from_str(color: &str) -> std::result::Result<Self, Self::Err> {
        match color {
            "auto" => Ok(ColorMode::Auto),
            "never" => Ok(ColorMode::Never),
            "always" => Ok(ColorMode::Always),
            _ => Err(ColorModeError),
        }
    }
}

/// Error raised when a color mode option is not recognized.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct ColorModeError;

impl Display for ColorModeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("invalid color mode (must be `auto`, `never`, or `always`)")
    }
}

impl std::error::Error for ColorModeError {}
