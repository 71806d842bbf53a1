use std::borrow::Cow;
use std::fmt::{self, Display};

/// Error types used throughout the `fle` library.
///
/// Linker errors are fatal: `link()` never emits a partial output, never
/// warns-and-continues, and never retries.
#[derive(Debug)]
pub enum Error {
    /// An error occurred while opening, reading, or writing FLE files.
    Io {
        /// A descriptive message about the I/O error.
        msg: Cow<'static, str>,
    },

    /// The FLE container or one of its section bodies is malformed.
    ///
    /// This also covers inputs of a kind the linker refuses to consume,
    /// such as an already-linked executable passed back in as an input.
    Parse {
        /// A descriptive message about what failed to parse.
        msg: Cow<'static, str>,
    },

    /// Two GLOBAL definitions of the same name across selected inputs.
    MultipleDefinition {
        /// The multiply-defined symbol name.
        name: String,
    },

    /// A reference with no internal, archive-reachable, or shared-library
    /// definition while producing a non-shared output.
    UndefinedSymbol {
        /// The unresolved symbol name.
        name: String,
    },

    /// The entry symbol is unresolved for a non-shared output.
    MissingEntry {
        /// The requested entry symbol name.
        name: String,
    },

    /// A program header references a section absent from the object.
    SectionMissing {
        /// The missing section name.
        name: String,
    },

    /// A relocation cannot be applied: unknown kind, or a computed value
    /// that does not fit the relocation's width.
    UnsupportedRelocation {
        /// A descriptive message naming the relocation and the failure.
        msg: Cow<'static, str>,
    },

    /// An error occurred during memory mapping in the loader.
    Mmap {
        /// A descriptive message about the memory mapping error.
        msg: Cow<'static, str>,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io { msg } => write!(f, "I/O error: {msg}"),
            Error::Parse { msg } => write!(f, "Parse error: {msg}"),
            Error::MultipleDefinition { name } => {
                write!(f, "Multiple definition of strong symbol: {name}")
            }
            Error::UndefinedSymbol { name } => write!(f, "Undefined symbol: {name}"),
            Error::MissingEntry { name } => write!(f, "Missing entry symbol: {name}"),
            Error::SectionMissing { name } => write!(f, "Section not found: {name}"),
            Error::UnsupportedRelocation { msg } => write!(f, "Unsupported relocation: {msg}"),
            Error::Mmap { msg } => write!(f, "Memory mapping error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            msg: err.to_string().into(),
        }
    }
}

#[cold]
#[inline(never)]
pub(crate) fn parse_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Parse { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn multiple_definition(name: impl Into<String>) -> Error {
    Error::MultipleDefinition { name: name.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn undefined_symbol(name: impl Into<String>) -> Error {
    Error::UndefinedSymbol { name: name.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn missing_entry(name: impl Into<String>) -> Error {
    Error::MissingEntry { name: name.into() }
}

#[cold]
#[inline(never)]
#[allow(unused)]
pub(crate) fn section_missing(name: impl Into<String>) -> Error {
    Error::SectionMissing { name: name.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn unsupported_relocation(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::UnsupportedRelocation { msg: msg.into() }
}

#[cold]
#[inline(never)]
#[allow(unused)]
pub(crate) fn mmap_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Mmap { msg: msg.into() }
}
