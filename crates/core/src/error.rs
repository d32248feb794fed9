//! Runtime error taxonomy
//!
//! `RuntimeError` is the abstract error-kind enum shared across every crate
//! in the workspace. It never unwinds the host stack: primitive failures are
//! values (see `glyph-runtime`'s primitive calling convention), and this type
//! is what they carry. Splitter and builder failures wrap it in their own
//! structured exception types but reuse these kinds rather than inventing a
//! parallel taxonomy.

use std::fmt;

/// One of the abstract error kinds named by the specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidPath,
    PermissionDenied,
    NoFile,
    FileExists,
    DirectoryNotEmpty,
    IoError,
    PartialSuccess,
    ExceedsVmLimit,
    InvalidHandle,
    SpecialAtom,
    NotOpenForRead,
    NotOpenForWrite,
    FiberCannotJoinItself,
    IncorrectNumberOfArguments,
    IncorrectArgumentType,
    KeyNotFound,
    NoMethod,
    NoMethodDefinition,
    AmbiguousMethodDefinition,
    LoadingIsOver,
    CannotDefineDuringCompilation,
    AtomAlreadyExists,
    AmbiguousName,
    MalformedMessage,
    InconsistentArgumentReordering,
    IncorrectTypeForNumberedChoice,
    IncorrectTypeForBooleanGroup,
    BlockContainsInvalidStatements,
    InconsistentPrefixFunction,
    OperationNotSupported,
}

impl ErrorKind {
    /// The error code as it would be assigned to a calling function's
    /// failure variable (spec §7: "assigns this to the calling function's
    /// failure variable").
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidPath => "E_INVALID_PATH",
            ErrorKind::PermissionDenied => "E_PERMISSION_DENIED",
            ErrorKind::NoFile => "E_NO_FILE",
            ErrorKind::FileExists => "E_FILE_EXISTS",
            ErrorKind::DirectoryNotEmpty => "E_DIRECTORY_NOT_EMPTY",
            ErrorKind::IoError => "E_IO_ERROR",
            ErrorKind::PartialSuccess => "E_PARTIAL_SUCCESS",
            ErrorKind::ExceedsVmLimit => "E_EXCEEDS_VM_LIMIT",
            ErrorKind::InvalidHandle => "E_INVALID_HANDLE",
            ErrorKind::SpecialAtom => "E_SPECIAL_ATOM",
            ErrorKind::NotOpenForRead => "E_NOT_OPEN_FOR_READ",
            ErrorKind::NotOpenForWrite => "E_NOT_OPEN_FOR_WRITE",
            ErrorKind::FiberCannotJoinItself => "E_FIBER_CANNOT_JOIN_ITSELF",
            ErrorKind::IncorrectNumberOfArguments => "E_INCORRECT_NUMBER_OF_ARGUMENTS",
            ErrorKind::IncorrectArgumentType => "E_INCORRECT_ARGUMENT_TYPE",
            ErrorKind::KeyNotFound => "E_KEY_NOT_FOUND",
            ErrorKind::NoMethod => "E_NO_METHOD",
            ErrorKind::NoMethodDefinition => "E_NO_METHOD_DEFINITION",
            ErrorKind::AmbiguousMethodDefinition => "E_AMBIGUOUS_METHOD_DEFINITION",
            ErrorKind::LoadingIsOver => "E_LOADING_IS_OVER",
            ErrorKind::CannotDefineDuringCompilation => "E_CANNOT_DEFINE_DURING_COMPILATION",
            ErrorKind::AtomAlreadyExists => "E_ATOM_ALREADY_EXISTS",
            ErrorKind::AmbiguousName => "E_AMBIGUOUS_NAME",
            ErrorKind::MalformedMessage => "E_MALFORMED_MESSAGE",
            ErrorKind::InconsistentArgumentReordering => "E_INCONSISTENT_ARGUMENT_REORDERING",
            ErrorKind::IncorrectTypeForNumberedChoice => "E_INCORRECT_TYPE_FOR_NUMBERED_CHOICE",
            ErrorKind::IncorrectTypeForBooleanGroup => "E_INCORRECT_TYPE_FOR_BOOLEAN_GROUP",
            ErrorKind::BlockContainsInvalidStatements => "E_BLOCK_CONTAINS_INVALID_STATEMENTS",
            ErrorKind::InconsistentPrefixFunction => "E_INCONSISTENT_PREFIX_FUNCTION",
            ErrorKind::OperationNotSupported => "E_OPERATION_NOT_SUPPORTED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A runtime error: a kind plus a human-readable message.
///
/// This is the value primitive failures carry (spec §7): it never crosses
/// into host-level unwinding on its own. Higher layers (interpreter,
/// builder) are responsible for turning it into the right user-visible
/// surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for RuntimeError {}

impl From<std::io::Error> for RuntimeError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind as IoKind;
        let kind = match e.kind() {
            IoKind::NotFound => ErrorKind::NoFile,
            IoKind::PermissionDenied => ErrorKind::PermissionDenied,
            IoKind::AlreadyExists => ErrorKind::FileExists,
            _ => ErrorKind::IoError,
        };
        RuntimeError::new(kind, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_identifiers() {
        assert_eq!(ErrorKind::FiberCannotJoinItself.code(), "E_FIBER_CANNOT_JOIN_ITSELF");
        assert_eq!(ErrorKind::KeyNotFound.code(), "E_KEY_NOT_FOUND");
    }

    #[test]
    fn io_not_found_maps_to_no_file() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RuntimeError = io_err.into();
        assert_eq!(err.kind, ErrorKind::NoFile);
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = RuntimeError::new(ErrorKind::KeyNotFound, "no such key: x");
        assert_eq!(err.to_string(), "E_KEY_NOT_FOUND: no such key: x");
    }
}
