//! Structured failures raised while splitting a message name, reported to
//! the method-definition site (spec §7: splitter failures are raised at
//! definition time, not at every call site).

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// A group or alternation was never closed, a close appeared with no
    /// matching open, or a metacharacter appeared without the construct
    /// it modifies (e.g. `‡` outside a group, `!` with no preceding
    /// alternation group).
    MalformedNesting(String),
    /// `‴`/circled-number reordering marks were used inconsistently:
    /// some argument positions in the name carry one and others don't,
    /// or the marks used don't form a permutation of `1..=n`.
    InconsistentArgumentReordering,
    /// An alternation (`a|b|c`) mixed branches with a different number of
    /// arguments, so no fixed argument count can be assigned to it.
    ArgumentTypeMismatch(String),
    /// `«...»` contained no alternatives (e.g. `«»` or `«|»`).
    EmptyAlternation,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureError::MalformedNesting(detail) => {
                write!(f, "malformed nesting in message name: {detail}")
            }
            SignatureError::InconsistentArgumentReordering => {
                write!(f, "argument reordering marks do not form a consistent permutation")
            }
            SignatureError::ArgumentTypeMismatch(detail) => {
                write!(f, "inconsistent argument shape across alternatives: {detail}")
            }
            SignatureError::EmptyAlternation => write!(f, "group has no alternatives"),
        }
    }
}

impl std::error::Error for SignatureError {}
