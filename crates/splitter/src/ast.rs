//! The construct tree a message name parses into.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    /// `_`: an ordinary argument, parsed as a full expression.
    Plain,
    /// `_↑`: a variable-reference argument — the parsed phrase must
    /// denote an assignable variable, not merely a value.
    VariableReference,
    /// `_†`: a module-scope argument — resolved against the defining
    /// module's scope rather than the calling fiber's local scope.
    ModuleScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCardinality {
    /// The default cardinality of a bare `«...»` group: zero or more
    /// repetitions.
    Repeated,
    /// `«...»?`: zero or one occurrence, pushing a present/absent flag.
    Optional,
    /// `«...»⁇`: zero or one occurrence, pushing nothing.
    CompletelyOptional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Construct {
    /// A literal keyword run, matched verbatim.
    Keyword(String),
    /// `_`, `_↑`, or `_†`: a single argument of the given kind.
    Argument(ArgumentKind),
    /// `…`: a raw, unparsed token; `accepts_any` is set when a trailing
    /// `!` widens it from the default raw-token set to any token at all.
    RawTokenArgument { accepts_any: bool },
    /// An argument (of any kind above) followed by `‴n`/a circled digit,
    /// binding it to call-argument position `n` rather than its position
    /// in the name.
    ReorderedArgument { body: Box<Construct>, position: u32 },
    /// `«...»`, under one of the three cardinalities, with an optional
    /// `‡`-separated separator phrase run between repetitions.
    Group {
        body: Vec<Construct>,
        cardinality: GroupCardinality,
        separator: Option<Vec<Construct>>,
    },
    /// `«a|b|c»`, with no trailing `!`: any one alternative may match,
    /// and which one isn't recorded as an argument.
    Alternation(Vec<Vec<Construct>>),
    /// `«a|b|c»!`: like `Alternation`, but the matched branch's 1-based
    /// index is pushed as an extra integer argument.
    NumberedChoice(Vec<Vec<Construct>>),
}

impl Construct {
    /// How many argument slots this construct contributes to the overall
    /// call signature.
    pub fn argument_count(&self) -> usize {
        match self {
            Construct::Keyword(_) => 0,
            Construct::Argument(_) => 1,
            Construct::RawTokenArgument { .. } => 1,
            Construct::ReorderedArgument { .. } => 1,
            Construct::Group { body, separator, .. } => {
                let body_count: usize = body.iter().map(Construct::argument_count).sum();
                let separator_count: usize = separator
                    .as_ref()
                    .map(|s| s.iter().map(Construct::argument_count).sum())
                    .unwrap_or(0);
                body_count + separator_count
            }
            Construct::Alternation(branches) => {
                branches.first().map(|b| b.iter().map(Construct::argument_count).sum()).unwrap_or(0)
            }
            Construct::NumberedChoice(branches) => {
                1 + branches
                    .first()
                    .map(|b| b.iter().map(Construct::argument_count).sum::<usize>())
                    .unwrap_or(0)
            }
        }
    }
}
