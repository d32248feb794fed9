//! The message-name splitter: compiles a metacharacter-laden method name
//! into a small parsing-plan bytecode that, given a token stream, walks
//! exactly the argument positions the name declares.
//!
//! A message name is built from keyword runs and the following
//! metacharacters:
//!
//! - `_` — an ordinary argument, parsed as a full expression.
//! - `_↑` — a variable-reference argument: the phrase just parsed must
//!   denote an assignable variable.
//! - `_†` — a module-scope argument: resolved against the defining
//!   module's scope rather than the calling fiber's local scope.
//! - `…` — a raw-token argument, taken verbatim off the token stream
//!   without being parsed as an expression; a trailing `!` (`…!`) widens
//!   it to accept any raw token at all.
//! - `«...»` — a group. Its default cardinality is zero-or-more
//!   repetitions; a trailing `?` makes it optional (0 or 1 occurrence,
//!   pushing a present/absent flag), a trailing `⁇` makes it completely
//!   optional (0 or 1 occurrence, pushing nothing).
//! - `|` inside a group separates alternatives; a trailing `!` right
//!   after the group (legal only when it has more than one alternative)
//!   turns it into a *numbered choice*, recording which alternative
//!   matched as an extra integer argument.
//! - `‡` inside a single-alternative, repeated group splits its body from
//!   a separator phrase that appears between repetitions.
//! - `‴` followed by digits, or a single circled-number character,
//!   immediately after any argument construct reorders it: the number is
//!   the position it binds to in the call's argument list, independent
//!   of where the argument appears in the name.

pub mod ast;
pub mod emit;
pub mod error;
pub mod lexer;
pub mod parser;

pub use ast::Construct;
pub use emit::{ParseInstr, ParsingPlan};
pub use error::SignatureError;

/// Compile a message name into its parsing plan in one call.
pub fn compile(name: &str) -> Result<ParsingPlan, SignatureError> {
    let tokens = lexer::lex(name)?;
    let constructs = parser::parse(&tokens)?;
    emit::emit(&constructs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_simple_arguments_compile_to_two_checks_and_a_send() {
        // spec §8 scenario 4: "_+_" compiles to two CHECK_ARGUMENT
        // instructions followed by the final send.
        let plan = compile("_+_").unwrap();
        let checks = plan
            .instructions
            .iter()
            .filter(|i| matches!(i, ParseInstr::CheckArgument(_)))
            .count();
        assert_eq!(checks, 2);
        assert!(matches!(plan.instructions.last(), Some(ParseInstr::Send)));
        assert_eq!(plan.num_arguments, 2);
    }
}
