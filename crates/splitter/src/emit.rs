//! Emits the parsing-plan bytecode for a parsed message name.

use crate::ast::{ArgumentKind, Construct, GroupCardinality};
use crate::error::SignatureError;

/// A literal value a `PushLiteral` instruction makes available to the
/// send: either a present/absent flag (`Optional`) or a 1-based branch
/// index (`NumberedChoice`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseLiteral {
    Bool(bool),
    Int(u32),
}

/// The conversion a `Convert` instruction applies to the value just
/// parsed, for argument kinds whose parsed representation isn't already
/// the final one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertRule {
    VariableReference,
    ModuleScope,
    RawToken { accepts_any: bool },
    /// Remap the argument just parsed from its position in the name to
    /// call-argument position `position`.
    Reorder { position: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseInstr {
    /// Parse one ordinary argument expression off the token stream.
    ParseArgument,
    /// Parse an argument resolved against the defining module's scope.
    ParseArgumentInModuleScope,
    /// Parse a single raw (unparsed) token.
    ParseAnyRawToken,
    /// Parse an argument that must denote an assignable variable.
    ParseVariableReference,
    /// Record that argument `n` (1-based, in call-argument order) has
    /// just been parsed.
    CheckArgument(u32),
    /// Check the just-parsed argument against the type constraint
    /// associated with slot `c` (resolved against the method's declared
    /// argument types by the caller).
    TypeCheckArgument(u32),
    /// Convert the just-parsed argument's representation per `rule`.
    Convert(ConvertRule),
    /// Push a literal value, consumed by the final send.
    PushLiteral(ParseLiteral),
    /// Require and consume a literal keyword.
    MatchKeyword(String),
    /// Remember the current parse position, so a subsequent
    /// `EnsureParseProgress` can detect a non-advancing (and thus
    /// potentially infinite) repetition.
    SaveParsePosition,
    /// Fail unless the parse position has advanced past the most
    /// recently saved one.
    EnsureParseProgress,
    /// Pop the most recently saved parse position without checking it.
    DiscardSavedParsePosition,
    /// Jump to instruction `target` if the construct starting here
    /// fails to match (branch taken on mismatch, not on success).
    BranchForward(usize),
    /// Unconditionally jump to instruction `target`. `target` is an
    /// absolute instruction index; most uses skip forward past
    /// alternatives already tried, but a repeated group also uses this
    /// to return to its own first instruction for the next iteration —
    /// the spec names the instruction for its common direction, not as a
    /// constraint on the operand.
    JumpForward(usize),
    /// The method send itself, once every argument has been parsed.
    Send,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsingPlan {
    pub instructions: Vec<ParseInstr>,
    pub num_arguments: u32,
}

struct Emitter {
    instructions: Vec<ParseInstr>,
    next_argument: u32,
    /// `Some(true)`/`Some(false)` once we've seen whether arguments are
    /// reordered; `None` before the first argument.
    reordering_seen: Option<bool>,
    reorder_positions: Vec<u32>,
}

pub fn emit(constructs: &[Construct]) -> Result<ParsingPlan, SignatureError> {
    let mut e = Emitter {
        instructions: Vec::new(),
        next_argument: 0,
        reordering_seen: None,
        reorder_positions: Vec::new(),
    };
    e.emit_sequence(constructs)?;
    e.instructions.push(ParseInstr::Send);
    e.check_reorder_consistency()?;
    Ok(ParsingPlan {
        instructions: e.instructions,
        num_arguments: e.next_argument,
    })
}

impl Emitter {
    fn here(&self) -> usize {
        self.instructions.len()
    }

    /// Emit a `BranchForward` placeholder, returning its index so its
    /// target can be patched once known.
    fn emit_branch_placeholder(&mut self) -> usize {
        let idx = self.here();
        self.instructions.push(ParseInstr::BranchForward(0));
        idx
    }

    /// Emit a `JumpForward` placeholder, returning its index.
    fn emit_jump_placeholder(&mut self) -> usize {
        let idx = self.here();
        self.instructions.push(ParseInstr::JumpForward(0));
        idx
    }

    /// Patch a previously emitted branch/jump placeholder to target the
    /// current instruction position.
    fn patch_to_here(&mut self, idx: usize) {
        let target = self.here();
        match &mut self.instructions[idx] {
            ParseInstr::BranchForward(t) | ParseInstr::JumpForward(t) => *t = target,
            other => unreachable!("patch target {idx} is not a branch/jump: {other:?}"),
        }
    }

    fn emit_sequence(&mut self, constructs: &[Construct]) -> Result<(), SignatureError> {
        for c in constructs {
            self.emit_one(c)?;
        }
        Ok(())
    }

    fn emit_one(&mut self, construct: &Construct) -> Result<(), SignatureError> {
        match construct {
            Construct::Keyword(k) => self.instructions.push(ParseInstr::MatchKeyword(k.clone())),
            Construct::Argument(kind) => self.emit_argument(*kind, None)?,
            Construct::RawTokenArgument { accepts_any } => {
                self.emit_raw_token_argument(*accepts_any, None)?
            }
            Construct::ReorderedArgument { body, position } => {
                self.emit_reordered(body, *position)?
            }
            Construct::Group { body, cardinality, separator } => {
                self.emit_group(body, *cardinality, separator.as_deref())?
            }
            Construct::Alternation(branches) => self.emit_alternation(branches, false)?,
            Construct::NumberedChoice(branches) => self.emit_alternation(branches, true)?,
        }
        Ok(())
    }

    fn emit_reordered(&mut self, body: &Construct, position: u32) -> Result<(), SignatureError> {
        match body {
            Construct::Argument(kind) => self.emit_argument(*kind, Some(position)),
            Construct::RawTokenArgument { accepts_any } => {
                self.emit_raw_token_argument(*accepts_any, Some(position))
            }
            other => unreachable!("only arguments carry a reordering mark: {other:?}"),
        }
    }

    fn emit_argument(&mut self, kind: ArgumentKind, reorder_to: Option<u32>) -> Result<(), SignatureError> {
        let index = self.next_argument_index(reorder_to)?;
        match kind {
            ArgumentKind::Plain => self.instructions.push(ParseInstr::ParseArgument),
            ArgumentKind::VariableReference => {
                self.instructions.push(ParseInstr::ParseVariableReference)
            }
            ArgumentKind::ModuleScope => {
                self.instructions.push(ParseInstr::ParseArgumentInModuleScope)
            }
        }
        self.instructions.push(ParseInstr::CheckArgument(index));
        self.instructions.push(ParseInstr::TypeCheckArgument(index));
        match kind {
            ArgumentKind::VariableReference => {
                self.instructions.push(ParseInstr::Convert(ConvertRule::VariableReference))
            }
            ArgumentKind::ModuleScope => {
                self.instructions.push(ParseInstr::Convert(ConvertRule::ModuleScope))
            }
            ArgumentKind::Plain => {}
        }
        if let Some(position) = reorder_to {
            self.instructions.push(ParseInstr::Convert(ConvertRule::Reorder { position }));
        }
        Ok(())
    }

    fn emit_raw_token_argument(
        &mut self,
        accepts_any: bool,
        reorder_to: Option<u32>,
    ) -> Result<(), SignatureError> {
        let index = self.next_argument_index(reorder_to)?;
        self.instructions.push(ParseInstr::ParseAnyRawToken);
        self.instructions.push(ParseInstr::CheckArgument(index));
        self.instructions.push(ParseInstr::TypeCheckArgument(index));
        self.instructions.push(ParseInstr::Convert(ConvertRule::RawToken { accepts_any }));
        if let Some(position) = reorder_to {
            self.instructions.push(ParseInstr::Convert(ConvertRule::Reorder { position }));
        }
        Ok(())
    }

    fn next_argument_index(&mut self, reorder_to: Option<u32>) -> Result<u32, SignatureError> {
        self.next_argument += 1;
        let index = self.next_argument;
        let is_reordered = reorder_to.is_some();
        match self.reordering_seen {
            None => self.reordering_seen = Some(is_reordered),
            Some(prev) if prev != is_reordered => {
                return Err(SignatureError::InconsistentArgumentReordering)
            }
            _ => {}
        }
        if let Some(target) = reorder_to {
            self.reorder_positions.push(target);
        }
        Ok(index)
    }

    /// Emit a group under its cardinality. `Repeated` produces a
    /// progress-guarded loop; `Optional` produces a present/absent
    /// branch pushing a boolean; `CompletelyOptional` produces a bare
    /// branch pushing nothing.
    fn emit_group(
        &mut self,
        body: &[Construct],
        cardinality: GroupCardinality,
        separator: Option<&[Construct]>,
    ) -> Result<(), SignatureError> {
        match cardinality {
            GroupCardinality::Repeated => {
                let loop_top = self.here();
                let exit_patch = self.emit_branch_placeholder();
                self.instructions.push(ParseInstr::SaveParsePosition);
                self.emit_sequence(body)?;
                if let Some(sep) = separator {
                    self.emit_sequence(sep)?;
                }
                self.instructions.push(ParseInstr::EnsureParseProgress);
                self.instructions.push(ParseInstr::DiscardSavedParsePosition);
                let back = self.emit_jump_placeholder();
                self.instructions[back] = ParseInstr::JumpForward(loop_top);
                self.patch_to_here(exit_patch);
            }
            GroupCardinality::Optional => {
                let else_patch = self.emit_branch_placeholder();
                self.emit_sequence(body)?;
                self.instructions.push(ParseInstr::PushLiteral(ParseLiteral::Bool(true)));
                let end_patch = self.emit_jump_placeholder();
                self.patch_to_here(else_patch);
                self.instructions.push(ParseInstr::PushLiteral(ParseLiteral::Bool(false)));
                self.patch_to_here(end_patch);
            }
            GroupCardinality::CompletelyOptional => {
                let end_patch = self.emit_branch_placeholder();
                self.emit_sequence(body)?;
                self.patch_to_here(end_patch);
            }
        }
        Ok(())
    }

    /// Emit a branch cascade: test each alternative in turn, falling
    /// through to the next on mismatch. `numbered` pushes the 1-based
    /// matched-branch index as an extra argument.
    fn emit_alternation(&mut self, branches: &[Vec<Construct>], numbered: bool) -> Result<(), SignatureError> {
        let last = branches.len() - 1;
        let mut end_patches = Vec::new();
        for (i, branch) in branches.iter().enumerate() {
            let next_patch = if i != last { Some(self.emit_branch_placeholder()) } else { None };
            self.emit_sequence(branch)?;
            if numbered {
                self.instructions.push(ParseInstr::PushLiteral(ParseLiteral::Int(i as u32 + 1)));
            }
            if i != last {
                end_patches.push(self.emit_jump_placeholder());
            }
            if let Some(patch) = next_patch {
                self.patch_to_here(patch);
            }
        }
        for patch in end_patches {
            self.patch_to_here(patch);
        }
        if numbered {
            self.next_argument += 1;
        }
        Ok(())
    }

    fn check_reorder_consistency(&self) -> Result<(), SignatureError> {
        if self.reordering_seen != Some(true) {
            return Ok(());
        }
        let mut sorted = self.reorder_positions.clone();
        sorted.sort_unstable();
        let expected: Vec<u32> = (1..=sorted.len() as u32).collect();
        if sorted != expected {
            return Err(SignatureError::InconsistentArgumentReordering);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer::lex, parser::parse};

    fn plan_for(name: &str) -> ParsingPlan {
        let tokens = lex(name).unwrap();
        let tree = parse(&tokens).unwrap();
        emit(&tree).unwrap()
    }

    #[test]
    fn two_arguments_emit_two_checks_then_send() {
        let plan = plan_for("_+_");
        let checks: Vec<_> = plan
            .instructions
            .iter()
            .filter(|i| matches!(i, ParseInstr::CheckArgument(_)))
            .collect();
        assert_eq!(checks.len(), 2);
        assert_eq!(plan.instructions.last(), Some(&ParseInstr::Send));
        assert_eq!(plan.num_arguments, 2);
    }

    #[test]
    fn consistent_reordering_succeeds() {
        let tokens = lex("_‴2_‴1").unwrap();
        let tree = parse(&tokens).unwrap();
        let plan = emit(&tree).unwrap();
        assert_eq!(plan.num_arguments, 2);
        let converts: Vec<_> = plan
            .instructions
            .iter()
            .filter(|i| matches!(i, ParseInstr::Convert(ConvertRule::Reorder { .. })))
            .collect();
        assert_eq!(converts.len(), 2);
    }

    #[test]
    fn mixed_reordering_and_plain_arguments_is_rejected() {
        let tokens = lex("_‴1_").unwrap();
        let tree = parse(&tokens).unwrap();
        let err = emit(&tree).unwrap_err();
        assert_eq!(err, SignatureError::InconsistentArgumentReordering);
    }

    #[test]
    fn reordering_positions_must_form_a_permutation() {
        let tokens = lex("_‴1_‴1").unwrap();
        let tree = parse(&tokens).unwrap();
        let err = emit(&tree).unwrap_err();
        assert_eq!(err, SignatureError::InconsistentArgumentReordering);
    }

    #[test]
    fn numbered_choice_adds_an_extra_argument_and_pushes_its_index() {
        let plan = plan_for("as «a|b|c»!");
        assert_eq!(plan.num_arguments, 1);
        let pushed: Vec<_> = plan
            .instructions
            .iter()
            .filter_map(|i| match i {
                ParseInstr::PushLiteral(ParseLiteral::Int(n)) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(pushed, vec![1, 2, 3]);
    }

    #[test]
    fn optional_group_pushes_a_boolean_on_both_paths() {
        let plan = plan_for("«_»?");
        let pushed: Vec<_> = plan
            .instructions
            .iter()
            .filter_map(|i| match i {
                ParseInstr::PushLiteral(ParseLiteral::Bool(b)) => Some(*b),
                _ => None,
            })
            .collect();
        assert_eq!(pushed, vec![true, false]);
    }

    #[test]
    fn completely_optional_group_pushes_nothing() {
        let plan = plan_for("«_»⁇");
        assert!(!plan.instructions.iter().any(|i| matches!(i, ParseInstr::PushLiteral(_))));
    }

    #[test]
    fn repeated_group_is_guarded_by_the_progress_triad() {
        let plan = plan_for("«_‡,»");
        assert!(plan.instructions.contains(&ParseInstr::SaveParsePosition));
        assert!(plan.instructions.contains(&ParseInstr::EnsureParseProgress));
        assert!(plan.instructions.contains(&ParseInstr::DiscardSavedParsePosition));
        // the loop body jumps backward to its own entry for the next iteration.
        let jump_target = plan.instructions.iter().find_map(|i| match i {
            ParseInstr::JumpForward(t) => Some(*t),
            _ => None,
        });
        assert_eq!(jump_target, Some(0));
    }

    #[test]
    fn raw_token_argument_emits_parse_any_raw_token_and_convert() {
        let plan = plan_for("…!");
        assert!(plan.instructions.contains(&ParseInstr::ParseAnyRawToken));
        assert!(plan
            .instructions
            .contains(&ParseInstr::Convert(ConvertRule::RawToken { accepts_any: true })));
    }

    #[test]
    fn module_scope_argument_emits_its_parse_and_convert_instructions() {
        let plan = plan_for("_†");
        assert!(plan.instructions.contains(&ParseInstr::ParseArgumentInModuleScope));
        assert!(plan.instructions.contains(&ParseInstr::Convert(ConvertRule::ModuleScope)));
    }

    #[test]
    fn variable_reference_argument_emits_its_parse_and_convert_instructions() {
        let plan = plan_for("_↑");
        assert!(plan.instructions.contains(&ParseInstr::ParseVariableReference));
        assert!(plan.instructions.contains(&ParseInstr::Convert(ConvertRule::VariableReference)));
    }
}
