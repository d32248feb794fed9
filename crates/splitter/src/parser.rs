//! Recursive-descent parser turning tokens into a [`Construct`] tree.

use crate::ast::{ArgumentKind, Construct, GroupCardinality};
use crate::error::SignatureError;
use crate::lexer::Token;

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

pub fn parse(tokens: &[Token]) -> Result<Vec<Construct>, SignatureError> {
    let mut p = Parser { tokens, pos: 0 };
    let body = p.parse_sequence()?;
    match p.peek() {
        None => Ok(body),
        Some(Token::GroupClose) => Err(SignatureError::MalformedNesting(
            "unmatched '»' with no preceding '«'".to_string(),
        )),
        Some(Token::GroupSeparator) => Err(SignatureError::MalformedNesting(
            "'‡' may only appear inside a group".to_string(),
        )),
        Some(Token::Pipe) => Err(SignatureError::MalformedNesting(
            "'|' used outside of a group".to_string(),
        )),
        Some(other) => Err(SignatureError::MalformedNesting(format!(
            "unexpected token after top-level sequence: {other:?}"
        ))),
    }
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    /// Parses a flat run of constructs, stopping (without consuming) at
    /// `GroupClose`, `Pipe`, `GroupSeparator`, or end of input.
    fn parse_sequence(&mut self) -> Result<Vec<Construct>, SignatureError> {
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None
                | Some(Token::GroupClose)
                | Some(Token::Pipe)
                | Some(Token::GroupSeparator) => break,
                Some(Token::Keyword(_)) => {
                    if let Some(Token::Keyword(k)) = self.bump() {
                        out.push(Construct::Keyword(k.clone()));
                    }
                }
                Some(Token::Underscore) => {
                    let arg = self.parse_underscore_argument()?;
                    out.push(arg);
                }
                Some(Token::RawToken) => {
                    let arg = self.parse_raw_token_argument()?;
                    out.push(arg);
                }
                Some(Token::GroupOpen) => {
                    out.push(self.parse_group()?);
                }
                Some(Token::Optional) | Some(Token::CompletelyOptional) | Some(Token::Bang) => {
                    return Err(SignatureError::MalformedNesting(
                        "group-suffix marker with no preceding group".to_string(),
                    ));
                }
                Some(Token::VariableReference) | Some(Token::ModuleScope) => {
                    return Err(SignatureError::MalformedNesting(
                        "'↑'/'†' must immediately follow an argument's '_'".to_string(),
                    ));
                }
                Some(Token::ReorderMark(_)) => {
                    return Err(SignatureError::MalformedNesting(
                        "reordering mark with no preceding argument".to_string(),
                    ));
                }
            }
        }
        Ok(out)
    }

    /// Parses `_`, then an optional post-underscore kind marker (`↑` or
    /// `†`), then an optional reordering mark.
    fn parse_underscore_argument(&mut self) -> Result<Construct, SignatureError> {
        self.bump(); // consume '_'
        let kind = match self.peek() {
            Some(Token::VariableReference) => {
                self.bump();
                ArgumentKind::VariableReference
            }
            Some(Token::ModuleScope) => {
                self.bump();
                ArgumentKind::ModuleScope
            }
            _ => ArgumentKind::Plain,
        };
        self.maybe_reorder(Construct::Argument(kind))
    }

    /// Parses `…`, then an optional trailing `!` widening it to accept
    /// any raw token, then an optional reordering mark.
    fn parse_raw_token_argument(&mut self) -> Result<Construct, SignatureError> {
        self.bump(); // consume '…'
        let accepts_any = matches!(self.peek(), Some(Token::Bang));
        if accepts_any {
            self.bump();
        }
        self.maybe_reorder(Construct::RawTokenArgument { accepts_any })
    }

    fn maybe_reorder(&mut self, built: Construct) -> Result<Construct, SignatureError> {
        if let Some(Token::ReorderMark(position)) = self.peek() {
            let position = *position;
            self.bump();
            Ok(Construct::ReorderedArgument {
                body: Box::new(built),
                position,
            })
        } else {
            Ok(built)
        }
    }

    /// Parses `«...»` starting at the `GroupOpen` token, through any
    /// trailing suffix markers.
    fn parse_group(&mut self) -> Result<Construct, SignatureError> {
        self.bump(); // consume '«'
        let mut branches = Vec::new();
        let mut separator: Option<Vec<Construct>> = None;
        loop {
            let branch = self.parse_sequence()?;
            if matches!(self.peek(), Some(Token::GroupSeparator)) {
                self.bump();
                let sep = self.parse_sequence()?;
                if separator.is_some() {
                    return Err(SignatureError::MalformedNesting(
                        "a group may have at most one '‡' separator".to_string(),
                    ));
                }
                separator = Some(sep);
            }
            branches.push(branch);
            match self.peek() {
                Some(Token::Pipe) => {
                    self.bump();
                    continue;
                }
                Some(Token::GroupClose) => {
                    self.bump();
                    break;
                }
                None => {
                    return Err(SignatureError::MalformedNesting(
                        "unterminated '«' group".to_string(),
                    ));
                }
                Some(_) => unreachable!(
                    "parse_sequence only stops at GroupSeparator/Pipe/GroupClose/end"
                ),
            }
        }

        if branches.iter().any(Vec::is_empty) {
            return Err(SignatureError::EmptyAlternation);
        }

        if branches.len() > 1 {
            if separator.is_some() {
                return Err(SignatureError::MalformedNesting(
                    "'‡' separator may only appear in a non-alternation group".to_string(),
                ));
            }
            if matches!(self.peek(), Some(Token::Optional) | Some(Token::CompletelyOptional)) {
                return Err(SignatureError::MalformedNesting(
                    "an alternation group cannot also be optional".to_string(),
                ));
            }
            let counts: Vec<usize> = branches
                .iter()
                .map(|b| b.iter().map(Construct::argument_count).sum())
                .collect();
            if counts.windows(2).any(|w| w[0] != w[1]) {
                return Err(SignatureError::ArgumentTypeMismatch(
                    "alternatives bind different numbers of arguments".to_string(),
                ));
            }
            let numbered = matches!(self.peek(), Some(Token::Bang));
            if numbered {
                self.bump();
            }
            return Ok(if numbered {
                Construct::NumberedChoice(branches)
            } else {
                Construct::Alternation(branches)
            });
        }

        if matches!(self.peek(), Some(Token::Bang)) {
            return Err(SignatureError::MalformedNesting(
                "'!' numbered-choice marker requires a preceding alternation group".to_string(),
            ));
        }
        let cardinality = match self.peek() {
            Some(Token::Optional) => {
                self.bump();
                GroupCardinality::Optional
            }
            Some(Token::CompletelyOptional) => {
                self.bump();
                GroupCardinality::CompletelyOptional
            }
            _ => GroupCardinality::Repeated,
        };
        if separator.is_some() && !matches!(cardinality, GroupCardinality::Repeated) {
            return Err(SignatureError::MalformedNesting(
                "'‡' separator only applies to a repeated group".to_string(),
            ));
        }

        Ok(Construct::Group {
            body: branches.into_iter().next().unwrap_or_default(),
            cardinality,
            separator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    #[test]
    fn simple_arguments_parse_flat() {
        let tokens = lex("_+_").unwrap();
        let tree = parse(&tokens).unwrap();
        assert_eq!(
            tree,
            vec![
                Construct::Argument(ArgumentKind::Plain),
                Construct::Keyword("+".into()),
                Construct::Argument(ArgumentKind::Plain),
            ]
        );
    }

    #[test]
    fn repeated_group_with_separator() {
        let tokens = lex("«_‡,»").unwrap();
        let tree = parse(&tokens).unwrap();
        assert_eq!(tree.len(), 1);
        match &tree[0] {
            Construct::Group { body, cardinality, separator } => {
                assert_eq!(*cardinality, GroupCardinality::Repeated);
                assert_eq!(body.len(), 1);
                assert!(separator.is_some());
            }
            other => panic!("expected Group, got {other:?}"),
        }
    }

    #[test]
    fn optional_group_does_not_repeat() {
        let tokens = lex("«_»?").unwrap();
        let tree = parse(&tokens).unwrap();
        match &tree[0] {
            Construct::Group { cardinality, .. } => {
                assert_eq!(*cardinality, GroupCardinality::Optional)
            }
            other => panic!("expected Group, got {other:?}"),
        }
    }

    #[test]
    fn numbered_choice_with_matching_arities() {
        let tokens = lex("«a|b|c»!").unwrap();
        let tree = parse(&tokens).unwrap();
        assert!(matches!(tree[0], Construct::NumberedChoice(_)));
    }

    #[test]
    fn mismatched_alternation_arities_is_rejected() {
        let tokens = lex("«a|_b»").unwrap();
        let err = parse(&tokens).unwrap_err();
        assert!(matches!(err, SignatureError::ArgumentTypeMismatch(_)));
    }

    #[test]
    fn bang_without_preceding_alternation_is_rejected() {
        let tokens = lex("«_»!").unwrap();
        let err = parse(&tokens).unwrap_err();
        assert!(matches!(err, SignatureError::MalformedNesting(_)));
    }

    #[test]
    fn module_scope_marker_after_underscore_parses() {
        let tokens = lex("_†").unwrap();
        let tree = parse(&tokens).unwrap();
        assert_eq!(tree, vec![Construct::Argument(ArgumentKind::ModuleScope)]);
    }

    #[test]
    fn variable_reference_marker_without_preceding_underscore_is_rejected() {
        let tokens = lex("a↑").unwrap();
        let err = parse(&tokens).unwrap_err();
        assert!(matches!(err, SignatureError::MalformedNesting(_)));
    }

    #[test]
    fn unterminated_group_is_rejected() {
        let tokens = lex("«_").unwrap();
        let err = parse(&tokens).unwrap_err();
        assert!(matches!(err, SignatureError::MalformedNesting(_)));
    }

    #[test]
    fn reordered_arguments_parse() {
        let tokens = lex("_‴2_‴1").unwrap();
        let tree = parse(&tokens).unwrap();
        assert_eq!(
            tree,
            vec![
                Construct::ReorderedArgument {
                    body: Box::new(Construct::Argument(ArgumentKind::Plain)),
                    position: 2
                },
                Construct::ReorderedArgument {
                    body: Box::new(Construct::Argument(ArgumentKind::Plain)),
                    position: 1
                },
            ]
        );
    }

    #[test]
    fn raw_token_argument_parses() {
        let tokens = lex("…!").unwrap();
        let tree = parse(&tokens).unwrap();
        assert_eq!(tree, vec![Construct::RawTokenArgument { accepts_any: true }]);
    }
}
