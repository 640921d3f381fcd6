//! Prompt composition.
//!
//! A user prompt template names the two quote bodies with `{quote1}` and
//! `{quote2}`. Literal braces are written `{{` and `}}`. Anything else in
//! brace syntax is rejected so a typo in a template surfaces to the user
//! instead of being sent to the model verbatim.

use thiserror::Error;

/// Template placeholder for the first quote's text.
pub const QUOTE1: &str = "quote1";
/// Template placeholder for the second quote's text.
pub const QUOTE2: &str = "quote2";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("unknown placeholder '{{{0}}}' in prompt template (use {{quote1}} and {{quote2}})")]
    UnknownPlaceholder(String),
    #[error("empty placeholder '{{}}' in prompt template (use {{quote1}} and {{quote2}})")]
    EmptyPlaceholder,
    #[error("format options are not supported in placeholder '{{{0}}}'")]
    UnsupportedFormatSpec(String),
    #[error("single '{{' at byte {0} is not closed (write '{{{{' for a literal brace)")]
    UnclosedBrace(usize),
    #[error("single '}}' at byte {0} has no opening brace (write '}}}}' for a literal brace)")]
    UnmatchedClosingBrace(usize),
}

/// Substitutes `{quote1}` and `{quote2}` in `template`.
pub fn compose(template: &str, quote1: &str, quote2: &str) -> Result<String, ComposeError> {
    let mut out = String::with_capacity(template.len() + quote1.len() + quote2.len());
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut field = String::new();
                let mut closed = false;
                for (_, d) in chars.by_ref() {
                    match d {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => return Err(ComposeError::UnclosedBrace(i)),
                        _ => field.push(d),
                    }
                }
                if !closed {
                    return Err(ComposeError::UnclosedBrace(i));
                }
                out.push_str(resolve_field(&field, quote1, quote2)?);
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(ComposeError::UnmatchedClosingBrace(i));
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

fn resolve_field<'a>(
    field: &str,
    quote1: &'a str,
    quote2: &'a str,
) -> Result<&'a str, ComposeError> {
    let name_end = field.find([':', '!']).unwrap_or(field.len());
    let name = &field[..name_end];

    let value = match name {
        QUOTE1 => quote1,
        QUOTE2 => quote2,
        "" => return Err(ComposeError::EmptyPlaceholder),
        other => return Err(ComposeError::UnknownPlaceholder(other.to_string())),
    };

    if name_end != field.len() {
        return Err(ComposeError::UnsupportedFormatSpec(field.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_both_quotes() {
        assert_eq!(
            compose("Q1:{quote1} Q2:{quote2}", "foo", "bar").unwrap(),
            "Q1:foo Q2:bar"
        );
    }

    #[test]
    fn placeholders_may_repeat_or_be_absent() {
        assert_eq!(compose("{quote2}{quote2}", "a", "b").unwrap(), "bb");
        assert_eq!(compose("no placeholders", "a", "b").unwrap(), "no placeholders");
    }

    #[test]
    fn substituted_text_is_not_reinterpreted() {
        assert_eq!(
            compose("{quote1}", "{\"premium\": 120}", "").unwrap(),
            "{\"premium\": 120}"
        );
    }

    #[test]
    fn doubled_braces_are_literal() {
        assert_eq!(
            compose("{{\"a\": \"{quote1}\"}}", "x", "y").unwrap(),
            "{\"a\": \"x\"}"
        );
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        assert_eq!(
            compose("{quote3}", "a", "b"),
            Err(ComposeError::UnknownPlaceholder("quote3".into()))
        );
        assert_eq!(compose("{}", "a", "b"), Err(ComposeError::EmptyPlaceholder));
    }

    #[test]
    fn format_spec_is_an_error() {
        assert_eq!(
            compose("{quote1:>10}", "a", "b"),
            Err(ComposeError::UnsupportedFormatSpec("quote1:>10".into()))
        );
    }

    #[test]
    fn unbalanced_braces_are_errors() {
        assert_eq!(compose("abc {quote1", "a", "b"), Err(ComposeError::UnclosedBrace(4)));
        assert_eq!(compose("a } b", "a", "b"), Err(ComposeError::UnmatchedClosingBrace(2)));
        assert_eq!(compose("{a{b}", "a", "b"), Err(ComposeError::UnclosedBrace(0)));
    }

    #[test]
    fn error_messages_show_braces() {
        let err = compose("{price}", "a", "b").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown placeholder '{price}' in prompt template (use {quote1} and {quote2})"
        );
    }
}
