//! Command-text parsing: the first line of a mention body into an ordered
//! operation list.

use crate::command::ops::Operation;
use crate::error::CommandError;

/// Parse the command portion of a mention body.
///
/// Grammar: the first whitespace token is the bot's own handle and is
/// discarded; leading `!`-prefixed tokens are non-media directives and are
/// skipped; the remainder is a sequence of `-OPERATION` groups, each
/// followed by its parameter tokens (`key=value` or a bare flag key).
///
/// The returned list preserves token order, which is also execution order.
pub fn parse_command(body: &str) -> Result<Vec<Operation>, CommandError> {
    let first_line = body.lines().next().unwrap_or_default();
    let mut tokens = first_line.split_whitespace().peekable();

    // The leading mention of the bot itself.
    tokens.next();

    // Non-media directives (e.g. `!nodelete`) sit before the first operation.
    while tokens
        .peek()
        .is_some_and(|token| token.starts_with('!'))
    {
        tokens.next();
    }

    let mut operations: Vec<Operation> = Vec::new();
    while let Some(token) = tokens.next() {
        let Some(name) = token.strip_prefix('-') else {
            return Err(CommandError::ExpectedOperation(token.to_string()));
        };

        let mut params: Vec<(String, Option<String>)> = Vec::new();
        while let Some(param) = tokens.peek() {
            if param.starts_with('-') {
                break;
            }
            params.push(split_param(name, param)?);
            tokens.next();
        }

        operations.push(Operation::build(name, &params)?);
    }

    if operations.is_empty() {
        return Err(CommandError::Empty);
    }

    // Nested scan is fine at command-list sizes (< 10 entries).
    for (index, operation) in operations.iter().enumerate() {
        for earlier in &operations[..index] {
            if earlier.tag() == operation.tag() {
                return Err(CommandError::DuplicateOperation(operation.tag().to_string()));
            }
        }
    }

    Ok(operations)
}

/// Split one parameter token into `(key, optional value)`.
///
/// A token with no `=` is a bare flag; exactly one `=` separates key from
/// value; anything else (second `=`, empty key) is malformed.
fn split_param(
    operation: &str,
    token: &str,
) -> Result<(String, Option<String>), CommandError> {
    let malformed = || CommandError::MalformedParameter {
        operation: operation.to_ascii_uppercase(),
        token: token.to_string(),
    };

    match token.match_indices('=').count() {
        0 => Ok((token.to_string(), None)),
        1 => {
            let (key, value) = token.split_once('=').unwrap_or((token, ""));
            if key.is_empty() {
                return Err(malformed());
            }
            Ok((key.to_string(), Some(value.to_string())))
        }
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_left_to_right_operation_order() {
        let ops = parse_command("u/clipbot -REVERSE -TRIM start=1 end=5 -STABILIZE")
            .expect("valid command");
        let tags: Vec<_> = ops.iter().map(Operation::tag).collect();
        assert_eq!(tags, vec!["REVERSE", "TRIM", "STABILIZE"]);
    }

    #[test]
    fn rejects_duplicate_operation_tags_regardless_of_parameters() {
        let error = parse_command("u/clipbot -CROP left=10 -REVERSE -CROP top=20")
            .expect_err("two crops must fail");
        assert_eq!(error, CommandError::DuplicateOperation("CROP".into()));
    }

    #[test]
    fn resize_with_width_only_defaults_the_rest() {
        let ops = parse_command("u/clipbot -RESIZE width=300").expect("valid resize");
        assert_eq!(
            ops,
            vec![Operation::Resize {
                width: Some(300),
                height: None,
                scale: None
            }]
        );
    }

    #[test]
    fn adjacent_operations_do_not_cross_consume_tokens() {
        // CROP takes no tokens here and RESIZE gets none either; the failure
        // must be RESIZE's missing parameter, not a tokenizer error.
        let error = parse_command("u/clipbot -CROP -RESIZE").expect_err("resize needs a size");
        assert_eq!(
            error,
            CommandError::MissingParameter {
                operation: "RESIZE".into(),
                name: "width|height|scale".into()
            }
        );
    }

    #[test]
    fn skips_leading_directive_tokens() {
        let ops = parse_command("u/clipbot !nodelete !quiet -REVERSE").expect("valid command");
        assert_eq!(ops, vec![Operation::Reverse]);
    }

    #[test]
    fn rejects_stray_token_where_operation_expected() {
        let error = parse_command("u/clipbot please -REVERSE").expect_err("stray token");
        assert_eq!(error, CommandError::ExpectedOperation("please".into()));
    }

    #[test]
    fn rejects_parameter_with_two_equals_or_empty_key() {
        let error =
            parse_command("u/clipbot -TRIM start=1=2 end=5").expect_err("double = is malformed");
        assert!(matches!(error, CommandError::MalformedParameter { .. }));

        let error = parse_command("u/clipbot -TRIM =1 end=5").expect_err("empty key is malformed");
        assert!(matches!(error, CommandError::MalformedParameter { .. }));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert_eq!(parse_command("u/clipbot"), Err(CommandError::Empty));
        assert_eq!(parse_command(""), Err(CommandError::Empty));
        // Only the first line is command text.
        assert_eq!(
            parse_command("u/clipbot\n-REVERSE this is prose"),
            Err(CommandError::Empty)
        );
    }

    #[test]
    fn operation_names_are_case_insensitive() {
        let ops = parse_command("u/clipbot -reverse -Trim start=0 end=2").expect("valid command");
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0], Operation::Reverse);
    }
}
