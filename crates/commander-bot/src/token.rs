//! Bot token acquisition.

use crate::error::{BotError, BotResult};
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::debug;

/// Environment variable checked before any other token source.
pub const TOKEN_ENV_VAR: &str = "BOT_TOKEN";

/// Where a token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// The [`TOKEN_ENV_VAR`] environment variable.
    Environment,
    /// The `--token` argument.
    Argument,
    /// The file named by `--tokenfile`.
    File,
    /// Typed in at the prompt.
    Prompt,
}

/// Picks a token from the non-interactive sources, in precedence order.
///
/// Blank values are ignored. Returns `None` when every source is empty, in
/// which case the caller falls back to [`prompt_token`].
pub fn resolve_token(
    from_env: Option<String>,
    from_arg: Option<String>,
    token_file: Option<&Path>,
) -> BotResult<Option<(String, TokenSource)>> {
    if let Some(token) = non_blank(from_env) {
        return Ok(Some((token, TokenSource::Environment)));
    }
    if let Some(token) = non_blank(from_arg) {
        return Ok(Some((token, TokenSource::Argument)));
    }
    if let Some(path) = token_file {
        debug!(path = %path.display(), "Reading token file");
        let contents = std::fs::read_to_string(path).map_err(|source| BotError::TokenFile {
            path: path.to_path_buf(),
            source,
        })?;
        return non_blank(Some(contents))
            .map(|token| Some((token, TokenSource::File)))
            .ok_or(BotError::MissingToken);
    }
    Ok(None)
}

/// Asks for a token on the terminal.
pub fn prompt_token(input: &mut impl BufRead, output: &mut impl Write) -> BotResult<String> {
    write!(output, "Enter bot token: ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    non_blank(Some(line)).ok_or(BotError::MissingToken)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
