use crate::error::{Error, Result};

/// npm's own limit on package name length.
const MAX_IDENTIFIER_LEN: usize = 214;

/// Command words users paste from package READMEs (`npm i <name>`).
const INSTALL_VERBS: &[&str] = &["i", "install", "add"];

/// Normalize a user-supplied addon identifier.
///
/// Accepts things like `" npm i ankidroid-js-addon-progress-bar"` (including
/// non-breaking spaces copied from web pages) and returns the bare package name.
/// The result names the install directory, so anything that could act as a
/// path component other than a plain name is rejected.
pub fn sanitize_identifier(raw: &str) -> Result<String> {
    let mut tokens: Vec<&str> = raw
        .split(char::is_whitespace)
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.len() >= 2 && tokens[0] == "npm" && INSTALL_VERBS.contains(&tokens[1]) {
        tokens.drain(..2);
    }

    let name = tokens.concat();
    validate_identifier(&name)?;
    Ok(name)
}

/// Check that an already-normalized identifier is a safe directory name.
pub fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && !name.starts_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'));

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}
