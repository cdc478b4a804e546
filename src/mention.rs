//! Extraction of the inline tokens Discord embeds in message content.
//!
//! Ids travel inside the text as mention markup:
//! - role: `<@&id>`
//! - user: `<@!id>` or `<@id>`
//! - custom emoji: `<:name:id>` or `<a:name:id>` (the name is what reactions report)
//!
//! Only the first token of each kind counts; later ones are ignored.

use crate::error::{Error, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Role,
    User,
    Emoji,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenKind::Role => "role mention",
            TokenKind::User => "user mention",
            TokenKind::Emoji => "emoji",
        })
    }
}

/// Returns the text between the first `open` and the next `close` after it.
fn between<'a>(content: &'a str, open: &str, close: char) -> Option<&'a str> {
    let start = content.find(open)? + open.len();
    let rest = &content[start..];
    let end = rest.find(close)?;
    Some(&rest[..end])
}

fn non_empty(id: Option<&str>, kind: TokenKind) -> Result<String> {
    match id {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(Error::MissingToken(kind)),
    }
}

pub fn role_id(content: &str) -> Result<String> {
    non_empty(between(content, "<@&", '>'), TokenKind::Role)
}

pub fn user_id(content: &str) -> Result<String> {
    let mut offset = 0;
    while let Some(pos) = content[offset..].find("<@") {
        let start = offset + pos + 2;
        let rest = &content[start..];
        if rest.starts_with('&') {
            offset = start;
            continue;
        }
        let rest = rest.strip_prefix('!').unwrap_or(rest);
        return non_empty(rest.find('>').map(|end| &rest[..end]), TokenKind::User);
    }
    Err(Error::MissingToken(TokenKind::User))
}

/// Emoji key for a mapping, in order of preference: custom emoji markup,
/// a `:shortcode:`, then the first word outside ASCII (a Unicode emoji).
pub fn emoji(content: &str) -> Result<String> {
    if let Some(name) = custom_emoji_name(content) {
        return Ok(name.to_string());
    }

    let words = content
        .split_whitespace()
        .skip(1)
        .map(strip_markup)
        .filter(|word| !word.is_empty());

    for word in words.clone() {
        if let Some(code) = word
            .strip_prefix(':')
            .and_then(|w| w.strip_suffix(':'))
            .filter(|w| !w.is_empty() && !w.contains(':'))
        {
            return Ok(code.to_string());
        }
    }

    words
        .into_iter()
        .find(|word| !word.is_ascii())
        .map(str::to_string)
        .ok_or(Error::MissingToken(TokenKind::Emoji))
}

/// Drops `<...>` tokens glued to the front of a word.
fn strip_markup(mut word: &str) -> &str {
    while word.starts_with('<') {
        match word.find('>') {
            Some(end) => word = &word[end + 1..],
            None => break,
        }
    }
    word
}

fn custom_emoji_name(content: &str) -> Option<&str> {
    let static_at = content.find("<:");
    let animated_at = content.find("<a:");
    let open = match (static_at, animated_at) {
        (Some(s), Some(a)) if a < s => "<a:",
        (Some(_), _) => "<:",
        (None, Some(_)) => "<a:",
        (None, None) => return None,
    };
    between(content, open, ':').filter(|name| !name.is_empty())
}
