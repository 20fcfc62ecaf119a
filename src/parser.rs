//! MIME structure parsing and body resolution.
//!
//! Turns raw message bytes into [`ParsedMessage`] structured signal:
//! participant addresses, subject, and a single body text blob. Uses
//! `mail-parser` internally; charset decoding is replacement-based and a
//! message that fails to parse degrades to empty values rather than erroring.

use std::collections::HashSet;
use std::sync::OnceLock;

use mail_parser::{Address, Message, MessageParser, MimeHeaders, PartType};
use regex::Regex;

use crate::models::ParsedMessage;

/// Parse a raw message into participants, subject, and resolved body text.
///
/// Participants are the union of From, To, Cc, and Bcc addresses with
/// display names discarded and duplicates collapsed. A missing header
/// contributes nothing; a message `mail-parser` cannot make sense of
/// yields an empty [`ParsedMessage`].
#[must_use]
pub fn parse_message(raw: &[u8]) -> ParsedMessage {
    let Some(msg) = MessageParser::default().parse(raw) else {
        return ParsedMessage::default();
    };

    let mut participants = HashSet::new();
    for header in [msg.from(), msg.to(), msg.cc(), msg.bcc()]
        .into_iter()
        .flatten()
    {
        collect_addresses(header, &mut participants);
    }

    let subject = msg.subject().unwrap_or_default().to_string();
    let body = resolve_body(&msg);

    ParsedMessage {
        participants,
        subject,
        body,
    }
}

/// Collect the address portion of every display-name/address pair in a
/// header, including pairs nested inside address groups.
fn collect_addresses(header: &Address<'_>, out: &mut HashSet<String>) {
    match header {
        Address::List(list) => {
            for addr in list {
                if let Some(address) = addr.address.as_deref() {
                    if !address.is_empty() {
                        out.insert(address.to_string());
                    }
                }
            }
        }
        Address::Group(groups) => {
            for group in groups {
                for addr in &group.addresses {
                    if let Some(address) = addr.address.as_deref() {
                        if !address.is_empty() {
                            out.insert(address.to_string());
                        }
                    }
                }
            }
        }
    }
}

/// Resolve the body to one text blob.
///
/// Walks every part in document order: plain-text leaves contribute as-is,
/// HTML (and any textual leaf not exactly text/plain) is sanitized first,
/// nested message parts are walked recursively, and non-text leaves are
/// ignored. Parts join with a single separating space.
fn resolve_body(msg: &Message<'_>) -> String {
    let mut pieces: Vec<String> = Vec::new();
    collect_text_parts(msg, &mut pieces);
    pieces.join(" ")
}

fn collect_text_parts(msg: &Message<'_>, pieces: &mut Vec<String>) {
    for part in &msg.parts {
        match &part.body {
            PartType::Text(text) => {
                if is_plain_text(part) {
                    pieces.push(text.to_string());
                } else {
                    pieces.push(sanitize_html(text));
                }
            }
            PartType::Html(html) => pieces.push(sanitize_html(html)),
            PartType::Message(nested) => collect_text_parts(nested, pieces),
            _ => {}
        }
    }
}

/// Whether a textual part is declared exactly text/plain (or carries no
/// declared type at all).
fn is_plain_text<'a>(part: &impl MimeHeaders<'a>) -> bool {
    match part.content_type() {
        Some(ct) => {
            ct.ctype().eq_ignore_ascii_case("text")
                && ct
                    .subtype()
                    .map_or(true, |s| s.eq_ignore_ascii_case("plain"))
        }
        None => true,
    }
}

/// Reduce HTML to plain text.
///
/// Order matters: script/style blocks go first (with their content), then
/// remaining tags, then named/numeric entity references. Removing entities
/// after tags keeps fragments like `&amp;` from surviving as tokens.
#[must_use]
pub fn sanitize_html(html: &str) -> String {
    static SCRIPTS: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();
    static ENTITIES: OnceLock<Regex> = OnceLock::new();

    #[allow(clippy::expect_used)]
    let scripts = SCRIPTS.get_or_init(|| {
        Regex::new(r"(?is)<script[^>]*>.*?</script\s*>|<style[^>]*>.*?</style\s*>")
            .expect("script/style regex is well-formed")
    });
    #[allow(clippy::expect_used)]
    let tags =
        TAGS.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag regex is well-formed"));
    #[allow(clippy::expect_used)]
    let entities = ENTITIES
        .get_or_init(|| Regex::new(r"&#?[a-zA-Z0-9]+;").expect("entity regex is well-formed"));

    let no_blocks = scripts.replace_all(html, " ");
    let no_tags = tags.replace_all(&no_blocks, " ");
    entities.replace_all(&no_tags, " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_message() {
        let raw = b"From: Alice <alice@example.com>\r\n\
To: Bob <bob@example.com>, carol@example.com\r\n\
Cc: dave@example.com\r\n\
Subject: Quarterly numbers\r\n\
Content-Type: text/plain\r\n\r\n\
Please review the attached figures.\r\n";

        let parsed = parse_message(raw);
        assert_eq!(parsed.subject, "Quarterly numbers");
        assert_eq!(parsed.participants.len(), 4);
        assert!(parsed.participants.contains("alice@example.com"));
        assert!(parsed.participants.contains("bob@example.com"));
        assert!(parsed.participants.contains("carol@example.com"));
        assert!(parsed.participants.contains("dave@example.com"));
        assert!(parsed.body.contains("Please review"));
    }

    #[test]
    fn test_duplicate_addresses_collapse() {
        let raw = b"From: alice@example.com\r\n\
To: alice@example.com\r\n\
Subject: self note\r\n\r\n\
remember\r\n";

        let parsed = parse_message(raw);
        assert_eq!(parsed.participants.len(), 1);
    }

    #[test]
    fn test_missing_headers_degrade_to_empty() {
        let parsed = parse_message(b"\r\njust a body with no headers\r\n");
        assert_eq!(parsed.subject, "");
        assert!(parsed.participants.is_empty());
    }

    #[test]
    fn test_html_body_is_sanitized() {
        let raw = b"From: a@example.com\r\n\
Subject: hi\r\n\
Content-Type: text/html\r\n\r\n\
<script>bad()</script><p>Hello &amp; World</p>\r\n";

        let parsed = parse_message(raw);
        assert!(parsed.body.contains("Hello"));
        assert!(parsed.body.contains("World"));
        assert!(!parsed.body.contains("bad()"));
        assert!(!parsed.body.contains("script"));
        assert!(!parsed.body.contains('<'));
        assert!(!parsed.body.contains("&amp;"));
        assert!(!parsed.body.contains("amp"));
    }

    #[test]
    fn test_sanitize_html_order() {
        let out = sanitize_html("<script>bad()</script><p>Hello &amp; World</p>");
        assert!(out.contains("Hello"));
        assert!(out.contains("World"));
        assert!(!out.contains("bad"));
        assert!(!out.contains("amp"));
        assert!(!out.contains('<'));
    }

    #[test]
    fn test_sanitize_numeric_entities() {
        let out = sanitize_html("Fish &#38; Chips &nbsp;here");
        assert!(!out.contains("&#38;"));
        assert!(!out.contains("&nbsp;"));
        assert!(out.contains("Fish"));
        assert!(out.contains("Chips"));
    }

    #[test]
    fn test_multipart_prefers_all_text_parts() {
        let raw = b"From: a@example.com\r\n\
Subject: mixed\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"XYZ\"\r\n\r\n\
--XYZ\r\n\
Content-Type: text/plain\r\n\r\n\
plain words here\r\n\
--XYZ\r\n\
Content-Type: text/html\r\n\r\n\
<p>markup words here</p>\r\n\
--XYZ--\r\n";

        let parsed = parse_message(raw);
        assert!(parsed.body.contains("plain words here"));
        assert!(parsed.body.contains("markup words here"));
        assert!(!parsed.body.contains("<p>"));
    }
}
