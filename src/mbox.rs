//! Streaming mbox archive splitting.
//!
//! Reads an mbox file sequentially and hands each contained message's raw
//! bytes to a callback, without loading the whole archive into memory.
//! Tolerant of malformed input: mixed line endings, a UTF-8 BOM, `From `
//! separators not preceded by a blank line, and truncated final messages.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::warn;

use crate::error::{MailsieveError, Result};

/// Size of the internal read buffer.
const READ_BUFFER_SIZE: usize = 128 * 1024;

/// Split an mbox archive, invoking `on_message` with each message's bytes.
///
/// Messages are emitted in file order; the order has no semantic meaning
/// downstream. The emitted bytes exclude the `From ` separator line.
/// A callback error aborts the split and propagates, leaving the archive
/// untouched for replay.
///
/// Returns the number of messages emitted.
pub fn split_mbox(
    path: impl AsRef<Path>,
    mut on_message: impl FnMut(&[u8]) -> Result<()>,
) -> Result<u64> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| MailsieveError::artifact(path, e))?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

    let mut count: u64 = 0;
    let mut message: Vec<u8> = Vec::with_capacity(16 * 1024);
    let mut line: Vec<u8> = Vec::with_capacity(4096);
    let mut prev_line_blank = true;
    let mut first_line = true;

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| MailsieveError::artifact(path, e))?;
        if read == 0 {
            break;
        }

        if first_line {
            strip_bom(&mut line);
        }

        if is_separator(&line) && (first_line || prev_line_blank) {
            if !message.is_empty() {
                on_message(trim_trailing_blank(&message))?;
                count += 1;
                message.clear();
            }
        } else {
            if is_separator(&line) {
                warn!(path = %path.display(), "From line without preceding blank line, keeping in body");
            }
            message.extend_from_slice(&line);
        }

        prev_line_blank = is_blank(&line);
        first_line = false;
    }

    if !message.is_empty() {
        on_message(trim_trailing_blank(&message))?;
        count += 1;
    }

    Ok(count)
}

/// Whether the line is an mbox `From ` message separator.
fn is_separator(line: &[u8]) -> bool {
    line.starts_with(b"From ")
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|&b| b == b'\n' || b == b'\r')
}

fn strip_bom(line: &mut Vec<u8>) {
    if line.starts_with(&[0xEF, 0xBB, 0xBF]) {
        line.drain(..3);
    }
}

/// Drop the blank separator line mbox framing appends after each message.
fn trim_trailing_blank(message: &[u8]) -> &[u8] {
    let mut end = message.len();
    while end > 0 && (message[end - 1] == b'\n' || message[end - 1] == b'\r') {
        end -= 1;
    }
    // Keep one final newline when the message had any content
    if end < message.len() {
        end += 1;
    }
    &message[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        f.write_all(contents).expect("write");
        f
    }

    #[test]
    fn test_split_two_messages() {
        let mbox = b"From alice@example.com Thu Jan  1 00:00:00 2024\n\
Subject: first\n\nbody one\n\n\
From bob@example.com Thu Jan  1 00:00:01 2024\n\
Subject: second\n\nbody two\n";
        let f = write_temp(mbox);

        let mut messages: Vec<Vec<u8>> = Vec::new();
        let count = split_mbox(f.path(), |raw| {
            messages.push(raw.to_vec());
            Ok(())
        })
        .expect("split");

        assert_eq!(count, 2);
        assert!(messages[0].starts_with(b"Subject: first"));
        assert!(messages[1].starts_with(b"Subject: second"));
    }

    #[test]
    fn test_from_in_body_is_not_a_separator() {
        // "From" without the trailing space stays in the body
        let mbox = b"From alice@example.com Thu Jan  1 00:00:00 2024\n\
Subject: only\n\nFrom: quoted header in body\nmore\n";
        let f = write_temp(mbox);

        let mut count = 0;
        split_mbox(f.path(), |_| {
            count += 1;
            Ok(())
        })
        .expect("split");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_empty_file() {
        let f = write_temp(b"");
        let count = split_mbox(f.path(), |_| Ok(())).expect("split");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_callback_error_propagates() {
        let mbox = b"From a@b Thu Jan  1 00:00:00 2024\nSubject: x\n\nbody\n";
        let f = write_temp(mbox);

        let result = split_mbox(f.path(), |_| {
            Err(MailsieveError::Other("store failed".to_string()))
        });
        assert!(result.is_err());
    }
}
