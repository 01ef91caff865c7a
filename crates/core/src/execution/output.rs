//! Normalisation of streamed process output.

use std::iter::Peekable;
use std::str::Chars;

/// Normalise text accumulated line by line from a child's stream.
///
/// `\r\n` becomes `\n`, a lone trailing `\r` on a line is dropped, terminal
/// escape sequences (CSI such as colours, OSC such as window titles) are
/// removed whole, other control characters except `\n` and `\t` are
/// removed, and trailing whitespace is trimmed so the result is exactly
/// the emitted lines joined by `\n`.
pub fn clean_output(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for line in raw.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        push_visible(&mut cleaned, line);
        cleaned.push('\n');
    }
    let trimmed_len = cleaned.trim_end().len();
    cleaned.truncate(trimmed_len);
    cleaned
}

fn push_visible(out: &mut String, line: &str) {
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\x1b' => skip_escape(&mut chars),
            '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
}

/// Consume the remainder of an escape sequence whose `ESC` was just read.
fn skip_escape(chars: &mut Peekable<Chars<'_>>) {
    match chars.next() {
        // CSI: parameter and intermediate bytes up to one final byte.
        Some('[') => {
            for c in chars.by_ref() {
                if ('\u{40}'..='\u{7e}').contains(&c) {
                    break;
                }
            }
        }
        // OSC: ends at BEL or at ST (`ESC \`).
        Some(']') => {
            while let Some(c) = chars.next() {
                if c == '\x07' {
                    break;
                }
                if c == '\x1b' {
                    chars.next_if_eq(&'\\');
                    break;
                }
            }
        }
        // Two-character sequences such as `ESC c` or `ESC 7`.
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_newline_artifact_is_trimmed() {
        assert_eq!(clean_output("one\ntwo\n"), "one\ntwo");
    }

    #[test]
    fn crlf_is_normalised() {
        assert_eq!(clean_output("a\r\nb\r\n"), "a\nb");
    }

    #[test]
    fn control_characters_are_removed() {
        assert_eq!(clean_output("ok\0\x07\x08\n"), "ok");
    }

    #[test]
    fn colour_sequences_are_removed_whole() {
        assert_eq!(clean_output("ok\x1b[0m\n"), "ok");
        assert_eq!(clean_output("\x1b[1;31mred\x1b[0m plain\n"), "red plain");
        assert_eq!(clean_output("\x1b[2K\x1b[1Gprogress 50%"), "progress 50%");
    }

    #[test]
    fn title_sequences_are_removed_whole() {
        assert_eq!(clean_output("\x1b]0;my title\x07done"), "done");
        assert_eq!(clean_output("\x1b]2;t\x1b\\done"), "done");
    }

    #[test]
    fn trailing_escape_is_dropped() {
        assert_eq!(clean_output("text\x1b"), "text");
        assert_eq!(clean_output("text\x1b["), "text");
    }

    #[test]
    fn tabs_and_blank_interior_lines_survive() {
        assert_eq!(clean_output("a\tb\n\nc\n"), "a\tb\n\nc");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(clean_output(""), "");
        assert_eq!(clean_output("\n\n"), "");
    }
}
