//! Line-oriented patch computation.
//!
//! Pure: operates on an in-memory line vector and never touches a file.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("line numbers are 1-indexed; got {0}")]
    ZeroLine(usize),
    #[error("start line {from_line} is past the end of the file ({len} lines)")]
    StartOutOfRange { from_line: usize, len: usize },
    #[error("end line {to_line} is past the end of the file ({len} lines)")]
    EndOutOfRange { to_line: usize, len: usize },
}

/// Replace lines `from_line..=to_line` (1-indexed) with `new_lines`.
///
/// When `to_line < from_line` nothing is removed and `new_lines` is spliced in
/// immediately before `from_line` (`from_line == len + 1` appends). An empty
/// `new_lines` in replace mode deletes the range.
pub fn apply_line_replacement<S>(
    lines: &[S],
    from_line: usize,
    to_line: usize,
    new_lines: &[S],
) -> Result<Vec<S>, PatchError>
where
    S: Clone,
{
    if from_line == 0 {
        return Err(PatchError::ZeroLine(from_line));
    }
    let len = lines.len();
    if from_line > len + 1 {
        return Err(PatchError::StartOutOfRange { from_line, len });
    }

    let start = from_line - 1;
    let end = if to_line < from_line {
        start
    } else {
        if to_line > len {
            return Err(PatchError::EndOutOfRange { to_line, len });
        }
        to_line
    };

    let mut out = Vec::with_capacity(len - (end - start) + new_lines.len());
    out.extend_from_slice(&lines[..start]);
    out.extend_from_slice(new_lines);
    out.extend_from_slice(&lines[end..]);
    Ok(out)
}

/// Split file text into lines without terminators.
///
/// A single trailing newline does not produce an extra empty line, and
/// `\r\n` endings are normalized.
#[must_use]
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

/// Join lines back into file text, newline-terminated unless empty.
#[must_use]
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out
}
