//! Terminal review surface: the diff goes to stderr, the answer comes from
//! the controlling terminal.
//!
//! stdin and stdout carry the JSON-lines protocol, so the prompt never
//! touches them. Without a terminal every review is dismissed.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use tether_tools::{ReviewError, ReviewInput, ReviewRequest, ReviewSurface};
use tokio::sync::oneshot;

#[cfg(unix)]
const TTY_PATH: &str = "/dev/tty";
#[cfg(windows)]
const TTY_PATH: &str = "CONIN$";

pub struct TerminalSurface;

impl ReviewSurface for TerminalSurface {
    fn present(
        &self,
        request: &ReviewRequest,
    ) -> Result<oneshot::Receiver<ReviewInput>, ReviewError> {
        let (tx, rx) = oneshot::channel();
        let prompt = render(request);
        tokio::task::spawn_blocking(move || match ask(&prompt) {
            Ok(input) => {
                let _ = tx.send(input);
            }
            Err(e) => {
                // Dropping the sender dismisses the review.
                tracing::warn!("No terminal to review on ({e}); dismissing");
            }
        });
        Ok(rx)
    }

    fn return_to_caller(&self) {
        let _ = writeln!(io::stderr());
    }
}

fn render(request: &ReviewRequest) -> String {
    let verb = if request.is_new_file() { "Create" } else { "Apply change to" };
    let mut out = String::new();
    if request.diff().is_empty() {
        out.push_str("(no textual changes)\n");
    } else {
        out.push_str(request.diff());
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }
    out.push_str(&format!(
        "{verb} {}? ({}) [y/N] ",
        request.path().display(),
        request.stats()
    ));
    out
}

fn ask(prompt: &str) -> io::Result<ReviewInput> {
    let tty = File::open(TTY_PATH)?;
    let mut stderr = io::stderr().lock();
    stderr.write_all(prompt.as_bytes())?;
    stderr.flush()?;
    drop(stderr);

    let mut answer = String::new();
    if BufReader::new(tty).read_line(&mut answer)? == 0 {
        return Ok(ReviewInput::Dismissed);
    }
    Ok(parse_answer(&answer))
}

fn parse_answer(answer: &str) -> ReviewInput {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ReviewInput::Accept,
        _ => ReviewInput::Reject,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn only_yes_accepts() {
        assert_eq!(parse_answer("y\n"), ReviewInput::Accept);
        assert_eq!(parse_answer(" YES "), ReviewInput::Accept);
        assert_eq!(parse_answer("\n"), ReviewInput::Reject);
        assert_eq!(parse_answer("nope"), ReviewInput::Reject);
    }

    #[test]
    fn prompt_shows_diff_and_summary() {
        let request = ReviewRequest::new(
            PathBuf::from("notes.txt"),
            "a\n".to_string(),
            "b\n".to_string(),
            false,
        );
        let prompt = render(&request);
        assert!(prompt.contains("-a\n+b\n"));
        assert!(prompt.ends_with("Apply change to notes.txt? (+1 -1) [y/N] "));
    }
}
