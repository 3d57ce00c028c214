//! Affirmative confirmation for destructive operations.

use std::io::{stderr, stdin, BufRead, IsTerminal as _, Write};

/// Asks the user to confirm an action. Anything but an explicit yes is a no.
pub trait Confirm {
    fn confirm(&self, question: &str) -> bool;
}

/// Prompts on the terminal, or answers for the user when told to.
#[derive(Debug, Clone, Copy)]
pub struct TerminalConfirm {
    assume_yes: bool,
}

impl TerminalConfirm {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        if !is_interactive() {
            log::info!("Not a terminal, declining: {}", question);
            return false;
        }

        ask(question, &mut stdin().lock(), &mut stderr())
    }
}

/// Write the question to `prompt` and read one answer line from `input`.
/// Prompts never go to stdout, which may carry `--json` output.
fn ask(question: &str, input: &mut impl BufRead, prompt: &mut impl Write) -> bool {
    if write!(prompt, "{} [y/N]: ", question).is_err() {
        return false;
    }
    prompt.flush().ok();
    let mut answer = String::new();
    if input.read_line(&mut answer).is_err() {
        return false;
    }
    is_yes(&answer)
}

/// Fixed answer, for tests and scripted runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&self, _question: &str) -> bool {
        self.0
    }
}

fn is_interactive() -> bool {
    stdin().is_terminal() && stderr().is_terminal()
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
