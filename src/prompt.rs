use database::CredentialPrompt;
use std::io::{self, BufRead, IsTerminal, Write};
use tracing::warn;

/// Asks for the credential on the terminal. Declines when stdin is not a
/// terminal so unattended runs abort instead of blocking.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn prompt(&self, message: &str) -> Option<String> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            warn!("No terminal available to ask for the API key");
            return None;
        }

        let mut stderr = io::stderr();
        write!(stderr, "{} ", message).ok()?;
        stderr.flush().ok()?;

        let mut answer = String::new();
        stdin.lock().read_line(&mut answer).ok()?;
        Some(answer)
    }
}
