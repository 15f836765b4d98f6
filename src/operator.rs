use crate::error::{Result, RustMtapeError};
use std::io::{self, BufRead, Write};

/// Blocking operator interaction (tape swaps and confirmations)
pub trait OperatorPrompt: Send {
    /// Show `message` and block until the operator presses Enter
    fn wait_for_key(&mut self, message: &str) -> Result<()>;

    /// Ask a yes/no question
    fn confirm(&mut self, message: &str) -> Result<bool>;
}

/// Prompts on stdout and reads answers from stdin. End of input cancels.
#[derive(Debug, Default)]
pub struct ConsolePrompt;

impl ConsolePrompt {
    fn read_answer(&self) -> Result<String> {
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(RustMtapeError::operation_cancelled(
                "operator input closed",
            ));
        }
        Ok(line.trim().to_string())
    }
}

impl OperatorPrompt for ConsolePrompt {
    fn wait_for_key(&mut self, message: &str) -> Result<()> {
        if !message.is_empty() {
            println!("{}", message);
        }
        print!("Press Enter to continue...");
        io::stdout().flush()?;
        self.read_answer().map(|_| ())
    }

    fn confirm(&mut self, message: &str) -> Result<bool> {
        print!("{} [y/N]: ", message);
        io::stdout().flush()?;
        let answer = self.read_answer()?;
        Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
    }
}

/// Answers every prompt immediately (`--force` and unattended runs)
#[derive(Debug, Default)]
pub struct AutoConfirm;

impl OperatorPrompt for AutoConfirm {
    fn wait_for_key(&mut self, _message: &str) -> Result<()> {
        Ok(())
    }

    fn confirm(&mut self, _message: &str) -> Result<bool> {
        Ok(true)
    }
}
