use crate::error::{Result, RustMtapeError};
use crate::notify::MailMessage;
use tokio::process::Command;
use tracing::{info, warn};

/// Side effects a running script can ask for.
///
/// Built-ins call back into the engine through this trait, so the tape
/// engine and test doubles drive the same interpreter.
#[allow(async_fn_in_trait)]
pub trait ScriptHost {
    /// `eject()`; failures are logged by the host
    async fn eject(&mut self);

    /// `keypress()`
    async fn wait_for_key(&mut self, prompt: &str) -> Result<()>;

    /// `detectnewtape()`
    async fn detect_new_tape(&mut self) -> Result<()>;

    /// `sendmail()`
    async fn send_mail(&mut self, message: &MailMessage) -> Result<()>;

    /// `call <command>`; returns the exit code
    async fn run_external(&mut self, command: &str) -> Result<i32> {
        run_command_line(command).await
    }

    /// `print "text"`
    fn print(&mut self, function: &str, message: &str) {
        info!(target: "script", "[{}] {}", function, message);
    }
}

fn shell() -> (&'static str, &'static str) {
    if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    }
}

/// Run a command line through the platform shell, logging its output
pub async fn run_command_line(command: &str) -> Result<i32> {
    let (program, flag) = shell();
    let output = Command::new(program)
        .arg(flag)
        .arg(command)
        .output()
        .await
        .map_err(|e| RustMtapeError::script(format!("cannot run '{}': {}", command, e)))?;

    log_output(command, &output.stdout, &output.stderr);
    Ok(output.status.code().unwrap_or(-1))
}

/// Run a program with explicit arguments, logging its output
pub async fn run_program(program: &str, args: &[String]) -> Result<i32> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| RustMtapeError::script(format!("cannot run '{}': {}", program, e)))?;

    log_output(program, &output.stdout, &output.stderr);
    Ok(output.status.code().unwrap_or(-1))
}

fn log_output(command: &str, stdout: &[u8], stderr: &[u8]) {
    for line in String::from_utf8_lossy(stdout).lines() {
        info!(target: "script", "{}: {}", command, line);
    }
    for line in String::from_utf8_lossy(stderr).lines() {
        warn!(target: "script", "{}: {}", command, line);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_codes_surface() {
        assert_eq!(run_command_line("exit 0").await.unwrap(), 0);
        assert_eq!(run_command_line("exit 3").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_run_program_with_args() {
        let code = run_program("sh", &["-c".to_string(), "test \"$0\" = VOL_0001".to_string(), "VOL_0001".to_string()])
            .await
            .unwrap();
        assert_eq!(code, 0);
    }
}
