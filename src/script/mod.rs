//! Lifecycle scripts
//!
//! Operator automation hooked into six lifecycle events. A hook is either
//! an external program (batch, shell or PowerShell file) called with the
//! volume name and reason, or a script in the small `#!mtape2` language run
//! by the built-in interpreter.

pub mod environment;
pub mod host;
pub mod interpreter;
pub mod parser;
pub mod substitution;

pub use environment::ScriptEnvironment;
pub use host::ScriptHost;
pub use interpreter::{Interpreter, ScriptOutcome};
pub use parser::{parse_script, Dialect, FunctionTable, ParsedScript};

use crate::error::{Result, RustMtapeError};
use crate::utils::volume_name;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    NewTape,
    StartBackup,
    EndBackup,
    Alert,
    TapeNeeded,
    Clean,
}

impl LifecycleEvent {
    /// Text bound to `$REASON`
    pub fn reason(&self) -> &'static str {
        match self {
            LifecycleEvent::NewTape => "New Tape",
            LifecycleEvent::StartBackup => "Archive Started",
            LifecycleEvent::EndBackup => "Archive Ended",
            LifecycleEvent::Alert => "Alert",
            LifecycleEvent::TapeNeeded => "Tape Needed",
            LifecycleEvent::Clean => "Clean",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

const EXTERNAL_EXTENSIONS: &[&str] = &["bat", "cmd", "sh", "ps1"];

#[derive(Debug, Clone)]
pub enum LifecycleScript {
    Interpreted { path: PathBuf, script: ParsedScript },
    External { path: PathBuf },
}

impl LifecycleScript {
    /// Load a hook; the file extension picks external or interpreted
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(RustMtapeError::script(format!(
                "lifecycle script not found: {}",
                path.display()
            )));
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if EXTERNAL_EXTENSIONS.contains(&extension.as_str()) {
            info!("Lifecycle hook: external program {}", path.display());
            return Ok(LifecycleScript::External { path });
        }

        let source = std::fs::read_to_string(&path)?;
        let script = parse_script(&source);
        match script.dialect {
            Dialect::FunctionScoped => {}
            Dialect::Legacy => warn!(
                "{} uses the legacy #!mtape dialect; running it with the #!mtape2 interpreter",
                path.display()
            ),
            Dialect::Undeclared => warn!(
                "{} has no #!mtape2 directive; interpreting it anyway",
                path.display()
            ),
        }
        info!(
            "Lifecycle hook: script {} ({} functions)",
            path.display(),
            script.functions.len()
        );
        Ok(LifecycleScript::Interpreted { path, script })
    }

    /// Interpreted hook from source text
    pub fn from_source(source: &str) -> Self {
        LifecycleScript::Interpreted {
            path: PathBuf::from("<inline>"),
            script: parse_script(source),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            LifecycleScript::Interpreted { path, .. } => path,
            LifecycleScript::External { path } => path,
        }
    }

    /// Run the hook for one event
    pub async fn invoke<H: ScriptHost>(
        &self,
        event: LifecycleEvent,
        volume: u32,
        message: &str,
        host: &mut H,
    ) -> ScriptOutcome {
        self.invoke_entry(event, volume, message, None, host).await
    }

    /// Run the hook, then `entry` as a statement of `main`
    pub async fn invoke_entry<H: ScriptHost>(
        &self,
        event: LifecycleEvent,
        volume: u32,
        message: &str,
        entry: Option<&str>,
        host: &mut H,
    ) -> ScriptOutcome {
        debug!("Lifecycle event {} on {}", event, volume_name(volume));
        match self {
            LifecycleScript::Interpreted { script, .. } => {
                let env = ScriptEnvironment::for_event(event, volume, message);
                let mut interpreter = Interpreter::new(&script.functions, host, env);
                interpreter.run(entry).await
            }
            LifecycleScript::External { path } => run_external_hook(path, event, volume).await,
        }
    }
}

async fn run_external_hook(path: &Path, event: LifecycleEvent, volume: u32) -> ScriptOutcome {
    let is_powershell = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("ps1"))
        .unwrap_or(false);
    let script = path.to_string_lossy().to_string();
    let hook_args = vec![volume_name(volume), event.reason().to_string()];

    let (program, mut args): (&str, Vec<String>) = if is_powershell {
        (
            "powershell",
            vec!["-NoProfile".into(), "-File".into(), script],
        )
    } else if cfg!(windows) {
        ("cmd", vec!["/C".into(), script])
    } else {
        ("sh", vec![script])
    };
    args.extend(hook_args);

    match host::run_program(program, &args).await {
        Ok(0) => ScriptOutcome::success(),
        Ok(code) => ScriptOutcome::failed(format!("{} exited with {}", path.display(), code)),
        Err(e) => ScriptOutcome::failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reason_texts() {
        assert_eq!(LifecycleEvent::NewTape.reason(), "New Tape");
        assert_eq!(LifecycleEvent::StartBackup.reason(), "Archive Started");
        assert_eq!(LifecycleEvent::EndBackup.reason(), "Archive Ended");
        assert_eq!(LifecycleEvent::TapeNeeded.to_string(), "Tape Needed");
    }

    #[test]
    fn test_load_picks_kind_by_extension() {
        let dir = TempDir::new().unwrap();
        let shell = dir.path().join("newtape.sh");
        std::fs::write(&shell, "exit 0\n").unwrap();
        assert!(matches!(
            LifecycleScript::load(&shell).unwrap(),
            LifecycleScript::External { .. }
        ));

        let script = dir.path().join("hooks.mtape");
        std::fs::write(&script, "#!mtape2\nprint \"hi\"\n").unwrap();
        match LifecycleScript::load(&script).unwrap() {
            LifecycleScript::Interpreted { script, .. } => {
                assert_eq!(script.dialect, Dialect::FunctionScoped)
            }
            other => panic!("unexpected hook kind {:?}", other),
        }

        assert!(LifecycleScript::load(dir.path().join("missing.txt")).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_external_hook_receives_volume_and_reason() {
        let dir = TempDir::new().unwrap();
        let hook = dir.path().join("check.sh");
        std::fs::write(
            &hook,
            "[ \"$1\" = VOL_0002 ] && [ \"$2\" = \"New Tape\" ]\n",
        )
        .unwrap();
        let script = LifecycleScript::load(&hook).unwrap();

        struct NoHost;
        impl ScriptHost for NoHost {
            async fn eject(&mut self) {}
            async fn wait_for_key(&mut self, _prompt: &str) -> Result<()> {
                Ok(())
            }
            async fn detect_new_tape(&mut self) -> Result<()> {
                Ok(())
            }
            async fn send_mail(&mut self, _message: &crate::notify::MailMessage) -> Result<()> {
                Ok(())
            }
        }

        let ok = script
            .invoke(LifecycleEvent::NewTape, 2, "", &mut NoHost)
            .await;
        assert!(ok.is_success());

        let wrong = script.invoke(LifecycleEvent::Alert, 2, "", &mut NoHost).await;
        assert!(!wrong.is_success());
    }
}
