//! Statement execution
//!
//! Each function body runs line by line. Unrecognised lines are logged and
//! skipped; a failing built-in returns `Err`, which unwinds through every
//! caller back to the entry call.

use super::environment::{canonical_name, ScriptEnvironment};
use super::host::ScriptHost;
use super::parser::{FunctionTable, MAIN_FUNCTION};
use super::substitution::{substitute, substitute_with};
use crate::error::{Result, RustMtapeError};
use crate::notify::{MailMessage, DEFAULT_SMTP_PORT};
use crate::utils::strip_quotes;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

pub const MAX_CALL_DEPTH: usize = 64;

/// Result of one script invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutcome {
    /// 0 when every statement ran, non-zero after a built-in failure
    pub status: u32,
    pub failure: Option<String>,
}

impl ScriptOutcome {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failed<T: Into<String>>(detail: T) -> Self {
        Self {
            status: 1,
            failure: Some(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

enum SelectState {
    Idle,
    Open {
        value: String,
        matched: bool,
        run_next: bool,
    },
}

pub struct Interpreter<'s, H: ScriptHost> {
    functions: &'s FunctionTable,
    host: &'s mut H,
    env: ScriptEnvironment,
}

impl<'s, H: ScriptHost> Interpreter<'s, H> {
    pub fn new(functions: &'s FunctionTable, host: &'s mut H, env: ScriptEnvironment) -> Self {
        Self {
            functions,
            host,
            env,
        }
    }

    pub fn environment(&self) -> &ScriptEnvironment {
        &self.env
    }

    /// Run `main`, then the optional entry statement in main's context
    pub async fn run(&mut self, entry: Option<&str>) -> ScriptOutcome {
        let result = self.run_inner(entry).await;
        match result {
            Ok(()) => ScriptOutcome::success(),
            Err(e) => {
                warn!("Script aborted: {}", e);
                ScriptOutcome::failed(e.to_string())
            }
        }
    }

    async fn run_inner(&mut self, entry: Option<&str>) -> Result<()> {
        if self.functions.contains(MAIN_FUNCTION) {
            self.call(MAIN_FUNCTION, Vec::new(), 0).await?;
        }
        if let Some(statement) = entry {
            self.env.push_frame();
            let result = self.execute(MAIN_FUNCTION, statement, 0).await;
            self.env.pop_frame();
            result?;
        }
        Ok(())
    }

    fn call<'a>(
        &'a mut self,
        name: &'a str,
        args: Vec<String>,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            if depth >= MAX_CALL_DEPTH {
                return Err(RustMtapeError::script(format!(
                    "call depth limit reached in {}",
                    name
                )));
            }
            let functions = self.functions;
            let def = match functions.get(name) {
                Some(def) => def,
                None => {
                    warn!("Unknown script function {}", name);
                    return Ok(());
                }
            };
            debug!("Script call {}({})", def.name, args.join(", "));

            self.env.push_frame();
            for (i, param) in def.params.iter().enumerate() {
                let value = match args.get(i) {
                    Some(value) => value.as_str(),
                    None => {
                        warn!(
                            "{}: missing argument for parameter {}, using empty value",
                            def.name, param
                        );
                        ""
                    }
                };
                self.env.set_local(param, value);
            }
            if args.len() > def.params.len() {
                warn!(
                    "{}: {} extra argument(s) ignored",
                    def.name,
                    args.len() - def.params.len()
                );
            }

            let result = self.run_body(&def.name, &def.body, depth).await;
            self.env.pop_frame();
            result
        })
    }

    async fn run_body(&mut self, function: &str, body: &[String], depth: usize) -> Result<()> {
        let mut select = SelectState::Idle;

        for line in body {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let lower = line.to_lowercase();

            if let SelectState::Open {
                value,
                matched,
                run_next,
            } = &mut select
            {
                if lower.starts_with("end select") {
                    select = SelectState::Idle;
                    continue;
                }
                if lower == "case" || lower.starts_with("case ") || lower.starts_with("case\"") {
                    let candidate = self.case_value(line.get(4..).unwrap_or(""));
                    let hit = !*matched && candidate.eq_ignore_ascii_case(value.trim());
                    *run_next = hit;
                    *matched |= hit;
                    continue;
                }
                if *run_next {
                    *run_next = false;
                    self.execute(function, line, depth).await?;
                }
                continue;
            }

            if lower.starts_with("select(") || lower.starts_with("select (") {
                select = SelectState::Open {
                    value: self.select_value(line),
                    matched: false,
                    run_next: false,
                };
                continue;
            }

            self.execute(function, line, depth).await?;
        }

        if matches!(select, SelectState::Open { .. }) {
            warn!("{}: select block not closed with 'end select'", function);
        }
        Ok(())
    }

    fn select_value(&self, line: &str) -> String {
        let inner = match (line.find('('), line.rfind(')')) {
            (Some(open), Some(close)) if close > open => &line[open + 1..close],
            _ => "",
        };
        let expr = strip_quotes(inner);
        match self.env.get(expr) {
            Some(value) => value.trim().to_string(),
            None => substitute(expr, &self.env).trim().to_string(),
        }
    }

    fn case_value(&self, rest: &str) -> String {
        let rest = rest.trim();
        let rest = rest.strip_suffix(':').unwrap_or(rest);
        let substituted = substitute(rest, &self.env);
        strip_quotes(&substituted).trim().to_string()
    }

    async fn execute(&mut self, function: &str, line: &str, depth: usize) -> Result<()> {
        let lower = line.to_lowercase();
        let compact: String = lower.chars().filter(|c| !c.is_whitespace()).collect();

        if lower == "print" || lower.starts_with("print ") || lower.starts_with("print\"") {
            let text = substitute(line.get(5..).unwrap_or("").trim(), &self.env);
            self.host.print(function, strip_quotes(&text));
            return Ok(());
        }

        if lower.starts_with("call ") {
            let command = substitute(line.get(5..).unwrap_or("").trim(), &self.env);
            let command = strip_quotes(&command);
            let code = self.host.run_external(command).await?;
            if code != 0 {
                return Err(RustMtapeError::script(format!(
                    "external command '{}' exited with {}",
                    command, code
                )));
            }
            return Ok(());
        }

        match compact.as_str() {
            "eject()" | "eject" => {
                self.host.eject().await;
                return Ok(());
            }
            "keypress()" | "keypress" => {
                let prompt = self.env.get("MESSAGE").unwrap_or("").to_string();
                return self.host.wait_for_key(&prompt).await;
            }
            "detectnewtape()" | "detectnewtape" => {
                return self.host.detect_new_tape().await;
            }
            "sendmail()" | "sendmail" => {
                let message = self.mail_message()?;
                return self.host.send_mail(&message).await;
            }
            _ => {}
        }

        if let Some(assignment) = split_assignment(line) {
            let (name, rhs) = assignment;
            let value = substitute(rhs, &self.env);
            let value = strip_quotes(&value);
            if function.eq_ignore_ascii_case(MAIN_FUNCTION) {
                self.env.set_global(name, value);
            } else {
                self.env.set_local(name, value);
            }
            return Ok(());
        }

        if let Some((name, args)) = split_call(line) {
            if self.functions.contains(name) {
                let args = args
                    .into_iter()
                    .map(|a| strip_quotes(&substitute(a, &self.env)).to_string())
                    .collect();
                let name = name.to_string();
                return self.call(&name, args, depth + 1).await;
            }
            warn!("{}: unknown function '{}' skipped", function, name);
            return Ok(());
        }

        warn!("{}: unrecognised statement skipped: {}", function, line);
        Ok(())
    }

    /// Build a mail from the `Mail*` variables
    fn mail_message(&self) -> Result<MailMessage> {
        let get = |name: &str| strip_quotes(self.env.get(name).unwrap_or("")).to_string();

        let port = match get("MailPort").as_str() {
            "" => DEFAULT_SMTP_PORT,
            port => port.parse().map_err(|_| {
                RustMtapeError::parameter_validation(format!("invalid MailPort '{}'", port))
            })?,
        };

        let volume = self.env.get("VOLUME").unwrap_or("").to_string();
        let reason = self.env.get("REASON").unwrap_or("").to_string();
        let body = substitute_with(
            &get("MailMessage"),
            &[("VOLUME", volume.as_str()), ("REASON", reason.as_str())],
        );

        let message = MailMessage {
            host: get("MailHost"),
            port,
            user: get("MailUser"),
            password: get("MailPassword"),
            sender: get("MailSender"),
            recipient: get("MailRecipient"),
            subject: get("MailSubject"),
            body,
        };
        message.validate()?;
        Ok(message)
    }
}

/// `NAME = value` with `=` outside quotes and an identifier on the left
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let index = find_unquoted(line, '=')?;
    let name = line[..index].trim();
    let bare = name.trim_start_matches('$');
    if bare.is_empty() || !bare.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    if canonical_name(bare).is_empty() {
        return None;
    }
    Some((name, line[index + 1..].trim()))
}

/// `name(arg, "arg")`
fn split_call(line: &str) -> Option<(&str, Vec<&str>)> {
    let open = line.find('(')?;
    let line = line.trim_end().trim_end_matches(';');
    if !line.ends_with(')') {
        return None;
    }
    let name = line[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let inner = &line[open + 1..line.len() - 1];
    Some((name, split_args(inner)))
}

fn split_args(inner: &str) -> Vec<&str> {
    if inner.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, ch) in inner.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                args.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    args.push(inner[start..].trim());
    args
}

fn find_unquoted(line: &str, target: char) -> Option<usize> {
    let mut in_quotes = false;
    for (i, ch) in line.char_indices() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch == target && !in_quotes {
            return Some(i);
        }
    }
    None
}
