//! Script loader
//!
//! Splits a script into function blocks. Braces are recognised anywhere
//! outside double quotes, so both the compact one-line form
//! (`main(){A="1"} foo(x){print "$A-$x"}`) and one-statement-per-line blocks
//! load the same way. Text outside any block belongs to `main`.

use crate::utils::strip_quotes;
use std::collections::HashMap;
use tracing::{debug, warn};

pub const MAIN_FUNCTION: &str = "main";

/// Directive on the first line of a script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `#!mtape2`: functions, parameters and scoped variables
    FunctionScoped,
    /// `#!mtape`: the older single-function form
    Legacy,
    Undeclared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<String>,
}

/// Functions of a loaded script, matched case-insensitively by name
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: Vec<FunctionDef>,
    index: HashMap<String, usize>,
}

impl FunctionTable {
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.index
            .get(&name.to_lowercase())
            .map(|&i| &self.functions[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    fn entry(&mut self, name: &str, params: Vec<String>) -> &mut FunctionDef {
        let key = name.to_lowercase();
        let index = match self.index.get(&key) {
            Some(&i) => {
                if !params.is_empty() {
                    self.functions[i].params = params;
                }
                i
            }
            None => {
                self.functions.push(FunctionDef {
                    name: name.to_string(),
                    params,
                    body: Vec::new(),
                });
                let i = self.functions.len() - 1;
                self.index.insert(key, i);
                i
            }
        };
        &mut self.functions[index]
    }
}

#[derive(Debug, Clone)]
pub struct ParsedScript {
    pub dialect: Dialect,
    pub functions: FunctionTable,
}

#[derive(Debug, PartialEq, Eq)]
enum Segment {
    Text(String),
    Open,
    Close,
}

fn scan_line(line: &str, segments: &mut Vec<Segment>) {
    let mut current = String::new();
    let mut in_quotes = false;

    let flush = |current: &mut String, segments: &mut Vec<Segment>| {
        let text = current.trim();
        if !text.is_empty() {
            segments.push(Segment::Text(text.to_string()));
        }
        current.clear();
    };

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '{' if !in_quotes => {
                flush(&mut current, segments);
                segments.push(Segment::Open);
            }
            '}' if !in_quotes => {
                flush(&mut current, segments);
                segments.push(Segment::Close);
            }
            _ => current.push(ch),
        }
    }
    flush(&mut current, segments);
}

/// `name(a, b)` with an identifier name
pub fn parse_header(text: &str) -> Option<(String, Vec<String>)> {
    let text = text.trim();
    let open = text.find('(')?;
    if !text.ends_with(')') {
        return None;
    }
    let name = text[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let inner = &text[open + 1..text.len() - 1];
    let params = inner
        .split(',')
        .map(|p| strip_quotes(p).trim_start_matches('$').trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    Some((name.to_string(), params))
}

fn detect_dialect(line: &str) -> Option<Dialect> {
    let directive = line.trim();
    if !directive.starts_with("#!") {
        return None;
    }
    match directive[2..].trim().to_lowercase().as_str() {
        "mtape2" => Some(Dialect::FunctionScoped),
        "mtape" => Some(Dialect::Legacy),
        other => {
            warn!("Unknown script directive '#!{}'", other);
            Some(Dialect::Undeclared)
        }
    }
}

pub fn parse_script(source: &str) -> ParsedScript {
    let mut dialect = None;
    let mut segments = Vec::new();

    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if dialect.is_none() {
            if let Some(d) = detect_dialect(trimmed) {
                dialect = Some(d);
                continue;
            }
            dialect = Some(Dialect::Undeclared);
        }
        if trimmed.starts_with('#') {
            continue;
        }
        scan_line(trimmed, &mut segments);
    }

    let mut functions = FunctionTable::default();
    let mut current: Option<String> = None;
    let mut iter = segments.into_iter().peekable();

    while let Some(segment) = iter.next() {
        match (segment, current.clone()) {
            (Segment::Text(text), None) => {
                let header = if iter.peek() == Some(&Segment::Open) {
                    parse_header(&text)
                } else {
                    None
                };
                match header {
                    Some((name, params)) => {
                        iter.next();
                        debug!("Script function {}({})", name, params.join(", "));
                        functions.entry(&name, params);
                        current = Some(name);
                    }
                    None => functions.entry(MAIN_FUNCTION, Vec::new()).body.push(text),
                }
            }
            (Segment::Text(text), Some(name)) => {
                functions.entry(&name, Vec::new()).body.push(text);
            }
            (Segment::Open, None) => {
                warn!("Script block without a function header, treating it as main");
                functions.entry(MAIN_FUNCTION, Vec::new());
                current = Some(MAIN_FUNCTION.to_string());
            }
            (Segment::Open, Some(name)) => {
                warn!("Nested block in function {} ignored", name);
            }
            (Segment::Close, Some(_)) => current = None,
            (Segment::Close, None) => warn!("Unmatched '}}' in script ignored"),
        }
    }

    if let Some(name) = current {
        warn!("Function {} is not closed; block ends at end of script", name);
    }

    ParsedScript {
        dialect: dialect.unwrap_or(Dialect::Undeclared),
        functions,
    }
}
