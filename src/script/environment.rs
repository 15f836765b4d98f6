use super::LifecycleEvent;
use crate::utils::volume_name;
use std::collections::HashMap;

/// Canonical variable key: `$mailHost` and `MAILHOST` name the same variable
pub fn canonical_name(name: &str) -> String {
    name.trim().trim_start_matches('$').to_uppercase()
}

/// Variable scopes of one script invocation.
///
/// Lookups go innermost local frame, then globals, then the built-ins the
/// engine refreshed for this event. Assignments never touch built-ins.
#[derive(Debug, Clone, Default)]
pub struct ScriptEnvironment {
    builtins: HashMap<String, String>,
    globals: HashMap<String, String>,
    frames: Vec<HashMap<String, String>>,
}

impl ScriptEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh environment with the built-ins for one lifecycle event
    pub fn for_event(event: LifecycleEvent, volume: u32, message: &str) -> Self {
        let mut env = Self::new();
        let next_volume = volume_name(volume + 1);
        env.set_builtin("VOLUME", &volume_name(volume));
        env.set_builtin("REASON", event.reason());
        env.set_builtin(
            "DATETIME",
            &chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        env.set_builtin("0", &next_volume);
        env.set_builtin("1", event.reason());
        env.set_builtin("2", &next_volume);
        env.set_builtin("3", message);
        env.set_builtin("MESSAGE", message);
        env
    }

    pub fn set_builtin(&mut self, name: &str, value: &str) {
        self.builtins
            .insert(canonical_name(name), value.to_string());
    }

    pub fn set_global(&mut self, name: &str, value: &str) {
        self.globals.insert(canonical_name(name), value.to_string());
    }

    /// Assign in the innermost frame; without a frame this is a global
    pub fn set_local(&mut self, name: &str, value: &str) {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.insert(canonical_name(name), value.to_string());
            }
            None => self.set_global(name, value),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let key = canonical_name(name);
        if let Some(frame) = self.frames.last() {
            if let Some(value) = frame.get(&key) {
                return Some(value.as_str());
            }
        }
        self.globals
            .get(&key)
            .or_else(|| self.builtins.get(&key))
            .map(|v| v.as_str())
    }

    pub fn get_global(&self, name: &str) -> Option<&str> {
        self.globals.get(&canonical_name(name)).map(|v| v.as_str())
    }

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// Every name visible from the current frame with its effective value
    pub fn visible(&self) -> HashMap<&str, &str> {
        let mut merged: HashMap<&str, &str> = HashMap::new();
        for (k, v) in &self.builtins {
            merged.insert(k.as_str(), v.as_str());
        }
        for (k, v) in &self.globals {
            merged.insert(k.as_str(), v.as_str());
        }
        if let Some(frame) = self.frames.last() {
            for (k, v) in frame {
                merged.insert(k.as_str(), v.as_str());
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builtins() {
        let env = ScriptEnvironment::for_event(LifecycleEvent::NewTape, 3, "swap");
        assert_eq!(env.get("$VOLUME"), Some("VOL_0003"));
        assert_eq!(env.get("reason"), Some("New Tape"));
        assert_eq!(env.get("$0"), Some("VOL_0004"));
        assert_eq!(env.get("$3"), Some("swap"));
        assert_eq!(env.get("MESSAGE"), Some("swap"));
        assert!(env.get("DATETIME").is_some());
    }

    #[test]
    fn test_local_shadows_without_overwriting() {
        let mut env = ScriptEnvironment::for_event(LifecycleEvent::Alert, 0, "");
        env.set_global("A", "global");
        env.push_frame();
        env.set_local("A", "local");
        env.set_local("REASON", "shadow");
        assert_eq!(env.get("A"), Some("local"));
        assert_eq!(env.get("REASON"), Some("shadow"));
        env.pop_frame();

        assert_eq!(env.get("A"), Some("global"));
        assert_eq!(env.get("REASON"), Some("Alert"));
    }

    #[test]
    fn test_frames_are_isolated() {
        let mut env = ScriptEnvironment::new();
        env.push_frame();
        env.set_local("X", "outer");
        env.push_frame();
        assert_eq!(env.get("X"), None);
        env.pop_frame();
        assert_eq!(env.get("$x"), Some("outer"));
        assert_eq!(env.get_global("X"), None);
    }
}
