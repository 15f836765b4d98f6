//! `$NAME` token substitution
//!
//! Single left-to-right pass. At each `$` the longest known variable name
//! that follows (ASCII case-insensitive) and ends the token is replaced by
//! its value. Unknown tokens stay as written and substituted text is never
//! rescanned.

use super::environment::ScriptEnvironment;

/// Substitute every variable visible in `env`
pub fn substitute(text: &str, env: &ScriptEnvironment) -> String {
    let visible = env.visible();
    let pairs: Vec<(&str, &str)> = visible.into_iter().collect();
    substitute_with(text, &pairs)
}

/// Substitute only the given (name, value) pairs
pub fn substitute_with(text: &str, variables: &[(&str, &str)]) -> String {
    if !text.contains('$') || variables.is_empty() {
        return text.to_string();
    }

    let mut names: Vec<&(&str, &str)> = variables.iter().filter(|(n, _)| !n.is_empty()).collect();
    names.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(index) = rest.find('$') {
        out.push_str(&rest[..index]);
        let after = &rest[index + 1..];

        let hit = names.iter().find(|(name, _)| {
            after
                .get(..name.len())
                .map(|candidate| candidate.eq_ignore_ascii_case(name))
                .unwrap_or(false)
                && !after[name.len()..]
                    .chars()
                    .next()
                    .map(is_token_char)
                    .unwrap_or(false)
        });

        match hit {
            Some((name, value)) => {
                out.push_str(value);
                rest = &after[name.len()..];
            }
            None => {
                out.push('$');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_name_wins() {
        let vars = [("A", "1"), ("AB", "2")];
        assert_eq!(substitute_with("$AB-$A", &vars), "2-1");
    }

    #[test]
    fn test_name_must_end_the_token() {
        let vars = [("A", "1")];
        assert_eq!(substitute_with("$APPLE and $A", &vars), "$APPLE and 1");
        assert_eq!(substitute_with("$A_B $A.txt", &vars), "$A_B 1.txt");
    }

    #[test]
    fn test_shorter_name_used_when_longer_splits_a_token() {
        let vars = [("VOL", "v"), ("VOLUME", "VOL_0002")];
        assert_eq!(substitute_with("$VOLUME $VOLUMES $VOL", &vars), "VOL_0002 $VOLUMES v");
    }

    #[test]
    fn test_case_insensitive_tokens() {
        let vars = [("VOLUME", "VOL_0001")];
        assert_eq!(
            substitute_with("mount $volume now", &vars),
            "mount VOL_0001 now"
        );
    }

    #[test]
    fn test_unknown_tokens_left_intact() {
        let vars = [("X", "1")];
        assert_eq!(substitute_with("cost $ 5 $Y", &vars), "cost $ 5 $Y");
    }

    #[test]
    fn test_values_not_rescanned() {
        let vars = [("A", "$B"), ("B", "oops")];
        assert_eq!(substitute_with("$A", &vars), "$B");
    }

    #[test]
    fn test_environment_scopes() {
        let mut env = ScriptEnvironment::new();
        env.set_global("A", "1");
        env.push_frame();
        env.set_local("X", "2");
        assert_eq!(substitute("\"$A-$x\"", &env), "\"1-2\"");
    }
}
