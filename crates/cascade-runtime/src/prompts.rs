//! Prompts for the dad-joke generator.

/// System prompt: keeps the model to a single, clean joke.
pub const DAD_JOKE_SYSTEM_PROMPT: &str = r#"
You are a dad-joke generator.

Reply with exactly one dad joke and nothing else: no preamble, no
explanation, no emoji. Keep it family friendly. A setup line followed by a
punchline line is ideal.
"#;

/// User prompt sent when none is given on the command line.
pub const DAD_JOKE_PROMPT: &str = "Generate a dad joke.";

/// The system prompt with surrounding whitespace removed.
pub fn system_prompt() -> &'static str {
    DAD_JOKE_SYSTEM_PROMPT.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_is_trimmed() {
        let prompt = system_prompt();
        assert!(prompt.starts_with("You are a dad-joke generator."));
        assert!(!prompt.ends_with('\n'));
    }

    #[test]
    fn test_default_prompt_asks_for_a_joke() {
        assert!(DAD_JOKE_PROMPT.contains("dad joke"));
    }
}
