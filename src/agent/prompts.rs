use std::collections::BTreeMap;

pub const DEFAULT_PROMPT_KEY: &str = "default";

/// Named system prompts a request can select by key.
#[derive(Debug, Clone)]
pub struct SystemPrompts {
    prompts: BTreeMap<String, String>,
}

impl SystemPrompts {
    pub fn builtin() -> Self {
        let prompts = [
            (
                DEFAULT_PROMPT_KEY,
                "You are a Roblox Studio assistant. You help users with scripting, game design, \
                 and other Roblox development tasks.",
            ),
            (
                "scripting",
                "You are a Roblox Lua scripting expert. Provide clear, efficient, and \
                 well-commented code examples.",
            ),
            (
                "design",
                "You are a Roblox game design expert. Help users create engaging and visually \
                 appealing games.",
            ),
            (
                "debugging",
                "You are a debugging assistant for Roblox Studio. Help users identify and fix \
                 issues in their code and games.",
            ),
        ];

        Self {
            prompts: prompts
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// The prompt for `key`, or the default one.
    pub fn get(&self, key: Option<&str>) -> &str {
        key.and_then(|k| self.prompts.get(k))
            .or_else(|| self.prompts.get(DEFAULT_PROMPT_KEY))
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_falls_back_to_default() {
        let prompts = SystemPrompts::builtin();
        assert!(prompts.get(Some("scripting")).contains("Lua scripting expert"));
        assert_eq!(prompts.get(Some("poetry")), prompts.get(None));
        assert!(prompts.get(None).starts_with("You are a Roblox Studio assistant."));
        assert_eq!(prompts.keys().count(), 4);
    }
}
