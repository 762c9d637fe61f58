//! Command classification against per-bot pattern sets.
//!
//! Bots are tried in configuration order and, within a bot, categories are
//! tried in declared order. The first matching pattern decides the target.

use std::sync::Arc;

use fancy_regex::Regex;
use tracing::warn;

use crate::common::error::ConfigError;
use crate::config::types::BotConfig;

/// A compiled regex pattern with its original string for debugging.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    original: String,
    regex: Regex,
}

impl CompiledPattern {
    pub fn new(pattern: &str) -> Result<Self, fancy_regex::Error> {
        Ok(Self {
            original: pattern.to_string(),
            regex: Regex::new(pattern)?,
        })
    }

    /// Whether `text` matches. Runtime matcher errors count as no match.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text).unwrap_or_else(|e| {
            warn!("Regex match error for pattern '{}': {}", self.original, e);
            false
        })
    }
}

/// Compile a list of pattern strings, failing on the first invalid one.
pub fn compile_patterns(field: &str, patterns: &[String]) -> Result<Vec<CompiledPattern>, ConfigError> {
    patterns
        .iter()
        .enumerate()
        .map(|(index, pattern)| {
            CompiledPattern::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                field: field.to_string(),
                index,
                pattern: pattern.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

/// A named group of patterns belonging to one bot.
#[derive(Debug, Clone)]
pub struct PatternCategory {
    pub name: String,
    pub patterns: Vec<CompiledPattern>,
}

impl PatternCategory {
    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }
}

/// A downstream IRC knowledge bot.
#[derive(Debug, Clone)]
pub struct BotTarget {
    pub nick: String,
    pub relay_tokens: bool,
    pub code_block: bool,
    pub categories: Vec<PatternCategory>,
}

impl BotTarget {
    /// Compile a bot from its configuration.
    pub fn from_config(config: &BotConfig) -> Result<Self, ConfigError> {
        let categories = config
            .categories
            .iter()
            .map(|category| {
                let field = format!("bots.{}.{}", config.nick, category.name);
                Ok(PatternCategory {
                    name: category.name.clone(),
                    patterns: compile_patterns(&field, &category.patterns)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            nick: config.nick.clone(),
            relay_tokens: config.relay_tokens,
            code_block: config.code_block,
            categories,
        })
    }

    /// Whether an IRC nick refers to this bot.
    pub fn is_nick(&self, nick: &str) -> bool {
        self.nick.eq_ignore_ascii_case(nick)
    }
}

/// Result of a successful classification.
#[derive(Debug, Clone, Copy)]
pub struct Classification<'a> {
    pub bot: &'a BotTarget,
    pub category: &'a str,
}

/// Classifies chat text into at most one target bot.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    bots: Arc<[BotTarget]>,
}

impl PatternMatcher {
    pub fn new(bots: Arc<[BotTarget]>) -> Self {
        Self { bots }
    }

    /// First bot and category whose patterns match `text`.
    pub fn classify(&self, text: &str) -> Option<Classification<'_>> {
        self.bots.iter().find_map(|bot| {
            bot.categories
                .iter()
                .find(|category| category.matches(text))
                .map(|category| Classification {
                    bot,
                    category: category.name.as_str(),
                })
        })
    }

    /// Bot registered under `nick`, if any.
    pub fn bot_by_nick(&self, nick: &str) -> Option<&BotTarget> {
        self.bots.iter().find(|bot| bot.is_nick(nick))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::CategoryConfig;

    fn bot(nick: &str, categories: &[(&str, &[&str])]) -> BotTarget {
        BotTarget::from_config(&BotConfig {
            nick: nick.to_string(),
            relay_tokens: false,
            code_block: false,
            categories: categories
                .iter()
                .map(|(name, patterns)| CategoryConfig {
                    name: name.to_string(),
                    patterns: patterns.iter().map(|p| p.to_string()).collect(),
                })
                .collect(),
        })
        .unwrap()
    }

    fn make_matcher() -> PatternMatcher {
        PatternMatcher::new(
            vec![
                bot(
                    "Sequell",
                    &[
                        ("sequell_patterns", &[r"^!\w+", r"^\?\?"]),
                        ("learndb_patterns", &[r"^\?\?\S+\[\d+\]"]),
                    ],
                ),
                bot("Gretell", &[("monster_patterns", &[r"^@\?\S+", r"^\?\?"])]),
                bot("Cheibriados", &[("git_patterns", &[r"(?i)^%git\b"])]),
            ]
            .into(),
        )
    }

    #[test]
    fn test_first_bot_wins() {
        let matcher = make_matcher();
        // "??foo" matches both Sequell and Gretell; Sequell is declared first.
        let hit = matcher.classify("??foo").unwrap();
        assert_eq!(hit.bot.nick, "Sequell");
        assert_eq!(hit.category, "sequell_patterns");
    }

    #[test]
    fn test_first_category_wins() {
        let matcher = make_matcher();
        let hit = matcher.classify("??foo[2]").unwrap();
        assert_eq!(hit.category, "sequell_patterns");
    }

    #[test]
    fn test_other_bots() {
        let matcher = make_matcher();
        assert_eq!(matcher.classify("@?orb of fire").unwrap().bot.nick, "Gretell");
        let hit = matcher.classify("%GIT HEAD").unwrap();
        assert_eq!(hit.bot.nick, "Cheibriados");
        assert_eq!(hit.category, "git_patterns");
    }

    #[test]
    fn test_no_match() {
        let matcher = make_matcher();
        assert!(matcher.classify("hello there").is_none());
        assert!(matcher.classify("").is_none());
    }

    #[test]
    fn test_classification_is_stable() {
        let matcher = make_matcher();
        for _ in 0..10 {
            let hit = matcher.classify("!lg * won").unwrap();
            assert_eq!((hit.bot.nick.as_str(), hit.category), ("Sequell", "sequell_patterns"));
        }
    }

    #[test]
    fn test_case_sensitivity_is_per_pattern() {
        let matcher = make_matcher();
        assert!(matcher.classify("%git").is_some());
        assert!(matcher.classify("%Git").is_some());
        // Gretell needs a name after "@?"
        assert!(matcher.classify("@?").is_none());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = BotTarget::from_config(&BotConfig {
            nick: "Broken".to_string(),
            relay_tokens: false,
            code_block: false,
            categories: vec![CategoryConfig {
                name: "bad".to_string(),
                patterns: vec!["ok".to_string(), "[unclosed".to_string()],
            }],
        });
        match result {
            Err(ConfigError::InvalidPattern { field, index, .. }) => {
                assert_eq!(field, "bots.Broken.bad");
                assert_eq!(index, 1);
            }
            other => panic!("expected InvalidPattern, got {:?}", other),
        }
    }

    #[test]
    fn test_bot_by_nick_case_insensitive() {
        let matcher = make_matcher();
        assert_eq!(matcher.bot_by_nick("sequell").unwrap().nick, "Sequell");
        assert!(matcher.bot_by_nick("Henzell").is_none());
    }
}
