//! User-facing rule groups carrying an optional policy tag.

use serde::{Deserialize, Serialize};

use super::{RuleDef, RuleGroup};

/// A rule file as written by users.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigRuleGroups {
    #[serde(default)]
    pub groups: Vec<ConfigRuleGroup>,
}

/// [`RuleGroup`] plus the `partial_response_strategy` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigRuleGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
    /// Raw tag; resolved by the partitioner so the error can name the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_response_strategy: Option<String>,
}

impl ConfigRuleGroups {
    /// Parse a user rule file. Whitespace-only input yields no groups.
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        Self::from_slice(contents.as_bytes())
    }

    /// Parse raw file bytes. Input that is not valid UTF-8 is rejected.
    pub fn from_slice(contents: &[u8]) -> Result<Self, serde_yaml::Error> {
        if contents.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_yaml::from_slice(contents)
    }
}

impl ConfigRuleGroup {
    /// Split into the policy-stripped group and the raw policy tag.
    pub fn into_parts(self) -> (RuleGroup, Option<String>) {
        (
            RuleGroup {
                name: self.name,
                interval: self.interval,
                rules: self.rules,
            },
            self.partial_response_strategy,
        )
    }
}
