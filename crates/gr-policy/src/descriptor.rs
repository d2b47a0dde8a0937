// descriptor.rs — PolicyDescriptor: the desired state of a content-safety policy.
//
// A descriptor is what the operator writes down (usually as a YAML file):
// which content categories to filter and how hard, which PII to mask or block,
// literal terms and high-risk intents to deny, and the messages users see
// when something is blocked.
//
// `name` + `environment` identify a policy for its whole lifetime. The
// descriptor is plain input; the reconciler never mutates it.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Remote limit on guardrail names. Applies to `name`, `environment`, and
/// the combined remote name.
pub const MAX_NAME_LEN: usize = 50;
/// Remote limit on a single blocked term.
pub const MAX_TERM_LEN: usize = 100;
/// Remote limit on blocked-content messages.
pub const MAX_MESSAGE_LEN: usize = 500;

const DEFAULT_BLOCKED_MESSAGE: &str = "Sorry, the model cannot answer this question.";

/// Content categories the remote service can classify.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilterCategory {
    Hate,
    Sexual,
    Violence,
    Misconduct,
    Profanity,
}

impl fmt::Display for FilterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterCategory::Hate => write!(f, "hate"),
            FilterCategory::Sexual => write!(f, "sexual"),
            FilterCategory::Violence => write!(f, "violence"),
            FilterCategory::Misconduct => write!(f, "misconduct"),
            FilterCategory::Profanity => write!(f, "profanity"),
        }
    }
}

/// How aggressively a category is filtered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilterStrength {
    None,
    Low,
    Medium,
    High,
}

impl FilterStrength {
    /// Upper-case enumeration used on the wire.
    pub fn remote_name(&self) -> &'static str {
        match self {
            FilterStrength::None => "NONE",
            FilterStrength::Low => "LOW",
            FilterStrength::Medium => "MEDIUM",
            FilterStrength::High => "HIGH",
        }
    }
}

/// One category filter with separate strengths for prompts and completions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentFilter {
    pub category: FilterCategory,
    pub input_strength: FilterStrength,
    pub output_strength: FilterStrength,
}

/// Kinds of sensitive information the policy can act on.
///
/// `ApiKey` has no managed detector on the remote side; it is sent as a
/// regex-defined secret instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PiiEntity {
    Email,
    Phone,
    CreditCard,
    Ssn,
    ApiKey,
}

impl fmt::Display for PiiEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PiiEntity::Email => write!(f, "email"),
            PiiEntity::Phone => write!(f, "phone"),
            PiiEntity::CreditCard => write!(f, "credit_card"),
            PiiEntity::Ssn => write!(f, "ssn"),
            PiiEntity::ApiKey => write!(f, "api_key"),
        }
    }
}

/// What happens when a PII entity is detected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PiiAction {
    /// Replace the match with a placeholder and let the request through.
    Mask,
    /// Reject the whole request/response.
    Block,
}

impl PiiAction {
    pub fn remote_name(&self) -> &'static str {
        match self {
            PiiAction::Mask => "ANONYMIZE",
            PiiAction::Block => "BLOCK",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PiiRule {
    pub entity: PiiEntity,
    pub action: PiiAction,
}

/// High-risk intents that are always denied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BlockedIntent {
    MalwareGeneration,
    Jailbreak,
    CredentialTheft,
    DataExfiltration,
}

/// User-facing strings the remote service returns when it blocks content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Messaging {
    #[serde(default = "default_blocked_message")]
    pub blocked_input_message: String,
    #[serde(default = "default_blocked_message")]
    pub blocked_output_message: String,
}

impl Default for Messaging {
    fn default() -> Self {
        Self {
            blocked_input_message: default_blocked_message(),
            blocked_output_message: default_blocked_message(),
        }
    }
}

fn default_blocked_message() -> String {
    DEFAULT_BLOCKED_MESSAGE.to_string()
}

/// The desired state of one content-safety policy.
///
/// Collections default to empty so a descriptor file only has to mention
/// what it actually configures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyDescriptor {
    /// Stable identifier, unchanged across updates.
    pub name: String,

    /// Scoping tag (e.g., "dev", "prod"). Part of the policy's identity.
    pub environment: String,

    /// Optional free-text description sent with the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub content_filters: Vec<ContentFilter>,

    #[serde(default)]
    pub pii_rules: Vec<PiiRule>,

    /// Literal terms to block. A set: order and duplicates don't matter.
    #[serde(default)]
    pub blocked_terms: BTreeSet<String>,

    #[serde(default)]
    pub blocked_intents: BTreeSet<BlockedIntent>,

    #[serde(default)]
    pub messaging: Messaging,
}

impl PolicyDescriptor {
    /// Create an empty descriptor. Add at least one policy element before
    /// reconciling it; an empty policy does not validate.
    pub fn new(name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: environment.into(),
            description: None,
            content_filters: Vec::new(),
            pii_rules: Vec::new(),
            blocked_terms: BTreeSet::new(),
            blocked_intents: BTreeSet::new(),
            messaging: Messaging::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_filter(
        mut self,
        category: FilterCategory,
        input_strength: FilterStrength,
        output_strength: FilterStrength,
    ) -> Self {
        self.content_filters.push(ContentFilter {
            category,
            input_strength,
            output_strength,
        });
        self
    }

    pub fn with_pii_rule(mut self, entity: PiiEntity, action: PiiAction) -> Self {
        self.pii_rules.push(PiiRule { entity, action });
        self
    }

    pub fn with_blocked_term(mut self, term: impl Into<String>) -> Self {
        self.blocked_terms.insert(term.into());
        self
    }

    pub fn with_blocked_intent(mut self, intent: BlockedIntent) -> Self {
        self.blocked_intents.insert(intent);
        self
    }

    pub fn with_messaging(
        mut self,
        blocked_input_message: impl Into<String>,
        blocked_output_message: impl Into<String>,
    ) -> Self {
        self.messaging = Messaging {
            blocked_input_message: blocked_input_message.into(),
            blocked_output_message: blocked_output_message.into(),
        };
        self
    }

    /// `<environment>/<name>`, the key used for per-resource serialization
    /// and handle persistence.
    pub fn identity(&self) -> String {
        format!("{}/{}", self.environment, self.name)
    }

    /// Name of the remote guardrail: `<name>-<environment>`.
    ///
    /// Environments may not contain '-', so the last '-' always separates
    /// the two parts and distinct identities never share a remote name.
    pub fn remote_name(&self) -> String {
        format!("{}-{}", self.name, self.environment)
    }

    /// Check the descriptor against the remote service's constraints.
    ///
    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut problems = Vec::new();

        let name_ok = check_identifier("name", &self.name, true, &mut problems);
        let env_ok = check_identifier("environment", &self.environment, false, &mut problems);
        if name_ok && env_ok {
            let remote_name = self.remote_name();
            if remote_name.chars().count() > MAX_NAME_LEN {
                problems.push(format!(
                    "remote name '{}' exceeds {} characters; shorten name or environment",
                    remote_name, MAX_NAME_LEN
                ));
            }
        }

        let mut seen_categories = HashSet::new();
        for filter in &self.content_filters {
            if !seen_categories.insert(filter.category) {
                problems.push(format!(
                    "content filter category '{}' is listed more than once",
                    filter.category
                ));
            }
        }

        let mut seen_entities = HashSet::new();
        for rule in &self.pii_rules {
            if !seen_entities.insert(rule.entity) {
                problems.push(format!(
                    "PII entity '{}' is listed more than once",
                    rule.entity
                ));
            }
        }

        for term in &self.blocked_terms {
            if term.trim().is_empty() {
                problems.push("blocked terms must not be blank".to_string());
            } else if term.chars().count() > MAX_TERM_LEN {
                problems.push(format!(
                    "blocked term '{}…' exceeds {} characters",
                    term.chars().take(20).collect::<String>(),
                    MAX_TERM_LEN
                ));
            }
        }

        check_message(
            "blocked_input_message",
            &self.messaging.blocked_input_message,
            &mut problems,
        );
        check_message(
            "blocked_output_message",
            &self.messaging.blocked_output_message,
            &mut problems,
        );

        if self.content_filters.is_empty()
            && self.pii_rules.is_empty()
            && self.blocked_terms.is_empty()
            && self.blocked_intents.is_empty()
        {
            problems.push(
                "policy configures nothing: add a content filter, PII rule, blocked term, or blocked intent"
                    .to_string(),
            );
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(PolicyError::Invalid { problems })
        }
    }

    /// Parse a descriptor from YAML text. JSON is valid YAML, so this
    /// accepts both.
    pub fn from_yaml_str(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }

    /// Load a descriptor from a `.yaml`/`.yml`/`.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PolicyError::IoError {
            path: path.display().to_string(),
            source,
        })?;

        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let parsed = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            Self::from_yaml_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|reason| PolicyError::ParseError {
            path: path.display().to_string(),
            reason,
        })
    }
}

/// Returns whether `value` passed.
fn check_identifier(field: &str, value: &str, allow_dash: bool, problems: &mut Vec<String>) -> bool {
    if value.is_empty() {
        problems.push(format!("{} must not be empty", field));
        return false;
    }
    let before = problems.len();
    if value.chars().count() > MAX_NAME_LEN {
        problems.push(format!("{} exceeds {} characters", field, MAX_NAME_LEN));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || c == '_' || (allow_dash && c == '-');
    if !value.chars().all(allowed) {
        let charset = if allow_dash {
            "letters, digits, '-' and '_'"
        } else {
            "letters, digits and '_'"
        };
        problems.push(format!("{} '{}' may only contain {}", field, value, charset));
    }
    problems.len() == before
}

fn check_message(field: &str, value: &str, problems: &mut Vec<String>) {
    if value.trim().is_empty() {
        problems.push(format!("messaging.{} must not be blank", field));
    } else if value.chars().count() > MAX_MESSAGE_LEN {
        problems.push(format!(
            "messaging.{} exceeds {} characters",
            field, MAX_MESSAGE_LEN
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn safety_dev() -> PolicyDescriptor {
        PolicyDescriptor::new("safety", "dev")
            .with_blocked_term("hack")
            .with_blocked_term("exploit")
    }

    #[test]
    fn minimal_descriptor_validates() {
        assert!(safety_dev().validate().is_ok());
    }

    #[test]
    fn identity_and_remote_name() {
        let d = safety_dev();
        assert_eq!(d.identity(), "dev/safety");
        assert_eq!(d.remote_name(), "safety-dev");
    }

    #[test]
    fn empty_policy_is_rejected() {
        let err = PolicyDescriptor::new("safety", "dev").validate().unwrap_err();
        assert_eq!(err.problems().len(), 1);
        assert!(err.problems()[0].contains("configures nothing"));
    }

    #[test]
    fn all_problems_are_reported_together() {
        let d = PolicyDescriptor::new("", "prod env")
            .with_filter(
                FilterCategory::Hate,
                FilterStrength::High,
                FilterStrength::High,
            )
            .with_filter(FilterCategory::Hate, FilterStrength::Low, FilterStrength::Low)
            .with_pii_rule(PiiEntity::Email, PiiAction::Mask)
            .with_pii_rule(PiiEntity::Email, PiiAction::Block)
            .with_blocked_term("  ")
            .with_messaging("", "ok");

        let err = d.validate().unwrap_err();
        let problems = err.problems();
        assert!(problems.iter().any(|p| p == "name must not be empty"));
        assert!(problems.iter().any(|p| p.starts_with("environment 'prod env'")));
        assert!(problems.iter().any(|p| p.contains("'hate'")));
        assert!(problems.iter().any(|p| p.contains("'email'")));
        assert!(problems.iter().any(|p| p.contains("blank")));
        assert!(problems
            .iter()
            .any(|p| p.contains("blocked_input_message")));
        assert_eq!(problems.len(), 6);
    }

    #[test]
    fn overlong_values_are_rejected() {
        let long_name = "n".repeat(MAX_NAME_LEN + 1);
        let d = PolicyDescriptor::new(long_name, "dev")
            .with_blocked_term("t".repeat(MAX_TERM_LEN + 1))
            .with_messaging("m".repeat(MAX_MESSAGE_LEN + 1), "fine");
        let err = d.validate().unwrap_err();
        assert_eq!(err.problems().len(), 3);
    }

    #[test]
    fn distinct_identities_never_share_a_remote_name() {
        let a = PolicyDescriptor::new("a-b", "c").with_blocked_term("hack");
        let b = PolicyDescriptor::new("a", "b-c").with_blocked_term("hack");
        assert!(a.validate().is_ok());

        let err = b.validate().unwrap_err();
        assert!(err.problems()[0].starts_with("environment 'b-c' may only contain"));

        let b = PolicyDescriptor::new("a", "b_c").with_blocked_term("hack");
        assert!(b.validate().is_ok());
        assert_ne!(a.remote_name(), b.remote_name());
    }

    #[test]
    fn combined_remote_name_respects_length_limit() {
        let fits = PolicyDescriptor::new("n".repeat(46), "dev").with_blocked_term("hack");
        assert_eq!(fits.remote_name().len(), MAX_NAME_LEN);
        assert!(fits.validate().is_ok());

        let too_long = PolicyDescriptor::new("n".repeat(47), "dev").with_blocked_term("hack");
        let err = too_long.validate().unwrap_err();
        assert_eq!(err.problems().len(), 1);
        assert!(err.problems()[0].starts_with("remote name"));
    }

    #[test]
    fn blocked_terms_are_a_set() {
        let d = safety_dev().with_blocked_term("hack");
        assert_eq!(d.blocked_terms.len(), 2);
    }

    #[test]
    fn yaml_descriptor_with_defaults() {
        let yaml = r#"
name: safety
environment: dev
content_filters:
  - category: violence
    input_strength: high
    output_strength: medium
pii_rules:
  - entity: credit_card
    action: block
blocked_intents: [jailbreak, malware_generation]
"#;
        let d = PolicyDescriptor::from_yaml_str(yaml).unwrap();
        assert_eq!(d.content_filters[0].category, FilterCategory::Violence);
        assert_eq!(d.pii_rules[0].action, PiiAction::Block);
        assert!(d.blocked_intents.contains(&BlockedIntent::Jailbreak));
        assert!(d.blocked_terms.is_empty());
        // Messaging falls back to the service default.
        assert_eq!(d.messaging, Messaging::default());
        assert!(d.validate().is_ok());
    }

    #[test]
    fn unknown_category_fails_to_parse() {
        let yaml = r#"
name: safety
environment: dev
content_filters:
  - category: gambling
    input_strength: high
    output_strength: high
"#;
        assert!(PolicyDescriptor::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn load_from_json_and_yaml_files() {
        let dir = tempdir().unwrap();

        let json_path = dir.path().join("policy.json");
        std::fs::write(
            &json_path,
            serde_json::to_string(&safety_dev()).unwrap(),
        )
        .unwrap();
        assert_eq!(PolicyDescriptor::load(&json_path).unwrap(), safety_dev());

        let yaml_path = dir.path().join("policy.yaml");
        std::fs::write(
            &yaml_path,
            "name: safety\nenvironment: dev\nblocked_terms: [exploit, hack]\n",
        )
        .unwrap();
        assert_eq!(PolicyDescriptor::load(&yaml_path).unwrap(), safety_dev());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = PolicyDescriptor::load(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, PolicyError::IoError { .. }));
    }
}
