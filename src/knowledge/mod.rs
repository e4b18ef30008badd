//! Site knowledge: per-host notes and annotation rules selected by URL path.
//!
//! Built-in knowledge ships in `builtin.json`; users add their own through the
//! settings document. For a URL the resolver follows host redirects, then
//! merges every rule whose path regex matches, built-in rules first.

use crate::error::{AgentError, Result};
use indexmap::IndexMap;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

const BUILTIN_KNOWLEDGE: &str = include_str!("builtin.json");

/// Redirect chains longer than this are treated as cycles
const MAX_REDIRECTS: usize = 8;

/// Directs the grounder to label elements a generic pass would miss
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRule {
    pub selector: String,

    /// Fixed name for matched elements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_static_name: Option<String>,

    /// Attribute whose value names matched elements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_attribute_as_name: Option<String>,

    #[serde(default)]
    pub allow_invisible: bool,

    #[serde(default)]
    pub allow_covered: bool,

    #[serde(default)]
    pub allow_aria_hidden: bool,
}

impl AnnotationRule {
    pub fn new(selector: impl Into<String>) -> Self {
        Self { selector: selector.into(), ..Default::default() }
    }

    /// Builder method: fixed name
    pub fn with_static_name(mut self, name: impl Into<String>) -> Self {
        self.use_static_name = Some(name.into());
        self
    }

    /// Builder method: name from attribute
    pub fn with_attribute_as_name(mut self, attribute: impl Into<String>) -> Self {
        self.use_attribute_as_name = Some(attribute.into());
        self
    }

    /// Builder method: label even when not visible
    pub fn allow_invisible(mut self) -> Self {
        self.allow_invisible = true;
        self
    }

    /// Builder method: label even when another element covers it
    pub fn allow_covered(mut self) -> Self {
        self.allow_covered = true;
        self
    }

    /// Builder method: label even with `aria-hidden="true"`
    pub fn allow_aria_hidden(mut self) -> Self {
        self.allow_aria_hidden = true;
        self
    }
}

/// Knowledge applying to one page
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Knowledge {
    #[serde(default)]
    pub notes: Vec<String>,

    #[serde(default)]
    pub annotation_rules: Vec<AnnotationRule>,
}

impl Knowledge {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.annotation_rules.is_empty()
    }

    fn extend(&mut self, other: &Knowledge) {
        self.notes.extend(other.notes.iter().cloned());
        self.annotation_rules.extend(other.annotation_rules.iter().cloned());
    }
}

/// Knowledge selected by a set of path regexes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeRule {
    pub regexes: Vec<String>,
    pub knowledge: Knowledge,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostKnowledge {
    #[serde(default)]
    pub rules: Vec<KnowledgeRule>,
}

/// Knowledge keyed by host name
pub type HostKnowledgeBase = IndexMap<String, HostKnowledge>;

#[derive(Debug, Clone, Default, Deserialize)]
struct BuiltinKnowledge {
    #[serde(default)]
    redirects: HashMap<String, String>,
    #[serde(default)]
    hosts: HostKnowledgeBase,
}

/// Resolves the knowledge for a URL
#[derive(Debug, Clone)]
pub struct KnowledgeResolver {
    redirects: HashMap<String, String>,
    builtin: HostKnowledgeBase,
    custom: HostKnowledgeBase,
}

impl KnowledgeResolver {
    /// Resolver over the bundled knowledge and `custom`
    pub fn new(custom: HostKnowledgeBase) -> Result<Self> {
        let builtin: BuiltinKnowledge = serde_json::from_str(BUILTIN_KNOWLEDGE)
            .map_err(|e| AgentError::Config(format!("bundled knowledge is invalid: {}", e)))?;
        Ok(Self { redirects: builtin.redirects, builtin: builtin.hosts, custom })
    }

    /// Resolver without bundled knowledge
    pub fn from_parts(redirects: HashMap<String, String>, builtin: HostKnowledgeBase, custom: HostKnowledgeBase) -> Self {
        Self { redirects, builtin, custom }
    }

    /// Knowledge for `url`; empty for unparsable URLs and unknown hosts
    pub fn resolve(&self, url: &str) -> Knowledge {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::debug!("no knowledge for unparsable url `{}`: {}", url, e);
                return Knowledge::default();
            }
        };
        let Some(host) = parsed.host_str() else {
            return Knowledge::default();
        };

        self.resolve_location(host, parsed.path())
    }

    /// Knowledge for a host and path pair
    pub fn resolve_location(&self, host: &str, pathname: &str) -> Knowledge {
        let host = self.follow_redirects(host);

        let mut result = Knowledge::default();
        for source in [&self.builtin, &self.custom] {
            if let Some(host_data) = source.get(host) {
                merge_matching(&mut result, host_data, pathname);
            }
        }
        result
    }

    fn follow_redirects<'a>(&'a self, mut host: &'a str) -> &'a str {
        for _ in 0..MAX_REDIRECTS {
            match self.redirects.get(host) {
                Some(target) if target != host => host = target,
                _ => return host,
            }
        }
        log::warn!("knowledge redirect chain for `{}` too long, stopping", host);
        host
    }
}

fn merge_matching(result: &mut Knowledge, host_data: &HostKnowledge, pathname: &str) {
    for rule in &host_data.rules {
        let matched = rule.regexes.iter().any(|pattern| match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => re.is_match(pathname),
            Err(e) => {
                log::warn!("skipping invalid knowledge regex `{}`: {}", pattern, e);
                false
            }
        });
        if matched {
            result.extend(&rule.knowledge);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(regexes: &[&str], note: &str) -> KnowledgeRule {
        KnowledgeRule {
            regexes: regexes.iter().map(|r| r.to_string()).collect(),
            knowledge: Knowledge { notes: vec![note.to_string()], annotation_rules: Vec::new() },
        }
    }

    fn base(host: &str, rules: Vec<KnowledgeRule>) -> HostKnowledgeBase {
        let mut base = HostKnowledgeBase::new();
        base.insert(host.to_string(), HostKnowledge { rules });
        base
    }

    #[test]
    fn test_builtin_merged_before_custom() {
        let resolver = KnowledgeResolver::from_parts(
            HashMap::new(),
            base("shop.test", vec![rule(&[".*"], "builtin")]),
            base("shop.test", vec![rule(&["^/cart"], "custom")]),
        );

        let knowledge = resolver.resolve("https://shop.test/cart/items");
        assert_eq!(knowledge.notes, vec!["builtin".to_string(), "custom".to_string()]);
    }

    #[test]
    fn test_path_regex_is_case_insensitive() {
        let resolver = KnowledgeResolver::from_parts(HashMap::new(), base("a.test", vec![rule(&["^/inbox"], "mail")]), HostKnowledgeBase::new());

        assert_eq!(resolver.resolve("https://a.test/INBOX/1").notes, vec!["mail".to_string()]);
        assert!(resolver.resolve("https://a.test/sent").is_empty());
    }

    #[test]
    fn test_redirect_is_followed() {
        let mut redirects = HashMap::new();
        redirects.insert("www.a.test".to_string(), "a.test".to_string());
        let resolver = KnowledgeResolver::from_parts(redirects, base("a.test", vec![rule(&[".*"], "home")]), HostKnowledgeBase::new());

        assert_eq!(resolver.resolve("https://www.a.test/").notes, vec!["home".to_string()]);
    }

    #[test]
    fn test_redirect_cycle_terminates() {
        let mut redirects = HashMap::new();
        redirects.insert("x.test".to_string(), "y.test".to_string());
        redirects.insert("y.test".to_string(), "x.test".to_string());
        let resolver = KnowledgeResolver::from_parts(redirects, HostKnowledgeBase::new(), HostKnowledgeBase::new());

        assert!(resolver.resolve("https://x.test/").is_empty());
    }

    #[test]
    fn test_invalid_regex_is_skipped() {
        let resolver = KnowledgeResolver::from_parts(
            HashMap::new(),
            base("a.test", vec![rule(&["(unclosed"], "broken"), rule(&["/ok"], "fine")]),
            HostKnowledgeBase::new(),
        );

        assert_eq!(resolver.resolve("https://a.test/ok").notes, vec!["fine".to_string()]);
    }

    #[test]
    fn test_rule_matching_several_regexes_merges_once() {
        let resolver = KnowledgeResolver::from_parts(HashMap::new(), base("a.test", vec![rule(&["/a", "/a/b"], "once")]), HostKnowledgeBase::new());

        assert_eq!(resolver.resolve("https://a.test/a/b").notes.len(), 1);
    }

    #[test]
    fn test_unknown_host_and_bad_url() {
        let resolver = KnowledgeResolver::new(HostKnowledgeBase::new()).unwrap();

        assert!(resolver.resolve("https://unknown.invalid/").is_empty());
        assert!(resolver.resolve("not a url").is_empty());
    }

    #[test]
    fn test_bundled_knowledge_parses() {
        let resolver = KnowledgeResolver::new(HostKnowledgeBase::new()).unwrap();
        let knowledge = resolver.resolve("https://www.google.com/search?q=rust");

        assert!(!knowledge.notes.is_empty());
    }

    #[test]
    fn test_annotation_rule_camel_case() {
        let json = r##"{"selector": "#go", "useStaticName": "Go", "allowCovered": true}"##;
        let rule: AnnotationRule = serde_json::from_str(json).unwrap();

        assert_eq!(rule, AnnotationRule::new("#go").with_static_name("Go").allow_covered());
    }
}
