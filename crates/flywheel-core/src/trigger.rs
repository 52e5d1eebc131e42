//! Trigger context supplied once per pipeline run.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    Tag,
    PullRequest,
    Cron,
    Manual,
    Deployment,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Push => "push",
            EventKind::Tag => "tag",
            EventKind::PullRequest => "pull_request",
            EventKind::Cron => "cron",
            EventKind::Manual => "manual",
            EventKind::Deployment => "deployment",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventKind::Push),
            "tag" => Ok(EventKind::Tag),
            "pull_request" => Ok(EventKind::PullRequest),
            "cron" => Ok(EventKind::Cron),
            "manual" => Ok(EventKind::Manual),
            "deployment" => Ok(EventKind::Deployment),
            other => Err(format!("unknown event kind: {}", other)),
        }
    }
}

/// The event that started a run. Immutable for the run's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriggerContext {
    pub event: EventKind,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    pub commit: String,
    /// Caller-supplied variables, layered over the derived set.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl TriggerContext {
    pub fn push(branch: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            event: EventKind::Push,
            branch: Some(branch.into()),
            tag: None,
            commit: commit.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn tag(tag: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            event: EventKind::Tag,
            branch: None,
            tag: Some(tag.into()),
            commit: commit.into(),
            extra: BTreeMap::new(),
        }
    }

    /// The tag name when the run was tag-triggered, otherwise the commit sha.
    pub fn ref_tag(&self) -> &str {
        match (&self.event, &self.tag) {
            (EventKind::Tag, Some(tag)) => tag,
            _ => &self.commit,
        }
    }

    /// Variables derived from the trigger, available to substitution.
    pub fn variables(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert("COMMIT".to_string(), self.commit.clone());
        vars.insert("EVENT".to_string(), self.event.to_string());
        vars.insert(
            "BRANCH".to_string(),
            self.branch.clone().unwrap_or_default(),
        );
        vars.insert("TAG".to_string(), self.tag.clone().unwrap_or_default());
        vars.insert("REF_TAG".to_string(), self.ref_tag().to_string());
        vars.extend(self.extra.clone());
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_tag_prefers_tag_on_tag_event() {
        let ctx = TriggerContext::tag("v1.2.0", "abc123");
        assert_eq!(ctx.ref_tag(), "v1.2.0");
    }

    #[test]
    fn test_ref_tag_falls_back_to_commit() {
        let ctx = TriggerContext::push("main", "abc123");
        assert_eq!(ctx.ref_tag(), "abc123");

        // A stray tag on a non-tag event does not win
        let ctx = TriggerContext {
            event: EventKind::Push,
            branch: Some("main".to_string()),
            tag: Some("v9.9.9".to_string()),
            commit: "abc123".to_string(),
            extra: BTreeMap::new(),
        };
        assert_eq!(ctx.ref_tag(), "abc123");
    }

    #[test]
    fn test_derived_variables() {
        let ctx = TriggerContext::tag("v1.0.0", "deadbeef");
        let vars = ctx.variables();
        assert_eq!(vars["COMMIT"], "deadbeef");
        assert_eq!(vars["TAG"], "v1.0.0");
        assert_eq!(vars["REF_TAG"], "v1.0.0");
        assert_eq!(vars["EVENT"], "tag");
        assert_eq!(vars["BRANCH"], "");
    }

    #[test]
    fn test_extra_variables_layer_over_derived() {
        let mut ctx = TriggerContext::push("main", "abc123");
        ctx.extra.insert("REGION".to_string(), "us-east-1".to_string());
        ctx.extra.insert("BRANCH".to_string(), "override".to_string());

        let vars = ctx.variables();
        assert_eq!(vars["REGION"], "us-east-1");
        assert_eq!(vars["BRANCH"], "override");
    }
}
