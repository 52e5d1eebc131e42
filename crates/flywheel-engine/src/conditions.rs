//! When-clause evaluation.
//!
//! A clause list is a disjunction of conjunctions: the list matches if
//! at least one clause matches, and a clause matches iff every
//! sub-predicate present on it matches. Evaluation is a pure function
//! of (clauses, context, leg).

use flywheel_core::spec::{Leg, WhenClause};
use flywheel_core::trigger::{EventKind, TriggerContext};

/// Decide whether a step gated by `clauses` is included for this
/// trigger/leg combination. An empty clause list always matches.
pub fn clauses_match(clauses: &[WhenClause], ctx: &TriggerContext, leg: &Leg) -> bool {
    if clauses.is_empty() {
        return true;
    }
    clauses.iter().any(|clause| clause_matches(clause, ctx, leg))
}

fn clause_matches(clause: &WhenClause, ctx: &TriggerContext, leg: &Leg) -> bool {
    if !clause.event.is_empty() && !clause.event.contains(&ctx.event) {
        return false;
    }

    if let Some(cron) = clause.cron {
        if (ctx.event == EventKind::Cron) != cron {
            return false;
        }
    }

    if !clause.branch.is_empty() {
        let Some(branch) = &ctx.branch else {
            return false;
        };
        if !clause.branch.iter().any(|p| glob_match(p, branch)) {
            return false;
        }
    }

    if !clause.tag.is_empty() {
        let Some(tag) = &ctx.tag else {
            return false;
        };
        if !clause.tag.iter().any(|p| glob_match(p, tag)) {
            return false;
        }
    }

    // Axes omitted from the matcher are unconstrained.
    clause
        .matrix
        .iter()
        .all(|(axis, value)| leg.get(axis) == Some(value.as_str()))
}

fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return text.starts_with(prefix);
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        let prefix_slash = format!("{}/", prefix);
        if text.starts_with(&prefix_slash) {
            return !text[prefix_slash.len()..].contains('/');
        }
        return false;
    }
    if pattern.contains('*') {
        let parts: Vec<&str> = pattern.split('*').collect();
        if parts.len() == 2 {
            return text.starts_with(parts[0]) && text.ends_with(parts[1]);
        }
    }
    pattern == text
}
