//! Variable substitution engine.
//!
//! Resolves `${NAME}` and `${NAME:-default}` references in commands and
//! environment values. Lookup priority: leg binding, then trigger-derived
//! variable, then literal environment declared on the step. An
//! unresolvable reference without a default fails the step before any
//! sandbox is started; there is no partial substitution.
//!
//! Secret-typed environment entries are never substituted here. They are
//! resolved by the scheduler immediately before step launch and the
//! resolved values go only into the sandbox request.

use crate::error::{Error, Result};
use crate::spec::{EnvValue, Leg, StepSpec};
use crate::trigger::TriggerContext;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid regex")
    })
}

/// Layered variable resolver for one (leg, trigger, step) combination.
///
/// Built fresh per step so substitution stays leg-local and cannot leak
/// across legs running concurrently.
#[derive(Debug, Clone)]
pub struct Substituter {
    layers: Vec<BTreeMap<String, String>>,
}

impl Substituter {
    pub fn new(leg: &Leg, trigger: &TriggerContext) -> Self {
        Self {
            layers: vec![leg.bindings.clone(), trigger.variables()],
        }
    }

    /// Append the step's literal environment as the lowest-priority layer.
    pub fn with_step_env(mut self, env: &BTreeMap<String, EnvValue>) -> Self {
        let literals = env
            .iter()
            .filter_map(|(k, v)| match v {
                EnvValue::Literal(s) => Some((k.clone(), s.clone())),
                EnvValue::Secret(_) => None,
            })
            .collect();
        self.layers.push(literals);
        self
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.layers
            .iter()
            .find_map(|layer| layer.get(name))
            .map(String::as_str)
    }

    /// Substitute every reference in `input`. `location` names the field
    /// being substituted for error reporting.
    pub fn substitute(&self, input: &str, location: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for caps in reference_re().captures_iter(input) {
            let whole = caps.get(0).expect("match");
            let name = caps.get(1).expect("name").as_str();
            out.push_str(&input[last..whole.start()]);
            match self.resolve(name) {
                Some(value) => out.push_str(value),
                None => match caps.get(2) {
                    Some(default) => out.push_str(default.as_str()),
                    None => {
                        return Err(Error::Substitution {
                            name: name.to_string(),
                            location: location.to_string(),
                        });
                    }
                },
            }
            last = whole.end();
        }
        out.push_str(&input[last..]);
        Ok(out)
    }
}

/// A step with every reference resolved, ready for scheduling.
///
/// Secret entries stay as name pairs (env var → secret name) until the
/// scheduler resolves them right before launch.
#[derive(Debug, Clone)]
pub struct MaterializedStep {
    pub name: String,
    pub image: String,
    pub commands: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub secret_env: BTreeMap<String, String>,
    pub on_failure: Vec<String>,
    pub working_dir: Option<String>,
}

/// Materialize a step against a leg and trigger context.
pub fn materialize(
    step: &StepSpec,
    leg: &Leg,
    trigger: &TriggerContext,
) -> Result<MaterializedStep> {
    // Environment values see only leg and trigger variables, so a literal
    // cannot reference itself or a sibling.
    let env_sub = Substituter::new(leg, trigger);
    // Commands additionally see the step's literal environment.
    let cmd_sub = Substituter::new(leg, trigger).with_step_env(&step.environment);

    let loc = |field: &str| format!("step {} {}", step.name, field);

    let mut environment = BTreeMap::new();
    let mut secret_env = BTreeMap::new();
    for (key, value) in &step.environment {
        match value {
            EnvValue::Literal(raw) => {
                environment.insert(
                    key.clone(),
                    env_sub.substitute(raw, &loc(&format!("environment.{}", key)))?,
                );
            }
            EnvValue::Secret(reference) => {
                secret_env.insert(key.clone(), reference.from_secret.clone());
            }
        }
    }

    let commands = step
        .commands
        .iter()
        .map(|c| cmd_sub.substitute(c, &loc("commands")))
        .collect::<Result<Vec<_>>>()?;

    let on_failure = step
        .on_failure
        .iter()
        .map(|c| cmd_sub.substitute(c, &loc("on_failure")))
        .collect::<Result<Vec<_>>>()?;

    let image = env_sub.substitute(&step.image, &loc("image"))?;

    let working_dir = step
        .working_dir
        .as_ref()
        .map(|d| env_sub.substitute(d, &loc("working_dir")))
        .transpose()?;

    Ok(MaterializedStep {
        name: step.name.clone(),
        image,
        commands,
        environment,
        secret_env,
        on_failure,
        working_dir,
    })
}

/// Mask secret values in captured output.
pub fn mask_secrets(input: &str, secret_values: &[String]) -> String {
    let mut output = input.to_string();
    for value in secret_values {
        if !value.is_empty() {
            output = output.replace(value, "***");
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SecretReference;
    use pretty_assertions::assert_eq;

    fn leg_with(pairs: &[(&str, &str)]) -> Leg {
        let bindings = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Leg::new(0, bindings)
    }

    fn step(commands: &[&str], env: &[(&str, EnvValue)]) -> StepSpec {
        StepSpec {
            name: "build".to_string(),
            image: "rust:1.82".to_string(),
            commands: commands.iter().map(|c| c.to_string()).collect(),
            environment: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            when: Vec::new(),
            on_failure: Vec::new(),
            working_dir: None,
        }
    }

    #[test]
    fn test_leg_binding_wins_over_trigger_and_env() {
        let leg = leg_with(&[("TAG", "leg-tag")]);
        let trigger = TriggerContext::tag("v1.0.0", "abc");
        let step = step(
            &["echo ${TAG}"],
            &[("TAG", EnvValue::Literal("env-tag".to_string()))],
        );
        let m = materialize(&step, &leg, &trigger).unwrap();
        assert_eq!(m.commands, vec!["echo leg-tag"]);
    }

    #[test]
    fn test_trigger_variable_used_when_no_leg_binding() {
        let leg = leg_with(&[("ARCH", "amd64")]);
        let trigger = TriggerContext::push("main", "abc123");
        let step = step(&["./upload.sh ${ARCH}/${REF_TAG}"], &[]);
        let m = materialize(&step, &leg, &trigger).unwrap();
        assert_eq!(m.commands, vec!["./upload.sh amd64/abc123"]);
    }

    #[test]
    fn test_step_literal_env_is_lowest_priority_source() {
        let leg = leg_with(&[]);
        let trigger = TriggerContext::push("main", "abc");
        let step = step(
            &["echo ${TARGET}"],
            &[("TARGET", EnvValue::Literal("releases".to_string()))],
        );
        let m = materialize(&step, &leg, &trigger).unwrap();
        assert_eq!(m.commands, vec!["echo releases"]);
    }

    #[test]
    fn test_default_fallback() {
        let leg = leg_with(&[]);
        let trigger = TriggerContext::push("main", "abc");
        let step = step(&["echo ${MISSING:-fallback} ${EMPTY:-}"], &[]);
        let m = materialize(&step, &leg, &trigger).unwrap();
        assert_eq!(m.commands, vec!["echo fallback "]);
    }

    #[test]
    fn test_unresolved_reference_fails() {
        let leg = leg_with(&[]);
        let trigger = TriggerContext::push("main", "abc");
        let step = step(&["echo ${NOPE}"], &[]);
        let err = materialize(&step, &leg, &trigger).unwrap_err();
        assert!(matches!(err, Error::Substitution { ref name, .. } if name == "NOPE"));
    }

    #[test]
    fn test_secret_entries_are_not_substituted() {
        let leg = leg_with(&[]);
        let trigger = TriggerContext::push("main", "abc");
        let step = step(
            &["./push.sh"],
            &[(
                "TOKEN",
                EnvValue::Secret(SecretReference {
                    from_secret: "registry_token".to_string(),
                }),
            )],
        );
        let m = materialize(&step, &leg, &trigger).unwrap();
        assert!(m.environment.is_empty());
        assert_eq!(m.secret_env["TOKEN"], "registry_token");
    }

    #[test]
    fn test_substitution_is_leg_isolated() {
        let trigger = TriggerContext::push("main", "abc");
        let step = step(&["build ${ARCH}"], &[]);

        let a = materialize(&step, &leg_with(&[("ARCH", "amd64")]), &trigger).unwrap();
        let b = materialize(&step, &leg_with(&[("ARCH", "arm64")]), &trigger).unwrap();

        assert_eq!(a.commands, vec!["build amd64"]);
        assert_eq!(b.commands, vec!["build arm64"]);
    }

    #[test]
    fn test_image_is_substituted() {
        let leg = leg_with(&[("ARCH", "arm64")]);
        let trigger = TriggerContext::push("main", "abc");
        let mut s = step(&["true"], &[]);
        s.image = "builder-${ARCH}:latest".to_string();
        let m = materialize(&s, &leg, &trigger).unwrap();
        assert_eq!(m.image, "builder-arm64:latest");
    }

    #[test]
    fn test_mask_secrets() {
        let masked = mask_secrets(
            "pushing with token hunter2 done",
            &["hunter2".to_string(), String::new()],
        );
        assert_eq!(masked, "pushing with token *** done");
    }
}
