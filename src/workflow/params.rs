// Placeholder and example-value substitution for step fields.
use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::workflow::types::{Parameter, Step, StepAction};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern compiles"));

/// A field after substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substituted {
    pub value: String,
    /// Placeholder names with no supplied value, left in place.
    pub unresolved: Vec<String>,
}

/// Substitutes parameters into one field of step `step_number`.
///
/// If a supplied parameter's recorded example value occurs verbatim in the
/// field, the whole field becomes the supplied value. Otherwise every
/// `{name}` with a supplied value is replaced.
pub fn substitute_field(
    field: &str,
    step_number: u32,
    declared: &[Parameter],
    supplied: &HashMap<String, String>,
) -> Substituted {
    for param in declared {
        let Some(value) = supplied.get(&param.name) else {
            continue;
        };
        if param.example_value.is_empty() || !param.applies_to(step_number) {
            continue;
        }
        if field.contains(param.example_value.as_str()) {
            return Substituted {
                value: value.clone(),
                unresolved: Vec::new(),
            };
        }
    }

    let mut unresolved: Vec<String> = Vec::new();
    let value = PLACEHOLDER.replace_all(field, |caps: &Captures| {
        let name = &caps[1];
        match supplied.get(name) {
            Some(value) => value.clone(),
            None => {
                if !unresolved.iter().any(|n| n == name) {
                    unresolved.push(name.to_string());
                }
                caps[0].to_string()
            }
        }
    });

    Substituted {
        value: value.into_owned(),
        unresolved,
    }
}

/// The fields of a step after substitution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedStep {
    /// Label of the element to locate.
    pub target: Option<String>,
    /// Text to type for `Type` steps.
    pub text: Option<String>,
    pub warnings: Vec<String>,
}

/// Substitutes parameters into a step's target label and typed text.
pub fn resolve_step(
    step: &Step,
    declared: &[Parameter],
    supplied: &HashMap<String, String>,
) -> ResolvedStep {
    let mut resolved = ResolvedStep::default();

    if let Some(label) = step.target_label() {
        let s = substitute_field(label, step.step_number, declared, supplied);
        resolved.warnings.extend(s.unresolved);
        resolved.target = Some(s.value);
    }
    if let StepAction::Type { text } = &step.action {
        let s = substitute_field(text, step.step_number, declared, supplied);
        for name in s.unresolved {
            if !resolved.warnings.contains(&name) {
                resolved.warnings.push(name);
            }
        }
        resolved.text = Some(s.value);
    }

    if !resolved.warnings.is_empty() {
        tracing::warn!(
            step = step.step_number,
            unresolved = ?resolved.warnings,
            "unresolved parameter placeholders"
        );
    }
    resolved
}
