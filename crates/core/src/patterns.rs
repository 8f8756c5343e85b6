//! Instruction templates that can stand in for the initial planner call.
//!
//! Templates are registered before a run starts and only read afterwards. A
//! template that produces a wrong plan is harmless beyond cost: its steps are
//! validated like any planned step.

use crate::planning::Plan;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PatternError {
    #[error("Template already registered: {0}")]
    DuplicateTemplate(String),
    #[error("Invalid pattern for template {name}: {reason}")]
    InvalidPattern { name: String, reason: String },
    #[error("Missing binding: {0}")]
    MissingBinding(String),
    #[error("Invalid binding {name}: {reason}")]
    InvalidBinding { name: String, reason: String },
}

/// Named capture groups from a matched instruction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings(HashMap<String, String>);

impl Bindings {
    pub fn get(&self, name: &str) -> Result<&str, PatternError> {
        self.0
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| PatternError::MissingBinding(name.to_string()))
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }
}

type BuildFn = dyn Fn(&Bindings) -> Result<Plan, PatternError> + Send + Sync;

#[derive(Clone)]
pub struct Template {
    name: String,
    pattern: Regex,
    build: Arc<BuildFn>,
}

impl Template {
    pub fn new<F>(name: impl Into<String>, pattern: &str, build: F) -> Result<Self, PatternError>
    where
        F: Fn(&Bindings) -> Result<Plan, PatternError> + Send + Sync + 'static,
    {
        let name = name.into();
        let pattern = Regex::new(pattern).map_err(|e| PatternError::InvalidPattern {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            name,
            pattern,
            build: Arc::new(build),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn bind(&self, instruction: &str) -> Option<Bindings> {
        let captures = self.pattern.captures(instruction)?;
        let mut bindings = Bindings::default();
        for name in self.pattern.capture_names().flatten() {
            if let Some(value) = captures.name(name) {
                bindings.insert(name, value.as_str().trim());
            }
        }
        Some(bindings)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub template: String,
    pub plan: Plan,
}

/// Ordered template registry; earlier registrations win.
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher {
    templates: Vec<Template>,
}

impl PatternMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, template: Template) -> Result<&mut Self, PatternError> {
        if self.templates.iter().any(|t| t.name == template.name) {
            return Err(PatternError::DuplicateTemplate(template.name));
        }
        self.templates.push(template);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn template_names(&self) -> Vec<&str> {
        self.templates.iter().map(Template::name).collect()
    }

    /// First template whose pattern matches and whose plan builds cleanly.
    pub fn match_instruction(&self, instruction: &str) -> Option<PatternMatch> {
        let instruction = instruction.trim();
        for template in &self.templates {
            let Some(bindings) = template.bind(instruction) else {
                continue;
            };

            match (template.build)(&bindings) {
                Ok(plan) => match plan.validate() {
                    Ok(()) => {
                        tracing::debug!("Instruction matched template {}", template.name);
                        return Some(PatternMatch {
                            template: template.name.clone(),
                            plan,
                        });
                    }
                    Err(e) => {
                        tracing::warn!("Template {} built an invalid plan: {}", template.name, e)
                    }
                },
                Err(e) => tracing::warn!("Template {} failed to build: {}", template.name, e),
            }
        }
        None
    }
}
