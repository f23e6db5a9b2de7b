//! Phase prompt rendering.
//!
//! Each phase has its own role template; all of them include the shared task
//! pack context (descriptor summary, spec, risk notes, acceptance as YAML).

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::Phase;
use crate::io::taskpack::TaskPack;

const CONTEXT_TEMPLATE: &str = include_str!("prompts/context.md");
const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const IMPLEMENTER_TEMPLATE: &str = include_str!("prompts/implementer.md");
const VERIFIER_TEMPLATE: &str = include_str!("prompts/verifier.md");
const SECURITY_TEMPLATE: &str = include_str!("prompts/security.md");
const PR_AUTHOR_TEMPLATE: &str = include_str!("prompts/pr_author.md");

/// Task pack fields exposed to templates.
#[derive(Debug, Clone, Serialize)]
struct TaskPackContext<'a> {
    id: &'a str,
    title: &'a str,
    path: String,
    allow_network: &'static str,
    allow_cloud_mutations: &'static str,
    allowed_paths: &'a [String],
    spec: &'a str,
    risk: &'a str,
}

impl<'a> TaskPackContext<'a> {
    fn from_taskpack(taskpack: &'a TaskPack) -> Self {
        Self {
            id: &taskpack.id,
            title: &taskpack.title,
            path: taskpack.path.to_string_lossy().replace('\\', "/"),
            allow_network: flag(taskpack.constraints.allow_network),
            allow_cloud_mutations: flag(taskpack.constraints.allow_cloud_mutations),
            allowed_paths: &taskpack.allowed_paths,
            spec: taskpack.spec.trim(),
            risk: taskpack.risk.trim(),
        }
    }
}

/// Constraint flags always render as `True`/`False`.
fn flag(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("context", CONTEXT_TEMPLATE)
            .expect("context template should be valid");
        for phase in Phase::ALL {
            env.add_template(phase.as_str(), template_for(phase))
                .expect("phase template should be valid");
        }
        Self { env }
    }

    /// Render the prompt for `phase`.
    pub fn render(&self, taskpack: &TaskPack, phase: Phase) -> Result<String> {
        let acceptance = serde_yaml::to_string(&taskpack.acceptance)
            .context("serialize acceptance for prompt")?;
        let template = self.env.get_template(phase.as_str())?;
        let rendered = template
            .render(context! {
                taskpack => TaskPackContext::from_taskpack(taskpack),
                skills => taskpack.preferred_skills.join(", "),
                acceptance => acceptance.trim_end(),
            })
            .with_context(|| format!("render {phase} prompt"))?;
        Ok(rendered.trim().to_string())
    }
}

fn template_for(phase: Phase) -> &'static str {
    match phase {
        Phase::Planner => PLANNER_TEMPLATE,
        Phase::Implementer => IMPLEMENTER_TEMPLATE,
        Phase::Verifier => VERIFIER_TEMPLATE,
        Phase::Security => SECURITY_TEMPLATE,
        Phase::PrAuthor => PR_AUTHOR_TEMPLATE,
    }
}
