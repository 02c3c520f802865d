//! `list_models`: browse the catalog.

use std::fmt::Write as _;

use async_trait::async_trait;
use genmedia_core::{Catalog, MediaError, MediaResult, ModelCategory, ModelDescriptor};
use serde::Deserialize;
use serde_json::{json, Value};

use super::estimate_cost::category_names;
use super::{parse_args, MediaTool};
use crate::context::ToolContext;
use crate::ToolResult;

/// Arguments for `list_models`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListModelsArgs {
    /// Only list this category.
    pub category: Option<String>,
}

impl ListModelsArgs {
    fn categories(&self) -> MediaResult<Vec<ModelCategory>> {
        match self.category.as_deref() {
            None => Ok(ModelCategory::ALL.to_vec()),
            Some(name) => ModelCategory::parse(name).map(|c| vec![c]).ok_or_else(|| {
                MediaError::InvalidInput(format!(
                    "Unknown category {name}; expected one of {}",
                    category_names()
                ))
            }),
        }
    }
}

fn describe(model: &ModelDescriptor) -> String {
    let mut line = format!(
        "- {} ({}): ~{} credits, ~{}s",
        model.id, model.name, model.credits_per_use, model.estimated_time_seconds
    );
    if model.async_job {
        line.push_str(", queued job");
    }
    if !model.supported_formats.is_empty() {
        let _ = write!(line, ", formats: {}", model.supported_formats.join("/"));
    }
    line
}

/// Render the catalog grouped by category.
#[must_use]
pub fn render_catalog(catalog: &Catalog, categories: &[ModelCategory]) -> String {
    let mut text = String::new();
    for &category in categories {
        let models = catalog.models_by_category(category);
        if models.is_empty() {
            continue;
        }
        let _ = writeln!(text, "## {category}");
        for model in models {
            let _ = writeln!(text, "{}", describe(model));
        }
        text.push('\n');
    }
    text.trim_end().to_string()
}

/// The `list_models` tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListModels;

#[async_trait]
impl MediaTool for ListModels {
    fn name(&self) -> &'static str {
        "list_models"
    }

    fn description(&self) -> &'static str {
        "List the available generation models with their price and typical run time, \
         optionally filtered by category."
    }

    fn input_schema(&self) -> Value {
        let categories: Vec<&str> = ModelCategory::ALL.iter().map(|c| c.as_str()).collect();
        json!({
            "type": "object",
            "properties": {
                "category": { "type": "string", "enum": categories }
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let args: ListModelsArgs = parse_args(args)?;
        let categories = args.categories()?;
        Ok(ToolResult::text(render_catalog(&ctx.catalog, &categories)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_listing_has_a_heading_per_category() {
        let catalog = Catalog::builtin().unwrap();
        let text = render_catalog(&catalog, &ModelCategory::ALL);
        for category in ModelCategory::ALL {
            assert!(text.contains(&format!("## {category}")), "{category}");
        }
        assert!(text.contains("kling-2.1"));
        assert!(text.contains("queued job"));
    }

    #[test]
    fn filter_limits_the_listing() {
        let args: ListModelsArgs = parse_args(json!({"category": "text-to-speech"})).unwrap();
        let catalog = Catalog::builtin().unwrap();
        let text = render_catalog(&catalog, &args.categories().unwrap());
        assert!(text.contains("dia"));
        assert!(!text.contains("sdxl"));
    }

    #[test]
    fn unknown_category_is_invalid_input() {
        let args: ListModelsArgs = parse_args(json!({"category": "3d"})).unwrap();
        assert!(matches!(args.categories(), Err(MediaError::InvalidInput(_))));
    }
}
