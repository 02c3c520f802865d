//! `estimate_cost`: projected credits for a planned batch of calls.

use std::fmt::Write as _;

use async_trait::async_trait;
use genmedia_core::{MediaError, MediaResult, ModelCategory, ModelDescriptor, Validator};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, MediaTool};
use crate::context::ToolContext;
use crate::ToolResult;

/// Largest batch an estimate covers.
pub const MAX_OPERATIONS: u32 = 1000;

/// Arguments for `estimate_cost`.
#[derive(Debug, Clone, Deserialize)]
pub struct EstimateCostArgs {
    /// Model to price.
    pub model: Option<String>,
    /// Price every model in this category instead.
    pub category: Option<String>,
    /// Number of planned calls.
    pub operations: Option<u32>,
    /// Also fetch the live balance.
    #[serde(default)]
    pub check_balance: bool,
}

impl EstimateCostArgs {
    fn validate(&self) -> MediaResult<()> {
        Validator::new()
            .model_id(self.model.as_deref())
            .range("operations", self.operations, 1.0, f64::from(MAX_OPERATIONS))
            .finish()
    }

    fn operations(&self) -> u32 {
        self.operations.unwrap_or(1)
    }
}

/// Price estimate for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    /// Model id.
    pub model_id: String,
    /// Display name.
    pub name: String,
    /// Credits per call.
    pub per_call: f64,
    /// Whether `per_call` is an observed average rather than the declared price.
    pub observed: bool,
    /// Number of observations behind the average.
    pub samples: u64,
    /// `per_call` times the number of operations.
    pub projected: f64,
}

/// Price one model from observed averages, falling back to the declared cost.
#[must_use]
pub fn estimate(ctx: &ToolContext, model: &ModelDescriptor, operations: u32) -> Estimate {
    let stats = ctx.costs.stats(&model.id).filter(|s| s.sample_count > 0);
    let per_call = stats.map_or(model.credits_per_use, |s| s.average);
    Estimate {
        model_id: model.id.clone(),
        name: model.name.clone(),
        per_call,
        observed: stats.is_some(),
        samples: stats.map_or(0, |s| s.sample_count),
        projected: per_call * f64::from(operations),
    }
}

fn models_to_price<'c>(
    ctx: &'c ToolContext,
    args: &EstimateCostArgs,
) -> MediaResult<Vec<&'c ModelDescriptor>> {
    if let Some(id) = args.model.as_deref() {
        return Ok(vec![ctx.catalog.require_model(id)?]);
    }
    match args.category.as_deref() {
        Some(name) => {
            let category = ModelCategory::parse(name).ok_or_else(|| {
                MediaError::InvalidInput(format!(
                    "Unknown category {name}; expected one of {}",
                    category_names()
                ))
            })?;
            Ok(ctx.catalog.models_by_category(category))
        }
        None => Ok(ctx.catalog.models().collect()),
    }
}

pub(crate) fn category_names() -> String {
    ModelCategory::ALL
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The `estimate_cost` tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimateCost;

#[async_trait]
impl MediaTool for EstimateCost {
    fn name(&self) -> &'static str {
        "estimate_cost"
    }

    fn description(&self) -> &'static str {
        "Estimate the credits a planned number of calls will consume, for one model, \
         a category or the whole catalog. Uses observed averages where available. \
         Optionally checks the live balance."
    }

    fn input_schema(&self) -> Value {
        let categories: Vec<&str> = ModelCategory::ALL.iter().map(|c| c.as_str()).collect();
        json!({
            "type": "object",
            "properties": {
                "model": { "type": "string" },
                "category": { "type": "string", "enum": categories },
                "operations": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_OPERATIONS,
                    "default": 1
                },
                "check_balance": { "type": "boolean", "default": false }
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let args: EstimateCostArgs = parse_args(args)?;
        args.validate()?;
        let operations = args.operations();
        let estimates: Vec<Estimate> = models_to_price(ctx, &args)?
            .into_iter()
            .map(|model| estimate(ctx, model, operations))
            .collect();

        let mut text = format!("Cost estimate for {operations} operation(s):\n");
        for e in &estimates {
            let basis = if e.observed {
                format!("observed average over {} call(s)", e.samples)
            } else {
                "declared price".to_string()
            };
            let _ = writeln!(
                text,
                "- {} ({}): {:.2} credits/call ({basis}), total {:.2}",
                e.name, e.model_id, e.per_call, e.projected
            );
        }

        if args.check_balance {
            let needed = estimates.iter().map(|e| e.projected).fold(0.0_f64, f64::max);
            let credits = ctx.transport.credit_balance().await?;
            match credits.remaining {
                Some(remaining) if remaining >= needed => {
                    let _ = write!(
                        text,
                        "Balance: {remaining:.2} credits, enough for the projected {needed:.2}."
                    );
                }
                Some(remaining) => {
                    let _ = write!(
                        text,
                        "Balance: {remaining:.2} credits, NOT enough for the projected {needed:.2}."
                    );
                }
                None => text.push_str("Balance: unavailable from the API."),
            }
        }

        Ok(ToolResult::text(text.trim_end()))
    }
}
