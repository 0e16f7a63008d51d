use clap::Args;
use serde_json::Value;

use deal_engine_core::appraisal::{self, DealAppraisalInput};

use crate::input;

/// Arguments for a full development appraisal
#[derive(Args)]
pub struct AppraiseArgs {
    /// Path to JSON/YAML deal file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_appraise(args: AppraiseArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let deal: DealAppraisalInput = input::load(args.input.as_deref())?
        .ok_or("--input <deal.json|deal.yaml> or stdin required for an appraisal")?;
    let result = appraisal::appraise_deal(&deal)?;
    Ok(serde_json::to_value(result)?)
}
