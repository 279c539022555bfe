use anyhow::Result;
use tracing::info;

use crate::analysis::input_summaries;
use crate::cli::InspectArgs;
use crate::data::load_pair;
use crate::model::DatasetManifest;
use crate::util::{now_utc_string, write_json_pretty};

pub fn run(args: InspectArgs) -> Result<()> {
    let (control, test) = load_pair(&args.input)?;
    let inputs = input_summaries(&control, &test)?;

    let manifest = DatasetManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        delimiter: args.input.delimiter.clone(),
        inputs,
    };

    let manifest_path = args
        .manifest_path
        .clone()
        .unwrap_or_else(|| args.out_dir.join("dataset_manifest.json"));
    write_json_pretty(&manifest_path, &manifest)?;

    for input in &manifest.inputs {
        info!(
            group = %input.group,
            path = %input.path,
            sha256 = %input.sha256,
            rows = input.rows,
            dropped = input.rows_dropped,
            date_start = %input.date_start.clone().unwrap_or_default(),
            date_end = %input.date_end.clone().unwrap_or_default(),
            campaigns = input.campaigns.len(),
            "input inspected"
        );
    }
    info!(manifest = %manifest_path.display(), "dataset manifest written");

    Ok(())
}
