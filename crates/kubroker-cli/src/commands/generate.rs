use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use kubroker_core::catalog::GENERATED_SUFFIX;
use kubroker_core::{OfferingConfig, generate_offering};

use crate::cli::GenerateArgs;
use crate::output::{print_success, print_warning};

pub fn run(args: &GenerateArgs) -> Result<()> {
    let written = generate_dir(&args.input, &args.output, args.force)?;
    if written.is_empty() {
        print_warning(&format!(
            "No offering configs found in {}",
            args.input.display()
        ));
        return Ok(());
    }
    for path in &written {
        print_success(&format!("Wrote {}", path.display()));
    }
    Ok(())
}

/// Generates one descriptor per `*.json` config in `input`, returning the written paths.
fn generate_dir(input: &Path, output: &Path, force: bool) -> Result<Vec<PathBuf>> {
    let mut configs = fs::read_dir(input)
        .with_context(|| format!("Failed to read {}", input.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to list {}", input.display()))?;
    configs.retain(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"));
    configs.sort();

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let mut written = Vec::with_capacity(configs.len());
    for path in configs {
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: OfferingConfig = serde_json::from_str(&data)
            .with_context(|| format!("Invalid offering config {}", path.display()))?;
        if config.name.trim().is_empty() {
            bail!("Offering config {} has no name", path.display());
        }

        let target = output.join(format!("{}{GENERATED_SUFFIX}", config.name));
        if target.exists() && !force {
            bail!(
                "{} already exists; regenerating assigns new service and plan IDs (use --force)",
                target.display()
            );
        }

        let offering = generate_offering(&config)
            .with_context(|| format!("Failed to generate offering {}", config.name))?;
        let json = serde_json::to_string_pretty(&offering)?;
        fs::write(&target, json).with_context(|| format!("Failed to write {}", target.display()))?;
        written.push(target);
    }
    Ok(written)
}
