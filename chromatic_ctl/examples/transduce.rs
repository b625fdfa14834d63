//! Run the full transduction pipeline over a line of text and print the
//! report as JSON.
//!
//! Run with: cargo run --example transduce -- "I don't think so"

use std::env;
use std::path::Path;

use anyhow::Context;
use chromatic_ctl::{export_report, CodecTables, Pipeline, PipelineConfig};

const CONFIG_PATH: &str = "config/ctl.toml";
const PHONEME_PATH: &str = "config/phonemes.toml";
const EXPORT_DIR: &str = "out/metrics";

fn main() -> anyhow::Result<()> {
    let text = env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let text = if text.is_empty() {
        "The signal is NOT lost, is it?".to_string()
    } else {
        text
    };

    let config = load_config();
    let tables = load_tables();
    let pipeline = Pipeline::new(&config, tables).context("building pipeline")?;
    let report = pipeline.run(&text).context("running pipeline")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    eprintln!(
        "decoded: {:?}\ninterpreted: {:?}\nagreement {:.3}, coherence {:.3}, {} warnings, {} violations",
        report.decoded,
        report.interpreted,
        report.coupling.summary.mean_agreement,
        report.coupling.summary.mean_coherence,
        report.coupling.summary.warnings,
        report.coupling.summary.violations
    );

    export_report(Path::new(EXPORT_DIR), &report).context("exporting metrics")?;
    Ok(())
}

fn load_config() -> PipelineConfig {
    PipelineConfig::load_from_file(CONFIG_PATH).unwrap_or_else(|err| {
        eprintln!("Falling back to default config: {err}");
        PipelineConfig::default()
    })
}

fn load_tables() -> CodecTables {
    CodecTables::load_from_file(PHONEME_PATH).unwrap_or_else(|err| {
        eprintln!("Falling back to built-in phoneme tables: {err}");
        CodecTables::builtin()
    })
}
