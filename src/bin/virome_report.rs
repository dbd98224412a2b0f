use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;

use virome_rs::config::AnalysisConfig;
use virome_rs::run_analysis;

fn spinner(color: &str, msg: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template(&format!("{{spinner:.{color}}} {{msg}}"))
            .expect("Invalid spinner template"),
    );
    spinner.set_message(msg);
    spinner
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Paths come from the DATA_DIR constant in `config`.
    let config = AnalysisConfig::default();

    // 1. Load, reconcile and join
    let pb = spinner("blue", "Loading tables and reconciling samples...");
    let results = match run_analysis(&config) {
        Ok(r) => r,
        Err(e) => {
            pb.abandon_with_message("Analysis aborted.");
            return Err(e.into());
        }
    };
    pb.finish_with_message(format!(
        "Joined {} records over {} samples ({} diagnostic(s)).",
        results.abundance.records().len(),
        results.abundance.samples().len(),
        results.diagnostics.len()
    ));

    // 2. Summaries
    let pb = spinner("green", "Summarising target kingdom...");
    let target = results.target_view();
    let condensed = results.condensed_heatmap();
    pb.finish_with_message(format!(
        "{}: {} reads across {} taxa; condensed heatmap keeps {} rows.",
        results.target_kingdom,
        target.total_count(),
        target.tax_ids().len(),
        condensed.rows.len()
    ));

    // 3. Outputs
    let pb = spinner("yellow", "Writing report tables...");
    let written = results.write_reports(&config.output_dir)?;
    pb.finish_with_message(format!(
        "Wrote {} file(s) to {}.",
        written.len(),
        config.output_dir.display()
    ));

    if results.diagnostics.iter().any(|d| d.is_key_mismatch()) {
        log::warn!("Some samples lost metadata:\n{}", results.get_reconciliation_report());
    }
    Ok(())
}
