use std::env;
use std::path::PathBuf;

use pitfeat::{
    build_config_from_env, build_feature_table, init_logging, load_table, log_app_start,
    log_build_summary, logging_config_from_env, stage_feature_csv, write_feature_sqlite,
};

const BINARY: &str = "build_features";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;

    let cfg = build_config_from_env()?;
    log_app_start(BINARY, &logging, &cfg);

    let monthly_path = env_path("PITFEAT_MONTHLY_PATH")
        .ok_or("PITFEAT_MONTHLY_PATH must point at the monthly panel (CSV or zipped CSV)")?;
    let output_path = env_path("PITFEAT_OUTPUT_PATH")
        .unwrap_or_else(|| PathBuf::from("data/features.csv"));

    let monthly = load_table(&monthly_path)?;
    let statics = env_path("PITFEAT_STATIC_PATH")
        .map(|path| load_table(&path))
        .transpose()?;

    let table = build_feature_table(&monthly, statics.as_ref(), &cfg)?;
    // The CSV stays under its temp name until every sink has succeeded.
    let staged = stage_feature_csv(&table, &output_path)?;
    if let Some(db_path) = env_path("PITFEAT_SQLITE_PATH") {
        let table_name = env::var("PITFEAT_SQLITE_TABLE").unwrap_or_else(|_| "features".to_string());
        write_feature_sqlite(&table, &db_path, table_name.trim())?;
    }
    let report = staged.publish()?;

    log_build_summary(BINARY, &table.summary);
    println!(
        "Wrote {} rows x {} columns to {} (label_rate={:.4}, sha256={})",
        table.summary.rows,
        table.summary.columns,
        report.path.display(),
        table.summary.label_rate,
        report.sha256
    );
    println!("{}", serde_json::to_string_pretty(&table.summary)?);

    Ok(())
}

fn env_path(var: &str) -> Option<PathBuf> {
    env::var(var)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}
