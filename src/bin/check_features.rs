use std::env;
use std::path::PathBuf;

use pitfeat::{
    build_config_from_env, check_feature_table, check_written_schema, init_logging, load_table,
    logging_config_from_env, read_feature_schema, schema_sidecar_path, QualityGateSpec,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;

    let cfg = build_config_from_env()?;
    let path = env::args()
        .nth(1)
        .or_else(|| env::var("PITFEAT_OUTPUT_PATH").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/features.csv"));

    let table = load_table(&path)?;
    let report = check_feature_table(&table, &QualityGateSpec::from_config(&cfg))?;

    let sidecar = schema_sidecar_path(&path);
    if sidecar.exists() {
        let written = read_feature_schema(&sidecar)?;
        check_written_schema(&table, &written, &cfg)?;
        println!("Schema v{} matches ({})", written.version, written.fingerprint);
    } else {
        println!("No schema sidecar at {}; schema not checked", sidecar.display());
    }

    println!(
        "Loaded {} rows, {} columns. {} rate={:.3}",
        report.rows, report.columns, report.label_column, report.label_rate
    );

    Ok(())
}
