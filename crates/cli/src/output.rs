use crate::error::CliError;
use model::{migration::Progress, schema::ScanResult};

pub fn print_scan(result: &ScanResult, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    if result.is_empty() {
        println!("No table references the scanned patterns.");
        return Ok(());
    }

    println!("{:<40} {:>10}", "Table", "Rows");
    println!("{}", "-".repeat(51));
    for (table, rows) in &result.tables {
        println!("{table:<40} {rows:>10}");
    }
    Ok(())
}

pub fn print_progress(progress: &Progress, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(progress)?);
        return Ok(());
    }

    match progress {
        Progress::NoMigration => println!("No migration has been started."),
        Progress::Running {
            run_id,
            total,
            completed,
            errors,
        } => {
            let percent = if *total == 0 {
                100.0
            } else {
                *completed as f64 * 100.0 / *total as f64
            };
            println!("{:<12} {run_id}", "Run");
            println!("{:<12} {completed}/{total} ({percent:.1}%)", "Completed");
            println!("{:<12} {errors}", "Errors");
        }
    }
    Ok(())
}
