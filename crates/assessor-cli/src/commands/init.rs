//! The `assessor init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("assessor.toml").exists() {
        println!("assessor.toml already exists, skipping.");
    } else {
        std::fs::write("assessor.toml", SAMPLE_CONFIG)?;
        println!("Created assessor.toml");
    }

    std::fs::create_dir_all("fixtures")?;
    let example_path = std::path::Path::new("fixtures/example.toml");
    if example_path.exists() {
        println!("fixtures/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_FIXTURE)?;
        println!("Created fixtures/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Run: assessor validate --fixture fixtures/example.toml");
    println!("  2. Run: assessor evaluate --fixture fixtures/example.toml");
    println!("  3. Add your own scales and answer sheets under fixtures/");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# assessor configuration

# Max assessments evaluated at once in a batch
parallelism = 4

# Scales with more factors than this are scored concurrently
concurrent_threshold = 10

# Worker counts for concurrent scoring and interpretation (0 = automatic)
scoring_workers = 0
interpret_workers = 0

# Cancel unfinished batch work after this many milliseconds
# batch_timeout_ms = 30000
"#;

const EXAMPLE_FIXTURE: &str = include_str!("../../../../fixtures/example.toml");
