//! The `assessor strategies` command.

use anyhow::Result;

use assessor_core::registry::StrategyRegistry;

pub fn execute() -> Result<()> {
    let registry = StrategyRegistry::with_defaults();

    println!("Scoring strategies:");
    for name in registry.scoring_names() {
        println!("  {name}");
    }

    println!("\nInterpretation strategies:");
    for kind in registry.interpret_kinds() {
        println!("  {kind}");
    }

    println!("\nComposite strategies:");
    for kind in registry.composite_kinds() {
        println!("  {kind}");
    }

    Ok(())
}
