//! Unit listing command.

use clap::Args;
use murmur_units::{UnitCategory, UnitRegistry};

const CATEGORIES: [UnitCategory; 6] = [
    UnitCategory::Io,
    UnitCategory::Generator,
    UnitCategory::Arithmetic,
    UnitCategory::Link,
    UnitCategory::Control,
    UnitCategory::Storage,
];

#[derive(Args)]
pub struct UnitsArgs {
    /// Show details for a specific label
    #[arg(value_name = "LABEL")]
    label: Option<String>,
}

pub fn run(args: UnitsArgs) -> anyhow::Result<()> {
    let registry = UnitRegistry::new();

    if let Some(label) = &args.label {
        let unit = registry
            .get(label)
            .ok_or_else(|| anyhow::anyhow!("Unknown unit: {}", label))?;
        println!("{}", unit.label);
        println!("{}", "=".repeat(unit.label.len()));
        println!();
        println!("{}", unit.description);
        println!("Category: {}", unit.category.name());
        if !unit.aliases.is_empty() {
            println!("Aliases: {}", unit.aliases.join(", "));
        }
        return Ok(());
    }

    println!("Available Units ({})", registry.len());
    for category in CATEGORIES {
        println!();
        println!("{}:", category.name());
        for unit in registry.units_in_category(category) {
            let aliases = if unit.aliases.is_empty() {
                String::new()
            } else {
                format!(" ({})", unit.aliases.join(", "))
            };
            println!("  {:10} {}{}", unit.label, unit.description, aliases);
        }
    }
    Ok(())
}
