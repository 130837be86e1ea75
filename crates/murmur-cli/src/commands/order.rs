//! Compiled process order listing.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use murmur_config::{EngineConfig, PatchConfig};
use murmur_core::OrderStep;

#[derive(Args)]
pub struct OrderArgs {
    /// Patch file (TOML)
    #[arg(value_name = "PATCH")]
    patch: PathBuf,
}

pub fn run(args: OrderArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let patch = PatchConfig::load(&args.patch)
        .with_context(|| format!("loading patch {}", args.patch.display()))?;
    let built = patch.build_default(config.settings())?;

    let (lines, buffers) = built.context().with_engine(|engine| {
        engine.compile();
        let graph = engine.graph();
        let Some(order) = graph.order() else {
            return (Vec::new(), 0);
        };
        let lines = order
            .steps()
            .iter()
            .map(|step| match *step {
                OrderStep::Unit(id) => {
                    let name = built.name_of(id).unwrap_or("?");
                    let label = graph.label(id).unwrap_or("?");
                    format!("{name} ({label})")
                }
                OrderStep::Sum { .. } => step.to_string(),
            })
            .collect::<Vec<_>>();
        (lines, order.buffer_count())
    });

    println!("Process order ({} steps, {} buffers):", lines.len(), buffers);
    for (i, line) in lines.iter().enumerate() {
        println!("  {:3}. {}", i + 1, line);
    }
    Ok(())
}
