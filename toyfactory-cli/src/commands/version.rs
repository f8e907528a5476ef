//! Version command - show version information.

use anyhow::Result;

/// Version information.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the version command.
pub fn run() -> Result<()> {
    println!("toyfactory - replicated factory state machine and gateway");
    println!();
    println!("Version:     {}", VERSION);
    println!(
        "Wire format: v{}",
        toyfactory_core::codec::WIRE_VERSION
    );
    println!(
        "Platform:    {} / {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    println!();
    println!("Components:");
    println!("  toyfactory-core     Entity model, commands, events, wire codec");
    println!("  toyfactory-cluster  State machine, snapshots, in-process log");
    println!("  toyfactory-gateway  Correlation registry, bridge, dispatch loop");
    println!("  toyfactory-cli      Command-line interface");

    Ok(())
}
