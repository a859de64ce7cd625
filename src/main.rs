//! Stylec Compiler Binary

use std::process;
use stylec::StylecCli;

fn main() {
    let mut cli = StylecCli::new();

    if let Err(e) = cli.run() {
        eprintln!("Error: {}", e);
        for (span, label) in e.labeled_spans() {
            eprintln!("  --> {}: {}", span, label);
        }
        process::exit(1);
    }
}
