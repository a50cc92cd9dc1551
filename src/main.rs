//! mobile_release - build, sign, validate and deploy mobile apps.
//!
//! Exit code 0 means every enabled destination received its release, 2 that
//! some destination failed, 1 that the pipeline itself stopped with an error.

use std::process;

#[tokio::main]
async fn main() {
    let exit_code = match mobile_release::cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            for suggestion in e.recovery_suggestions() {
                eprintln!("  hint: {}", suggestion);
            }
            1
        }
    };

    process::exit(exit_code);
}
