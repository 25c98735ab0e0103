//! # Research Kit
//!
//! Thin binary over the runner: all command logic lives in
//! `research-runner` so integration tests can drive the same paths.

fn main() {
    std::process::exit(research_runner::run());
}
