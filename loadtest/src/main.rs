//! Load generator for the product catalog and search services.
//!
//! See the `loadtest` library for the workload model. Run `loadtest list` to see the available
//! scenarios and `loadtest run` to start a run.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    loadtest::cli::execute()
}
