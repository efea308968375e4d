pub mod metrics;
mod ops;

pub use ops::{make_ops_app, run_ops_server, OpsState};
