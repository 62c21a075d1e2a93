pub mod snapshot_worker;

pub use snapshot_worker::run as run_snapshot_worker;
