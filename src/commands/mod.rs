pub mod import;
pub mod save;
pub mod serve;
pub mod status;
