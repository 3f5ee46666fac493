pub mod calculate;
pub mod dataset;
pub mod formula;
pub mod init;
pub mod runs;
pub mod settings;
