pub mod init;
pub mod lock;
pub mod quiz;
pub mod utils;
