pub mod evaluate;
pub mod init;
pub mod strategies;
pub mod validate;
