pub mod config;
pub mod event;
pub mod init;
pub mod resource;
pub mod serve;
pub mod stack;
