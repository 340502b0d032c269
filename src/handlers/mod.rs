pub mod access;
pub mod commands;
pub mod doll_args;
pub mod media;
