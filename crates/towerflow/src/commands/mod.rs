pub mod deploy;
pub mod destroy;
pub mod info;
