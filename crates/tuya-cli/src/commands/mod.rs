//! Command implementations for tuya-cli

pub mod find;
pub mod info;
pub mod list;
pub mod online;
pub mod send;
pub mod status;

pub use find::find;
pub use info::info;
pub use list::list;
pub use online::online;
pub use send::send;
pub use status::status;
