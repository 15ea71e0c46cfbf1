pub mod builder;
pub mod config;
pub mod console;
pub mod mcumgr;
pub mod nrfutil;
pub mod runner;
pub mod scenario;

pub use crate::builder::WestBuilder;
pub use crate::config::Config;
pub use crate::console::{Console, ConsoleConfig, ConsoleRead};
pub use crate::mcumgr::Mcumgr;
pub use crate::nrfutil::{erase_board, list_devices, reset_board, DeviceList};
pub use crate::scenario::{DfuScenario, DfuStep};
