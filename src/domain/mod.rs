pub mod account;
pub mod country;
pub mod entry;
pub mod ports;
pub mod transfer;
