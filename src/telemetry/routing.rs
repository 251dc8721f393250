//! Record routing: in-process bus and the HTTP collector worker behind it.

pub mod bus;
pub mod collector;
