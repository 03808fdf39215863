//! `sitl-stream` – Serial Bridge
//!
//! Presents the simulator link to firmware as an ordinary serial port.
//!
//! # Modules
//!
//! - [`serial`] – [`SerialPort`][serial::SerialPort]: the UART trait firmware
//!   code is written against.
//! - [`buffer`] – [`InputBuffer`][buffer::InputBuffer] and
//!   [`EchoBuffer`][buffer::EchoBuffer]: fixed-capacity byte stores that drop
//!   the newest bytes when full.
//! - [`bridge`] – [`StreamBridge`][bridge::StreamBridge]: polls the
//!   [`SocketTransport`][sitl_transport::SocketTransport] on every read-side
//!   call and forwards writes synchronously.

pub mod bridge;
pub mod buffer;
pub mod serial;

pub use bridge::StreamBridge;
pub use buffer::{DEFAULT_CAPACITY, EchoBuffer, InputBuffer};
pub use serial::SerialPort;
