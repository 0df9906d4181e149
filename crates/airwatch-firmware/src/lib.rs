//! ESP32-S3 firmware-specific modules for airwatch
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: peripheral bring-up, the WiFi link and sockets, the RTT logger,
//! and the concrete switches, clocks and watchdog the core tasks are generic
//! over.

#![no_std]

extern crate alloc;

pub mod hardware;
pub mod logger;
pub mod net;
pub mod system;
