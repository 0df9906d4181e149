//! Hardware-independent core library for airwatch
//!
//! This crate contains all platform-agnostic logic for the airwatch
//! battery-powered air quality monitor: the shared sensor cache, the power
//! state machines, the menu state machine, persisted configuration, network
//! supervision, screen rendering and the cooperative task bodies that tie
//! them together.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod activity;
pub mod app_state;
pub mod async_i2c_bus;
pub mod cache;
pub mod config;
pub mod display;
pub mod error;
pub mod input;
pub mod logging;
pub mod menu;
pub mod network;
pub mod power;
pub mod sensors;
pub mod tasks;
