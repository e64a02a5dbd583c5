//! Ultrasonic ranging and differential servo drive for a small robot on no-std platforms.
//!
//! Hardware is injected through `embedded-hal` pins and the traits in
//! [`utils::hal`]; nothing here touches board-global state.
#![no_std]

pub mod utils;
