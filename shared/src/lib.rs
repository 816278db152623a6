#![no_std]

#[cfg(test)]
extern crate std;

pub mod fsm;
pub mod hbridge;
pub mod motion;
pub mod ntc;
pub mod polarity;
pub mod state;
