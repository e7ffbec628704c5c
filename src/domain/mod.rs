pub mod accumulator;
pub mod display;
pub mod replay;
pub mod sample;
