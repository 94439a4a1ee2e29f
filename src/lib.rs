pub mod cache;
pub mod composer;
pub mod container;
pub mod envelope;
pub mod file;
pub mod oscillator;
pub mod output;
pub mod tuning;
pub mod wave;
