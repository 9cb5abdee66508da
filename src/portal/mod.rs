pub mod navigator;
pub mod selectors;
