//! Graph topology, evaluation order and the render driver.

pub(crate) mod dag;
pub(crate) mod driver;
pub(crate) mod output;
