//! Interest: concurrent fetch-and-pin of a block of rows, with completion tracking.

pub(crate) mod coordinator;
pub(crate) mod pool;
