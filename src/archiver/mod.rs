pub mod audit;
pub mod config;
pub mod delete;
pub mod lock;
pub mod mark;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod tags;
pub mod util;

#[cfg(test)]
pub mod testing;
