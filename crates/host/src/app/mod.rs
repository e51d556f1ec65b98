pub(crate) mod bootstrap;
pub(crate) mod config;
pub(crate) mod loop_runner;
pub(crate) mod metrics;
pub(crate) mod thruport;
pub(crate) mod world;
