//! Everything that turns a configuration into a running tracker node:
//! process setup (logging) and the job that binds the RPC surface, forms
//! the cluster and starts the actors.
pub mod app;
pub mod jobs;
pub mod logging;
