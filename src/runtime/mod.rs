//! Execution environments (backends) for the ASG.
//!
//! `backend` defines the common interface, `cpu_backend` the `ndarray`
//! implementation, and `session` binds a `GraphContext` to a backend.

pub mod backend;
pub mod cpu_backend;
pub mod session;
