//! Module containing the execution backends.
//!
//! [`backend::Backend`] is the kernel interface layers dispatch to;
//! [`cpu_backend::CpuBackend`] is its CPU implementation.

pub mod backend;
pub mod cpu_backend;
