//! Run orchestration
//!
//! - Requests: target function plus per-stage configs
//! - Runner: prerequisite resolution, accelerator fallback, timings
//! - Results: tagged output with a metadata envelope

pub mod accelerator;
pub mod request;
pub mod result;
pub mod runner;

pub use accelerator::{Accelerator, EmulatedAccelerator, GpuContext, GPU_HPSS_KERNEL};
pub use request::{Backend, FunctionId, RunRequest};
pub use result::{RunMeta, RunOutput, RunResult, Timings};
pub use runner::{run_analysis, AnalysisRunner};
