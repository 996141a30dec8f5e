use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::Result as OrtResult;
use std::fmt;
use std::sync::OnceLock;

use crate::classifier::ClassifierError;

// Outcome of the one ONNX Runtime environment init, failure included
static INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Compute device sessions are created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl Device {
    /// Picks CUDA when ONNX Runtime reports the provider as usable, CPU otherwise.
    /// Meant to be called once at startup; the result is threaded through
    /// `RuntimeConfig`.
    pub fn probe() -> Self {
        match CUDAExecutionProvider::default().is_available() {
            Ok(true) => Self::Cuda,
            Ok(false) => Self::Cpu,
            Err(e) => {
                log::warn!("Could not query CUDA availability: {}", e);
                Self::Cpu
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda => f.write_str("cuda"),
        }
    }
}

#[derive(Debug)]
pub struct RuntimeConfig {
    pub inter_threads: usize,
    pub intra_threads: usize,
    pub optimization_level: GraphOptimizationLevel,
    pub device: Device,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            inter_threads: 0, // Let ONNX Runtime decide
            intra_threads: 0, // Let ONNX Runtime decide
            optimization_level: GraphOptimizationLevel::Level3,
            device: Device::Cpu,
        }
    }
}

impl RuntimeConfig {
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

impl Clone for RuntimeConfig {
    fn clone(&self) -> Self {
        Self {
            inter_threads: self.inter_threads,
            intra_threads: self.intra_threads,
            optimization_level: copy_level(&self.optimization_level),
            device: self.device,
        }
    }
}

// GraphOptimizationLevel is neither Clone nor Copy
fn copy_level(level: &GraphOptimizationLevel) -> GraphOptimizationLevel {
    match level {
        GraphOptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
        GraphOptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
        GraphOptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
        GraphOptimizationLevel::Disable => GraphOptimizationLevel::Disable,
    }
}

fn init_onnx_environment() -> OrtResult<()> {
    ort::init()
        .with_name("morphview")
        .commit()?;
    Ok(())
}

/// Runs `init` the first time `cell` is touched and replays its outcome on
/// every later call.
fn init_once<F>(cell: &OnceLock<Result<(), String>>, init: F) -> Result<(), ClassifierError>
where
    F: FnOnce() -> Result<(), String>,
{
    cell.get_or_init(init)
        .clone()
        .map_err(|e| ClassifierError::ModelError(format!("ONNX Runtime initialization failed: {}", e)))
}

pub fn ensure_initialized() -> Result<(), ClassifierError> {
    init_once(&INIT, || init_onnx_environment().map_err(|e| e.to_string()))
}

pub fn create_session_builder(config: &RuntimeConfig) -> Result<SessionBuilder, ClassifierError> {
    ensure_initialized()?;
    let mut builder = Session::builder()?;

    // Configure threading
    if config.inter_threads > 0 {
        builder = builder.with_inter_threads(config.inter_threads)?;
    }
    if config.intra_threads > 0 {
        builder = builder.with_intra_threads(config.intra_threads)?;
    }

    builder = builder.with_optimization_level(copy_level(&config.optimization_level))?;

    builder = match config.device {
        // CPU stays registered as the fallback for ops CUDA cannot run
        Device::Cuda => builder.with_execution_providers([
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ])?,
        Device::Cpu => builder.with_execution_providers([CPUExecutionProvider::default().build()])?,
    };

    Ok(builder)
}
