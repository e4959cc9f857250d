//! 核心层：错误类型与优雅关闭

pub mod error;
pub mod shutdown;

pub use error::{AgentError, SecOpsError};
pub use shutdown::{
    run_with_graceful_shutdown, ServiceCleanup, ShutdownCleanup, ShutdownCoordinator,
    ShutdownManager,
};
