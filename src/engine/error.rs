//! 水力引擎错误类型

use thiserror::Error;

/// 水力引擎错误
///
/// `InvalidInput` 表示上传的 INP 文件本身不合法，其余变体都属于仿真失败
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("line {line}: {message}")]
    InvalidInput { line: usize, message: String },

    #[error("{0}")]
    InvalidNetwork(String),

    #[error("failed to read input file: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported feature: {0}")]
    Unsupported(String),

    #[error("hydraulic solution did not converge at t={time}s after {trials} trials")]
    Convergence { time: u64, trials: usize },

    #[error("hydraulic system is singular at t={time}s (disconnected part of the network?)")]
    Singular { time: u64 },

    #[error("unknown result quantity: {0}")]
    UnknownQuantity(String),
}

impl EngineError {
    /// 行级输入错误
    pub fn input(line: usize, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            line,
            message: message.into(),
        }
    }

    /// 网络级输入错误（拓扑、缺少水源等）
    pub fn network(message: impl Into<String>) -> Self {
        Self::InvalidNetwork(message.into())
    }

    /// 是否为输入文件错误（对应 HTTP 400）
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidInput { .. } | EngineError::InvalidNetwork(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(EngineError::input(3, "bad").is_invalid_input());
        assert!(EngineError::network("no reservoirs").is_invalid_input());
        assert!(!EngineError::Convergence { time: 0, trials: 200 }.is_invalid_input());
        assert!(!EngineError::Unsupported("PRV".into()).is_invalid_input());
    }

    #[test]
    fn test_display_includes_line() {
        let err = EngineError::input(12, "expected a number");
        assert_eq!(err.to_string(), "line 12: expected a number");
    }
}
