//! 会话监管：取消
//!
//! 取消粒度是「不再开始下一轮」：编排器在每轮开始前检查令牌，进行中的一轮总是跑完。

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 共享令牌（例如交给 Ctrl+C 处理任务）
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn cancel(&self) {
        tracing::info!("session cancellation requested");
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_with_token_clones() {
        let sup = SessionSupervisor::new();
        let token = sup.cancel_token();
        assert!(!sup.is_cancelled());
        token.cancel();
        assert!(sup.is_cancelled());
    }
}
