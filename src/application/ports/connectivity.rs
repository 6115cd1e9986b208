use async_trait::async_trait;

/// Platform reachability check.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}
