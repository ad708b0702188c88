use uuid::Uuid;

tokio::task_local! {
    static CALLER_ID: Uuid;
}

/// Establish the "acquiring execution context" identity (spec §3's LH
/// definition) for the duration of `fut`. Both backends use this identity
/// to recognize reentrant acquisition by the same caller (spec §9) and to
/// enforce I2 (only the originating context may release).
///
/// Call this once at the top of a request/orchestrator invocation; nested
/// lock acquisitions inside `fut` (including nested C5 invocations) inherit
/// the same identity automatically via the task-local.
pub async fn with_caller_scope<F>(fut: F) -> F::Output
where
    F: std::future::Future,
{
    if CALLER_ID.try_with(|_| ()).is_ok() {
        // Already inside a caller scope; nested scopes keep the same identity.
        return fut.await;
    }
    CALLER_ID.scope(Uuid::new_v4(), fut).await
}

/// The current caller identity, or a fresh one-shot identity if called
/// outside [`with_caller_scope`] (e.g. ad hoc test code or a fire-and-forget
/// background task that never reenters).
#[must_use]
pub fn current_caller() -> Uuid {
    CALLER_ID.try_with(|id| *id).unwrap_or_else(|_| Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nested_scopes_share_identity() {
        let outer = with_caller_scope(async {
            let id1 = current_caller();
            let id2 = with_caller_scope(async { current_caller() }).await;
            (id1, id2)
        })
        .await;
        assert_eq!(outer.0, outer.1);
    }

    #[tokio::test]
    async fn distinct_scopes_get_distinct_identities() {
        let a = with_caller_scope(async { current_caller() }).await;
        let b = with_caller_scope(async { current_caller() }).await;
        assert_ne!(a, b);
    }
}
