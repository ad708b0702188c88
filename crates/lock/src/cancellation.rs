use tokio_util::sync::CancellationToken;

tokio::task_local! {
    static CANCEL_TOKEN: CancellationToken;
}

/// Run `fut` with `token` available to backends via [`current_cancellation`].
///
/// Backends await this token alongside their backoff/notify sleeps inside
/// `try_acquire`'s wait loop; when it fires they return
/// [`crate::backend::AcquireOutcome::Interrupted`] after cleaning up any
/// partial state created so far (e.g. ZooKeeper deletes the sequential
/// child it had created but did not yet own) -- spec §5, "Cancellation".
pub async fn with_cancellation<F>(token: CancellationToken, fut: F) -> F::Output
where
    F: std::future::Future,
{
    CANCEL_TOKEN.scope(token, fut).await
}

/// The current cancellation token, or a token that never cancels if no
/// scope was established (the common case for one-shot library calls and
/// tests).
#[must_use]
pub fn current_cancellation() -> CancellationToken {
    CANCEL_TOKEN.try_with(Clone::clone).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelling_the_token_is_observed_inside_the_scope() {
        let token = CancellationToken::new();
        let inner_token = token.clone();
        let handle = tokio::spawn(with_cancellation(token, async move {
            current_cancellation().cancelled().await;
            "cancelled"
        }));
        inner_token.cancel();
        assert_eq!(handle.await.unwrap(), "cancelled");
    }

    #[tokio::test]
    async fn default_token_outside_scope_never_fires() {
        let token = current_cancellation();
        assert!(!token.is_cancelled());
    }
}
