use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::traits::AiProvider;
use super::types::{ChatRequest, ChatResponse, ProviderError};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
        }
    }
}

/// Sends a request through the provider, retrying transport failures with a
/// doubling backoff. The token is checked before every attempt, while the
/// request is in flight, and across the backoff wait, so a stop never has to
/// sit out a delay. Cancellation is reported as `ProviderError::Cancelled`
/// and is never retried.
pub async fn send_with_backoff(
    provider: &dyn AiProvider,
    request: ChatRequest,
    cancel: &CancellationToken,
    policy: RetryPolicy,
) -> Result<ChatResponse, ProviderError> {
    let mut delay = policy.initial_delay;
    let mut retries = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let attempt = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            result = provider.send_message(request.clone()) => result,
        };

        match attempt {
            Ok(response) => return Ok(response),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if retries >= policy.max_retries {
                    return Err(err);
                }
                retries += 1;
                tracing::debug!(
                    "Request failed (retry {} of {} in {}ms): {}",
                    retries,
                    policy.max_retries,
                    delay.as_millis(),
                    err
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                delay *= 2;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tokio::time::Instant;

    use super::*;
    use crate::models::Role;
    use crate::providers::types::ChatMessage;

    struct FlakyProvider {
        attempts: AtomicUsize,
        fail_first: usize,
    }

    impl FlakyProvider {
        fn new(fail_first: usize) -> Self {
            Self {
                attempts: AtomicUsize::new(0),
                fail_first,
            }
        }
    }

    #[async_trait]
    impl AiProvider for FlakyProvider {
        async fn send_message(
            &self,
            _request: ChatRequest,
        ) -> Result<ChatResponse, ProviderError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                Err(ProviderError::Network("connection reset".into()))
            } else {
                Ok(ChatResponse::Message("ok".into()))
            }
        }
    }

    struct RejectingProvider {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl AiProvider for RejectingProvider {
        async fn send_message(
            &self,
            _request: ChatRequest,
        ) -> Result<ChatResponse, ProviderError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::InvalidResponse("no candidates".into()))
        }
    }

    struct NotifyingProvider {
        attempts: AtomicUsize,
        reached: Arc<Notify>,
    }

    #[async_trait]
    impl AiProvider for NotifyingProvider {
        async fn send_message(
            &self,
            _request: ChatRequest,
        ) -> Result<ChatResponse, ProviderError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.reached.notify_one();
            Err(ProviderError::Network("connection reset".into()))
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            api_key: "test-key".into(),
            model: "test-model".into(),
            messages: vec![ChatMessage {
                role: Role::User,
                text: "hi".into(),
            }],
            base_url: None,
            system_prompt: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let provider = FlakyProvider::new(2);
        let token = CancellationToken::new();
        let started = Instant::now();

        let result =
            send_with_backoff(&provider, request(), &token, RetryPolicy::default()).await;

        assert_eq!(result.unwrap(), ChatResponse::Message("ok".into()));
        assert_eq!(provider.attempts.load(Ordering::SeqCst), 3);
        // 1000ms after the first failure, 2000ms after the second.
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let provider = FlakyProvider::new(usize::MAX);
        let token = CancellationToken::new();

        let result =
            send_with_backoff(&provider, request(), &token, RetryPolicy::default()).await;

        assert!(matches!(result, Err(ProviderError::Network(_))));
        assert_eq!(provider.attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_response_not_retried() {
        let provider = RejectingProvider {
            attempts: AtomicUsize::new(0),
        };
        let token = CancellationToken::new();
        let started = Instant::now();

        let result =
            send_with_backoff(&provider, request(), &token, RetryPolicy::default()).await;

        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
        assert_eq!(provider.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let provider = FlakyProvider::new(0);
        let token = CancellationToken::new();
        token.cancel();

        let result =
            send_with_backoff(&provider, request(), &token, RetryPolicy::default()).await;

        assert!(matches!(result, Err(ProviderError::Cancelled)));
        assert_eq!(provider.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let reached = Arc::new(Notify::new());
        let provider = Arc::new(NotifyingProvider {
            attempts: AtomicUsize::new(0),
            reached: reached.clone(),
        });
        let token = CancellationToken::new();

        let task = tokio::spawn({
            let provider = provider.clone();
            let token = token.clone();
            async move {
                send_with_backoff(provider.as_ref(), request(), &token, RetryPolicy::default())
                    .await
            }
        });

        reached.notified().await;
        token.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ProviderError::Cancelled)));
        assert_eq!(provider.attempts.load(Ordering::SeqCst), 1);
    }
}
