use super::DispatchService;
use crate::domain::{Channel, CommonSettings, RenderedContent};
use crate::transport::{SendContext, Transport, TransportError};
use backon::{ConstantBuilder, Retryable};
use futures::FutureExt;
use opentelemetry::KeyValue;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

impl DispatchService {
    /// Sends through `transport`, retrying transient failures with a fixed delay.
    ///
    /// Each attempt is bounded by the channel timeout and the request deadline,
    /// whichever ends first. Cancellation interrupts attempts and retry delays.
    pub(super) async fn deliver(
        &self,
        ctx: &SendContext,
        transport: &dyn Transport,
        channel: &Channel,
        content: &RenderedContent,
        settings: CommonSettings,
    ) -> Result<(), TransportError> {
        let timeout = Duration::from_millis(settings.timeout_ms);
        let backoff = ConstantBuilder::default()
            .with_delay(Duration::from_millis(settings.retry_delay_ms))
            .with_max_times(settings.retry_attempts as usize);

        let retrying = (|| attempt(ctx, transport, channel, content, timeout))
            .retry(backoff)
            .when(TransportError::is_transient)
            .notify(|e, delay| {
                self.metrics
                    .transport_retries_total
                    .add(1, &[KeyValue::new("channel_type", channel.channel_type.clone())]);
                tracing::warn!(
                    channel_id = %channel.id,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "transient transport error, retrying"
                );
            });

        tokio::select! {
            biased;
            () = ctx.cancelled() => Err(TransportError::cancelled()),
            result = retrying => result,
        }
    }
}

async fn attempt(
    ctx: &SendContext,
    transport: &dyn Transport,
    channel: &Channel,
    content: &RenderedContent,
    timeout: Duration,
) -> Result<(), TransportError> {
    let attempt_ctx = ctx.child(timeout);
    if attempt_ctx.is_cancelled() {
        return Err(TransportError::cancelled());
    }
    let Some(deadline) = attempt_ctx.deadline().filter(|_| !attempt_ctx.is_expired()) else {
        return Err(TransportError::timeout("request deadline exceeded before send"));
    };

    let send = AssertUnwindSafe(transport.send(&attempt_ctx, channel, content)).catch_unwind();
    tokio::select! {
        biased;
        () = attempt_ctx.cancelled() => Err(TransportError::cancelled()),
        outcome = tokio::time::timeout_at(deadline, send) => match outcome {
            Err(_) => Err(TransportError::timeout(format!(
                "{} transport gave no response before the deadline",
                transport.type_name()
            ))),
            Ok(Err(payload)) => {
                let cause = panic_message(payload.as_ref());
                tracing::error!(channel_id = %channel.id, cause = %cause, "transport panicked");
                Err(TransportError::permanent("panic", format!("transport panicked: {cause}")))
            }
            Ok(Ok(result)) => result,
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_handles_both_payload_kinds() {
        let static_str: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(static_str.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "kaboom");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
