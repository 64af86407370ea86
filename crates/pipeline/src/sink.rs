//! Where a job reports its progress and outcome.

use std::future::Future;

use studio_events::payload::CompletionMetadata;
use studio_events::CallbackClient;

/// Receiver of a job's progress milestones and its single outcome.
///
/// Implementations are best-effort: delivery problems never reach the job.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, percent: u8, step: &str) -> impl Future<Output = ()> + Send;

    fn complete(
        &self,
        output_url: &str,
        duration_seconds: u64,
        metadata: CompletionMetadata,
    ) -> impl Future<Output = ()> + Send;

    fn failed(&self, error_message: &str) -> impl Future<Output = ()> + Send;
}

impl ProgressSink for CallbackClient {
    async fn progress(&self, percent: u8, step: &str) {
        CallbackClient::progress(self, percent, step).await;
    }

    async fn complete(&self, output_url: &str, duration_seconds: u64, metadata: CompletionMetadata) {
        CallbackClient::complete(self, output_url, duration_seconds, metadata).await;
    }

    async fn failed(&self, error_message: &str) {
        CallbackClient::failed(self, error_message).await;
    }
}
