//! Drives extraction of every resource type in parent-before-child order.
//!
//! Child contexts are consumed as they are produced: right after a parent record has been
//! emitted, the child sequences it seeds run to exhaustion before the parent stream is polled
//! again. Nothing is buffered beyond the parent's current page.

use crate::client::{Emitted, TikTokClient};
use crate::config::Config;
use crate::context::Context;
use crate::error::Error;
use crate::resource::Resource;
use crate::sink::Sink;
use indexmap::IndexMap;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::watch;
use tokio_stream::StreamExt;

/// A failure tied to the resource type and context whose sequence it aborted.
#[derive(Debug, thiserror::Error)]
#[error("stream `{resource}` failed for context {context}: {error}")]
pub struct SyncFailure {
    pub resource: Resource,
    pub context: Context,
    #[source]
    pub error: Error,
}

/// Per-stream counters for one run, plus the context sequences that failed without stopping
/// the run.
#[derive(Debug, Default)]
pub struct SyncSummary {
    /// Records emitted, keyed by stream name.
    pub records: IndexMap<&'static str, u64>,
    /// Pagination sequences started, keyed by stream name.
    pub sequences: IndexMap<&'static str, u64>,
    pub failures: Vec<SyncFailure>,
}

impl SyncSummary {
    pub fn records_for(&self, resource: Resource) -> u64 {
        self.records.get(resource.name()).copied().unwrap_or(0)
    }

    pub fn sequences_for(&self, resource: Resource) -> u64 {
        self.sequences.get(resource.name()).copied().unwrap_or(0)
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

type SyncFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SyncFailure>> + Send + 'a>>;

/// Runs every resource type for a set of business accounts.
#[derive(Debug, Clone)]
pub struct Tap {
    client: TikTokClient,
    business_ids: Vec<String>,
}

impl Tap {
    pub fn new(client: TikTokClient, business_ids: Vec<String>) -> Self {
        Self {
            client,
            business_ids,
        }
    }

    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        if let Some(start_date) = config.start_date {
            tracing::debug!(
                %start_date,
                "start_date is configured but the API offers no date filter"
            );
        }
        Ok(Self::new(
            TikTokClient::from_config(config)?,
            config.business_ids.clone(),
        ))
    }

    /// Aborts the run before the next page request once `cancel` reads `true`.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.client = self.client.with_cancellation(cancel);
        self
    }

    pub fn client(&self) -> &TikTokClient {
        &self.client
    }

    /// Extracts everything and hands each record to `sink`. Flushing the sink is left to the
    /// caller.
    ///
    /// Auth and request failures abort only the context sequence they occurred in; they are
    /// collected in the returned summary. A pagination loop, cancellation or a sink failure
    /// aborts the whole run and is returned as the error.
    pub async fn run<S: Sink + Send>(&self, sink: &mut S) -> Result<SyncSummary, SyncFailure> {
        let mut summary = SyncSummary::default();
        for resource in Resource::ALL.into_iter().filter(|r| r.parent().is_none()) {
            for context in resource.partitions(&self.business_ids) {
                self.sync_context(resource, context, sink, &mut summary)
                    .await?;
            }
        }

        tracing::info!(
            records = ?summary.records,
            sequences = ?summary.sequences,
            failures = summary.failures.len(),
            "sync finished"
        );
        Ok(summary)
    }

    /// Runs one full pagination sequence for `context`, and recursively the child sequences
    /// each of its records seeds.
    fn sync_context<'a, S: Sink + Send>(
        &'a self,
        resource: Resource,
        context: Context,
        sink: &'a mut S,
        summary: &'a mut SyncSummary,
    ) -> SyncFuture<'a> {
        Box::pin(async move {
            let stream = resource.name();
            tracing::info!(stream, %context, "starting sequence");
            *summary.sequences.entry(stream).or_default() += 1;

            let mut count = 0u64;
            let records = self.client.records(resource, context.clone());
            let mut records = std::pin::pin!(records);
            while let Some(item) = records.next().await {
                let Emitted {
                    record,
                    child_context,
                } = match item {
                    Ok(item) => item,
                    Err(error) if error.is_fatal_to_run() => {
                        tracing::error!(stream, %context, %error, "aborting sync");
                        return Err(SyncFailure {
                            resource,
                            context,
                            error,
                        });
                    }
                    Err(error) => {
                        tracing::error!(
                            stream,
                            %context,
                            %error,
                            "sequence failed, skipping context"
                        );
                        summary.failures.push(SyncFailure {
                            resource,
                            context,
                            error,
                        });
                        return Ok(());
                    }
                };

                if let Err(error) = sink.emit(stream, &record) {
                    return Err(SyncFailure {
                        resource,
                        context,
                        error,
                    });
                }
                count += 1;
                *summary.records.entry(stream).or_default() += 1;

                if let Some(child_context) = child_context {
                    for child in resource.children() {
                        self.sync_context(child, child_context.clone(), &mut *sink, &mut *summary)
                            .await?;
                    }
                }
            }

            tracing::info!(stream, %context, records = count, "sequence drained");
            Ok(())
        })
    }
}
