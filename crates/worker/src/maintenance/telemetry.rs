use async_trait::async_trait;

/// Destination for the queue-length counts produced by
/// [`count_queued_submissions`](super::count_queued_submissions). Stands in
/// for the reference command's NewRelic/CloudWatch metric emitters, neither
/// of which is reimplemented here (see design notes) — a real shipper plugs
/// in behind this seam.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn emit(&self, counts: &[(String, i64)]);
}

/// Always-on sink: a pretty-printed table on stdout, matching the reference
/// command's unconditional console output.
pub struct StdoutTelemetrySink;

#[async_trait]
impl TelemetrySink for StdoutTelemetrySink {
    async fn emit(&self, counts: &[(String, i64)]) {
        for (queue_name, count) in counts {
            println!("{queue_name:<30} {count:<10}");
        }
    }
}

/// Emits one structured tracing event per queue, for deployments that scrape
/// logs rather than stdout.
pub struct TracingTelemetrySink;

#[async_trait]
impl TelemetrySink for TracingTelemetrySink {
    async fn emit(&self, counts: &[(String, i64)]) {
        for (queue_name, count) in counts {
            tracing::info!(queue = %queue_name, count, "queue length");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracing_sink_does_not_panic_on_empty_counts() {
        TracingTelemetrySink.emit(&[]).await;
    }
}
