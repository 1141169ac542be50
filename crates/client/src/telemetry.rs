use tracing::Subscriber;
use tracing_subscriber::{fmt::writer::MakeWriter, layer::SubscriberExt, EnvFilter};

use crate::config::{ClientConfig, LogFormat};

const DEFAULT_FILTER: &str = "info,murmur_client=info,murmur=info";

/// Installs the global subscriber. A second install is reported and ignored.
///
/// Events emitted while a gateway session runs are nested in its `signaling`
/// span, so each line carries that span's `connection_id` and `gateway`
/// fields: inline as `signaling{connection_id=..}` in compact output and under
/// `spans` in JSON output.
pub fn init(config: &ClientConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = subscriber(config.log_format(), filter, std::io::stderr);

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {err}");
    }
}

fn subscriber<W>(
    format: LogFormat,
    filter: EnvFilter,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Compact => Box::new(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(writer),
            ),
        ),
        LogFormat::Json => Box::new(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_level(true)
                    .with_current_span(false)
                    .with_span_list(true)
                    .with_writer(writer),
            ),
        ),
    }
}
