use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{EnvFilter, Layer, fmt::writer::BoxMakeWriter, layer::SubscriberExt};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogTarget {
    #[default]
    Stdout,
    Stderr,
}

#[derive(Clone, Debug, Default)]
pub struct TracerOptions {
    pub target: LogTarget,
    /// Used when `RUST_LOG` is not set.
    pub default_directive: Option<String>,
}

/// Owns the global subscriber configuration for a binary.
pub struct TracerEngine {
    service_name: String,
}

impl TracerEngine {
    /// Installs the fmt layer, filtered by `RUST_LOG`.
    /// #Arguments
    /// * `options` - The caller-specified instance of TracerOptions.
    /// * `service_name` - The name of the binary, recorded on the first log line.
    /// #Returns
    /// An instance of TracerEngine, or an error if a global subscriber already exists.
    pub fn new(options: TracerOptions, service_name: &str) -> Result<Self, SetGlobalDefaultError> {
        let writer = match options.target {
            LogTarget::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
        };
        let log_filter = match options.default_directive.as_deref() {
            Some(directive) if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() => {
                EnvFilter::new(directive)
            }
            _ => EnvFilter::from_default_env(),
        };
        let stdout_tracer = tracing_subscriber::fmt::layer().with_writer(writer);

        let subscriber =
            tracing_subscriber::Registry::default().with(stdout_tracer.with_filter(log_filter));
        tracing::subscriber::set_global_default(subscriber)?;

        tracing::debug!("Tracer initialised for {service_name}");
        Ok(Self {
            service_name: service_name.to_owned(),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}
