//! Tracing subscriber setup with an optional dedicated audit stream.
//!
//! With an audit target configured, events under that target are written
//! as JSON by their own layer and never reach the application log. Every
//! other event goes through the application layer and its `EnvFilter`.

use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_subscriber::filter::{Directive, Targets};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

pub use tracing_subscriber::util::TryInitError;

/// Boxed layer as assembled by [`TracingConfig::layers`].
pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Tracing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Application log filter, used when `RUST_LOG` is unset
    pub log_level: String,
    /// Write application logs as JSON
    pub json_output: bool,
    /// Target routed to the audit stream; `None` leaves it in the application log
    pub audit_target: Option<String>,
    /// Minimum level kept on the audit stream
    pub audit_level: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "crypto-pipeline".to_string(),
            log_level: "info".to_string(),
            json_output: false,
            audit_target: None,
            audit_level: "info".to_string(),
        }
    }
}

impl TracingConfig {
    /// Set the service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the application log filter.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable JSON application output.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    /// Route events under `target` to the audit stream.
    #[must_use]
    pub fn with_audit_target(mut self, target: impl Into<String>) -> Self {
        self.audit_target = Some(target.into());
        self
    }

    /// Set the audit stream level.
    #[must_use]
    pub fn with_audit_level(mut self, level: impl Into<String>) -> Self {
        self.audit_level = level.into();
        self
    }

    /// Filter for the application layer. Excludes the audit target when one
    /// is configured.
    #[must_use]
    pub fn app_filter(&self) -> EnvFilter {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));

        match self
            .audit_target
            .as_ref()
            .and_then(|target| format!("{target}=off").parse::<Directive>().ok())
        {
            Some(exclude_audit) => filter.add_directive(exclude_audit),
            None => filter,
        }
    }

    /// Filter for the audit layer, if an audit target is configured.
    ///
    /// An unparsable audit level falls back to `info`.
    #[must_use]
    pub fn audit_filter(&self) -> Option<Targets> {
        let level = self
            .audit_level
            .parse::<LevelFilter>()
            .unwrap_or(LevelFilter::INFO);
        self.audit_target
            .as_ref()
            .map(|target| Targets::new().with_target(target.clone(), level))
    }

    /// Build the application layer and, when configured, the audit layer.
    pub fn layers<S, A, W>(&self, app_writer: A, audit_writer: W) -> Vec<BoxedLayer<S>>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
        A: for<'w> MakeWriter<'w> + Send + Sync + 'static,
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let app = if self.json_output {
            fmt::layer()
                .json()
                .with_writer(app_writer)
                .with_filter(self.app_filter())
                .boxed()
        } else {
            fmt::layer()
                .with_ansi(false)
                .with_writer(app_writer)
                .with_filter(self.app_filter())
                .boxed()
        };

        let mut layers = vec![app];
        if let Some(filter) = self.audit_filter() {
            layers.push(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(audit_writer)
                    .with_filter(filter)
                    .boxed(),
            );
        }
        layers
    }
}

/// Install the global subscriber, both streams writing to stdout.
///
/// Should be called once at startup.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(config.layers(std::io::stdout, std::io::stdout))
        .try_init()?;

    tracing::info!(
        service = %config.service_name,
        audit_target = config.audit_target.as_deref().unwrap_or("-"),
        "Tracing initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::Level;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.service_name, "crypto-pipeline");
        assert_eq!(config.log_level, "info");
        assert!(!config.json_output);
        assert!(config.audit_target.is_none());
        assert!(config.audit_filter().is_none());
    }

    #[test]
    fn test_audit_filter_only_admits_audit_target() {
        let config = TracingConfig::default()
            .with_audit_target("crypto_pipeline::audit")
            .with_audit_level("warn");
        let filter = config.audit_filter().unwrap();

        assert!(filter.would_enable("crypto_pipeline::audit", &Level::WARN));
        assert!(!filter.would_enable("crypto_pipeline::audit", &Level::INFO));
        assert!(!filter.would_enable("crypto_pipeline::provider", &Level::ERROR));
    }

    #[test]
    fn test_unparsable_audit_level_falls_back_to_info() {
        let config = TracingConfig::default()
            .with_audit_target("audit")
            .with_audit_level("loud");
        let filter = config.audit_filter().unwrap();

        assert!(filter.would_enable("audit", &Level::INFO));
        assert!(!filter.would_enable("audit", &Level::DEBUG));
    }

    #[test]
    fn test_audit_events_are_routed_to_their_own_stream() {
        let app = Capture::default();
        let audit = Capture::default();
        let config = TracingConfig::default()
            .with_log_level("info")
            .with_audit_target("crypto_pipeline::audit");

        let (app_writer, audit_writer) = (app.clone(), audit.clone());
        let subscriber = tracing_subscriber::registry()
            .with(config.layers(move || app_writer.clone(), move || audit_writer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "crypto_pipeline::audit", operation = "encrypt", "audit record");
            tracing::info!("provider ready");
        });

        let app_text = app.text();
        let audit_text = audit.text();
        assert!(app_text.contains("provider ready"));
        assert!(!app_text.contains("audit record"));
        assert!(audit_text.contains("audit record"));
        assert!(audit_text.contains("\"operation\":\"encrypt\""));
        assert!(!audit_text.contains("provider ready"));
    }

    #[test]
    fn test_without_audit_target_everything_stays_inline() {
        let app = Capture::default();
        let config = TracingConfig::default().with_log_level("info");

        let app_writer = app.clone();
        let subscriber = tracing_subscriber::registry()
            .with(config.layers(move || app_writer.clone(), io::sink));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "crypto_pipeline::audit", "audit record");
        });

        assert!(app.text().contains("audit record"));
    }

    #[test]
    fn test_second_init_reports_error() {
        let config = TracingConfig::default().with_log_level("warn");
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
