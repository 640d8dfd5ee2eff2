//! Logging infrastructure

use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::BaseConfig;
use crate::errors::{Result, SwarmError};

/// Event formatter that prepends the configured log prefix to every line.
struct PrefixedFormat {
    prefix: String,
    inner: fmt::format::Format,
}

impl<S, N> FormatEvent<S, N> for PrefixedFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        write!(writer, "{}", self.prefix)?;
        self.inner.format_event(ctx, writer, event)
    }
}

/// Initialize logging based on configuration
pub fn init_logging(config: &BaseConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.log_level.parse::<Level>().unwrap_or(Level::INFO);
        EnvFilter::new(level.to_string())
    });

    let format = PrefixedFormat {
        prefix: config.log_prefix.clone(),
        inner: fmt::format().with_target(false),
    };

    let result = Registry::default()
        .with(filter)
        .with(fmt::layer().event_format(format))
        .try_init();

    // Tolerate another component having set the global subscriber already
    if let Err(e) = result {
        if !e.to_string().contains("already been set") {
            return Err(SwarmError::Config(format!("failed to init logging: {}", e)));
        }
    }

    Ok(())
}
