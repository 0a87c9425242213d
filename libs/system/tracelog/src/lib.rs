// This file is part of Nitrogen.
//
// Nitrogen is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Nitrogen is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Nitrogen.  If not, see <http://www.gnu.org/licenses/>.
use anyhow::{anyhow, Result};
use structopt::StructOpt;
use tracing_chrome::FlushGuard;
use tracing_subscriber::{
    fmt::{format::DefaultFields, FormattedFields},
    prelude::*,
    registry::Registry,
    EnvFilter,
};

// Inspired heavily by bevy_log

#[derive(Clone, Debug, StructOpt)]
pub struct TraceLogOpts {
    /// Capture a chrome-format execution trace.
    #[structopt(short = "T", long)]
    trace: bool,

    /// Log filter directives, e.g. "info,clipmap=trace"
    #[structopt(long, default_value = "info")]
    log_filter: String,
}

impl Default for TraceLogOpts {
    fn default() -> Self {
        Self {
            trace: false,
            log_filter: "info".to_owned(),
        }
    }
}

impl TraceLogOpts {
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_log_filter(mut self, filter: &str) -> Self {
        self.log_filter = filter.to_owned();
        self
    }
}

// Keep this alive for as long as traces should be captured; the chrome trace is written out
// when it is dropped.
pub struct TraceLog {
    chrome_guard: Option<FlushGuard>,
}

impl TraceLog {
    pub fn init(opts: &TraceLogOpts) -> Result<Self> {
        // Route the `log` facade, used throughout the libraries, into tracing.
        tracing_log::LogTracer::init()?;

        let filter = EnvFilter::try_new(&opts.log_filter)?;
        let subscriber = Registry::default()
            .with(filter)
            .with(tracing_error::ErrorLayer::default())
            .with(tracing_subscriber::fmt::Layer::default());

        if !opts.trace {
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| anyhow!("could not set global tracing subscriber: {e}"))?;
            return Ok(Self { chrome_guard: None });
        }

        let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
            .name_fn(Box::new(|event_or_span| match event_or_span {
                tracing_chrome::EventOrSpan::Event(event) => event.metadata().name().into(),
                tracing_chrome::EventOrSpan::Span(span) => {
                    if let Some(fields) = span.extensions().get::<FormattedFields<DefaultFields>>()
                    {
                        format!("{}: {}", span.metadata().name(), fields.fields.as_str())
                    } else {
                        span.metadata().name().into()
                    }
                }
            }))
            .build();
        tracing::subscriber::set_global_default(subscriber.with(chrome_layer))
            .map_err(|e| anyhow!("could not set global tracing subscriber: {e}"))?;
        Ok(Self {
            chrome_guard: Some(guard),
        })
    }

    pub fn is_tracing(&self) -> bool {
        self.chrome_guard.is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_opts_parse() {
        let opts = TraceLogOpts::from_iter(["test", "-T", "--log-filter", "debug"]);
        assert!(opts.trace);
        assert_eq!(opts.log_filter, "debug");
        let opts = TraceLogOpts::from_iter(["test"]);
        assert!(!opts.trace);
        assert_eq!(opts.log_filter, "info");
    }

    #[test]
    fn test_bad_filter_is_an_error() {
        assert!(EnvFilter::try_new("clipmap=notalevel").is_err());
    }
}
