//! Process-wide `tracing` output through a factory's format and sinks.
//!
//! Libraries in the stack (hyper, axum, tower-http) emit through `tracing`.
//! Installing the factory's layer behind an `EnvFilter` gives the process a
//! single structured output: their events become records named
//! `<namespace>.<target>`, with the fields of enclosing spans first.

use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::Error;

use super::{Level, LoggerFactory};

impl LoggerFactory {
    /// A dispatcher rendering events of every target with this factory's
    /// format and outputs, filtered by `filter`. A no-op factory yields a
    /// dispatcher that drops everything.
    pub fn tracing_dispatch(&self, filter: EnvFilter) -> Dispatch {
        match self.logger().core() {
            Some(core) => {
                let subscriber = tracing_subscriber::registry()
                    .with(filter)
                    .with(core.layer());
                Dispatch::new(subscriber)
            }
            None => Dispatch::none(),
        }
    }

    /// Install [`tracing_dispatch`](Self::tracing_dispatch) as the global
    /// default.
    ///
    /// Filtering follows `RUST_LOG` when set; otherwise foreign targets are
    /// kept at `warn` and this crate at the factory's level.
    pub fn install_tracing(&self) -> Result<(), Error> {
        let own_level = self.level().unwrap_or(Level::Warn);
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("warn,{}={}", env!("CARGO_CRATE_NAME"), own_level))
        });

        self.tracing_dispatch(filter)
            .try_init()
            .map_err(|e| Error::TracingInit(e.to_string()))
    }
}
