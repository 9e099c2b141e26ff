//! Tracing subscriber setup shared by binaries

use crate::errors::{ServiceError, ServiceResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `<service>=info` plus the library
/// crates at `info`.
pub fn init_tracing(service_name: &str) -> ServiceResult<()> {
    let target = service_name.replace('-', "_");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{target}=info,fx_rates=info,billing=info,services_common=info").into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| ServiceError::InternalError(format!("tracing already initialised: {e}")))
}
