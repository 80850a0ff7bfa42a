use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Install the process-wide log subscriber.
///
/// `RUST_LOG` takes precedence; `default_directive` is appended so a bare
/// process still logs at a sensible level. Calling this more than once is
/// harmless, later calls are ignored.
pub fn init_tracing(default_directive: &str) {
    let directive = default_directive
        .parse()
        .or_else(|_| "info".parse())
        .ok();

    let mut filter = EnvFilter::builder()
        .with_env_var("RUST_LOG")
        .from_env_lossy();
    if let Some(directive) = directive {
        filter = filter.add_directive(directive);
    }

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .with(filter)
        .try_init();
}
