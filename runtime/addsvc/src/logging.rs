use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "addsvc=info,addsvc_core=info,addsvc_fabric=info";

pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true).json())
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false).compact())
            .init();
    }
}
