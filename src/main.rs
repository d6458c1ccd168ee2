use anyhow::Context as _;
use resilience::client::{build_pipeline, ValuesClient};
use resilience::metrics::MetricsService;
use resilience::{init_tracing, Context, PolicyExt, ResilienceConfig};
use std::env;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut show_metrics = false;
    let mut config_path = None;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--metrics" => show_metrics = true,
            _ => config_path = Some(arg),
        }
    }

    let config = match &config_path {
        Some(path) => ResilienceConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => ResilienceConfig::default(),
    };
    config.validate()?;

    let metrics = if show_metrics {
        Some(MetricsService::new()?)
    } else {
        None
    };

    let client = ValuesClient::new(&config.demo.base_url, config.demo.request_timeout())?;
    let pipeline = build_pipeline(&config);
    let id = config.demo.id;

    info!(
        base_url = client.base_url(),
        id,
        calls = config.demo.calls,
        max_retries = config.retry.max_retries,
        "Starting demo"
    );

    let client = &client;
    let mut failures = 0u32;
    for call in 1..=config.demo.calls {
        let context = Context::with_key(format!("The execution. #{}", call));

        match pipeline.execute(&context, move || client.get_value(id)).await {
            Ok(value) => println!("{}", value),
            Err(err) => {
                failures += 1;
                error!(
                    execution_key = context.execution_key(),
                    kind = err.kind(),
                    error = %err,
                    "Call failed"
                );
            }
        }
    }

    if let Some(metrics) = metrics {
        print!("{}", metrics.render());
    }

    if failures == config.demo.calls {
        anyhow::bail!("All {} calls failed", failures);
    }

    Ok(())
}
