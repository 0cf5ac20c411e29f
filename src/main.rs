use flotilla::startup::{init_logging, run};
use flotilla::ControllerConfig;

#[tokio::main]
async fn main() {
    init_logging();
    let cfg = match ControllerConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };
    if let Err(e) = run(cfg).await {
        tracing::error!(error = %e, "controller failed");
        std::process::exit(1);
    }
}
