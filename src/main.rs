use log::error;
use todo_app_core::config::Config;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Environment misconfigured: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = todo_app_core::start_server(config).await {
        error!("Server failed: {e}");
        std::process::exit(1);
    }
}
