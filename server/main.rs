/// malaria-cam prediction service
///
/// Classifies uploaded blood-cell images and returns Grad-CAM explanations.
/// Served by a synchronous tiny_http server.
///
/// Run with:
///   cargo run --bin server --release -- --config server.json
///
/// Endpoints:
///   GET  /         service description
///   GET  /health   liveness and model status
///   POST /predict  multipart image upload

mod handlers;
mod routes;
mod state;
mod util;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tiny_http::Server;
use tracing::{error, info, warn};

use malaria_cam::{logging, Network, ServerConfig};
use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "server", about = "HTTP service for malaria classification with Grad-CAM")]
struct Args {
    /// JSON config file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_tracing(args.verbose.max(1));

    let config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let model = match Network::load_json(&config.model_path.to_string_lossy()) {
        Ok(network) => {
            info!(name = %network.name, path = %config.model_path.display(), "model loaded");
            Some(network)
        }
        Err(err) => {
            warn!(error = %err, path = %config.model_path.display(), "model not loaded; /predict will answer 503");
            None
        }
    };

    let server = match Server::http(config.addr.as_str()) {
        Ok(server) => server,
        Err(err) => {
            error!(error = %err, addr = %config.addr, "failed to bind HTTP server");
            return ExitCode::FAILURE;
        }
    };
    info!(addr = %config.addr, gradcam = config.include_gradcam, "listening");

    let shared_state = Arc::new(AppState::new(config, model));

    // Each request runs on its own thread; the model is shared read-only and
    // instrumentation is serialized inside the classifier.
    for request in server.incoming_requests() {
        let state_clone = Arc::clone(&shared_state);
        std::thread::spawn(move || {
            routes::dispatch(request, state_clone);
        });
    }

    ExitCode::SUCCESS
}
