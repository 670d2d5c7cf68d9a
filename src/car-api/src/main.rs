use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};
use structopt::StructOpt;

use car_api::{api, AppState, LineBot};
use car_serve::{ImageClassifier, LabelSet};

#[derive(StructOpt, Debug)]
#[structopt(
    name = "car-api",
    about = "HTTP upload and chat-webhook frontend for car model classification"
)]
struct CmdArgs {
    #[structopt(help = "Export directory of the SavedModel")]
    export_dir: PathBuf,

    #[structopt(help = "Path to the labels file, one class name per line")]
    labels_path: PathBuf,

    #[structopt(
        long,
        default_value = "0.0.0.0:8000",
        help = "Socket address to listen on"
    )]
    listen: SocketAddr,

    #[structopt(long, env = "CHANNEL_ACCESS_TOKEN", hide_env_values = true)]
    channel_access_token: Option<String>,

    #[structopt(long, env = "CHANNEL_SECRET", hide_env_values = true)]
    channel_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    // Model load and shape validation happen here, before the socket
    // is bound. A bad artifact must abort startup, not the first
    // request.
    let labels = LabelSet::from_file(&args.labels_path)?;
    let classifier = Arc::new(ImageClassifier::new(&args.export_dir, labels)?);

    let line = match (args.channel_access_token, args.channel_secret) {
        (Some(token), Some(secret)) => Some(LineBot::new(token, secret)),
        _ => {
            warn!("CHANNEL_ACCESS_TOKEN/CHANNEL_SECRET not set, /callback disabled");
            None
        }
    };

    let state = Arc::new(AppState { classifier, line });
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!("listening on {}", args.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
