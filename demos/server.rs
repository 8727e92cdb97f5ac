use argh::FromArgs;
use kornia_caption::{
    Blip, BlipConfig, CaptionEngine, CaptionService, ModelSource,
    blip::{DEFAULT_MAX_LENGTH, DEFAULT_MODEL_ID},
    server::{self, Theme, UiConfig},
};
use std::{path::PathBuf, sync::Arc};

// defaults for the server, only reachable from this machine
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 7860;
const DEFAULT_EXAMPLES: [&str; 1] = ["cat.jpg"];

#[derive(FromArgs)]
/// Serve a web page that captions uploaded images with BLIP.
struct ServerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// the hub id of the model to load
    #[argh(option, default = "DEFAULT_MODEL_ID.to_string()")]
    model_id: String,

    /// the hub revision of the model
    #[argh(option, default = "String::from(\"main\")")]
    revision: String,

    /// load the model from a local directory instead of the hub
    #[argh(option)]
    model_dir: Option<PathBuf>,

    /// maximum caption length in tokens
    #[argh(option, default = "DEFAULT_MAX_LENGTH")]
    max_length: usize,

    /// run on the cpu even if an accelerator is available
    #[argh(switch)]
    cpu: bool,

    /// page theme: soft, base or dark
    #[argh(option, default = "Theme::Soft")]
    theme: Theme,

    /// example image shown in the gallery, can be repeated
    #[argh(option)]
    example: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ServerArgs = argh::from_env();

    let source = match args.model_dir {
        Some(dir) => ModelSource::Local(dir),
        None => ModelSource::Hub {
            model_id: args.model_id,
            revision: args.revision,
        },
    };

    // no degraded mode: without a model there is nothing to serve
    let model = match Blip::new(BlipConfig {
        source,
        max_length: args.max_length,
        force_cpu: args.cpu,
        ..Default::default()
    }) {
        Ok(model) => model,
        Err(e) => {
            log::error!("Error loading model or processor: {e}");
            std::process::exit(1);
        }
    };

    let service = Arc::new(CaptionService::new(model));
    let engine = Arc::new(CaptionEngine::new(service));

    let examples = if args.example.is_empty() {
        DEFAULT_EXAMPLES.iter().map(PathBuf::from).collect()
    } else {
        args.example
    };
    let mut ui = UiConfig::default();
    ui.theme = args.theme;
    let ui = ui.with_examples(examples);

    let app = server::router(engine, ui);

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: http://{}", addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
