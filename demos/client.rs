use argh::FromArgs;
use kornia_caption::server::CaptionReply;
use std::path::PathBuf;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 7860;

#[derive(FromArgs)]
/// Caption client for a running caption server
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "caption" or "status"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Caption(CaptionCommand),
    Status(StatusCommand),
}

#[derive(FromArgs)]
/// Upload an image and print its caption
#[argh(subcommand, name = "caption")]
struct CaptionCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

#[derive(FromArgs)]
/// Print the server state
#[argh(subcommand, name = "status")]
struct StatusCommand {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    match args.command {
        ClientCommands::Caption(caption_command) => {
            let file_name = caption_command
                .image_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            let bytes = tokio::fs::read(&caption_command.image_path).await?;
            let form = reqwest::multipart::Form::new().part(
                "image",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

            let response = client
                .post(format!("http://{}/caption", addr))
                .multipart(form)
                .send()
                .await?;

            if response.status().is_success() {
                let reply = response.json::<CaptionReply>().await?;
                println!("Caption #{} ({} ms): {}", reply.id, reply.duration_ms, reply.caption);
            } else {
                let result = response.json::<serde_json::Value>().await?;
                println!("Error: {}", serde_json::to_string_pretty(&result)?);
            }
        }
        ClientCommands::Status(_) => {
            let response = client
                .get(format!("http://{}/status", addr))
                .send()
                .await?;

            let result = response.json::<serde_json::Value>().await?;
            println!("Status: {}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
