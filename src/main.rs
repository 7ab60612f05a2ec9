use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use moondream_ui::logger::{self, LogLevel};
use moondream_ui::{
    AppConfig, Element, EventBus, LocalBackend, PresetDialog, ScriptedGenerator, SessionEnd,
    Surface, TerminalSurface, UiController, shutdown_signal,
};

#[derive(Parser, Debug)]
#[command(name = "moondream", about = "Ask a question about an image and stream the answer")]
struct Cli {
    /// Question about the image
    #[arg(long)]
    prompt: String,

    /// Image file to pick
    #[arg(long)]
    image: Option<String>,

    /// Path to config TOML with [ui] and [backend] tables
    #[arg(long, default_value = "moondream.toml")]
    config: PathBuf,

    /// Override the scripted reply
    #[arg(long)]
    reply: Option<String>,

    /// Override the delay between generated tokens
    #[arg(long)]
    token_delay_ms: Option<u64>,

    /// Logging verbosity level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::try_init(cli.log_level).map_err(|e| anyhow::anyhow!(e))?;

    let mut config = AppConfig::load(&cli.config).await?;
    if let Some(reply) = cli.reply {
        config.backend.reply = reply;
    }
    if let Some(ms) = cli.token_delay_ms {
        config.backend.token_delay_ms = ms;
    }

    let bus = EventBus::new();
    let generator = ScriptedGenerator::new(config.backend.reply.clone())
        .token_delay(Duration::from_millis(config.backend.token_delay_ms));
    let backend = LocalBackend::new(bus.clone(), Arc::new(generator))
        .channel(config.ui.channel.clone())
        .assets_dir(config.backend.assets_dir.clone());

    let surface = TerminalSurface::new();
    let page = surface.page().clone();
    let controller = UiController::new(
        Arc::new(backend),
        Arc::new(PresetDialog::new(cli.image)),
        bus,
        Arc::new(surface),
    )
    .config(config.ui);

    page.set_value(Element::PromptInput, &cli.prompt);
    if controller.open_image().await.is_none() {
        bail!("no image selected");
    }

    let abort = controller.abort_handle();
    let session = controller.submit();
    tokio::pin!(session);
    let finished = tokio::select! {
        end = &mut session => Some(end),
        _ = shutdown_signal() => None,
    };
    let end = match finished {
        Some(end) => end,
        None => {
            abort.abort();
            session.await
        }
    };
    println!();

    match end {
        SessionEnd::Failed => bail!("{}", page.text(Element::ErrorMessage)),
        SessionEnd::Skipped => bail!("prompt is empty"),
        SessionEnd::Finished | SessionEnd::Completed | SessionEnd::Aborted => Ok(()),
    }
}
