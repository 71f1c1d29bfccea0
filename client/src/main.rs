use clap::Parser;
use client::network::ConnectorConfig;
use client::runner::SessionRunner;
use client::session::UserIntent;
use log::info;
use shared::Participant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8081")]
    server: String,

    /// Display name to join with
    #[arg(short = 'n', long, default_value = "player")]
    name: String,

    /// Game code to join; omit to create a new session
    #[arg(short = 'c', long)]
    code: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting Past Pursuit client...");
    info!("Connecting to: {}", args.server);

    let identity = Participant::new("", &args.name);
    let config = ConnectorConfig::new(&args.server);

    let (mut runner, handle) = SessionRunner::new(identity, config);
    runner.connect();

    match args.code {
        Some(code) => {
            info!("Joining session {}", code);
            handle.intent(UserIntent::Join { code });
        }
        None => {
            info!("Creating a new session");
            handle.intent(UserIntent::Create);
        }
    }

    // Log what a rendering layer would show: phase changes, countdowns and
    // round results as the view updates.
    let mut view_rx = handle.view();
    tokio::spawn(async move {
        while view_rx.changed().await.is_ok() {
            let view = view_rx.borrow().clone();
            match &view.game_code {
                Some(code) => info!(
                    "[{}] round {} ({:?}) {} - {} (first to {})",
                    code,
                    view.round,
                    view.phase,
                    view.player_score,
                    view.opponent_score,
                    shared::WINNING_SCORE
                ),
                None => info!("in lobby ({:?})", view.phase),
            }
            if let Some(remaining) = view.countdown {
                info!("  {}s remaining", remaining);
            }
            if let Some(result) = &view.result {
                info!("  {}", result);
            }
        }
    });

    // Leave the session cleanly on Ctrl-C.
    let ctrl_c_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            ctrl_c_handle.intent(UserIntent::Leave);
            ctrl_c_handle.close();
        }
    });

    runner.run().await;

    Ok(())
}
