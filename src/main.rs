use cribside::{AudioEngine, EngineConfig, SessionState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let address = match std::env::args().nth(1).or_else(|| std::env::var("CRIBSIDE_URL").ok()) {
        Some(addr) => addr,
        None => {
            eprintln!("usage: cribside <ws-url>   (or set CRIBSIDE_URL)");
            std::process::exit(2);
        }
    };

    let engine = AudioEngine::new(EngineConfig::default());
    engine.start_streaming(&address).await?;

    let mut state_rx = engine.subscribe();
    loop {
        let state = state_rx.borrow_and_update().clone();
        log::info!("session state: {}", state);
        match state {
            SessionState::Error(reason) => {
                log::error!("stream failed: {}", reason);
                break;
            }
            SessionState::Idle => {
                log::info!("stream ended");
                break;
            }
            _ => {}
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("received Ctrl+C, shutting down...");
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    engine.stop_streaming().await;
    Ok(())
}
