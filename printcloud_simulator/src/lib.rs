//! In-memory stand-in for the remote print service.
//!
//! Serves the printer, command and print job resources over HTTP so the bridge can be run
//! and tested without a real account. Printers, acknowledgements and jobs live only as long
//! as the process.

pub mod api;
pub mod models;
pub mod state;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

pub use api::create_router;
pub use state::{SimOptions, SimState};

/// A simulator serving on a local port; stops when dropped.
pub struct RunningSimulator {
    pub base_url: Url,
    pub state: SimState,
    handle: JoinHandle<()>,
}

impl Drop for RunningSimulator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serves `state` on `listener`; URIs handed out are rooted at the state's base URL.
pub async fn serve(listener: TcpListener, state: SimState) -> std::io::Result<()> {
    axum::serve(listener, create_router(state)).await
}

/// Starts a simulator on an ephemeral localhost port.
pub async fn spawn(options: SimOptions) -> std::io::Result<RunningSimulator> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let base_url = Url::parse(&format!("http://{addr}/")).map_err(std::io::Error::other)?;
    let state = SimState::new(base_url.clone(), options);

    let server_state = state.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, server_state).await {
            tracing::error!("Simulator stopped: {}", e);
        }
    });
    tracing::info!("Print service simulator listening on {}", base_url);

    Ok(RunningSimulator {
        base_url,
        state,
        handle,
    })
}
