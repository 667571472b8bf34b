//! Solver-side listener: accepts connections on the configured solver
//! address and logs every annotation task it receives.
//!
//! Usage: `solver_listen [config.yaml]`

use std::path::PathBuf;

use common::log_setup::setup_logging;
use paint::PaintConfig;
use paint::transport::TcpFrameReader;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging("info");

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => PaintConfig::load(&path)?,
        None => PaintConfig::default(),
    };

    let listener = TcpListener::bind(&config.solver.address).await?;
    info!(address = %config.solver.address, "Solver listener ready");

    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "Paint client connected");
        tokio::spawn(async move {
            if let Err(err) = receive_tasks(stream).await {
                error!(%peer, "Connection failed: {err}");
            }
        });
    }
}

async fn receive_tasks(stream: TcpStream) -> anyhow::Result<()> {
    let mut reader = TcpFrameReader::new(stream);
    while let Some(task) = reader.read_task().await? {
        let voxels: usize = task.masks().values().map(|mask| mask.count(&true)).sum();
        info!(
            uuid = task.uuid(),
            id = task.id(),
            new_ids = ?task.new_ids(),
            invalidated_ids = ?task.invalidated_ids(),
            voxels,
            "Received annotation task"
        );
    }
    Ok(())
}
