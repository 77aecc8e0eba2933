use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use garoa_common::{DEFAULT_AOF_PATH, DEFAULT_HOST, DEFAULT_PORT, MAX_CONNECTIONS};
use garoa_server::{Connection, handle_connection};
use garoa_storage::{Db, create_aof, replay_aof};

#[derive(Parser, Debug)]
#[command(name = "garoa-server", about = "GaroaDB — in-memory data store")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[arg(long, default_value_t = MAX_CONNECTIONS)]
    max_connections: usize,
    /// Arquivo do journal append-only.
    #[arg(long, value_name = "FILE", default_value = DEFAULT_AOF_PATH)]
    aof: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "garoa_server=info".into()),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let db = Db::new();

    // Replay do journal antes de aceitar conexões; erro aqui é fatal
    let count = replay_aof(&args.aof, &db).await?;
    if count > 0 {
        info!("{count} comandos restaurados do AOF");
    }

    let (aof_tx, writer) = create_aof(args.aof.clone(), 10_000);
    tokio::spawn(async move {
        if let Err(e) = writer.run().await {
            error!("AOF writer erro: {e}");
        }
    });
    let aof_tx = Some(aof_tx);

    let listener = TcpListener::bind(&addr).await?;
    info!("GaroaDB escutando em {addr}");

    let semaphore = std::sync::Arc::new(tokio::sync::Semaphore::new(args.max_connections));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    loop {
        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => permit.unwrap(),
            _ = signal::ctrl_c() => {
                info!("shutdown signal recebido");
                break;
            }
        };

        let (socket, addr) = tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok(v) => v,
                    Err(e) => {
                        error!("erro ao aceitar conexão: {e}");
                        continue;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("shutdown signal recebido");
                break;
            }
        };

        info!("nova conexão: {addr}");
        let db = db.clone();
        let aof_tx = aof_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let conn = Connection::new(socket);
            if let Err(e) = handle_connection(conn, db, &mut shutdown_rx, aof_tx).await {
                error!("erro na conexão {addr}: {e}");
            }
            info!("conexão encerrada: {addr}");
            drop(permit);
        });
    }

    // Avisa as conexões e deixa o writer flushar/syncar uma última vez
    drop(shutdown_tx);
    drop(aof_tx);

    Ok(())
}
