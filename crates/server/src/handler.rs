use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error};

use garoa_common::{ConnectionError, StorageError};
use garoa_protocol::{Command, Frame};
use garoa_storage::{Db, End, is_write_command};

use crate::Connection;

/// Loop principal de tratamento de uma conexão.
pub async fn handle_connection(
    mut conn: Connection,
    db: Db,
    shutdown: &mut broadcast::Receiver<()>,
    aof_tx: Option<mpsc::Sender<Command>>,
) -> Result<(), ConnectionError> {
    loop {
        let frame = tokio::select! {
            result = conn.read_frame() => match result {
                Ok(frame) => frame,
                // frame malformado: um reply de erro e a conexão segue
                Err(ConnectionError::Protocol(e)) => {
                    conn.write_frame(&Frame::Error(e.to_string())).await?;
                    continue;
                }
                Err(e) => return Err(e),
            },
            _ = shutdown.recv() => {
                return Ok(());
            }
        };

        let frame = match frame {
            Some(f) => f,
            None => return Ok(()), // EOF
        };

        let cmd = match Command::from_frame(frame) {
            Ok(cmd) => cmd,
            Err(e) => {
                conn.write_frame(&Frame::Error(e.to_string())).await?;
                continue;
            }
        };

        debug!("comando recebido: {cmd:?}");

        // BLPOP/BRPOP podem estacionar indefinidamente; correm contra o
        // shutdown para não vazar a task da conexão.
        let response = tokio::select! {
            response = execute_command(&cmd, &db) => response,
            _ = shutdown.recv() => {
                return Ok(());
            }
        };

        // Mutação aceita vai para o journal; channel cheio segura o loop
        // de leitura (back-pressure intencional)
        if is_write_command(&cmd)
            && !matches!(response, Frame::Error(_))
            && let Some(ref tx) = aof_tx
        {
            if tx.send(cmd.clone()).await.is_err() {
                // writer morto: a mutação foi aplicada mas não persistida
                error!("AOF writer indisponível, mutação não persistida: {cmd:?}");
            }
        }

        conn.write_frame(&response).await?;
    }
}

/// Executa um comando e retorna o Frame de resposta.
///
/// Convenções de reply: contagens de DEL/EXISTS/LPUSH/RPUSH saem como
/// simple string (`+3`); EXPIRE/TTL/HSET/HDEL como inteiro; LPOP/RPOP
/// sempre como array, mesmo com um único elemento.
async fn execute_command(cmd: &Command, db: &Db) -> Frame {
    match cmd {
        Command::Ping => Frame::simple("PONG"),
        Command::Echo(msg) => Frame::Simple(msg.clone()),
        Command::Get(key) => match db.get(key).await {
            Ok(Some(value)) => Frame::Simple(value),
            Ok(None) => Frame::Null,
            Err(e) => Frame::Error(e.to_string()),
        },
        Command::Set { key, value } => {
            db.set(key.clone(), value.clone()).await;
            Frame::simple("OK")
        }
        Command::Del(keys) => {
            let count = db.del(keys).await;
            Frame::simple(&count.to_string())
        }
        Command::Exists(keys) => {
            let count = db.exists(keys).await;
            Frame::simple(&count.to_string())
        }
        Command::Expire { key, seconds } => {
            if db.expire(key, *seconds as u64).await {
                Frame::Integer(1)
            } else {
                Frame::Integer(0)
            }
        }
        Command::Ttl(key) => Frame::Integer(db.ttl(key).await),
        Command::LPush { key, values } => {
            push_reply(db.push(key, values.clone(), End::Left).await)
        }
        Command::RPush { key, values } => {
            push_reply(db.push(key, values.clone(), End::Right).await)
        }
        Command::LPop { key, count } => pop_reply(db.pop(key, *count, End::Left).await),
        Command::RPop { key, count } => pop_reply(db.pop(key, *count, End::Right).await),
        Command::BLPop(key) => blocking_pop_reply(db.blocking_pop(key, End::Left).await),
        Command::BRPop(key) => blocking_pop_reply(db.blocking_pop(key, End::Right).await),
        Command::HGet { key, field } => match db.hget(key, field).await {
            Ok(Some(value)) => Frame::Bulk(value),
            Ok(None) => Frame::Null,
            Err(e) => Frame::Error(e.to_string()),
        },
        Command::HSet { key, pairs } => match db.hset(key, pairs.clone()).await {
            Ok(created) => Frame::Integer(created as i64),
            Err(e) => Frame::Error(e.to_string()),
        },
        Command::HGetAll(key) => match db.hgetall(key).await {
            Ok(flat) => Frame::Array(flat.into_iter().map(Frame::Bulk).collect()),
            Err(e) => Frame::Error(e.to_string()),
        },
        Command::HDel { key, fields } => match db.hdel(key, fields).await {
            Ok(removed) => Frame::Integer(removed as i64),
            Err(e) => Frame::Error(e.to_string()),
        },
        Command::Unknown(name) => {
            debug!("comando desconhecido: {name}");
            Frame::Error("INVALID COMMAND".into())
        }
    }
}

fn push_reply(result: Result<usize, StorageError>) -> Frame {
    match result {
        Ok(len) => Frame::simple(&len.to_string()),
        Err(e) => Frame::Error(e.to_string()),
    }
}

fn pop_reply(result: Result<Vec<Bytes>, StorageError>) -> Frame {
    match result {
        Ok(items) => Frame::Array(items.into_iter().map(Frame::Bulk).collect()),
        Err(e) => Frame::Error(e.to_string()),
    }
}

fn blocking_pop_reply(result: Result<Bytes, StorageError>) -> Frame {
    match result {
        Ok(value) => Frame::Bulk(value),
        Err(e) => Frame::Error(e.to_string()),
    }
}
