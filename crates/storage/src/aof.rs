use std::io::Cursor;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, interval};
use tracing::{debug, info};

use garoa_protocol::{Command, Frame};

use crate::Db;
use crate::list::End;

/// Limite do buffer interno de escrita.
const MAX_BUFFER_BYTES: usize = 512 * 1024;

/// Writer que recebe mutações via channel e faz append no arquivo AOF.
///
/// Três atividades num único select: comando novo entra no buffer (ou
/// direto no arquivo, se maior que o buffer), tick de flush (1 s) escreve
/// o buffer, tick de sync (1 s) chama fsync.
pub struct AofWriter {
    rx: mpsc::Receiver<Command>,
    path: PathBuf,
}

impl AofWriter {
    pub fn new(rx: mpsc::Receiver<Command>, path: PathBuf) -> Self {
        Self { rx, path }
    }

    /// Loop principal: recebe comandos e escreve no arquivo.
    pub async fn run(mut self) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let mut buffer = BytesMut::with_capacity(MAX_BUFFER_BYTES);
        let mut write_tick = interval(Duration::from_secs(1));
        let mut sync_tick = interval(Duration::from_secs(1));

        info!("AOF writer iniciado: {:?}", self.path);

        loop {
            tokio::select! {
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(cmd) => append_command(&mut file, &mut buffer, &cmd).await?,
                        None => {
                            // channel fechado — flush e sync finais
                            if !buffer.is_empty() {
                                file.write_all(&buffer).await?;
                            }
                            file.sync_data().await?;
                            info!("AOF writer encerrado");
                            return Ok(());
                        }
                    }
                }
                _ = write_tick.tick() => {
                    if !buffer.is_empty() {
                        file.write_all(&buffer).await?;
                        buffer.clear();
                    }
                }
                _ = sync_tick.tick() => {
                    file.sync_data().await?;
                }
            }
        }
    }
}

/// Serializa o comando e acumula no buffer, respeitando o limite.
/// `write_all` insiste até todos os bytes serem aceitos.
async fn append_command(
    file: &mut File,
    buffer: &mut BytesMut,
    cmd: &Command,
) -> std::io::Result<()> {
    let mut encoded = BytesMut::new();
    cmd.to_frame().encode(&mut encoded);

    // comando sozinho maior que o buffer: flush e escrita direta
    if encoded.len() > MAX_BUFFER_BYTES {
        if !buffer.is_empty() {
            file.write_all(&buffer[..]).await?;
            buffer.clear();
        }
        return file.write_all(&encoded).await;
    }

    if buffer.len() + encoded.len() > MAX_BUFFER_BYTES {
        file.write_all(&buffer[..]).await?;
        buffer.clear();
    }
    buffer.extend_from_slice(&encoded);
    Ok(())
}

/// Lê o arquivo AOF e reaplica as mutações no Db, na ordem de commit.
/// Arquivo ausente não é erro; frame ou comando inválido é fatal.
pub async fn replay_aof(path: &Path, db: &Db) -> std::io::Result<usize> {
    if !path.exists() {
        info!("arquivo AOF não encontrado, iniciando sem dados");
        return Ok(0);
    }

    let mut file = File::open(path).await?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).await?;

    let mut cursor = Cursor::new(&data[..]);
    let mut count = 0;

    while (cursor.position() as usize) < data.len() {
        let start = cursor.position();
        Frame::check(&mut cursor).map_err(corrupt)?;
        cursor.set_position(start);
        let frame = Frame::parse(&mut cursor).map_err(corrupt)?;
        let cmd = Command::from_frame(frame).map_err(corrupt)?;
        apply_command(&cmd, db).await;
        count += 1;
    }

    info!("AOF replay completo: {count} comandos restaurados");
    Ok(count)
}

fn corrupt(e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, format!("AOF corrompido: {e}"))
}

/// Aplica uma mutação do journal ao Db.
///
/// Pop bloqueante reaplica como pop simples: na ordem de commit o push
/// que o satisfez vem antes, então nunca há o que esperar. Resultado de
/// pop/push é ignorado (um journal truncado pode deixar um pop sem alvo).
async fn apply_command(cmd: &Command, db: &Db) {
    match cmd {
        Command::Set { key, value } => db.set(key.clone(), value.clone()).await,
        Command::Del(keys) => {
            db.del(keys).await;
        }
        Command::Expire { key, seconds } => {
            db.expire(key, *seconds as u64).await;
        }
        Command::LPush { key, values } => {
            let _ = db.push(key, values.clone(), End::Left).await;
        }
        Command::RPush { key, values } => {
            let _ = db.push(key, values.clone(), End::Right).await;
        }
        Command::LPop { key, count } => {
            let _ = db.pop(key, *count, End::Left).await;
        }
        Command::RPop { key, count } => {
            let _ = db.pop(key, *count, End::Right).await;
        }
        Command::BLPop(key) => {
            let _ = db.pop(key, None, End::Left).await;
        }
        Command::BRPop(key) => {
            let _ = db.pop(key, None, End::Right).await;
        }
        Command::HSet { key, pairs } => {
            let _ = db.hset(key, pairs.clone()).await;
        }
        Command::HDel { key, fields } => {
            let _ = db.hdel(key, fields).await;
        }
        _ => {
            debug!("AOF: comando não-mutação ignorado no replay: {cmd:?}");
        }
    }
}

/// Cria um par (sender, AofWriter) para uso no servidor.
pub fn create_aof(path: PathBuf, channel_capacity: usize) -> (mpsc::Sender<Command>, AofWriter) {
    let (tx, rx) = mpsc::channel(channel_capacity);
    let writer = AofWriter::new(rx, path);
    (tx, writer)
}

/// Determina se um comando é mutação e deve ser persistido no AOF.
pub fn is_write_command(cmd: &Command) -> bool {
    matches!(
        cmd,
        Command::Set { .. }
            | Command::Del(_)
            | Command::Expire { .. }
            | Command::LPush { .. }
            | Command::RPush { .. }
            | Command::LPop { .. }
            | Command::RPop { .. }
            | Command::BLPop(_)
            | Command::BRPop(_)
            | Command::HSet { .. }
            | Command::HDel { .. }
    )
}
