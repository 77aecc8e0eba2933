use bytes::Bytes;
use garoa_common::CommandError;

use crate::{Frame, Parse};

/// Enum com todos os comandos suportados.
///
/// `from_frame` valida aridade e argumentos numéricos; `to_frame` refaz o
/// array de bulk strings, que é o formato gravado no journal append-only.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Echo(Bytes),
    Get(String),
    Set {
        key: String,
        value: Bytes,
    },
    Del(Vec<String>),
    Exists(Vec<String>),
    Expire {
        key: String,
        seconds: i64,
    },
    Ttl(String),
    LPush {
        key: String,
        values: Vec<Bytes>,
    },
    RPush {
        key: String,
        values: Vec<Bytes>,
    },
    LPop {
        key: String,
        count: Option<usize>,
    },
    RPop {
        key: String,
        count: Option<usize>,
    },
    BLPop(String),
    BRPop(String),
    HGet {
        key: String,
        field: String,
    },
    HSet {
        key: String,
        pairs: Vec<(String, Bytes)>,
    },
    HGetAll(String),
    HDel {
        key: String,
        fields: Vec<String>,
    },
    Unknown(String),
}

impl Command {
    /// Faz o parse de um Frame em um Command.
    ///
    /// Nomes são resolvidos case-insensitive; um nome fora do conjunto vira
    /// `Command::Unknown` (o handler responde `INVALID COMMAND`).
    pub fn from_frame(frame: Frame) -> Result<Command, CommandError> {
        let mut parse = Parse::new(frame)?;
        let cmd_name = parse.next_string()?.to_uppercase();

        let cmd = match cmd_name.as_str() {
            "PING" => {
                parse.finish()?;
                Command::Ping
            }
            "ECHO" => {
                let msg = parse.next_bytes()?;
                parse.finish()?;
                Command::Echo(msg)
            }
            "GET" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::Get(key)
            }
            "SET" => {
                let key = parse.next_string()?;
                let value = parse.next_bytes()?;
                parse.finish()?;
                Command::Set { key, value }
            }
            "DEL" => Command::Del(collect_keys(&mut parse)?),
            "EXISTS" => Command::Exists(collect_keys(&mut parse)?),
            "EXPIRE" => {
                let key = parse.next_string()?;
                let seconds = parse
                    .next_int()
                    .map_err(|e| numeric_error(e, CommandError::TimeNotPositive))?;
                parse.finish()?;
                if seconds <= 0 {
                    return Err(CommandError::TimeNotPositive);
                }
                Command::Expire { key, seconds }
            }
            "TTL" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::Ttl(key)
            }
            "LPUSH" => {
                let (key, values) = parse_push(&mut parse)?;
                Command::LPush { key, values }
            }
            "RPUSH" => {
                let (key, values) = parse_push(&mut parse)?;
                Command::RPush { key, values }
            }
            "LPOP" => {
                let (key, count) = parse_pop(&mut parse)?;
                Command::LPop { key, count }
            }
            "RPOP" => {
                let (key, count) = parse_pop(&mut parse)?;
                Command::RPop { key, count }
            }
            "BLPOP" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::BLPop(key)
            }
            "BRPOP" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::BRPop(key)
            }
            "HGET" => {
                let key = parse.next_string()?;
                let field = parse.next_string()?;
                parse.finish()?;
                Command::HGet { key, field }
            }
            "HSET" => {
                let key = parse.next_string()?;
                // HSET key field value [field value ...]: N >= 3 e N ímpar,
                // ou seja, pelo menos um par e nenhum campo sem valor.
                let mut pairs = Vec::new();
                while parse.has_remaining() {
                    let field = parse.next_string()?;
                    if !parse.has_remaining() {
                        return Err(CommandError::WrongArity);
                    }
                    let value = parse.next_bytes()?;
                    pairs.push((field, value));
                }
                if pairs.is_empty() {
                    return Err(CommandError::WrongArity);
                }
                Command::HSet { key, pairs }
            }
            "HGETALL" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::HGetAll(key)
            }
            "HDEL" => {
                let key = parse.next_string()?;
                if !parse.has_remaining() {
                    return Err(CommandError::WrongArity);
                }
                let mut fields = Vec::new();
                while parse.has_remaining() {
                    fields.push(parse.next_string()?);
                }
                Command::HDel { key, fields }
            }
            _ => Command::Unknown(cmd_name),
        };

        Ok(cmd)
    }

    /// Encoda o comando como Frame (array de bulk strings) para o journal.
    pub fn to_frame(&self) -> Frame {
        match self {
            Command::Ping => Frame::Array(vec![Frame::bulk("PING")]),
            Command::Echo(msg) => Frame::Array(vec![Frame::bulk("ECHO"), Frame::Bulk(msg.clone())]),
            Command::Get(key) => Frame::Array(vec![Frame::bulk("GET"), Frame::bulk(key)]),
            Command::Set { key, value } => Frame::Array(vec![
                Frame::bulk("SET"),
                Frame::bulk(key),
                Frame::Bulk(value.clone()),
            ]),
            Command::Del(keys) => {
                let mut parts = vec![Frame::bulk("DEL")];
                parts.extend(keys.iter().map(|k| Frame::bulk(k)));
                Frame::Array(parts)
            }
            Command::Exists(keys) => {
                let mut parts = vec![Frame::bulk("EXISTS")];
                parts.extend(keys.iter().map(|k| Frame::bulk(k)));
                Frame::Array(parts)
            }
            Command::Expire { key, seconds } => Frame::Array(vec![
                Frame::bulk("EXPIRE"),
                Frame::bulk(key),
                Frame::bulk(&seconds.to_string()),
            ]),
            Command::Ttl(key) => Frame::Array(vec![Frame::bulk("TTL"), Frame::bulk(key)]),
            Command::LPush { key, values } => {
                let mut parts = vec![Frame::bulk("LPUSH"), Frame::bulk(key)];
                parts.extend(values.iter().map(|v| Frame::Bulk(v.clone())));
                Frame::Array(parts)
            }
            Command::RPush { key, values } => {
                let mut parts = vec![Frame::bulk("RPUSH"), Frame::bulk(key)];
                parts.extend(values.iter().map(|v| Frame::Bulk(v.clone())));
                Frame::Array(parts)
            }
            Command::LPop { key, count } => {
                let mut parts = vec![Frame::bulk("LPOP"), Frame::bulk(key)];
                if let Some(c) = count {
                    parts.push(Frame::bulk(&c.to_string()));
                }
                Frame::Array(parts)
            }
            Command::RPop { key, count } => {
                let mut parts = vec![Frame::bulk("RPOP"), Frame::bulk(key)];
                if let Some(c) = count {
                    parts.push(Frame::bulk(&c.to_string()));
                }
                Frame::Array(parts)
            }
            Command::BLPop(key) => Frame::Array(vec![Frame::bulk("BLPOP"), Frame::bulk(key)]),
            Command::BRPop(key) => Frame::Array(vec![Frame::bulk("BRPOP"), Frame::bulk(key)]),
            Command::HGet { key, field } => Frame::Array(vec![
                Frame::bulk("HGET"),
                Frame::bulk(key),
                Frame::bulk(field),
            ]),
            Command::HSet { key, pairs } => {
                let mut parts = vec![Frame::bulk("HSET"), Frame::bulk(key)];
                for (field, value) in pairs {
                    parts.push(Frame::bulk(field));
                    parts.push(Frame::Bulk(value.clone()));
                }
                Frame::Array(parts)
            }
            Command::HGetAll(key) => Frame::Array(vec![Frame::bulk("HGETALL"), Frame::bulk(key)]),
            Command::HDel { key, fields } => {
                let mut parts = vec![Frame::bulk("HDEL"), Frame::bulk(key)];
                parts.extend(fields.iter().map(|f| Frame::bulk(f)));
                Frame::Array(parts)
            }
            Command::Unknown(name) => Frame::Array(vec![Frame::bulk(name)]),
        }
    }
}

/// Troca erros de validação numérica pela mensagem específica do comando,
/// preservando aridade (argumento faltando continua sendo aridade).
fn numeric_error(err: CommandError, specific: CommandError) -> CommandError {
    match err {
        CommandError::WrongArity => CommandError::WrongArity,
        _ => specific,
    }
}

fn collect_keys(parse: &mut Parse) -> Result<Vec<String>, CommandError> {
    if !parse.has_remaining() {
        return Err(CommandError::WrongArity);
    }
    let mut keys = Vec::with_capacity(parse.remaining());
    while parse.has_remaining() {
        keys.push(parse.next_string()?);
    }
    Ok(keys)
}

fn parse_push(parse: &mut Parse) -> Result<(String, Vec<Bytes>), CommandError> {
    let key = parse.next_string()?;
    if !parse.has_remaining() {
        return Err(CommandError::WrongArity);
    }
    let mut values = Vec::with_capacity(parse.remaining());
    while parse.has_remaining() {
        values.push(parse.next_bytes()?);
    }
    Ok((key, values))
}

fn parse_pop(parse: &mut Parse) -> Result<(String, Option<usize>), CommandError> {
    let key = parse.next_string()?;
    let count = if parse.has_remaining() {
        let n = parse
            .next_int()
            .map_err(|e| numeric_error(e, CommandError::CountNotPositive))?;
        if n <= 0 {
            return Err(CommandError::CountNotPositive);
        }
        Some(n as usize)
    } else {
        None
    };
    parse.finish()?;
    Ok((key, count))
}
