use bytes::Bytes;
use std::collections::HashMap;
use tokio::time::Instant;

use crate::list::List;

/// Tipo do valor armazenado.
///
/// A tag é estável pela vida da chave: trocar de tipo é delete + recreate
/// (a única exceção é SET, que sobrescreve qualquer coisa).
#[derive(Debug)]
pub(crate) enum Value {
    String(Bytes),
    List(List),
    Hash(HashMap<String, Bytes>),
}

/// Objeto no keyspace: valor tipado + deadline absoluto opcional.
#[derive(Debug)]
pub(crate) struct Object {
    pub(crate) value: Value,
    pub(crate) expires_at: Option<Instant>,
}

impl Object {
    /// Cria um objeto sem deadline (nunca expira).
    pub(crate) fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.expires_at
            .map(|t| Instant::now() >= t)
            .unwrap_or(false)
    }
}
