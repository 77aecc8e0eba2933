use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, oneshot};
use tokio::time::{Duration, Instant};

use garoa_common::StorageError;

use crate::expiry::{ExpiryIndex, run_expiration_worker};
use crate::list::{End, List, Waiter};
use crate::object::{Object, Value};

/// Hand-off pendente de um push: canal do waiter + valor consumido.
/// O envio acontece fora do lock do keyspace.
type Handoff = (oneshot::Sender<Bytes>, Bytes);

/// Estado compartilhado entre todas as conexões.
pub(crate) struct Shared {
    /// Keyspace inteiro atrás de um único mutex. Checagem de tipo,
    /// expiração lazy e mutação são inseparáveis — e leituras removem
    /// chave vencida, então leitura também é escrita.
    keys: Mutex<HashMap<String, Object>>,
    pub(crate) expiry: ExpiryIndex,
}

/// Handle para o banco de dados in-memory.
#[derive(Clone)]
pub struct Db {
    pub(crate) shared: Arc<Shared>,
}

/// Remove em-place uma chave vencida e devolve a entrada viva, se houver.
/// Toda leitura keyada passa por aqui: valor vencido nunca é observado.
fn live_entry<'a>(keys: &'a mut HashMap<String, Object>, key: &str) -> Option<&'a mut Object> {
    if keys.get(key).is_some_and(Object::is_expired) {
        keys.remove(key);
    }
    keys.get_mut(key)
}

impl Db {
    pub fn new() -> Self {
        let db = Db {
            shared: Arc::new(Shared {
                keys: Mutex::new(HashMap::new()),
                expiry: ExpiryIndex::new(),
            }),
        };

        // Worker de expiração ativa roda pela vida inteira do processo
        tokio::spawn(run_expiration_worker(db.clone()));

        db
    }

    // --- String operations ---

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let mut keys = self.shared.keys.lock().await;
        match live_entry(&mut keys, key) {
            None => Ok(None),
            Some(obj) => match &obj.value {
                Value::String(data) => Ok(Some(data.clone())),
                _ => Err(StorageError::InvalidMethod),
            },
        }
    }

    /// SET sobrescreve qualquer tipo (lista/hash inclusive) e limpa o
    /// deadline. Entrada obsoleta no heap de expiração é filtrada no pop.
    pub async fn set(&self, key: String, value: Bytes) {
        let mut keys = self.shared.keys.lock().await;
        keys.insert(key, Object::new(Value::String(value)));
    }

    /// Remove as chaves e conta quantas existiam (vencida não conta).
    pub async fn del(&self, targets: &[String]) -> usize {
        let mut keys = self.shared.keys.lock().await;
        let mut count = 0;
        for key in targets {
            if let Some(obj) = keys.remove(key)
                && !obj.is_expired()
            {
                count += 1;
            }
        }
        count
    }

    /// Conta chaves existentes; repetição na query conta de novo.
    pub async fn exists(&self, targets: &[String]) -> usize {
        let mut keys = self.shared.keys.lock().await;
        let mut count = 0;
        for key in targets {
            if live_entry(&mut keys, key).is_some() {
                count += 1;
            }
        }
        count
    }

    // --- Expiração ---

    /// Define o deadline da chave daqui a `seconds`. Substitui deadline
    /// anterior. Retorna false se a chave não existe.
    pub async fn expire(&self, key: &str, seconds: u64) -> bool {
        // seconds grande demais para o relógio satura no futuro distante
        let at = Instant::now()
            .checked_add(Duration::from_secs(seconds))
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(86400 * 365 * 30));
        self.expire_at(key, at).await
    }

    pub(crate) async fn expire_at(&self, key: &str, at: Instant) -> bool {
        {
            let mut keys = self.shared.keys.lock().await;
            let Some(obj) = live_entry(&mut keys, key) else {
                return false;
            };
            obj.expires_at = Some(at);
        }
        // o heap tem mutex próprio; seções críticas nunca aninham
        self.shared.expiry.schedule(key.to_string(), at).await;
        true
    }

    /// Segundos restantes, truncado; -1 sem deadline, -2 chave ausente.
    pub async fn ttl(&self, key: &str) -> i64 {
        let mut keys = self.shared.keys.lock().await;
        match live_entry(&mut keys, key) {
            None => -2,
            Some(obj) => match obj.expires_at {
                None => -1,
                Some(at) => at.saturating_duration_since(Instant::now()).as_secs() as i64,
            },
        }
    }

    /// Remoção pelo worker de expiração: só apaga se o deadline vivo for
    /// exatamente o da entrada popada (o filtro de entradas obsoletas).
    pub(crate) async fn remove_if_deadline(&self, key: &str, at: Instant) -> bool {
        let mut keys = self.shared.keys.lock().await;
        if keys.get(key).is_some_and(|obj| obj.expires_at == Some(at)) {
            keys.remove(key);
            true
        } else {
            false
        }
    }

    // --- List operations ---

    /// Push em uma das pontas; cria a lista se a chave não existe.
    ///
    /// Com waiters estacionados a lista está vazia: cada waiter vivo
    /// consome um valor da ponta correspondente à sua direção, sem o valor
    /// nunca entrar na lista; a sobra é inserida normalmente. O tamanho
    /// retornado conta os valores entregues como se tivessem sido
    /// inseridos — é o comprimento que o pusher enxergaria.
    pub async fn push(
        &self,
        key: &str,
        values: Vec<Bytes>,
        end: End,
    ) -> Result<usize, StorageError> {
        let (count, handoffs) = self.push_and_collect(key, values, end).await?;

        // rendezvous só depois de soltar o lock do keyspace
        let mut rejected = deliver(handoffs);
        while !rejected.is_empty() {
            // receiver sumiu entre o is_closed e o send: devolve o valor
            // pelo mesmo caminho (pode acordar outro waiter)
            match self.push_and_collect(key, rejected, end).await {
                Ok((_, handoffs)) => rejected = deliver(handoffs),
                Err(_) => break, // a chave mudou de tipo no meio; nada a fazer
            }
        }

        Ok(count)
    }

    async fn push_and_collect(
        &self,
        key: &str,
        values: Vec<Bytes>,
        end: End,
    ) -> Result<(usize, Vec<Handoff>), StorageError> {
        let mut keys = self.shared.keys.lock().await;
        if keys.get(key).is_some_and(Object::is_expired) {
            keys.remove(key);
        }
        let obj = keys
            .entry(key.to_string())
            .or_insert_with(|| Object::new(Value::List(List::new())));
        let Value::List(list) = &mut obj.value else {
            return Err(StorageError::InvalidMethod);
        };

        let mut handoffs: Vec<Handoff> = Vec::new();
        if list.is_empty() && !list.waiters.is_empty() {
            // o segmento que os valores formariam, já na ordem final
            let mut incoming: VecDeque<Bytes> = match end {
                End::Left => values.into_iter().rev().collect(),
                End::Right => values.into_iter().collect(),
            };
            while !incoming.is_empty() {
                let Some(waiter) = list.waiters.pop_front() else {
                    break;
                };
                if waiter.tx.is_closed() {
                    continue; // cliente desistiu; não consome valor
                }
                let value = match waiter.end {
                    End::Left => incoming.pop_front(),
                    End::Right => incoming.pop_back(),
                };
                if let Some(value) = value {
                    handoffs.push((waiter.tx, value));
                }
            }
            for value in incoming {
                list.push(End::Right, value);
            }
        } else {
            for value in values {
                list.push(end, value);
            }
        }

        let count = handoffs.len() + list.len();
        if list.is_empty() && list.waiters.is_empty() {
            keys.remove(key);
        }
        Ok((count, handoffs))
    }

    /// Pop de até `count` valores (default 1). Chave ausente é erro;
    /// lista esvaziada remove a chave.
    pub async fn pop(
        &self,
        key: &str,
        count: Option<usize>,
        end: End,
    ) -> Result<Vec<Bytes>, StorageError> {
        let mut keys = self.shared.keys.lock().await;
        let Some(obj) = live_entry(&mut keys, key) else {
            return Err(StorageError::KeyNotFound);
        };
        let Value::List(list) = &mut obj.value else {
            return Err(StorageError::InvalidMethod);
        };

        let n = count.unwrap_or(1).min(list.len());
        let mut popped = Vec::with_capacity(n);
        for _ in 0..n {
            if let Some(value) = list.pop(end) {
                popped.push(value);
            }
        }

        if list.is_empty() && list.waiters.is_empty() {
            keys.remove(key);
        }
        Ok(popped)
    }

    /// Pop bloqueante: retorna na hora se houver valor; senão instala a
    /// lista vazia (se preciso), estaciona um waiter e aguarda o
    /// rendezvous de um push futuro.
    pub async fn blocking_pop(&self, key: &str, end: End) -> Result<Bytes, StorageError> {
        let rx = {
            let mut keys = self.shared.keys.lock().await;
            if keys.get(key).is_some_and(Object::is_expired) {
                keys.remove(key);
            }
            let obj = keys
                .entry(key.to_string())
                .or_insert_with(|| Object::new(Value::List(List::new())));
            let Value::List(list) = &mut obj.value else {
                return Err(StorageError::InvalidMethod);
            };

            if let Some(value) = list.pop(end) {
                if list.is_empty() && list.waiters.is_empty() {
                    keys.remove(key);
                }
                return Ok(value);
            }

            let (tx, rx) = oneshot::channel();
            list.waiters.push_back(Waiter { end, tx });
            rx
        }; // lock liberado antes de estacionar

        // sender derrubado sem envio = a lista foi sobrescrita/removida
        rx.await.map_err(|_| StorageError::KeyNotFound)
    }

    // --- Hash operations ---

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>, StorageError> {
        let mut keys = self.shared.keys.lock().await;
        match live_entry(&mut keys, key) {
            None => Ok(None),
            Some(obj) => match &obj.value {
                Value::Hash(hash) => Ok(hash.get(field).cloned()),
                _ => Err(StorageError::TypeMismatch),
            },
        }
    }

    /// Grava os pares e retorna quantos campos foram criados (sobrescrever
    /// campo existente não conta). Cria o hash se a chave não existe.
    pub async fn hset(
        &self,
        key: &str,
        pairs: Vec<(String, Bytes)>,
    ) -> Result<usize, StorageError> {
        let mut keys = self.shared.keys.lock().await;
        if keys.get(key).is_some_and(Object::is_expired) {
            keys.remove(key);
        }
        let obj = keys
            .entry(key.to_string())
            .or_insert_with(|| Object::new(Value::Hash(HashMap::new())));
        let Value::Hash(hash) = &mut obj.value else {
            return Err(StorageError::TypeMismatch);
        };

        let mut created = 0;
        for (field, value) in pairs {
            if hash.insert(field, value).is_none() {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Todos os pares campo/valor achatados; ordem não especificada.
    /// Chave ausente responde vazio (não é erro, diferente de LPOP).
    pub async fn hgetall(&self, key: &str) -> Result<Vec<Bytes>, StorageError> {
        let mut keys = self.shared.keys.lock().await;
        match live_entry(&mut keys, key) {
            None => Ok(Vec::new()),
            Some(obj) => match &obj.value {
                Value::Hash(hash) => {
                    let mut flat = Vec::with_capacity(hash.len() * 2);
                    for (field, value) in hash {
                        flat.push(Bytes::from(field.clone()));
                        flat.push(value.clone());
                    }
                    Ok(flat)
                }
                _ => Err(StorageError::TypeMismatch),
            },
        }
    }

    /// Remove campos e conta os que existiam. Um hash que ficou sem campos
    /// continua keyado (contraste com lista, que some ao esvaziar).
    pub async fn hdel(&self, key: &str, fields: &[String]) -> Result<usize, StorageError> {
        let mut keys = self.shared.keys.lock().await;
        match live_entry(&mut keys, key) {
            None => Ok(0),
            Some(obj) => match &mut obj.value {
                Value::Hash(hash) => {
                    let mut removed = 0;
                    for field in fields {
                        if hash.remove(field).is_some() {
                            removed += 1;
                        }
                    }
                    Ok(removed)
                }
                _ => Err(StorageError::TypeMismatch),
            },
        }
    }

    #[cfg(test)]
    pub(crate) async fn contains_raw(&self, key: &str) -> bool {
        self.shared.keys.lock().await.contains_key(key)
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

/// Envia cada valor no canal do seu waiter; devolve os valores cujo
/// receiver já tinha sumido.
fn deliver(handoffs: Vec<Handoff>) -> Vec<Bytes> {
    handoffs
        .into_iter()
        .filter_map(|(tx, value)| tx.send(value).err())
        .collect()
}
