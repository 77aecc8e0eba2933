use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tokio::sync::{Mutex, Notify};
use tokio::time::{self, Instant};
use tracing::debug;

use crate::Db;

/// Entrada no heap de expiração: (deadline, chave), ordenada pelo deadline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ExpiryEntry {
    at: Instant,
    key: String,
}

/// Índice de expiração: min-heap de (deadline, chave) + sinal de wake.
///
/// O keyspace só insere; entradas obsoletas (chave removida, deadline
/// reescrito) ficam no heap e são filtradas no pop pela igualdade exata
/// de deadline contra o objeto vivo. O mutex daqui nunca aninha com o do
/// keyspace.
#[derive(Debug)]
pub(crate) struct ExpiryIndex {
    heap: Mutex<BinaryHeap<Reverse<ExpiryEntry>>>,
    wake: Notify,
}

impl ExpiryIndex {
    pub(crate) fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            wake: Notify::new(),
        }
    }

    /// Registra um deadline. Acorda o worker se a nova entrada precede a
    /// raiz atual (ou se o heap estava vazio).
    pub(crate) async fn schedule(&self, key: String, at: Instant) {
        let mut heap = self.heap.lock().await;
        let precedes_root = heap.peek().is_none_or(|Reverse(top)| at < top.at);
        heap.push(Reverse(ExpiryEntry { at, key }));
        drop(heap);

        if precedes_root {
            self.wake.notify_one();
        }
    }

    async fn next_deadline(&self) -> Option<Instant> {
        self.heap.lock().await.peek().map(|Reverse(e)| e.at)
    }

    /// Remove a raiz apenas se já venceu; uma raiz futura fica no lugar
    /// (um wake pode correr contra o timer e chegar aqui cedo demais).
    async fn pop_due(&self, now: Instant) -> Option<(Instant, String)> {
        let mut heap = self.heap.lock().await;
        if heap.peek().is_some_and(|Reverse(e)| e.at <= now) {
            heap.pop().map(|Reverse(e)| (e.at, e.key))
        } else {
            None
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }
}

/// Worker de expiração ativa: dorme até o deadline da raiz e remove as
/// chaves vencidas. A expiração lazy já garante que valor vencido nunca é
/// observado; o papel daqui é limitar memória de chaves nunca mais lidas.
pub(crate) async fn run_expiration_worker(db: Db) {
    let index = &db.shared.expiry;

    loop {
        let Some(deadline) = index.next_deadline().await else {
            index.wake.notified().await;
            continue;
        };

        if deadline > Instant::now() {
            tokio::select! {
                _ = time::sleep_until(deadline) => {}
                // entrada nova mais cedo que a raiz: recomeça o cálculo
                _ = index.wake.notified() => continue,
            }
        }

        let now = Instant::now();
        while let Some((at, key)) = index.pop_due(now).await {
            if db.remove_if_deadline(&key, at).await {
                debug!("chave expirada removida: {key}");
            }
        }
    }
}
