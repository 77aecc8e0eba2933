use std::collections::VecDeque;

use bytes::Bytes;
use tokio::sync::oneshot;

/// Máximo de elementos por chunk.
const CHUNK_MAX_ITEMS: usize = 64;
/// Máximo de bytes de payload por chunk.
const CHUNK_MAX_BYTES: usize = 4096;

/// Extremidade de uma lista (e direção de um pop bloqueante).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    Left,
    Right,
}

/// Waiter de pop bloqueante: canal de uso único marcado com a direção.
/// Vive dentro da própria lista; o pusher drena a fila em ordem FIFO.
#[derive(Debug)]
pub(crate) struct Waiter {
    pub(crate) end: End,
    pub(crate) tx: oneshot::Sender<Bytes>,
}

/// Chunk de capacidade fixa: ring buffer limitado por itens e por bytes.
#[derive(Debug)]
struct Chunk {
    items: VecDeque<Bytes>,
    bytes: usize,
}

impl Chunk {
    fn new() -> Self {
        Self {
            items: VecDeque::with_capacity(CHUNK_MAX_ITEMS),
            bytes: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Recusa quando qualquer limite estouraria. Um chunk vazio aceita um
    /// elemento de qualquer tamanho (elemento maior que o limite ocupa um
    /// chunk sozinho).
    fn accepts(&self, value: &Bytes) -> bool {
        self.items.len() < CHUNK_MAX_ITEMS
            && (self.items.is_empty() || self.bytes + value.len() <= CHUNK_MAX_BYTES)
    }

    fn push(&mut self, end: End, value: Bytes) {
        self.bytes += value.len();
        match end {
            End::Left => self.items.push_front(value),
            End::Right => self.items.push_back(value),
        }
    }

    fn pop(&mut self, end: End) -> Option<Bytes> {
        let value = match end {
            End::Left => self.items.pop_front(),
            End::Right => self.items.pop_back(),
        }?;
        self.bytes -= value.len();
        Some(value)
    }
}

/// Lista como sequência dupla de chunks: push/pop O(1) nas duas pontas.
/// Sempre existe pelo menos um chunk; um chunk vazio que não é o único é
/// desligado no pop.
#[derive(Debug)]
pub(crate) struct List {
    chunks: VecDeque<Chunk>,
    len: usize,
    pub(crate) waiters: VecDeque<Waiter>,
}

impl List {
    pub(crate) fn new() -> Self {
        let mut chunks = VecDeque::new();
        chunks.push_back(Chunk::new());
        Self {
            chunks,
            len: 0,
            waiters: VecDeque::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn push(&mut self, end: End, value: Bytes) {
        let needs_new_chunk = match end {
            End::Left => self.chunks.front().is_none_or(|c| !c.accepts(&value)),
            End::Right => self.chunks.back().is_none_or(|c| !c.accepts(&value)),
        };
        if needs_new_chunk {
            match end {
                End::Left => self.chunks.push_front(Chunk::new()),
                End::Right => self.chunks.push_back(Chunk::new()),
            }
        }

        let chunk = match end {
            End::Left => self.chunks.front_mut(),
            End::Right => self.chunks.back_mut(),
        };
        if let Some(chunk) = chunk {
            chunk.push(end, value);
            self.len += 1;
        }
    }

    pub(crate) fn pop(&mut self, end: End) -> Option<Bytes> {
        let value = match end {
            End::Left => self.chunks.front_mut()?.pop(End::Left),
            End::Right => self.chunks.back_mut()?.pop(End::Right),
        }?;
        self.len -= 1;

        if self.chunks.len() > 1 {
            let emptied = match end {
                End::Left => self.chunks.front().is_some_and(Chunk::is_empty),
                End::Right => self.chunks.back().is_some_and(Chunk::is_empty),
            };
            if emptied {
                match end {
                    End::Left => self.chunks.pop_front(),
                    End::Right => self.chunks.pop_back(),
                };
            }
        }

        Some(value)
    }

    /// Itera os elementos da esquerda para a direita.
    #[cfg(test)]
    fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.chunks.iter().flat_map(|c| c.items.iter())
    }
}
