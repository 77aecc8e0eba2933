/// Erros de parsing do protocolo RESP.
///
/// As variantes visíveis ao cliente carregam a mensagem exata do wire
/// (`INVALID DATA TYPE` etc.); as internas têm descrição livre.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame incompleto: precisa de mais bytes do stream.
    #[error("frame incompleto")]
    Incomplete,
    #[error("INVALID DATA TYPE")]
    InvalidFrameType(u8),
    #[error("PROTOCOL ERROR: invalid integer '{0}'")]
    InvalidInteger(String),
    #[error("PROTOCOL ERROR: invalid bulk length {0}")]
    InvalidBulkLength(i64),
    #[error("PROTOCOL ERROR: frame exceeds maximum size ({0} bytes)")]
    FrameTooLarge(usize),
    #[error("PROTOCOL ERROR: invalid encoding: {0}")]
    InvalidEncoding(String),
}

/// Erros de armazenamento/engine de dados.
///
/// A mensagem de cada variante é exatamente o que vai no reply `-...\r\n`.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum StorageError {
    /// Operação de string/lista contra chave de outro tipo.
    #[error("INVALID METHOD")]
    InvalidMethod,
    /// Operação de hash contra chave de outro tipo.
    #[error("TYPE MISMATCH")]
    TypeMismatch,
    #[error("Key not found")]
    KeyNotFound,
}

/// Erros de conexão TCP.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("conexão resetada pelo peer")]
    ConnectionReset,
    /// Frame malformado: a conexão sobrevive, o handler responde o erro.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("servidor em shutdown")]
    Shutdown,
}

/// Erros de parsing/validação de comandos.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("INVALID COMMAND")]
    Unknown(String),
    #[error("INCORRECT NUMBER OF ARGUMENTS")]
    WrongArity,
    #[error("TIME IS NOT A POSITIVE INTEGER")]
    TimeNotPositive,
    #[error("COUNT MUST BE A POSITIVE INTEGER")]
    CountNotPositive,
    #[error("INVALID ARGUMENT: {0}")]
    InvalidArgument(String),
}

/// Erro top-level do GaroaDB.
#[derive(Debug, thiserror::Error)]
pub enum GaroaError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Result type alias.
pub type GaroaResult<T> = Result<T, GaroaError>;

// Conversão implícita de io::Error → GaroaError (via ConnectionError)
impl From<std::io::Error> for GaroaError {
    fn from(e: std::io::Error) -> Self {
        GaroaError::Connection(ConnectionError::Io(e))
    }
}
