use bytes::Bytes;
use garoa_common::CommandError;

use crate::Frame;

/// Cursor sobre um Frame::Array para extrair argumentos sequencialmente.
///
/// Esgotar os argumentos (ou sobrar argumento no `finish`) vira
/// `WrongArity`, que chega ao cliente como `INCORRECT NUMBER OF ARGUMENTS`.
pub struct Parse {
    parts: Vec<Frame>,
    pos: usize,
}

impl Parse {
    /// Cria um Parse a partir de um Frame. O frame deve ser Array.
    pub fn new(frame: Frame) -> Result<Parse, CommandError> {
        match frame {
            Frame::Array(parts) => Ok(Parse { parts, pos: 0 }),
            _ => Err(CommandError::InvalidArgument(
                "expected an array of bulk strings".into(),
            )),
        }
    }

    /// Retorna o próximo elemento como String (de Bulk ou Simple).
    pub fn next_string(&mut self) -> Result<String, CommandError> {
        match self.next()? {
            Frame::Simple(data) | Frame::Bulk(data) => String::from_utf8(data.to_vec())
                .map_err(|_| CommandError::InvalidArgument("invalid UTF-8 string".into())),
            _ => Err(CommandError::InvalidArgument(
                "expected a string argument".into(),
            )),
        }
    }

    /// Retorna o próximo elemento como Bytes (de Bulk).
    pub fn next_bytes(&mut self) -> Result<Bytes, CommandError> {
        match self.next()? {
            Frame::Bulk(data) | Frame::Simple(data) => Ok(data),
            _ => Err(CommandError::InvalidArgument(
                "expected a bulk string argument".into(),
            )),
        }
    }

    /// Retorna o próximo elemento como i64.
    pub fn next_int(&mut self) -> Result<i64, CommandError> {
        match self.next()? {
            Frame::Integer(n) => Ok(n),
            Frame::Bulk(data) | Frame::Simple(data) => {
                let s = std::str::from_utf8(&data)
                    .map_err(|_| CommandError::InvalidArgument("invalid integer".into()))?;
                s.parse::<i64>()
                    .map_err(|_| CommandError::InvalidArgument(format!("'{s}' is not an integer")))
            }
            _ => Err(CommandError::InvalidArgument("expected an integer".into())),
        }
    }

    /// Verifica se todos os argumentos foram consumidos.
    pub fn finish(&self) -> Result<(), CommandError> {
        if self.pos < self.parts.len() {
            Err(CommandError::WrongArity)
        } else {
            Ok(())
        }
    }

    /// Verifica se ainda há argumentos restantes.
    pub fn has_remaining(&self) -> bool {
        self.pos < self.parts.len()
    }

    /// Retorna o número de argumentos restantes.
    pub fn remaining(&self) -> usize {
        self.parts.len() - self.pos
    }

    fn next(&mut self) -> Result<Frame, CommandError> {
        if self.pos >= self.parts.len() {
            return Err(CommandError::WrongArity);
        }
        let frame = self.parts[self.pos].clone();
        self.pos += 1;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_strings() {
        let frame = Frame::array_from_strs(&["SET", "key", "value"]);
        let mut parse = Parse::new(frame).unwrap();
        assert_eq!(parse.next_string().unwrap(), "SET");
        assert_eq!(parse.next_string().unwrap(), "key");
        assert_eq!(parse.next_string().unwrap(), "value");
        parse.finish().unwrap();
    }

    #[test]
    fn parse_extracts_int_from_bulk() {
        let frame = Frame::array_from_strs(&["EXPIRE", "key", "10"]);
        let mut parse = Parse::new(frame).unwrap();
        parse.next_string().unwrap();
        parse.next_string().unwrap();
        assert_eq!(parse.next_int().unwrap(), 10);
        parse.finish().unwrap();
    }

    #[test]
    fn parse_not_array_fails() {
        let frame = Frame::simple("OK");
        assert!(Parse::new(frame).is_err());
    }

    #[test]
    fn parse_extra_args_is_arity_error() {
        let frame = Frame::array_from_strs(&["PING", "extra"]);
        let mut parse = Parse::new(frame).unwrap();
        parse.next_string().unwrap();
        assert_eq!(parse.finish(), Err(CommandError::WrongArity));
    }

    #[test]
    fn parse_exhausted_is_arity_error() {
        let frame = Frame::array_from_strs(&["GET"]);
        let mut parse = Parse::new(frame).unwrap();
        parse.next_string().unwrap();
        assert_eq!(parse.next_string(), Err(CommandError::WrongArity));
    }

    #[test]
    fn parse_non_integer_argument() {
        let frame = Frame::array_from_strs(&["LPOP", "list", "abc"]);
        let mut parse = Parse::new(frame).unwrap();
        parse.next_string().unwrap();
        parse.next_string().unwrap();
        assert!(matches!(
            parse.next_int(),
            Err(CommandError::InvalidArgument(_))
        ));
    }
}
