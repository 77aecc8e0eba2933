use bytes::Bytes;
use std::io::Cursor;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Duration;

use garoa_protocol::Frame;
use garoa_storage::{Db, create_aof, replay_aof};

/// Helper: sobe um servidor de teste na porta dada, com journal opcional.
async fn start_server(port: u16, aof: Option<PathBuf>) -> tokio::task::JoinHandle<()> {
    let handle = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}"))
            .await
            .unwrap();
        let db = Db::new();

        let aof_tx = match aof {
            Some(path) => {
                replay_aof(&path, &db).await.unwrap();
                let (tx, writer) = create_aof(path, 100);
                tokio::spawn(async move {
                    let _ = writer.run().await;
                });
                Some(tx)
            }
            None => None,
        };

        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
        loop {
            let (socket, _) = listener.accept().await.unwrap();
            let db = db.clone();
            let aof_tx = aof_tx.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                let conn = garoa_server::Connection::new(socket);
                let _ = garoa_server::handle_connection(conn, db, &mut shutdown_rx, aof_tx).await;
            });
        }
    });

    // Aguardar servidor estar pronto
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle
}

/// Helper: envia um comando e lê o frame de resposta.
async fn send_command(stream: &mut TcpStream, args: &[&str]) -> Frame {
    send_raw(stream, args).await;
    read_frame(stream).await
}

/// Helper: envia um comando sem ler resposta.
async fn send_raw(stream: &mut TcpStream, args: &[&str]) {
    let frame = Frame::array_from_strs(args);
    let mut buf = bytes::BytesMut::new();
    frame.encode(&mut buf);
    stream.write_all(&buf).await.unwrap();
    stream.flush().await.unwrap();
}

/// Helper: lê um frame do stream.
async fn read_frame(stream: &mut TcpStream) -> Frame {
    let mut response_buf = bytes::BytesMut::with_capacity(4096);
    loop {
        let n = stream.read_buf(&mut response_buf).await.unwrap();
        assert!(n > 0, "server closed connection unexpectedly");

        let mut cursor = Cursor::new(&response_buf[..]);
        if Frame::check(&mut cursor).is_ok() {
            cursor.set_position(0);
            return Frame::parse(&mut cursor).unwrap();
        }
    }
}

async fn connect(port: u16) -> TcpStream {
    TcpStream::connect(format!("127.0.0.1:{port}"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_ping_pong() {
    let port = 17400;
    let _server = start_server(port, None).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["PING"]).await;
    assert_eq!(response, Frame::simple("PONG"));
}

#[tokio::test]
async fn test_echo() {
    let port = 17401;
    let _server = start_server(port, None).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["ECHO", "Hello, GaroaDB!"]).await;
    assert_eq!(response, Frame::simple("Hello, GaroaDB!"));
}

#[tokio::test]
async fn test_set_get_del_roundtrip() {
    let port = 17402;
    let _server = start_server(port, None).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["SET", "foo", "bar"]).await;
    assert_eq!(response, Frame::simple("OK"));

    // GET responde simple string com o valor
    let response = send_command(&mut stream, &["GET", "foo"]).await;
    assert_eq!(response, Frame::simple("bar"));

    // DEL conta só as chaves que existiam
    let response = send_command(&mut stream, &["DEL", "foo", "baz"]).await;
    assert_eq!(response, Frame::simple("1"));

    let response = send_command(&mut stream, &["GET", "foo"]).await;
    assert_eq!(response, Frame::Null);
}

#[tokio::test]
async fn test_exists_counts_duplicates() {
    let port = 17403;
    let _server = start_server(port, None).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["SET", "a", "1"]).await;

    let response = send_command(&mut stream, &["EXISTS", "a", "a", "b"]).await;
    assert_eq!(response, Frame::simple("2"));
}

#[tokio::test]
async fn test_list_push_pop_flow() {
    let port = 17404;
    let _server = start_server(port, None).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["RPUSH", "q", "a", "b", "c"]).await;
    assert_eq!(response, Frame::simple("3"));

    let response = send_command(&mut stream, &["LPOP", "q", "2"]).await;
    assert_eq!(
        response,
        Frame::Array(vec![
            Frame::Bulk(Bytes::from("a")),
            Frame::Bulk(Bytes::from("b")),
        ])
    );

    let response = send_command(&mut stream, &["EXISTS", "q"]).await;
    assert_eq!(response, Frame::simple("1"));

    // sem count o reply ainda é array (de um elemento)
    let response = send_command(&mut stream, &["LPOP", "q"]).await;
    assert_eq!(response, Frame::Array(vec![Frame::Bulk(Bytes::from("c"))]));

    // lista esvaziada: a chave sumiu
    let response = send_command(&mut stream, &["EXISTS", "q"]).await;
    assert_eq!(response, Frame::simple("0"));
}

#[tokio::test]
async fn test_lpop_missing_key_is_error() {
    let port = 17405;
    let _server = start_server(port, None).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["LPOP", "missing"]).await;
    assert_eq!(response, Frame::Error("Key not found".into()));
}

#[tokio::test]
async fn test_blpop_handoff_from_another_connection() {
    let port = 17406;
    let _server = start_server(port, None).await;

    // Conexão A estaciona no BLPOP
    let mut blocked = connect(port).await;
    send_raw(&mut blocked, &["BLPOP", "q"]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Conexão B empurra um valor; o reply conta o valor entregue
    let mut pusher = connect(port).await;
    let response = send_command(&mut pusher, &["LPUSH", "q", "x"]).await;
    assert_eq!(response, Frame::simple("1"));

    // A desbloqueia com o valor, que nunca entrou na lista
    let response = read_frame(&mut blocked).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("x")));

    let response = send_command(&mut pusher, &["EXISTS", "q"]).await;
    assert_eq!(response, Frame::simple("0"));
}

#[tokio::test]
async fn test_brpop_takes_the_right_end() {
    let port = 17407;
    let _server = start_server(port, None).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["RPUSH", "q", "a", "b"]).await;
    let response = send_command(&mut stream, &["BRPOP", "q"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("b")));
}

#[tokio::test]
async fn test_hash_flow() {
    let port = 17408;
    let _server = start_server(port, None).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["HSET", "h", "f1", "v1", "f2", "v2"]).await;
    assert_eq!(response, Frame::Integer(2));

    // sobrescrever f1 não conta; f3 é novo
    let response = send_command(&mut stream, &["HSET", "h", "f1", "V1", "f3", "v3"]).await;
    assert_eq!(response, Frame::Integer(1));

    let response = send_command(&mut stream, &["HGET", "h", "f1"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("V1")));

    let response = send_command(&mut stream, &["HGETALL", "h"]).await;
    match response {
        Frame::Array(items) => {
            assert_eq!(items.len(), 6);
            let flat: Vec<Bytes> = items
                .into_iter()
                .map(|f| match f {
                    Frame::Bulk(b) => b,
                    other => panic!("expected bulk, got {other:?}"),
                })
                .collect();
            let pairs: Vec<(&Bytes, &Bytes)> = flat.chunks(2).map(|c| (&c[0], &c[1])).collect();
            assert!(pairs.contains(&(&Bytes::from("f1"), &Bytes::from("V1"))));
            assert!(pairs.contains(&(&Bytes::from("f2"), &Bytes::from("v2"))));
            assert!(pairs.contains(&(&Bytes::from("f3"), &Bytes::from("v3"))));
        }
        other => panic!("expected array, got {other:?}"),
    }

    let response = send_command(&mut stream, &["HDEL", "h", "f1", "ghost"]).await;
    assert_eq!(response, Frame::Integer(1));

    // HGETALL de chave ausente é array vazio
    let response = send_command(&mut stream, &["HGETALL", "nope"]).await;
    assert_eq!(response, Frame::Array(vec![]));
}

#[tokio::test]
async fn test_expire_ttl_lifecycle() {
    let port = 17409;
    let _server = start_server(port, None).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["SET", "k", "v"]).await;

    let response = send_command(&mut stream, &["TTL", "k"]).await;
    assert_eq!(response, Frame::Integer(-1));

    let response = send_command(&mut stream, &["EXPIRE", "k", "1"]).await;
    assert_eq!(response, Frame::Integer(1));

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let response = send_command(&mut stream, &["GET", "k"]).await;
    assert_eq!(response, Frame::Null);

    let response = send_command(&mut stream, &["TTL", "k"]).await;
    assert_eq!(response, Frame::Integer(-2));

    // EXPIRE em chave ausente responde 0
    let response = send_command(&mut stream, &["EXPIRE", "k", "10"]).await;
    assert_eq!(response, Frame::Integer(0));
}

#[tokio::test]
async fn test_error_taxonomy() {
    let port = 17410;
    let _server = start_server(port, None).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["FOOBAR"]).await;
    assert_eq!(response, Frame::Error("INVALID COMMAND".into()));

    let response = send_command(&mut stream, &["GET"]).await;
    assert_eq!(
        response,
        Frame::Error("INCORRECT NUMBER OF ARGUMENTS".into())
    );

    let response = send_command(&mut stream, &["HSET", "h", "f1", "v1", "f2"]).await;
    assert_eq!(
        response,
        Frame::Error("INCORRECT NUMBER OF ARGUMENTS".into())
    );

    let response = send_command(&mut stream, &["EXPIRE", "k", "0"]).await;
    assert_eq!(
        response,
        Frame::Error("TIME IS NOT A POSITIVE INTEGER".into())
    );

    let response = send_command(&mut stream, &["LPOP", "q", "-3"]).await;
    assert_eq!(
        response,
        Frame::Error("COUNT MUST BE A POSITIVE INTEGER".into())
    );

    // família string/lista contra tipo errado: INVALID METHOD
    send_command(&mut stream, &["SET", "s", "v"]).await;
    let response = send_command(&mut stream, &["LPUSH", "s", "a"]).await;
    assert_eq!(response, Frame::Error("INVALID METHOD".into()));

    send_command(&mut stream, &["RPUSH", "l", "a"]).await;
    let response = send_command(&mut stream, &["GET", "l"]).await;
    assert_eq!(response, Frame::Error("INVALID METHOD".into()));

    // família hash contra tipo errado: TYPE MISMATCH
    let response = send_command(&mut stream, &["HGET", "l", "f"]).await;
    assert_eq!(response, Frame::Error("TYPE MISMATCH".into()));
}

#[tokio::test]
async fn test_set_overwrites_list() {
    let port = 17411;
    let _server = start_server(port, None).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["RPUSH", "k", "a"]).await;
    let response = send_command(&mut stream, &["SET", "k", "v"]).await;
    assert_eq!(response, Frame::simple("OK"));

    let response = send_command(&mut stream, &["GET", "k"]).await;
    assert_eq!(response, Frame::simple("v"));
}

#[tokio::test]
async fn test_protocol_error_keeps_connection_alive() {
    let port = 17412;
    let _server = start_server(port, None).await;
    let mut stream = connect(port).await;

    // type byte desconhecido
    stream.write_all(b"?que\r\n").await.unwrap();
    stream.flush().await.unwrap();
    let response = read_frame(&mut stream).await;
    assert_eq!(response, Frame::Error("INVALID DATA TYPE".into()));

    // a conexão continua servindo
    let response = send_command(&mut stream, &["PING"]).await;
    assert_eq!(response, Frame::simple("PONG"));
}

#[tokio::test]
async fn test_boot_replay_from_aof() {
    let dir = tempfile::tempdir().unwrap();
    let aof_path = dir.path().join("boot.aof");

    // journal pré-existente: [SET a 1][RPUSH L x y][HSET h f v]
    let mut buf = bytes::BytesMut::new();
    Frame::array_from_strs(&["SET", "a", "1"]).encode(&mut buf);
    Frame::array_from_strs(&["RPUSH", "L", "x", "y"]).encode(&mut buf);
    Frame::array_from_strs(&["HSET", "h", "f", "v"]).encode(&mut buf);
    std::fs::write(&aof_path, &buf).unwrap();

    let port = 17413;
    let _server = start_server(port, Some(aof_path)).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["GET", "a"]).await;
    assert_eq!(response, Frame::simple("1"));

    let response = send_command(&mut stream, &["LPOP", "L"]).await;
    assert_eq!(response, Frame::Array(vec![Frame::Bulk(Bytes::from("x"))]));

    let response = send_command(&mut stream, &["HGET", "h", "f"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("v")));
}

#[tokio::test]
async fn test_mutations_survive_restart_via_aof() {
    let dir = tempfile::tempdir().unwrap();
    let aof_path = dir.path().join("restart.aof");

    let port = 17414;
    let server = start_server(port, Some(aof_path.clone())).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["SET", "persisted", "yes"]).await;
    send_command(&mut stream, &["RPUSH", "queue", "job1", "job2"]).await;
    // leitura não entra no journal
    send_command(&mut stream, &["GET", "persisted"]).await;

    // espera o tick de flush (1 s) escrever o buffer no arquivo
    tokio::time::sleep(Duration::from_millis(1500)).await;
    drop(stream);
    server.abort();

    let port = 17415;
    let _server = start_server(port, Some(aof_path)).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["GET", "persisted"]).await;
    assert_eq!(response, Frame::simple("yes"));

    let response = send_command(&mut stream, &["LPOP", "queue", "2"]).await;
    assert_eq!(
        response,
        Frame::Array(vec![
            Frame::Bulk(Bytes::from("job1")),
            Frame::Bulk(Bytes::from("job2")),
        ])
    );
}

#[tokio::test]
async fn test_large_value_roundtrip() {
    let port = 17416;
    let _server = start_server(port, None).await;
    let mut stream = connect(port).await;

    // elemento maior que um chunk inteiro (4096 bytes)
    let big = "x".repeat(10_000);
    let response = send_command(&mut stream, &["RPUSH", "big", big.as_str()]).await;
    assert_eq!(response, Frame::simple("1"));

    let response = send_command(&mut stream, &["LPOP", "big"]).await;
    assert_eq!(
        response,
        Frame::Array(vec![Frame::Bulk(Bytes::from(big))])
    );
}
