//! A tiny in-process mock `ktserver` used by the integration tests. It
//! speaks just enough of the binary protocol to exercise `set_bulk`,
//! `get_bulk`, and `remove_bulk` against an in-memory store, so the test
//! suite doesn't need a real `ktserver` binary on `PATH`.

use std::collections::HashMap;
use std::sync::Arc;

use ktasync::{MB_ERROR, MB_GET_BULK, MB_PLAY_SCRIPT, MB_REMOVE_BULK, MB_SET_BULK};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

type Store = Arc<Mutex<HashMap<(u16, Vec<u8>), (Vec<u8>, i64)>>>;

/// Behavior knob for [`MockServer`]: respond normally, or always answer the
/// next request with the `ERROR` magic (used by the server-error scenario).
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    ErrorOnce,
}

pub struct MockServer {
    pub port: u16,
}

impl MockServer {
    /// Bind an ephemeral port and start serving in the background.
    pub async fn start(mode: Mode) -> MockServer {
        let _ = env_logger::try_init();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let store: Store = Arc::new(Mutex::new(HashMap::new()));
        let error_once = Arc::new(Mutex::new(mode == Mode::ErrorOnce));

        tokio::spawn(async move {
            loop {
                let (socket, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                let store = Arc::clone(&store);
                let error_once = Arc::clone(&error_once);
                tokio::spawn(async move {
                    let _ = serve_connection(socket, store, error_once).await;
                });
            }
        });

        MockServer { port }
    }
}

async fn serve_connection(
    mut socket: TcpStream,
    store: Store,
    error_once: Arc<Mutex<bool>>,
) -> std::io::Result<()> {
    loop {
        let magic = match socket.read_u8().await {
            Ok(m) => m,
            Err(_) => return Ok(()),
        };
        let flags = socket.read_u32().await?;
        let n = socket.read_u32().await?;

        match magic {
            MB_SET_BULK => {
                let mut cnt = 0u32;
                let mut db_store = store.lock().await;
                for _ in 0..n {
                    let db = socket.read_u16().await?;
                    let klen = socket.read_u32().await? as usize;
                    let vlen = socket.read_u32().await? as usize;
                    let xt = socket.read_i64().await?;
                    let mut key = vec![0u8; klen];
                    socket.read_exact(&mut key).await?;
                    let mut val = vec![0u8; vlen];
                    socket.read_exact(&mut val).await?;
                    db_store.insert((db, key), (val, xt));
                    cnt += 1;
                }
                drop(db_store);

                if should_error(&error_once).await {
                    send_error(&mut socket).await?;
                } else if flags & 0x01 == 0 {
                    socket.write_u8(MB_SET_BULK).await?;
                    socket.write_u32(cnt).await?;
                    socket.flush().await?;
                }
            }
            MB_GET_BULK => {
                let mut wanted = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let db = socket.read_u16().await?;
                    let klen = socket.read_u32().await? as usize;
                    let mut key = vec![0u8; klen];
                    socket.read_exact(&mut key).await?;
                    wanted.push((db, key));
                }

                if should_error(&error_once).await {
                    send_error(&mut socket).await?;
                    continue;
                }

                let db_store = store.lock().await;
                let mut found = Vec::new();
                for (db, key) in wanted {
                    if let Some((val, xt)) = db_store.get(&(db, key.clone())) {
                        found.push((db, key, val.clone(), *xt));
                    }
                }
                drop(db_store);

                socket.write_u8(MB_GET_BULK).await?;
                socket.write_u32(found.len() as u32).await?;
                for (db, key, val, xt) in found {
                    socket.write_u16(db).await?;
                    socket.write_u32(key.len() as u32).await?;
                    socket.write_u32(val.len() as u32).await?;
                    socket.write_i64(xt).await?;
                    socket.write_all(&key).await?;
                    socket.write_all(&val).await?;
                }
                socket.flush().await?;
            }
            MB_REMOVE_BULK => {
                let mut cnt = 0u32;
                let mut db_store = store.lock().await;
                for _ in 0..n {
                    let db = socket.read_u16().await?;
                    let klen = socket.read_u32().await? as usize;
                    let mut key = vec![0u8; klen];
                    socket.read_exact(&mut key).await?;
                    if db_store.remove(&(db, key)).is_some() {
                        cnt += 1;
                    }
                }
                drop(db_store);

                if should_error(&error_once).await {
                    send_error(&mut socket).await?;
                } else if flags & 0x01 == 0 {
                    socket.write_u8(MB_REMOVE_BULK).await?;
                    socket.write_u32(cnt).await?;
                    socket.flush().await?;
                }
            }
            MB_PLAY_SCRIPT => {
                // The generic `n` read above lands on `nlen` for this
                // command: the prefix is `u8 m; u32 flags; u32 nlen; name;
                // u32 n;`, not `u32 n` directly.
                let nlen = n as usize;
                let mut name = vec![0u8; nlen];
                socket.read_exact(&mut name).await?;
                let record_count = socket.read_u32().await?;

                let mut records = Vec::with_capacity(record_count as usize);
                for _ in 0..record_count {
                    let klen = socket.read_u32().await? as usize;
                    let vlen = socket.read_u32().await? as usize;
                    let mut key = vec![0u8; klen];
                    socket.read_exact(&mut key).await?;
                    let mut val = vec![0u8; vlen];
                    socket.read_exact(&mut val).await?;
                    records.push((key, val));
                }

                if should_error(&error_once).await {
                    send_error(&mut socket).await?;
                    continue;
                }

                // A real script procedure could transform its input; this
                // mock just echoes what it was given, which is enough to
                // exercise the response codec's coalesced-read path.
                if flags & 0x01 == 0 {
                    socket.write_u8(MB_PLAY_SCRIPT).await?;
                    socket.write_u32(records.len() as u32).await?;
                    for (key, val) in records {
                        socket.write_u32(key.len() as u32).await?;
                        socket.write_u32(val.len() as u32).await?;
                        socket.write_all(&key).await?;
                        socket.write_all(&val).await?;
                    }
                    socket.flush().await?;
                }
            }
            _ => {
                send_error(&mut socket).await?;
            }
        }
    }
}

async fn should_error(error_once: &Arc<Mutex<bool>>) -> bool {
    let mut flag = error_once.lock().await;
    if *flag {
        *flag = false;
        true
    } else {
        false
    }
}

async fn send_error(socket: &mut TcpStream) -> std::io::Result<()> {
    socket.write_u8(MB_ERROR).await?;
    socket.flush().await
}
