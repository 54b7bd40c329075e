use crate::{
    error::{StratumError, StratumResult},
    protocol::Outbound,
    session::{Session, StratumContext},
};
use pool_core::{debug, error, info, warn};
use pool_mining::model::job::JobTemplate;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::broadcast::{self, error::RecvError},
    time::{Instant, sleep},
};

pub const READ_BUFFER_SIZE: usize = 4096;
/// A connection buffering more than this without a newline is dropped
pub const MAX_LINE_LENGTH: usize = 16 * 1024;

/// Public Stratum TCP listener. Every accepted connection runs its own
/// [`Session`] in a dedicated task.
pub struct StratumListener {
    listener: TcpListener,
    ctx: Arc<StratumContext>,
}

impl StratumListener {
    pub async fn bind(addr: SocketAddr, ctx: Arc<StratumContext>) -> StratumResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> StratumResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!("Stratum listener started on {}", addr),
            Err(err) => warn!("Stratum listener started on an unknown address: {}", err),
        }
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let ctx = self.ctx.clone();
                    tokio::spawn(serve_connection(ctx, stream, peer));
                }
                Err(err) => {
                    error!("Failed to accept stratum connection: {}", err);
                    // typically fd exhaustion, give the process room to recover
                    sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

async fn serve_connection(ctx: Arc<StratumContext>, stream: TcpStream, peer: SocketAddr) {
    debug!("[{}] Connected", peer);
    // subscribe before the session can ask for work so no job is missed
    let jobs = ctx.job_manager.subscribe();
    let mut session = Session::new(ctx.clone(), peer);
    match connection_loop(&ctx, &mut session, stream, jobs).await {
        Ok(()) => debug!("[{}] Disconnected", peer),
        Err(err) => debug!("[{}] Disconnected: {}", peer, err),
    }
}

async fn connection_loop(
    ctx: &StratumContext,
    session: &mut Session,
    stream: TcpStream,
    mut jobs: broadcast::Receiver<Arc<JobTemplate>>,
) -> StratumResult<()> {
    let (mut reader, mut writer) = stream.into_split();
    let idle_timeout = ctx.config.idle_timeout;
    let idle = sleep(idle_timeout);
    tokio::pin!(idle);

    let mut buffer = [0u8; READ_BUFFER_SIZE];
    let mut pending: Vec<u8> = Vec::new();
    loop {
        tokio::select! {
            read = reader.read(&mut buffer) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }
                pending.extend_from_slice(&buffer[..n]);
                while let Some(newline) = pending.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = pending.drain(..=newline).collect();
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    idle.as_mut().reset(Instant::now() + idle_timeout);
                    let out = session.handle_line(line).await;
                    write_lines(&mut writer, &out).await?;
                }
                if pending.len() > MAX_LINE_LENGTH {
                    return Err(StratumError::Protocol(format!("line exceeds {MAX_LINE_LENGTH} bytes")));
                }
            }
            job = jobs.recv() => {
                let job = match job {
                    Ok(job) => job,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("[{}] Skipped {} job updates, sending the current one", session.peer(), skipped);
                        match ctx.job_manager.current_snapshot() {
                            Some(job) => job,
                            None => continue,
                        }
                    }
                    Err(RecvError::Closed) => return Ok(()),
                };
                if let Some(notify) = session.on_new_job(&job) {
                    write_lines(&mut writer, &[notify]).await?;
                }
            }
            () = &mut idle => {
                debug!("[{}] Idle for {:?}, closing", session.peer(), idle_timeout);
                return Ok(());
            }
        }
    }
}

/// Writes each message as one newline-terminated JSON line.
pub(crate) async fn write_lines<W: AsyncWrite + Unpin>(writer: &mut W, messages: &[Outbound]) -> StratumResult<()> {
    if messages.is_empty() {
        return Ok(());
    }
    let mut payload = String::new();
    for message in messages {
        payload.push_str(&message.to_line()?);
        payload.push('\n');
    }
    writer.write_all(payload.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{self, Harness, PASSWORD, WORKER};
    use pool_mining::testutils::fixtures;
    use serde_json::{Value, json};
    use tokio::{
        io::{AsyncBufReadExt, BufReader, Lines},
        net::tcp::OwnedReadHalf,
        time::timeout,
    };

    async fn start(idle_timeout: Duration) -> (Harness, SocketAddr) {
        let harness = testutils::harness(fixtures::HARD_BITS, idle_timeout).await;
        let listener = StratumListener::bind("127.0.0.1:0".parse().unwrap(), harness.ctx.clone()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(listener.run());
        (harness, addr)
    }

    async fn next_message(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Value {
        let line = timeout(Duration::from_secs(5), lines.next_line()).await.unwrap().unwrap().expect("connection closed");
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_mining_over_tcp() {
        let (harness, addr) = start(Duration::from_secs(60)).await;
        let (reader, mut writer) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut lines = BufReader::new(reader).lines();

        // two requests in one segment, the second split across writes
        writer.write_all(b"{\"id\":1,\"method\":\"mining.subscribe\",\"params\":[]}\n{\"id\":2,\"method\":").await.unwrap();
        let subscribed = next_message(&mut lines).await;
        assert_eq!(subscribed["id"], json!(1));
        assert_eq!(subscribed["error"], Value::Null);
        assert_eq!(subscribed["result"][2], json!(fixtures::EXTRANONCE2_SIZE));

        writer.write_all(format!("\"mining.authorize\",\"params\":[\"{WORKER}\",\"{PASSWORD}\"]}}\n").as_bytes()).await.unwrap();
        assert_eq!(next_message(&mut lines).await, json!({"id": 2, "result": true, "error": null}));
        assert_eq!(next_message(&mut lines).await["method"], json!("mining.set_difficulty"));
        let notify = next_message(&mut lines).await;
        assert_eq!(notify["method"], json!("mining.notify"));
        assert_eq!(notify["params"][0], json!("1"));

        writer.write_all(b"garbage\n").await.unwrap();
        assert_eq!(next_message(&mut lines).await["error"][0], json!(-32700));

        // a new job is pushed without a request
        harness.ctx.job_manager.rebuild().await.unwrap();
        let notify = next_message(&mut lines).await;
        assert_eq!(notify["method"], json!("mining.notify"));
        assert_eq!(notify["params"][0], json!("2"));
        assert_eq!(notify["params"][8], json!(true));
    }

    #[tokio::test]
    async fn test_idle_connection_is_closed() {
        let (harness, addr) = start(Duration::from_millis(300)).await;
        let (reader, mut writer) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut lines = BufReader::new(reader).lines();
        writer.write_all(b"{\"id\":1,\"method\":\"mining.subscribe\",\"params\":[]}\n").await.unwrap();
        next_message(&mut lines).await;

        // job broadcasts do not count as activity
        harness.ctx.job_manager.rebuild().await.unwrap();
        let closed = timeout(Duration::from_secs(5), lines.next_line()).await.unwrap().unwrap();
        assert_eq!(closed, None);
    }

    #[tokio::test]
    async fn test_overlong_line_drops_connection() {
        let (_harness, addr) = start(Duration::from_secs(60)).await;
        let (reader, mut writer) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut lines = BufReader::new(reader).lines();
        // the server may reset the connection mid-write
        let _ = writer.write_all(&vec![b'a'; MAX_LINE_LENGTH + READ_BUFFER_SIZE]).await;
        let closed = timeout(Duration::from_secs(5), lines.next_line()).await.unwrap();
        assert!(matches!(closed, Ok(None) | Err(_)));
    }
}
