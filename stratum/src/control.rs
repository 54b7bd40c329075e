use crate::{
    error::{StratumError, StratumResult},
    listener::write_lines,
    protocol::{Outbound, StratumMethod, create_error_response, create_success_response, parse_message},
};
use pool_core::{debug, error, info, warn};
use pool_mining::manager::JobManager;
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::{TcpListener, TcpStream},
    time::sleep,
};

/// Operator channel for `daemon.blocknotify`. Listens on loopback only and
/// ignores peers that are not local.
pub struct ControlListener {
    listener: TcpListener,
    job_manager: Arc<JobManager>,
}

impl ControlListener {
    pub async fn bind(addr: SocketAddr, job_manager: Arc<JobManager>) -> StratumResult<Self> {
        if !addr.ip().is_loopback() {
            return Err(StratumError::NonLoopback(addr));
        }
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, job_manager })
    }

    pub fn local_addr(&self) -> StratumResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Control listener started on {}", addr);
        }
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) if peer.ip().is_loopback() => {
                    tokio::spawn(serve_control(self.job_manager.clone(), stream, peer));
                }
                Ok((_, peer)) => warn!("Dropping control connection from non-local peer {}", peer),
                Err(err) => {
                    error!("Failed to accept control connection: {}", err);
                    sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

async fn serve_control(job_manager: Arc<JobManager>, stream: TcpStream, peer: SocketAddr) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                debug!("[control {}] Read failed: {}", peer, err);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle_control_line(&job_manager, line.trim()).await;
        if let Err(err) = write_lines(&mut writer, &[reply]).await {
            debug!("[control {}] Write failed: {}", peer, err);
            break;
        }
    }
}

async fn handle_control_line(job_manager: &JobManager, line: &str) -> Outbound {
    let request = match parse_message(line) {
        Ok(request) => request,
        Err(err) => return Outbound::Response(create_error_response(Value::Null, &err)),
    };
    let response = match StratumMethod::from(request.method.as_str()) {
        StratumMethod::BlockNotify => match job_manager.rebuild().await {
            Ok(job) => {
                info!("Block notification rebuilt job {}", job.job_id_hex());
                create_success_response(request.id, json!("ok"))
            }
            Err(err) => create_error_response(request.id, &StratumError::Template(err)),
        },
        _ => create_error_response(request.id, &StratumError::MethodNotFound(request.method)),
    };
    Outbound::Response(response)
}
