//! UDP PUT 서버 (수신자)
//!
//! 세그먼트 단위로 파일을 받아 재조립하고, 완성된 파일의 CRC32C를 ACK로 돌려준다.
//!
//! 사용법:
//!   cargo run --release --bin udp-put-server -- --port 9000 [OPTIONS]
//!
//! 예시:
//!   # 완성된 파일을 디렉토리에 저장
//!   cargo run --release --bin udp-put-server -- --port 9000 --output ./received
//!
//!   # 메모리 제한
//!   cargo run --release --bin udp-put-server -- --port 9000 --max-files 64 --idle-timeout-ms 15000

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use udp_put::{Config, Server, DEFAULT_PORT};

/// UDP PUT 수신 서버
#[derive(Parser)]
#[command(name = "udp-put-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 수신 포트
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// 바인드 주소
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// 완성된 파일을 <DIR>/<file_id>.bin 으로 저장
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 동시에 추적하는 최대 파일 수 (0 = 무제한)
    #[arg(long)]
    max_files: Option<usize>,

    /// 미완료 파일 유휴 타임아웃 (0 = 무제한)
    #[arg(long)]
    idle_timeout_ms: Option<u64>,

    /// 완료된 파일 보존 시간 (0 = 영구 보존)
    #[arg(long)]
    retention_ms: Option<u64>,

    /// 통계 출력 주기 (초, 0 = 출력 안 함)
    #[arg(long, default_value_t = 10)]
    stats_interval: u64,

    /// 디버그 로그 출력
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::default();
        if let Some(max_files) = self.max_files {
            config.max_tracked_files = max_files;
        }
        if let Some(idle_timeout_ms) = self.idle_timeout_ms {
            config.idle_timeout_ms = idle_timeout_ms;
        }
        if let Some(retention_ms) = self.retention_ms {
            config.completed_retention_ms = retention_ms;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 로깅 설정 (RUST_LOG 우선)
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = cli.config();
    info!("UDP PUT Server starting...");
    info!("Max tracked files: {}", config.max_tracked_files);
    info!("Idle timeout: {} ms", config.idle_timeout_ms);
    info!("Completed retention: {} ms", config.completed_retention_ms);

    let mut server = Server::bind(SocketAddr::new(cli.bind, cli.port), config).await?;

    // 저장 태스크: 완성된 파일을 <DIR>/<file_id>.bin 으로 기록
    let writer_task = match cli.output.clone() {
        Some(dir) => Some(server.save_completed(dir).await?),
        None => None,
    };

    // ─────────────────────────────────────────────────────────────────
    // 통계 태스크
    // ─────────────────────────────────────────────────────────────────
    let stats = server.stats_handle();
    if cli.stats_interval > 0 {
        let stats = stats.clone();
        let period = Duration::from_secs(cli.stats_interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                info!("{}", stats.read().summary());
            }
        });
    }

    let result = tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            Ok(())
        }
    };

    info!("Final: {}", stats.read().summary());

    // 핸들러(송신측 채널)를 버려야 저장 태스크가 남은 파일을 쓰고 끝난다
    drop(server);
    if let Some(task) = writer_task {
        if let Err(e) = task.await {
            error!("저장 태스크 비정상 종료: {}", e);
        }
    }

    result.map_err(Into::into)
}
